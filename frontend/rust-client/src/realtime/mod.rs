//! Socket.IO transport for PvP matches.

pub mod protocol;
pub mod socket;

pub use socket::{Incoming, SocketConnection};

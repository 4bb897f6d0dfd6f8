//! Client-side state machines.
//!
//! Each machine is a pure reducer (`apply(event) -> effects`) plus, where
//! timers or I/O are involved, an async controller that feeds it.

pub mod countdown;
pub mod leaderboard;
pub mod notice;
pub mod pvp;
pub mod reviews;
pub mod solo;

pub use countdown::{Countdown, Tick};
pub use leaderboard::{rank_leaderboard, RankedEntry};
pub use notice::{Notice, NoticeLevel};
pub use pvp::{PvpController, PvpEffect, PvpHandle, PvpInput, PvpMachine, PvpState};
pub use reviews::{LocalStatus, ReviewBoard, ReviewEntry, ReviewFeed};
pub use solo::{SoloCommand, SoloController, SoloEffect, SoloEvent, SoloGame, SoloHandle, SoloPhase};

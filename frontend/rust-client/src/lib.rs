//! Typed client for the recruiting platform backend: Code Battle sessions
//! and PvP matches, employer reviews and AI interviews.

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod realtime;
pub mod services;
pub mod state;
pub mod utils;

pub use config::Config;
pub use error::{ClientError, Result};
pub use services::{ApiClient, CodeBattleService, InterviewService, ReviewService};

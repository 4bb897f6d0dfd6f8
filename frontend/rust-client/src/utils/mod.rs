pub mod retry;
pub mod time;

pub use retry::{retry_with, RetryPolicy};
pub use time::{format_age, format_clock};

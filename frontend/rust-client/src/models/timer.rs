use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TimerEvent {
    TimerTick(TimerTick),
    TimeExpired(TimeExpired),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TimerTick {
    pub remaining_seconds: u32,
    pub elapsed_seconds: u32,
    pub total_seconds: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TimeExpired {
    pub total_seconds: u32,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl TimerEvent {
    pub fn tick(remaining_seconds: u32, total_seconds: u32) -> Self {
        TimerEvent::TimerTick(TimerTick {
            remaining_seconds,
            elapsed_seconds: total_seconds.saturating_sub(remaining_seconds),
            total_seconds,
            timestamp: Utc::now(),
        })
    }

    pub fn expired(total_seconds: u32) -> Self {
        TimerEvent::TimeExpired(TimeExpired {
            total_seconds,
            timestamp: Utc::now(),
            message: "Time limit exceeded".to_string(),
        })
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            TimerEvent::TimerTick(_) => "timer-tick",
            TimerEvent::TimeExpired(_) => "time-expired",
        }
    }
}

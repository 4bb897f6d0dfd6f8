use crate::models::codebattle::Difficulty;
use crate::models::timer::TimerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Running(u32),
    /// Returned once, on the tick that reaches zero.
    Expired,
    Idle,
}

/// One-second countdown whose expiry fires exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    total: u32,
    remaining: u32,
    expired: bool,
}

impl Countdown {
    pub fn new(total_secs: u32) -> Self {
        Self {
            total: total_secs,
            remaining: total_secs,
            expired: false,
        }
    }

    pub fn for_difficulty(difficulty: Difficulty) -> Self {
        Self::new(difficulty.time_limit_secs())
    }

    pub fn tick(&mut self) -> Tick {
        if self.expired {
            return Tick::Idle;
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.expired = true;
            Tick::Expired
        } else {
            Tick::Running(self.remaining)
        }
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn elapsed(&self) -> u32 {
        self.total - self.remaining
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    pub fn tick_event(&self) -> TimerEvent {
        TimerEvent::tick(self.remaining, self.total)
    }

    pub fn expired_event(&self) -> TimerEvent {
        TimerEvent::expired(self.total)
    }
}

pub mod codebattle;
pub mod interview;
pub mod pvp;
pub mod review;
pub mod timer;

pub use codebattle::*;
pub use interview::{InterviewFeedback, InterviewMessage, InterviewSession, InterviewStatus, Speaker};
pub use pvp::{ClientEvent, MatchInfo, MatchResult, Opponent, ServerEvent};
pub use review::{CreateReviewRequest, EmployerResponse, Review};
pub use timer::TimerEvent;

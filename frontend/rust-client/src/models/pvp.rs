use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::codebattle::{Difficulty, GameTask};
use crate::error::ClientError;

/// Prefix shared by every Code Battle socket event.
pub const EVENT_PREFIX: &str = "codebattle:";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Opponent {
    pub user_id: i64,
    pub username: String,
    #[serde(default)]
    pub rating: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchInfo {
    pub match_id: String,
    pub opponent: Opponent,
    pub task: GameTask,
    #[serde(default)]
    pub time_limit: Option<u32>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

impl MatchInfo {
    /// Seconds on the local clock: the server's limit when sent, else the
    /// difficulty budget.
    pub fn time_limit_secs(&self) -> u32 {
        self.time_limit
            .filter(|secs| *secs > 0)
            .unwrap_or_else(|| self.task.difficulty.time_limit_secs())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PvpSubmitResult {
    #[serde(default)]
    pub solved: bool,
    #[serde(default)]
    pub tests_passed: u32,
    #[serde(default)]
    pub tests_total: u32,
    #[serde(default)]
    pub time_spent: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpponentProgress {
    #[serde(default)]
    pub tests_passed: Option<u32>,
    #[serde(default)]
    pub tests_total: Option<u32>,
    #[serde(default)]
    pub solved: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    #[serde(default)]
    pub match_id: Option<String>,
    #[serde(default)]
    pub winner_id: Option<i64>,
    #[serde(default)]
    pub is_draw: bool,
    #[serde(default)]
    pub rating_change: Option<i32>,
    #[serde(default)]
    pub new_rating: Option<i32>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    FindMatch {
        language: String,
        difficulty: Option<Difficulty>,
    },
    CancelSearch,
    CreateRoom {
        language: String,
        difficulty: Option<Difficulty>,
    },
    JoinRoom {
        room_code: String,
        language: String,
    },
    SubmitCode {
        match_id: String,
        code: String,
        language: String,
    },
    LeaveMatch {
        match_id: Option<String>,
    },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::FindMatch { .. } => "find-match",
            ClientEvent::CancelSearch => "cancel-search",
            ClientEvent::CreateRoom { .. } => "create-room",
            ClientEvent::JoinRoom { .. } => "join-room",
            ClientEvent::SubmitCode { .. } => "submit-code",
            ClientEvent::LeaveMatch { .. } => "leave-match",
        }
    }

    /// Full wire name, e.g. `codebattle:find-match`.
    pub fn wire_name(&self) -> String {
        format!("{}{}", EVENT_PREFIX, self.name())
    }

    pub fn payload(&self) -> Value {
        match self {
            ClientEvent::FindMatch {
                language,
                difficulty,
            }
            | ClientEvent::CreateRoom {
                language,
                difficulty,
            } => json!({ "language": language, "difficulty": difficulty }),
            ClientEvent::CancelSearch => json!({}),
            ClientEvent::JoinRoom {
                room_code,
                language,
            } => json!({ "roomCode": room_code, "language": language }),
            ClientEvent::SubmitCode {
                match_id,
                code,
                language,
            } => json!({ "matchId": match_id, "code": code, "language": language }),
            ClientEvent::LeaveMatch { match_id } => json!({ "matchId": match_id }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Searching { queue_size: Option<u32> },
    MatchFound(MatchInfo),
    SubmitResult(PvpSubmitResult),
    OpponentSubmitted(OpponentProgress),
    MatchFinished(MatchResult),
    OpponentLeft { match_id: Option<String> },
    RoomCreated { room_code: String },
    Error { message: String },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Searching { .. } => "searching",
            ServerEvent::MatchFound(_) => "match-found",
            ServerEvent::SubmitResult(_) => "submit-result",
            ServerEvent::OpponentSubmitted(_) => "opponent-submitted",
            ServerEvent::MatchFinished(_) => "match-finished",
            ServerEvent::OpponentLeft { .. } => "opponent-left",
            ServerEvent::RoomCreated { .. } => "room-created",
            ServerEvent::Error { .. } => "error",
        }
    }

    /// Decodes a socket event. Returns `Ok(None)` for events outside the
    /// Code Battle namespace so callers can skip them.
    pub fn decode(name: &str, data: Value) -> Result<Option<Self>, ClientError> {
        let Some(short) = name.strip_prefix(EVENT_PREFIX) else {
            return Ok(None);
        };

        let event = match short {
            "searching" => ServerEvent::Searching {
                queue_size: data
                    .get("queueSize")
                    .and_then(Value::as_u64)
                    .and_then(|n| u32::try_from(n).ok()),
            },
            "match-found" => ServerEvent::MatchFound(serde_json::from_value(data)?),
            "submit-result" => ServerEvent::SubmitResult(serde_json::from_value(data)?),
            "opponent-submitted" => ServerEvent::OpponentSubmitted(
                serde_json::from_value(data).unwrap_or_default(),
            ),
            "match-finished" => ServerEvent::MatchFinished(serde_json::from_value(data)?),
            "opponent-left" => ServerEvent::OpponentLeft {
                match_id: data
                    .get("matchId")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            "room-created" => ServerEvent::RoomCreated {
                room_code: data
                    .get("roomCode")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        ClientError::Socket("room-created without roomCode".to_string())
                    })?,
            },
            "error" => ServerEvent::Error {
                message: data
                    .get("message")
                    .and_then(Value::as_str)
                    .or_else(|| data.as_str())
                    .unwrap_or("Unknown server error")
                    .to_string(),
            },
            _ => return Ok(None),
        };

        Ok(Some(event))
    }
}

//! Engine.IO v4 / Socket.IO v5 text framing.
//!
//! Only the subset the game server uses is understood: text frames, the
//! default namespace and events with at most one payload argument.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ClientError, Result};

/// Reply to a server heartbeat.
pub const PONG: &str = "3";

/// Query string appended to the socket URL.
pub const HANDSHAKE_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    Message(String),
    Noop,
}

impl EnginePacket {
    pub fn parse(frame: &str) -> Result<Self> {
        let mut chars = frame.chars();
        let kind = chars
            .next()
            .ok_or_else(|| ClientError::Socket("empty frame".to_string()))?;
        let rest = chars.as_str();

        match kind {
            '0' => Ok(EnginePacket::Open(serde_json::from_str(rest)?)),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping),
            '3' => Ok(EnginePacket::Pong),
            '4' => Ok(EnginePacket::Message(rest.to_string())),
            '6' => Ok(EnginePacket::Noop),
            other => Err(ClientError::Socket(format!(
                "unknown engine packet type '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event {
        name: String,
        data: Value,
        ack: Option<u64>,
    },
    Ack {
        id: u64,
        data: Value,
    },
    ConnectError(String),
}

impl SocketPacket {
    /// Parses the payload of an engine `Message` packet.
    pub fn parse(payload: &str) -> Result<Self> {
        let mut chars = payload.chars();
        let kind = chars
            .next()
            .ok_or_else(|| ClientError::Socket("empty socket packet".to_string()))?;
        let mut rest = chars.as_str();

        // optional `/namespace,`
        if rest.starts_with('/') {
            rest = match rest.find(',') {
                Some(idx) => &rest[idx + 1..],
                None => "",
            };
        }

        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        let ack = if digits > 0 {
            rest[..digits].parse::<u64>().ok()
        } else {
            None
        };
        let body = &rest[digits..];

        let value = if body.is_empty() {
            None
        } else {
            Some(serde_json::from_str::<Value>(body)?)
        };

        match kind {
            '0' => Ok(SocketPacket::Connect(value)),
            '1' => Ok(SocketPacket::Disconnect),
            '2' => {
                let Some(Value::Array(mut args)) = value else {
                    return Err(ClientError::Socket("event without arguments".to_string()));
                };
                if args.is_empty() {
                    return Err(ClientError::Socket("event without a name".to_string()));
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    other => {
                        return Err(ClientError::Socket(format!("invalid event name {}", other)))
                    }
                };
                let data = if args.is_empty() {
                    Value::Null
                } else {
                    args.remove(0)
                };
                Ok(SocketPacket::Event { name, data, ack })
            }
            '3' => {
                let id = ack.ok_or_else(|| ClientError::Socket("ack without id".to_string()))?;
                let data = match value {
                    Some(Value::Array(mut args)) if !args.is_empty() => args.remove(0),
                    _ => Value::Null,
                };
                Ok(SocketPacket::Ack { id, data })
            }
            '4' => {
                let message = value
                    .as_ref()
                    .and_then(|v| v.get("message").and_then(Value::as_str).or_else(|| v.as_str()))
                    .unwrap_or("connection refused")
                    .to_string();
                Ok(SocketPacket::ConnectError(message))
            }
            other => Err(ClientError::Socket(format!(
                "unsupported socket packet type '{}'",
                other
            ))),
        }
    }
}

/// `40{"token":...}`: joins the default namespace with auth.
pub fn encode_connect(token: Option<&str>) -> String {
    match token {
        Some(token) => format!("40{}", json!({ "token": token })),
        None => "40".to_string(),
    }
}

/// `42["name",data]`
pub fn encode_event(name: &str, data: &Value) -> String {
    format!("42{}", json!([name, data]))
}

pub fn encode_disconnect() -> String {
    "41".to_string()
}

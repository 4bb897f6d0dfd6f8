use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::protocol::{
    encode_connect, encode_disconnect, encode_event, EnginePacket, OpenInfo, SocketPacket,
    HANDSHAKE_PATH, PONG,
};
use crate::error::{ClientError, Result};
use crate::metrics;
use crate::models::pvp::{ClientEvent, ServerEvent};
use crate::utils::retry::{retry_with, RetryPolicy};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// What the reader task hands to the game controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Event(ServerEvent),
    Closed(String),
}

enum HandshakeError {
    Rejected(String),
    Failed(String),
}

/// A live Socket.IO connection to the game server.
///
/// Frames are pumped by two background tasks; both are aborted when the
/// connection is dropped.
pub struct SocketConnection {
    outgoing: mpsc::UnboundedSender<String>,
    incoming: mpsc::UnboundedReceiver<Incoming>,
    tasks: Vec<JoinHandle<()>>,
}

impl SocketConnection {
    /// Connects to `{socket_url}/socket.io/` and joins the default namespace.
    pub async fn connect(socket_url: &str, token: Option<&str>) -> Result<Self> {
        let url = format!("{}{}", socket_url.trim_end_matches('/'), HANDSHAKE_PATH);

        let result = retry_with(
            &RetryPolicy::socket_connect(),
            |e| matches!(e, HandshakeError::Failed(_)),
            || Self::handshake(&url, token),
        )
        .await;

        match result {
            Ok(conn) => Ok(conn),
            Err(HandshakeError::Rejected(reason)) => {
                tracing::warn!("Socket connection rejected: {}", reason);
                Err(ClientError::Http {
                    status: 401,
                    message: reason,
                })
            }
            Err(HandshakeError::Failed(reason)) => {
                tracing::error!("Socket connection to {} failed: {}", url, reason);
                Err(ClientError::Socket(reason))
            }
        }
    }

    async fn handshake(url: &str, token: Option<&str>) -> std::result::Result<Self, HandshakeError> {
        let connect = async {
            let (ws, _) = connect_async(url)
                .await
                .map_err(|e| HandshakeError::Failed(e.to_string()))?;
            let (mut write, mut read) = ws.split();
            let mut open: Option<OpenInfo> = None;

            loop {
                let frame = match read.next().await {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(HandshakeError::Failed("closed during handshake".to_string()))
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(HandshakeError::Failed(e.to_string())),
                };

                match EnginePacket::parse(&frame) {
                    Ok(EnginePacket::Open(info)) => {
                        tracing::debug!("Engine session opened: sid={}", info.sid);
                        open = Some(info);
                        write
                            .send(Message::Text(encode_connect(token)))
                            .await
                            .map_err(|e| HandshakeError::Failed(e.to_string()))?;
                    }
                    Ok(EnginePacket::Ping) => {
                        write
                            .send(Message::Text(PONG.to_string()))
                            .await
                            .map_err(|e| HandshakeError::Failed(e.to_string()))?;
                    }
                    Ok(EnginePacket::Message(payload)) => match SocketPacket::parse(&payload) {
                        Ok(SocketPacket::Connect(_)) => break,
                        Ok(SocketPacket::ConnectError(reason)) => {
                            return Err(HandshakeError::Rejected(reason))
                        }
                        Ok(other) => tracing::debug!("Ignoring {:?} during handshake", other),
                        Err(e) => return Err(HandshakeError::Failed(e.to_string())),
                    },
                    Ok(EnginePacket::Close) => {
                        return Err(HandshakeError::Failed("closed during handshake".to_string()))
                    }
                    Ok(_) => {}
                    Err(e) => return Err(HandshakeError::Failed(e.to_string())),
                }
            }

            Ok::<_, HandshakeError>((write, read, open))
        };

        let (mut write, mut read, open) = tokio::time::timeout(HANDSHAKE_TIMEOUT, connect)
            .await
            .map_err(|_| HandshakeError::Failed("handshake timed out".to_string()))??;

        let heartbeat = open
            .as_ref()
            .map(|info| Duration::from_millis(info.ping_interval + info.ping_timeout))
            .filter(|d| !d.is_zero());

        tracing::info!("Connected to game server at {}", url);

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<Incoming>();

        let writer = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = write.send(Message::Text(frame)).await {
                    tracing::error!("Failed to send socket frame: {}", e);
                    break;
                }
            }
            let _ = write.close().await;
        });

        let pong_tx = out_tx.clone();
        let reader = tokio::spawn(async move {
            let reason = loop {
                let next = match heartbeat {
                    Some(limit) => match tokio::time::timeout(limit, read.next()).await {
                        Ok(next) => next,
                        Err(_) => break "heartbeat timed out".to_string(),
                    },
                    None => read.next().await,
                };

                let frame = match next {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break "server closed the connection".to_string(),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break e.to_string(),
                };

                match EnginePacket::parse(&frame) {
                    Ok(EnginePacket::Ping) => {
                        let _ = pong_tx.send(PONG.to_string());
                    }
                    Ok(EnginePacket::Message(payload)) => match SocketPacket::parse(&payload) {
                        Ok(SocketPacket::Event { name, data, .. }) => {
                            match ServerEvent::decode(&name, data) {
                                Ok(Some(event)) => {
                                    metrics::record_pvp_event(event.name());
                                    if in_tx.send(Incoming::Event(event)).is_err() {
                                        return;
                                    }
                                }
                                Ok(None) => tracing::debug!("Ignoring socket event {}", name),
                                Err(e) => tracing::warn!("Malformed {} payload: {}", name, e),
                            }
                        }
                        Ok(SocketPacket::Disconnect) => break "disconnected by server".to_string(),
                        Ok(_) => {}
                        Err(e) => tracing::warn!("Failed to parse socket packet: {}", e),
                    },
                    Ok(EnginePacket::Close) => break "server closed the connection".to_string(),
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Failed to parse engine packet: {}", e),
                }
            };

            tracing::info!("Socket closed: {}", reason);
            let _ = in_tx.send(Incoming::Closed(reason));
        });

        Ok(SocketConnection {
            outgoing: out_tx,
            incoming: in_rx,
            tasks: vec![reader, writer],
        })
    }

    /// Wraps raw frame channels; the game controller cannot tell the
    /// difference from a network connection.
    pub fn from_channels(
        outgoing: mpsc::UnboundedSender<String>,
        incoming: mpsc::UnboundedReceiver<Incoming>,
    ) -> Self {
        Self {
            outgoing,
            incoming,
            tasks: Vec::new(),
        }
    }

    pub fn emit(&self, event: &ClientEvent) -> Result<()> {
        tracing::debug!("Emitting {}", event.wire_name());
        self.outgoing
            .send(encode_event(&event.wire_name(), &event.payload()))
            .map_err(|_| ClientError::Socket("connection closed".to_string()))
    }

    /// Next decoded server event; `None` once both sides are gone.
    pub async fn next_event(&mut self) -> Option<Incoming> {
        self.incoming.recv().await
    }

    pub fn close(&self) {
        let _ = self.outgoing.send(encode_disconnect());
    }
}

impl Drop for SocketConnection {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

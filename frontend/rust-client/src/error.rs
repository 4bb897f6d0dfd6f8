use thiserror::Error;

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("{0}")]
    Validation(String),

    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("socket error: {0}")]
    Socket(String),

    #[error("not supported: {0}")]
    Unsupported(String),

    #[error("action not allowed while {0}")]
    InvalidTransition(&'static str),
}

impl ClientError {
    /// Extracts the most useful message from an error response body.
    ///
    /// The backend answers with `{"error": "..."}` for most failures and
    /// `{"message": "..."}` for validation; anything else is passed through.
    pub fn from_response_body(status: u16, body: &str) -> Self {
        let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
        let message = parsed
            .as_ref()
            .and_then(|v| v.get("error").or_else(|| v.get("message")))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| {
                reqwest::StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Unknown error")
                    .to_string()
            });

        ClientError::Http { status, message }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Http { status: 404, .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Http { status: 401, .. })
    }

    /// Text shown to the user in a toast.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Transport(_) => "Network error, please check your connection".to_string(),
            ClientError::Http { message, .. } => message.clone(),
            ClientError::Validation(msg) => msg.clone(),
            ClientError::Decode(_) => "Unexpected response from server".to_string(),
            ClientError::Socket(_) => "Connection to the game server lost".to_string(),
            ClientError::Unsupported(what) => format!("{} is not available", what),
            ClientError::InvalidTransition(state) => format!("Not available while {}", state),
        }
    }
}

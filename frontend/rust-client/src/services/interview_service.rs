use base64::{engine::general_purpose, Engine as _};

use super::ApiClient;
use crate::error::{ClientError, Result};
use crate::models::interview::{
    AudioAnswerRequest, CreateInterviewRequest, InterviewFeedback, InterviewSession,
    MessageReply, SendMessageRequest, TtsRequest,
};

#[derive(Clone)]
pub struct InterviewService {
    api: ApiClient,
}

impl InterviewService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn create(&self, req: &CreateInterviewRequest) -> Result<InterviewSession> {
        if req.role.trim().is_empty() {
            return Err(ClientError::Validation("Please choose a role".to_string()));
        }
        let session: InterviewSession = self.api.post("/interviews", "/interviews", req).await?;
        tracing::info!("Interview created: id={}, role={}", session.id, session.role);
        Ok(session)
    }

    pub async fn get(&self, id: i64) -> Result<InterviewSession> {
        self.api
            .get("/interviews/:id", &format!("/interviews/{}", id))
            .await
    }

    /// Sends a chat answer and folds the reply into `session`.
    ///
    /// The candidate message is appended before the request; on failure it
    /// stays in the transcript so the user can see what was not delivered.
    pub async fn send_message(
        &self,
        session: &mut InterviewSession,
        content: &str,
    ) -> Result<Option<InterviewFeedback>> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ClientError::Validation("Message must not be empty".to_string()));
        }
        if session.is_completed() {
            return Err(ClientError::InvalidTransition("the interview is completed"));
        }

        session.push_local(crate::models::InterviewMessage::candidate(content));

        let reply: MessageReply = self
            .api
            .post(
                "/interviews/:id/message",
                &format!("/interviews/{}/message", session.id),
                &SendMessageRequest {
                    content: content.to_string(),
                },
            )
            .await?;

        session.replace_from_server(reply.messages);
        if let Some(feedback) = reply.feedback.clone() {
            session.finish(feedback);
        }
        Ok(reply.feedback)
    }

    pub async fn complete(&self, session: &mut InterviewSession) -> Result<InterviewFeedback> {
        let feedback: InterviewFeedback = self
            .api
            .post(
                "/interviews/:id/complete",
                &format!("/interviews/{}/complete", session.id),
                &serde_json::json!({}),
            )
            .await?;
        tracing::info!("Interview completed: id={}, score={}", session.id, feedback.score);
        session.finish(feedback.clone());
        Ok(feedback)
    }

    pub async fn mine(&self) -> Result<Vec<InterviewSession>> {
        self.api.get("/interviews/my", "/interviews/my").await
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.api
            .delete("/interviews/:id", &format!("/interviews/{}", id))
            .await
    }

    pub async fn create_audio(&self, req: &CreateInterviewRequest) -> Result<InterviewSession> {
        self.api
            .post("/interviews/audio", "/interviews/audio", req)
            .await
    }

    /// Submits a speech-recognised answer. An empty transcript means the
    /// recogniser produced nothing, which is reported as unsupported.
    pub async fn answer_audio(&self, id: i64, transcript: &str) -> Result<MessageReply> {
        if transcript.trim().is_empty() {
            return Err(ClientError::Unsupported("Speech recognition".to_string()));
        }
        self.api
            .post(
                "/interviews/audio/:id/answer",
                &format!("/interviews/audio/{}/answer", id),
                &AudioAnswerRequest {
                    transcript: transcript.trim().to_string(),
                },
            )
            .await
    }

    pub async fn complete_audio(&self, id: i64) -> Result<InterviewFeedback> {
        self.api
            .post(
                "/interviews/audio/:id/complete",
                &format!("/interviews/audio/{}/complete", id),
                &serde_json::json!({}),
            )
            .await
    }

    /// Synthesised speech for `text`. Accepts either `{"audio": "<base64>"}`
    /// or a raw audio body.
    pub async fn tts(&self, req: &TtsRequest) -> Result<Vec<u8>> {
        let bytes = self
            .api
            .post_raw("/interviews/tts", "/interviews/tts", req)
            .await?;
        decode_audio(&bytes)
    }
}

fn decode_audio(bytes: &[u8]) -> Result<Vec<u8>> {
    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(value) => {
            let encoded = value
                .get("audio")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ClientError::Unsupported("Speech synthesis".to_string()))?;
            // data URLs carry a `data:audio/mpeg;base64,` prefix
            let encoded = encoded.rsplit(',').next().unwrap_or(encoded);
            general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| ClientError::Unsupported(format!("Speech synthesis ({})", e)))
        }
        Err(_) if !bytes.is_empty() => Ok(bytes.to_vec()),
        Err(_) => Err(ClientError::Unsupported("Speech synthesis".to_string())),
    }
}

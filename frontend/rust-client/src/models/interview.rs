use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Interviewer,
    Candidate,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InterviewMessage {
    pub role: Speaker,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl InterviewMessage {
    pub fn candidate(content: impl Into<String>) -> Self {
        Self {
            role: Speaker::Candidate,
            content: content.into(),
            created_at: Some(Utc::now()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InterviewFeedback {
    pub score: u32,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewStatus {
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InterviewSession {
    pub id: i64,
    pub role: String,
    #[serde(default)]
    pub level: Option<String>,
    pub status: InterviewStatus,
    #[serde(default)]
    pub messages: Vec<InterviewMessage>,
    #[serde(default)]
    pub feedback: Option<InterviewFeedback>,
}

impl InterviewSession {
    /// Appends the candidate's message before the server answers.
    pub fn push_local(&mut self, message: InterviewMessage) {
        self.messages.push(message);
    }

    /// Replaces the transcript with the server's copy, which already
    /// contains the candidate message and the interviewer's reply.
    pub fn replace_from_server(&mut self, messages: Vec<InterviewMessage>) {
        self.messages = messages;
    }

    pub fn finish(&mut self, feedback: InterviewFeedback) {
        self.status = InterviewStatus::Completed;
        self.feedback = Some(feedback);
    }

    pub fn is_completed(&self) -> bool {
        self.status == InterviewStatus::Completed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInterviewRequest {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// Reply to a chat message: the full transcript and, on the final
/// question, the feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReply {
    pub messages: Vec<InterviewMessage>,
    #[serde(default)]
    pub feedback: Option<InterviewFeedback>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioAnswerRequest {
    pub transcript: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsRequest {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> InterviewSession {
        InterviewSession {
            id: 1,
            role: "backend".to_string(),
            level: Some("junior".to_string()),
            status: InterviewStatus::InProgress,
            messages: vec![],
            feedback: None,
        }
    }

    #[test]
    fn test_transcript_updates() {
        let mut s = session();
        s.push_local(InterviewMessage::candidate("I like Rust"));
        assert_eq!(s.messages.len(), 1);

        s.replace_from_server(vec![
            InterviewMessage::candidate("I like Rust"),
            InterviewMessage {
                role: Speaker::Interviewer,
                content: "Why?".to_string(),
                created_at: None,
            },
        ]);
        assert_eq!(s.messages.len(), 2);
        assert_eq!(s.messages[1].role, Speaker::Interviewer);
    }

    #[test]
    fn test_finish_stores_feedback() {
        let mut s = session();
        s.finish(InterviewFeedback {
            score: 78,
            strengths: vec!["clarity".to_string()],
            weaknesses: vec![],
            recommendations: vec![],
            summary: None,
        });
        assert!(s.is_completed());
        assert_eq!(s.feedback.as_ref().map(|f| f.score), Some(78));
    }
}

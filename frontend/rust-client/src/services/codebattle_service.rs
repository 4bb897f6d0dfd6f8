use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use super::ApiClient;
use crate::error::{ClientError, Result};
use crate::models::codebattle::{
    AiStatus, BattleStats, CodeRequest, ExecuteRequest, ExecuteResult, GameTask, HintResponse,
    HistoryEntry, LanguageInfo, LeaderboardEntry, PlayerRating, RequestHintRequest,
    StartSessionRequest, StartSessionResponse, SubmitResult, TaskFilter, TestRunResult,
};
use crate::state::leaderboard::{rank_leaderboard, RankedEntry};

/// Session operations the solo/VS-AI controller depends on.
#[async_trait]
pub trait CodeBattleApi: Send + Sync {
    async fn start_session(&self, req: &StartSessionRequest) -> Result<StartSessionResponse>;
    async fn run_tests(&self, session_id: i64, code: &str) -> Result<TestRunResult>;
    async fn submit(&self, session_id: i64, code: &str) -> Result<SubmitResult>;
    async fn request_hint(&self, session_id: i64) -> Result<HintResponse>;
    async fn ai_status(&self, session_id: i64) -> Result<AiStatus>;
}

#[derive(Debug, Serialize)]
struct LimitQuery {
    limit: u32,
}

#[derive(Clone)]
pub struct CodeBattleService {
    api: ApiClient,
}

impl CodeBattleService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<GameTask>> {
        self.api
            .get_with_query("/codebattle/tasks", "/codebattle/tasks", filter)
            .await
    }

    pub async fn get_task(&self, task_id: i64) -> Result<GameTask> {
        self.api
            .get("/codebattle/tasks/:id", &format!("/codebattle/tasks/{}", task_id))
            .await
    }

    pub async fn daily_task(&self) -> Result<GameTask> {
        self.api
            .get("/codebattle/tasks/daily", "/codebattle/tasks/daily")
            .await
    }

    pub async fn my_rating(&self) -> Result<PlayerRating> {
        self.api
            .get("/codebattle/rating/me", "/codebattle/rating/me")
            .await
    }

    /// Leaderboard in display order; equal ratings keep server order.
    pub async fn leaderboard(&self, limit: u32) -> Result<Vec<RankedEntry>> {
        let entries: Vec<LeaderboardEntry> = self
            .api
            .get_with_query(
                "/codebattle/leaderboard",
                "/codebattle/leaderboard",
                &LimitQuery { limit },
            )
            .await?;
        Ok(rank_leaderboard(entries))
    }

    pub async fn execute(&self, req: &ExecuteRequest) -> Result<ExecuteResult> {
        if req.code.trim().is_empty() {
            return Err(ClientError::Validation("Code must not be empty".to_string()));
        }
        self.api
            .post("/codebattle/execute", "/codebattle/execute", req)
            .await
    }

    pub async fn languages(&self) -> Result<Vec<LanguageInfo>> {
        self.api
            .get("/codebattle/languages", "/codebattle/languages")
            .await
    }

    pub async fn history(&self, limit: u32) -> Result<Vec<HistoryEntry>> {
        self.api
            .get_with_query(
                "/codebattle/history",
                "/codebattle/history",
                &LimitQuery { limit },
            )
            .await
    }

    pub async fn stats(&self) -> Result<BattleStats> {
        self.api.get("/codebattle/stats", "/codebattle/stats").await
    }
}

#[async_trait]
impl CodeBattleApi for CodeBattleService {
    async fn start_session(&self, req: &StartSessionRequest) -> Result<StartSessionResponse> {
        let response: StartSessionResponse = self
            .api
            .post(
                "/codebattle/sessions/start",
                "/codebattle/sessions/start",
                req,
            )
            .await?;

        tracing::info!(
            "Session started: id={}, task={}, mode={}",
            response.session.id,
            response.task.id,
            req.mode.as_str()
        );
        Ok(response)
    }

    async fn run_tests(&self, session_id: i64, code: &str) -> Result<TestRunResult> {
        self.api
            .post(
                "/codebattle/sessions/:id/test",
                &format!("/codebattle/sessions/{}/test", session_id),
                &CodeRequest {
                    code: code.to_string(),
                    language: None,
                    idempotency_key: None,
                },
            )
            .await
    }

    async fn submit(&self, session_id: i64, code: &str) -> Result<SubmitResult> {
        let result: SubmitResult = self
            .api
            .post(
                "/codebattle/sessions/:id/submit",
                &format!("/codebattle/sessions/{}/submit", session_id),
                &CodeRequest {
                    code: code.to_string(),
                    language: None,
                    idempotency_key: Some(Uuid::new_v4().to_string()),
                },
            )
            .await?;

        tracing::info!(
            "Session submitted: id={}, solved={}, tests={}/{}",
            session_id,
            result.solved,
            result.tests_passed,
            result.tests_total
        );
        Ok(result)
    }

    async fn request_hint(&self, session_id: i64) -> Result<HintResponse> {
        self.api
            .post(
                "/codebattle/sessions/:id/hint",
                &format!("/codebattle/sessions/{}/hint", session_id),
                &RequestHintRequest {
                    idempotency_key: Some(Uuid::new_v4().to_string()),
                },
            )
            .await
    }

    async fn ai_status(&self, session_id: i64) -> Result<AiStatus> {
        self.api
            .get(
                "/codebattle/sessions/:id/ai-status",
                &format!("/codebattle/sessions/{}/ai-status", session_id),
            )
            .await
    }
}

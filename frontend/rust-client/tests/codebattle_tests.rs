mod common;

use common::MockBackend;
use recruit_client::models::codebattle::{Difficulty, ExecuteRequest, League, TaskFilter};
use recruit_client::services::{ApiClient, CodeBattleService};
use recruit_client::ClientError;

async fn service(backend: &MockBackend) -> (ApiClient, CodeBattleService) {
    let api = ApiClient::new(&backend.config()).unwrap();
    (api.clone(), CodeBattleService::new(api))
}

#[tokio::test]
async fn test_list_tasks_sends_filter_and_trace_id() {
    let backend = MockBackend::start().await;
    let (_, battle) = service(&backend).await;

    let tasks = battle
        .list_tasks(&TaskFilter {
            difficulty: Some(Difficulty::Hard),
            ..TaskFilter::default()
        })
        .await
        .unwrap();

    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].difficulty, Difficulty::Hard);
    assert_eq!(tasks[0].difficulty.time_limit_secs(), 600);

    let recorded = backend.state.requests_to("/codebattle/tasks");
    assert_eq!(recorded[0].body["difficulty"], "hard");
    assert!(recorded[0].body.get("language").is_none());
    assert!(recorded[0].trace_id.is_some());
}

#[tokio::test]
async fn test_missing_task_surfaces_server_message() {
    let backend = MockBackend::start().await;
    let (_, battle) = service(&backend).await;

    let err = battle.get_task(99).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.user_message(), "Task not found");
}

#[tokio::test]
async fn test_daily_task() {
    let backend = MockBackend::start().await;
    let (_, battle) = service(&backend).await;

    let task = battle.daily_task().await.unwrap();
    assert_eq!(task.id, 2);
    assert_eq!(task.visible_tests().count(), 1);
}

#[tokio::test]
async fn test_leaderboard_keeps_server_order_for_ties() {
    let backend = MockBackend::start().await;
    let (_, battle) = service(&backend).await;

    let ranked = battle.leaderboard(10).await.unwrap();
    let names: Vec<&str> = ranked.iter().map(|r| r.entry.username.as_str()).collect();
    assert_eq!(names, vec!["alice", "carol", "dave", "bob"]);
    assert_eq!(ranked[0].rank, 1);
    assert_eq!(ranked[0].league, League::Platinum);
    // server league wins over the derived bucket
    assert_eq!(ranked[3].league, League::Gold);

    let again = battle.leaderboard(10).await.unwrap();
    assert_eq!(ranked, again);
}

#[tokio::test]
async fn test_rating_requires_token() {
    let backend = MockBackend::start().await;
    let (api, battle) = service(&backend).await;

    let rating = battle.my_rating().await.unwrap();
    assert_eq!(rating.rating, 1420);
    assert_eq!(rating.effective_league(), League::Platinum);

    api.clear_token();
    let err = battle.my_rating().await.unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn test_execute_rejects_empty_code_locally() {
    let backend = MockBackend::start().await;
    let (_, battle) = service(&backend).await;

    let err = battle
        .execute(&ExecuteRequest {
            language: "javascript".to_string(),
            code: "  \n".to_string(),
            input: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
    assert!(backend.state.requests_to("/codebattle/execute").is_empty());

    let result = battle
        .execute(&ExecuteRequest {
            language: "javascript".to_string(),
            code: "console.log(1 + 2)".to_string(),
            input: None,
        })
        .await
        .unwrap();
    assert_eq!(result.stdout, "3\n");
}

#[tokio::test]
async fn test_unreachable_backend_is_a_transport_error() {
    let backend = MockBackend::start().await;
    let mut config = backend.config();
    drop(backend);
    config.api_url = "http://127.0.0.1:9".to_string();

    let battle = CodeBattleService::new(ApiClient::new(&config).unwrap());
    let err = battle.daily_task().await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
}

#![allow(dead_code)]

//! In-process stand-in for the platform backend: the REST routes the client
//! calls plus a minimal Socket.IO endpoint.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use recruit_client::config::Config;

pub const TEST_TOKEN: &str = "test-token";
pub const PLAYER_ID: i64 = 1;
pub const OPPONENT_ID: i64 = 2;

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub trace_id: Option<String>,
    pub body: Value,
}

#[derive(Default)]
pub struct MockState {
    pub requests: Mutex<Vec<Recorded>>,
    pub socket_frames: Mutex<Vec<String>>,
    pub ai_statuses: Mutex<VecDeque<Value>>,
    pub reviews: Mutex<Vec<Value>>,
    /// When set, listings omit reviews created through the API.
    pub stale_listing: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub fail_responses: AtomicBool,
    pub submits: AtomicUsize,
    pub next_id: AtomicI64,
}

impl MockState {
    fn record(&self, method: &str, path: String, headers: &HeaderMap, body: Value) {
        let trace_id = headers
            .get("x-trace-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.requests.lock().unwrap().push(Recorded {
            method: method.to_string(),
            path,
            trace_id,
            body,
        });
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    pub fn frames(&self) -> Vec<String> {
        self.socket_frames.lock().unwrap().clone()
    }

    fn next_id(&self) -> i64 {
        100 + self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

pub struct MockBackend {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
    server: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();

        let state = Arc::new(MockState::default());
        *state.reviews.lock().unwrap() = vec![
            review_json(1, 11, "Friendly interviewers"),
            review_json(2, 12, "Slow feedback"),
        ];

        let app = router(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            server,
        }
    }

    pub fn config(&self) -> Config {
        Config {
            api_url: format!("http://{}", self.addr),
            socket_url: format!("ws://{}", self.addr),
            access_token: Some(TEST_TOKEN.to_string()),
            pvp_start_delay_ms: 50,
            ..Config::default()
        }
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

pub fn task_json(id: i64) -> Value {
    let difficulty = match id {
        2 => "medium",
        3 => "hard",
        _ => "easy",
    };
    json!({
        "id": id,
        "title": format!("Task {}", id),
        "description": "Return the sum of two numbers",
        "difficulty": difficulty,
        "languages": ["javascript", "python"],
        "testCases": [
            {"input": "1 2", "expectedOutput": "3"},
            {"input": "2 2", "expectedOutput": "4", "hidden": true}
        ],
        "starterCode": {"javascript": "function solve(a, b) {\n}\n"}
    })
}

pub fn review_json(id: i64, user_id: i64, comment: &str) -> Value {
    json!({
        "id": id,
        "userId": user_id,
        "employerId": 1,
        "rating": 4,
        "comment": comment,
        "authorName": format!("user{}", user_id)
    })
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/api/codebattle/tasks", get(list_tasks))
        .route("/api/codebattle/tasks/daily", get(daily_task))
        .route("/api/codebattle/tasks/{id}", get(get_task))
        .route("/api/codebattle/leaderboard", get(leaderboard))
        .route("/api/codebattle/rating/me", get(my_rating))
        .route("/api/codebattle/sessions/start", post(start_session))
        .route("/api/codebattle/sessions/{id}/test", post(run_tests))
        .route("/api/codebattle/sessions/{id}/submit", post(submit))
        .route("/api/codebattle/sessions/{id}/hint", post(hint))
        .route("/api/codebattle/sessions/{id}/ai-status", get(ai_status))
        .route("/api/codebattle/execute", post(execute))
        .route("/api/reviews", post(create_review))
        .route("/api/reviews/employer/{id}", get(list_reviews))
        .route("/api/reviews/{id}", axum::routing::delete(delete_review))
        .route(
            "/api/reviews/{id}/response",
            post(add_response).put(add_response).delete(delete_response),
        )
        .route("/api/interviews", post(create_interview))
        .route("/api/interviews/{id}/message", post(interview_message))
        .route("/api/interviews/{id}/complete", post(complete_interview))
        .route("/api/interviews/tts", post(tts))
        .route("/socket.io/", get(socket))
        .with_state(state)
}

async fn list_tasks(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.record("GET", "/codebattle/tasks".into(), &headers, json!(query));
    let tasks: Vec<Value> = [1, 2, 3]
        .into_iter()
        .map(task_json)
        .filter(|t| match query.get("difficulty") {
            Some(d) => t["difficulty"] == d.as_str(),
            None => true,
        })
        .collect();
    Json(json!(tasks))
}

async fn daily_task(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Json<Value> {
    state.record("GET", "/codebattle/tasks/daily".into(), &headers, Value::Null);
    Json(task_json(2))
}

async fn get_task(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    state.record("GET", format!("/codebattle/tasks/{}", id), &headers, Value::Null);
    if id > 3 {
        return error(StatusCode::NOT_FOUND, "Task not found");
    }
    Json(task_json(id)).into_response()
}

async fn leaderboard(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Json<Value> {
    state.record("GET", "/codebattle/leaderboard".into(), &headers, Value::Null);
    Json(json!([
        {"userId": 3, "username": "carol", "rating": 1250},
        {"userId": 1, "username": "alice", "rating": 1420},
        {"userId": 4, "username": "dave", "rating": 1250},
        {"userId": 2, "username": "bob", "rating": 1250, "league": "gold"}
    ]))
}

async fn my_rating(headers: HeaderMap) -> Response {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", TEST_TOKEN))
        .unwrap_or(false);
    if !authorized {
        return error(StatusCode::UNAUTHORIZED, "Authentication required");
    }
    Json(json!({"rating": 1420, "wins": 12, "losses": 4, "draws": 1})).into_response()
}

async fn start_session(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record("POST", "/codebattle/sessions/start".into(), &headers, body.clone());
    let task_id = body["taskId"].as_i64().unwrap_or(1);
    if task_id > 3 {
        return error(StatusCode::NOT_FOUND, "Task not found");
    }
    let id = state.next_id();
    Json(json!({
        "session": {
            "id": id,
            "taskId": task_id,
            "mode": body["mode"],
            "status": "active",
            "language": body["language"]
        },
        "task": task_json(task_id)
    }))
    .into_response()
}

async fn run_tests(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record("POST", format!("/codebattle/sessions/{}/test", id), &headers, body);
    Json(json!({"passed": 1, "total": 1, "results": [{"input": "1 2", "expected": "3", "actual": "3", "passed": true}]}))
}

async fn submit(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record("POST", format!("/codebattle/sessions/{}/submit", id), &headers, body.clone());
    state.submits.fetch_add(1, Ordering::SeqCst);
    let solved = body["code"].as_str().unwrap_or("").contains("return");
    Json(json!({
        "solved": solved,
        "testsPassed": if solved { 2 } else { 0 },
        "testsTotal": 2,
        "score": if solved { 100 } else { 0 },
        "timeSpent": 42,
        "ratingChange": if solved { 12 } else { -8 }
    }))
}

async fn hint(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record("POST", format!("/codebattle/sessions/{}/hint", id), &headers, body);
    let used = state.requests_to(&format!("/codebattle/sessions/{}/hint", id)).len();
    Json(json!({"hint": format!("Hint {}", used), "hintsUsed": used}))
}

async fn ai_status(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Json<Value> {
    state.record("GET", format!("/codebattle/sessions/{}/ai-status", id), &headers, Value::Null);
    let next = state.ai_statuses.lock().unwrap().pop_front();
    Json(next.unwrap_or_else(|| json!({"status": "completed", "progress": 100})))
}

async fn execute(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record("POST", "/codebattle/execute".into(), &headers, body);
    Json(json!({"stdout": "3\n", "stderr": "", "exitCode": 0, "timeMs": 12}))
}

async fn list_reviews(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Json<Value> {
    state.record("GET", format!("/reviews/employer/{}", id), &headers, Value::Null);
    let stale = state.stale_listing.load(Ordering::SeqCst);
    let reviews: Vec<Value> = state
        .reviews
        .lock()
        .unwrap()
        .iter()
        .filter(|r| !(stale && r["id"].as_i64().unwrap_or(0) >= 100))
        .cloned()
        .collect();
    Json(json!(reviews))
}

async fn create_review(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record("POST", "/reviews".into(), &headers, body.clone());
    let id = state.next_id();
    let mut review = review_json(id, PLAYER_ID, body["comment"].as_str().unwrap_or(""));
    review["rating"] = body["rating"].clone();
    state.reviews.lock().unwrap().insert(0, review.clone());
    Json(review)
}

async fn delete_review(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    state.record("DELETE", format!("/reviews/{}", id), &headers, Value::Null);
    if state.fail_deletes.load(Ordering::SeqCst) {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "Database unavailable");
    }
    state
        .reviews
        .lock()
        .unwrap()
        .retain(|r| r["id"].as_i64() != Some(id));
    StatusCode::NO_CONTENT.into_response()
}

async fn add_response(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Response {
    state.record("POST", format!("/reviews/{}/response", id), &headers, body.clone());
    if state.fail_responses.load(Ordering::SeqCst) {
        return error(StatusCode::FORBIDDEN, "Only the employer can respond");
    }
    Json(json!({"text": body["text"], "createdAt": "2026-01-05T10:00:00Z"})).into_response()
}

async fn delete_response(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    state.record("DELETE", format!("/reviews/{}/response", id), &headers, Value::Null);
    if state.fail_responses.load(Ordering::SeqCst) {
        return error(StatusCode::FORBIDDEN, "Only the employer can respond");
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn create_interview(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record("POST", "/interviews".into(), &headers, body.clone());
    Json(json!({
        "id": 7,
        "role": body["role"],
        "status": "in_progress",
        "messages": [
            {"role": "interviewer", "content": "Tell me about yourself."}
        ]
    }))
}

async fn interview_message(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record("POST", format!("/interviews/{}/message", id), &headers, body.clone());
    Json(json!({
        "messages": [
            {"role": "interviewer", "content": "Tell me about yourself."},
            {"role": "candidate", "content": body["content"]},
            {"role": "interviewer", "content": "Why Rust?"}
        ]
    }))
}

async fn complete_interview(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Json<Value> {
    state.record("POST", format!("/interviews/{}/complete", id), &headers, Value::Null);
    Json(json!({
        "score": 78,
        "summary": "Clear answers",
        "strengths": ["communication"],
        "recommendations": ["system design"]
    }))
}

async fn tts(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record("POST", "/interviews/tts".into(), &headers, body);
    Json(json!({ "audio": general_purpose::STANDARD.encode(b"RIFFwave") }))
}

async fn socket(State(state): State<Arc<MockState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn send_text(socket: &mut WebSocket, text: String) -> bool {
    socket.send(Message::Text(text.into())).await.is_ok()
}

async fn emit(socket: &mut WebSocket, name: &str, data: Value) -> bool {
    send_text(socket, format!("42{}", json!([format!("codebattle:{}", name), data]))).await
}

/// Socket.IO emulation: handshake with token auth, one heartbeat, then a
/// scripted match for every `find-match`.
async fn serve_socket(mut socket: WebSocket, state: Arc<MockState>) {
    let open = json!({"sid": "mock-sid", "upgrades": [], "pingInterval": 25000, "pingTimeout": 20000});
    if !send_text(&mut socket, format!("0{}", open)).await {
        return;
    }

    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        let text = text.to_string();
        state.socket_frames.lock().unwrap().push(text.clone());

        if let Some(auth) = text.strip_prefix("40") {
            let token = serde_json::from_str::<Value>(auth)
                .ok()
                .and_then(|v| v["token"].as_str().map(str::to_string));
            if token.as_deref() != Some(TEST_TOKEN) {
                send_text(&mut socket, r#"44{"message":"Authentication error"}"#.to_string()).await;
                return;
            }
            send_text(&mut socket, r#"40{"sid":"mock-socket"}"#.to_string()).await;
            send_text(&mut socket, "2".to_string()).await;
            continue;
        }

        let Some(payload) = text.strip_prefix("42") else {
            continue;
        };
        let Ok(Value::Array(args)) = serde_json::from_str::<Value>(payload) else {
            continue;
        };
        let name = args.first().and_then(Value::as_str).unwrap_or_default();
        let data = args.get(1).cloned().unwrap_or(Value::Null);

        match name {
            "codebattle:find-match" => {
                emit(&mut socket, "searching", json!({"queueSize": 1})).await;
                emit(&mut socket, "some-other-event", json!({})).await;
                emit(
                    &mut socket,
                    "match-found",
                    json!({
                        "matchId": "match-1",
                        "opponent": {"userId": OPPONENT_ID, "username": "rival", "rating": 1300},
                        "task": task_json(2)
                    }),
                )
                .await;
            }
            "codebattle:submit-code" => {
                emit(
                    &mut socket,
                    "submit-result",
                    json!({"solved": true, "testsPassed": 2, "testsTotal": 2}),
                )
                .await;
                emit(
                    &mut socket,
                    "match-finished",
                    json!({
                        "matchId": data["matchId"],
                        "winnerId": PLAYER_ID,
                        "isDraw": false,
                        "ratingChange": 15,
                        "newRating": 1435
                    }),
                )
                .await;
            }
            _ => {}
        }
    }
}

//! Mock inference services for backend tests
//!
//! One axum app serves both the cloud messages endpoint and the on-device
//! generate API. The cloud answer depends on the API key sent:
//! - `sk-good`: fenced JSON answer
//! - `sk-revoked`: 401
//! - `sk-busy`: 429
//! - `sk-empty`: 200 without a text block
//! - anything else: 500

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

pub const CLOUD_ANSWER: &str =
    "```json\n{\"tags\": {\"objects\": [\"Sea\", \"boat\"], \"scene\": [\"harbor\"]}, \"description\": \"漁港の朝\"}\n```";

pub const ON_DEVICE_ANSWER: &str = "Tags:\n- 夕焼け\n- 海\n- 港";

/// A request seen by the mock
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: &'static str,
    pub api_key: Option<String>,
    pub api_version: Option<String>,
    pub body: Value,
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<RecordedRequest>>>);

pub struct InferenceServer {
    base_url: String,
    recorder: Recorder,
    task: JoinHandle<()>,
}

impl InferenceServer {
    pub async fn start() -> Self {
        let recorder = Recorder::default();

        let app = Router::new()
            .route("/v1/messages", post(messages))
            .route("/api/version", get(version))
            .route("/api/generate", post(generate))
            .with_state(recorder.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            recorder,
            task,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.recorder.0.lock().unwrap().clone()
    }
}

impl Drop for InferenceServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn messages(
    State(recorder): State<Recorder>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let api_key = header(&headers, "x-api-key");
    recorder.0.lock().unwrap().push(RecordedRequest {
        path: "/v1/messages",
        api_key: api_key.clone(),
        api_version: header(&headers, "anthropic-version"),
        body,
    });

    match api_key.as_deref() {
        Some("sk-good") => Json(json!({
            "id": "msg_1",
            "type": "message",
            "content": [
                {"type": "text", "text": CLOUD_ANSWER}
            ]
        }))
        .into_response(),
        Some("sk-revoked") => StatusCode::UNAUTHORIZED.into_response(),
        Some("sk-busy") => StatusCode::TOO_MANY_REQUESTS.into_response(),
        Some("sk-empty") => Json(json!({"content": []})).into_response(),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "overloaded").into_response(),
    }
}

async fn version() -> Json<Value> {
    Json(json!({"version": "0.6.0"}))
}

async fn generate(State(recorder): State<Recorder>, Json(body): Json<Value>) -> Json<Value> {
    recorder.0.lock().unwrap().push(RecordedRequest {
        path: "/api/generate",
        api_key: None,
        api_version: None,
        body,
    });
    Json(json!({"model": "gemma3:4b", "response": ON_DEVICE_ANSWER, "done": true}))
}

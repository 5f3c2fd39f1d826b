//! Test utilities and common setup.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::{Value, json};
use tokio::sync::Mutex;

use terra::api::{self, AppState};
use terra::upstream::UpstreamClient;

pub const TEST_API_KEY: &str = "test-relay-credential";
pub const TEST_MODEL: &str = "meta/llama-3.1-405b-instruct";

/// What the stub upstream replies with.
pub enum StubUpstream {
    /// 200 with the given JSON body.
    Success(Value),
    /// The given status with a JSON error body.
    Status(u16),
    /// 200 with a body that is not JSON.
    NotJson,
}

/// The last request the stub upstream saw.
#[derive(Clone)]
pub struct RecordedRequest {
    pub body: Value,
    pub authorization: Option<String>,
}

/// Shared recorder so tests can assert on what actually went upstream.
#[derive(Clone, Default)]
pub struct UpstreamRecorder {
    inner: Arc<Mutex<Option<RecordedRequest>>>,
}

impl UpstreamRecorder {
    pub async fn last(&self) -> RecordedRequest {
        self.inner
            .lock()
            .await
            .clone()
            .expect("upstream was never called")
    }

    pub async fn was_called(&self) -> bool {
        self.inner.lock().await.is_some()
    }
}

#[derive(Clone)]
struct StubState {
    recorder: UpstreamRecorder,
    reply: Arc<StubUpstream>,
}

async fn completions_stub(
    State(state): State<StubState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let parsed = serde_json::from_str(&body).unwrap_or(Value::Null);
    *state.recorder.inner.lock().await = Some(RecordedRequest {
        body: parsed,
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    });

    match &*state.reply {
        StubUpstream::Success(value) => (StatusCode::OK, Json(value.clone())).into_response(),
        StubUpstream::Status(code) => (
            StatusCode::from_u16(*code).expect("valid status code"),
            Json(json!({"detail": "upstream exploded"})),
        )
            .into_response(),
        StubUpstream::NotJson => (StatusCode::OK, "definitely not json").into_response(),
    }
}

/// Serve the stub upstream on an ephemeral port and return its completions
/// URL plus the request recorder.
pub async fn spawn_upstream(reply: StubUpstream) -> (String, UpstreamRecorder) {
    let recorder = UpstreamRecorder::default();
    let state = StubState {
        recorder: recorder.clone(),
        reply: Arc::new(reply),
    };
    let app = Router::new()
        .route("/v1/chat/completions", post(completions_stub))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/v1/chat/completions", addr), recorder)
}

/// Create a relay application wired to the given upstream endpoint.
pub fn test_app(upstream_url: &str) -> Router {
    let upstream = UpstreamClient::new(
        upstream_url,
        TEST_MODEL,
        TEST_API_KEY,
        Duration::from_secs(5),
    )
    .expect("build upstream client");
    api::create_router(AppState::new(upstream, Vec::new()))
}

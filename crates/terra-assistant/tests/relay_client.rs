//! HttpRelayClient tests against an in-process relay stub.

use axum::{Json, Router, http::StatusCode, routing::post};
use serde_json::{Value, json};

use terra_assistant::{HttpRelayClient, RelayError, RelayTransport};
use terra_protocol::Turn;

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_send_returns_raw_relay_body() {
    let router = Router::new().route(
        "/proxy",
        post(|Json(body): Json<Value>| async move {
            assert_eq!(body["messages"][0]["role"], "system");
            Json(json!({
                "choices": [{"message": {"role": "assistant", "content": "hello"}}]
            }))
        }),
    );
    let base_url = spawn(router).await;

    let client = HttpRelayClient::new(base_url);
    let body = client
        .send(&[Turn::system("You are a travel assistant."), Turn::user("hi")])
        .await
        .unwrap();

    assert_eq!(body["choices"][0]["message"]["content"], "hello");
}

#[tokio::test]
async fn test_send_surfaces_relay_error_status() {
    let router = Router::new().route(
        "/proxy",
        post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to fetch AI response"})),
            )
        }),
    );
    let base_url = spawn(router).await;

    let client = HttpRelayClient::new(base_url);
    let err = client.send(&[Turn::user("hi")]).await.unwrap_err();

    assert!(matches!(err, RelayError::Status(500)));
}

#[tokio::test]
async fn test_unreachable_relay_is_a_transport_error() {
    // Port 1 is never bound in the test environment.
    let client = HttpRelayClient::new("http://127.0.0.1:1");
    let err = client.send(&[Turn::user("hi")]).await.unwrap_err();

    assert!(matches!(err, RelayError::Transport(_)));
}

// src/server.rs
//
// Local stand-in for a chat backend: echoes the message back after a fixed
// delay. Useful for exercising a front end without a model provider.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;

#[derive(Clone)]
struct EchoState {
    delay: Duration,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EchoRequest {
    pub message: Option<String>,
    pub file_content: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct EchoReply {
    pub id: String,
    pub content: String,
    pub timestamp: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct EchoResponse {
    pub response: EchoReply,
}

pub fn router(delay: Duration) -> Router {
    Router::new()
        .route("/api/chat", get(status).post(echo))
        .with_state(EchoState { delay })
}

/// `GET /api/chat`: liveness.
async fn status() -> Json<serde_json::Value> {
    Json(json!({ "message": "Chat API is working. Use POST to send messages." }))
}

/// `POST /api/chat`: echo `message`, prefixed by the file content if any.
async fn echo(State(state): State<EchoState>, Json(body): Json<EchoRequest>) -> Response {
    let Some(message) = body.message.filter(|m| !m.is_empty()) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Message is required" }))).into_response();
    };

    tokio::time::sleep(state.delay).await;

    let mut content = format!("This is a simulated AI response to: \"{message}\".");
    if let Some(file) = body.file_content.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
        content = format!("Processed File Content:\n---\n{file}\n---\n\n{content}");
    }
    content.push_str("\n\nIn a real application, this would be the response from an AI model.");

    let now = Utc::now();
    Json(EchoResponse {
        response: EchoReply {
            id: now.timestamp_millis().to_string(),
            content,
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        },
    })
    .into_response()
}

pub async fn bind(port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port))).await
}

pub async fn serve(listener: TcpListener, delay: Duration) -> std::io::Result<()> {
    tracing::info!("[server] echo endpoint listening on http://{}/api/chat", listener.local_addr()?);
    axum::serve(listener, router(delay)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    // The listener is bound before the spawn, so requests queue until the
    // server picks them up.
    async fn spawn(delay: Duration) -> String {
        let listener = bind(0).await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(serve(listener, delay));
        url
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        let url = spawn(Duration::ZERO).await;
        let resp = reqwest::Client::new()
            .post(format!("{url}/api/chat"))
            .json(&json!({ "message": "Hello", "fileContent": "  data  " }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: EchoResponse = resp.json().await.unwrap();
        assert!(body.response.content.starts_with("Processed File Content:\n---\ndata\n---"));
        assert!(body.response.content.contains("simulated AI response to: \"Hello\""));
        assert!(!body.response.id.is_empty());
    }

    #[tokio::test]
    async fn test_status_answers_right_after_spawn() {
        let url = spawn(Duration::ZERO).await;
        let resp = reqwest::get(format!("{url}/api/chat")).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert!(body["message"].as_str().unwrap().contains("Chat API is working"));
    }

    #[tokio::test]
    async fn test_missing_message_is_rejected() {
        let url = spawn(Duration::ZERO).await;
        let resp = reqwest::Client::new()
            .post(format!("{url}/api/chat"))
            .json(&json!({ "fileContent": "x" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Message is required");
    }

    #[tokio::test]
    async fn test_delay_is_applied() {
        let url = spawn(Duration::from_millis(200)).await;
        let started = std::time::Instant::now();
        reqwest::Client::new()
            .post(format!("{url}/api/chat"))
            .json(&json!({ "message": "slow" }))
            .send()
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(200));
    }
}

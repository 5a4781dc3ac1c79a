// src/error.rs

use serde_json::Value;
use thiserror::Error;

/// Failures on the send path. The `Display` text is what the user sees in a toast.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Authentication error (401): Please check your API key.")]
    Unauthorized,

    #[error("Access denied (403): You don't have permission to use this model.")]
    Forbidden,

    #[error("Not found (404): The requested resource was not found.")]
    NotFound,

    #[error("Rate limit exceeded (429): Too many requests. Please try again later.")]
    RateLimited,

    #[error("Server error ({0}): The AI provider is experiencing issues.")]
    Upstream(u16),

    #[error("API request failed: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Response body is empty")]
    MissingBody,

    #[error("Invalid response format from API. Please check your API URL.")]
    InvalidResponse,

    #[error("No models found. Please check your API configuration.")]
    NoModels,

    #[error("API is not configured: {0}")]
    NotConfigured(String),

    #[error("A response is still streaming in chat {0}")]
    Busy(String),

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ChatError {
    /// Classify a non-2xx response by status code, falling back to whatever
    /// message the body carries.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 => ChatError::Unauthorized,
            403 => ChatError::Forbidden,
            404 => ChatError::NotFound,
            429 => ChatError::RateLimited,
            s if s >= 500 => ChatError::Upstream(s),
            s => ChatError::Api {
                status: s,
                message: error_message_from_body(body),
            },
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ChatError::Unauthorized)
    }
}

fn error_message_from_body(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(json) => {
            let field = json.get("message").or_else(|| json.get("error"));
            match field {
                Some(Value::String(s)) => s.clone(),
                // OpenAI-style `{"error": {"message": "..."}}`
                Some(Value::Object(obj)) => obj
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown error")
                    .to_string(),
                _ => "Unknown error".to_string(),
            }
        }
        Err(_) => body.chars().take(100).collect(),
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("failed to (de)serialize stored state: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not determine a data directory")]
    NoDataDir,
}

/// Top-level error for the binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifies_known_statuses() {
        assert!(ChatError::from_status(401, "").to_string().contains("Authentication"));
        assert!(ChatError::from_status(403, "").to_string().contains("403"));
        assert!(ChatError::from_status(404, "").to_string().contains("Not found"));
        assert!(ChatError::from_status(429, "").to_string().contains("Rate limit"));
        assert!(ChatError::from_status(502, "").to_string().contains("Server error (502)"));
    }

    #[test]
    fn test_other_status_uses_body_message() {
        let err = ChatError::from_status(400, r#"{"message":"bad model"}"#);
        assert_eq!(err.to_string(), "API request failed: 400 - bad model");

        let err = ChatError::from_status(422, r#"{"error":{"message":"context too long"}}"#);
        assert_eq!(err.to_string(), "API request failed: 422 - context too long");

        let err = ChatError::from_status(418, r#"{"error":"teapot"}"#);
        assert_eq!(err.to_string(), "API request failed: 418 - teapot");
    }

    #[test]
    fn test_other_status_with_plain_body_is_truncated() {
        let body = "x".repeat(250);
        let err = ChatError::from_status(400, &body);
        assert_eq!(err.to_string(), format!("API request failed: 400 - {}", "x".repeat(100)));
    }
}

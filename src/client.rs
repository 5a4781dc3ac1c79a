// src/client.rs

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tokio_util::sync::CancellationToken;

use crate::error::ChatError;
use crate::sse::{parse_sse_response, SseHandler, StreamEnd};
use crate::store::ModelOption;
use crate::types::{OpenAIMessage, OpenAIModelList, OpenAIRequest};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Callbacks for one completion. Exactly one of `on_done` / `on_error` is
/// called; `on_chunk` is only ever called before `on_done`.
pub trait CompletionSink: Send {
    fn on_chunk(&mut self, chunk: &str);
    fn on_done(&mut self, end: StreamEnd);
    fn on_error(&mut self, error: ChatError);
}

pub struct CompletionRequest<'a> {
    pub base_url: &'a str,
    pub api_key: &'a str,
    pub model: &'a str,
    pub messages: &'a [OpenAIMessage],
}

#[derive(Clone)]
pub struct ChatCompletionClient {
    http: reqwest::Client,
}

impl Default for ChatCompletionClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatCompletionClient {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("[client] falling back to default HTTP client: {e}");
                reqwest::Client::new()
            });
        Self { http }
    }

    /// Stream one completion into `sink`. Never returns an error: every
    /// failure is delivered through `sink.on_error`.
    ///
    /// Cancelling `cancel` drops the request wherever it is, waiting for
    /// headers or for the next read, and ends with `StreamEnd::Cancelled`.
    pub async fn run(
        &self,
        request: CompletionRequest<'_>,
        cancel: &CancellationToken,
        sink: &mut dyn CompletionSink,
    ) {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            opened = self.open_stream(&request) => Some(opened),
        };

        let response = match opened {
            Some(Ok(response)) => response,
            Some(Err(e)) => {
                tracing::warn!("[client] completion request failed: {e}");
                sink.on_error(e);
                return;
            }
            None => {
                tracing::info!("[client] request cancelled before the response arrived");
                sink.on_done(StreamEnd::Cancelled);
                return;
            }
        };

        let mut relay = Relay { sink };
        parse_sse_response(response.bytes_stream(), cancel, &mut relay).await;
    }

    async fn open_stream(&self, request: &CompletionRequest<'_>) -> Result<reqwest::Response, ChatError> {
        let endpoint = format!("{}/chat/completions", request.base_url);
        tracing::info!("[client] sending request to {endpoint}");

        let body = OpenAIRequest {
            model: request.model,
            messages: request.messages,
            stream: true,
        };

        let response = self
            .http
            .post(&endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", request.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ChatError::from_status(status.as_u16(), &text));
        }

        if response.content_length() == Some(0) {
            return Err(ChatError::MissingBody);
        }

        Ok(response)
    }

    /// `GET {base}/models`, mapped to selectable options.
    pub async fn list_models(&self, base_url: &str, api_key: &str) -> Result<Vec<ModelOption>, ChatError> {
        let endpoint = format!("{base_url}/models");
        tracing::info!("[client] checking models at {endpoint}");

        let response = self
            .http
            .get(&endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {api_key}"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ChatError::from_status(status.as_u16(), &text));
        }

        let list: OpenAIModelList = response
            .json()
            .await
            .map_err(|_| ChatError::InvalidResponse)?;
        let models: Vec<ModelOption> = list
            .data
            .ok_or(ChatError::InvalidResponse)?
            .into_iter()
            .map(|m| ModelOption {
                name: m.id.clone(),
                id: m.id,
            })
            .collect();

        if models.is_empty() {
            return Err(ChatError::NoModels);
        }
        Ok(models)
    }
}

struct Relay<'a> {
    sink: &'a mut dyn CompletionSink,
}

impl SseHandler for Relay<'_> {
    fn on_chunk(&mut self, chunk: &str) {
        self.sink.on_chunk(chunk);
    }

    fn on_done(&mut self, end: StreamEnd) {
        self.sink.on_done(end);
    }
}

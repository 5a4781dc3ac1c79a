// src/commands/chat.rs

use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use tokio::task::JoinHandle;

use crate::client::{CompletionRequest, CompletionSink};
use crate::error::{ChatError, StoreError};
use crate::render::transcript_html;
use crate::sse::StreamEnd;
use crate::state::{lock, AppState, StreamSlot};
use crate::store::history::derive_title;
use crate::store::HistoryGroup;
use crate::types::{ChatEvent, ChatItem, Message, MessagePatch, OpenAIMessage, Toast};

const UNEXPECTED_ERROR: &str = "An unexpected error occurred. Please try again.";

/// What happened to a sent message.
#[derive(Debug)]
pub enum SendOutcome {
    /// The user message was stored but no endpoint is configured.
    ConfigRequired,
    /// A completion is streaming into `message_id`. The task finishes once
    /// the message has settled.
    Streaming {
        message_id: String,
        task: JoinHandle<()>,
    },
}

pub fn new_chat() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn list_chats(state: &AppState) -> Vec<(HistoryGroup, Vec<ChatItem>)> {
    lock(&state.history).grouped(&Local::now())
}

pub fn get_chat_messages(state: &AppState, chat_id: &str) -> Vec<Message> {
    lock(&state.conversations).list(chat_id).to_vec()
}

pub fn rename_chat(state: &AppState, chat_id: &str, title: &str) -> Result<bool, StoreError> {
    let title = title.trim();
    if title.is_empty() {
        return Ok(false);
    }
    let renamed = lock(&state.history).update(chat_id, Some(title.to_string()), None)?;
    if renamed {
        state.emit(ChatEvent::ChatsChanged);
    }
    Ok(renamed)
}

/// Remove the session and every message in it, stopping its stream first.
pub fn delete_chat(state: &AppState, chat_id: &str) -> Result<(), StoreError> {
    if state.cancel_stream(chat_id) {
        tracing::info!("[chat] cancelled stream of deleted chat {chat_id}");
    }

    lock(&state.history).delete(chat_id)?;
    lock(&state.conversations).clear(chat_id)?;

    state.emit(ChatEvent::ChatsChanged);
    Ok(())
}

pub fn cancel_generation(state: &AppState, chat_id: &str) -> bool {
    let cancelled = state.cancel_stream(chat_id);
    if cancelled {
        tracing::info!("[chat] cancellation requested for {chat_id}");
    }
    cancelled
}

/// Standalone HTML transcript, `None` for an unknown chat.
pub fn export_chat(state: &AppState, chat_id: &str) -> Option<String> {
    let messages = get_chat_messages(state, chat_id);
    if messages.is_empty() {
        return None;
    }
    let title = lock(&state.history)
        .get(chat_id)
        .map(|c| c.title.clone())
        .unwrap_or_else(|| derive_title(&messages));
    Some(transcript_html(&title, &messages))
}

/// Append the user's message and, when an endpoint is configured, start
/// streaming the assistant's reply into a placeholder.
///
/// Must be called from within a tokio runtime.
pub fn send_message(state: &Arc<AppState>, chat_id: &str, content: &str) -> Result<SendOutcome, ChatError> {
    if content.trim().is_empty() {
        return Err(ChatError::EmptyMessage);
    }

    // Claim the chat's single in-flight slot up front.
    let Some(slot) = state.claim_stream(chat_id) else {
        return Err(ChatError::Busy(chat_id.to_string()));
    };

    match start_completion(state, chat_id, content) {
        Ok(Some((message_id, request))) => {
            let task = spawn_completion(state.clone(), chat_id.to_string(), message_id.clone(), request, slot);
            Ok(SendOutcome::Streaming { message_id, task })
        }
        Ok(None) => {
            state.release_stream(chat_id, &slot);
            state.emit(ChatEvent::ConfigRequired {
                chat_id: chat_id.to_string(),
            });
            Ok(SendOutcome::ConfigRequired)
        }
        Err(e) => {
            state.release_stream(chat_id, &slot);
            Err(e)
        }
    }
}

struct PreparedRequest {
    base_url: String,
    api_key: String,
    model: String,
    messages: Vec<OpenAIMessage>,
}

fn start_completion(
    state: &AppState,
    chat_id: &str,
    content: &str,
) -> Result<Option<(String, PreparedRequest)>, ChatError> {
    let messages = {
        let mut conversations = lock(&state.conversations);
        conversations.append(chat_id, Message::user(content))?;
        conversations.list(chat_id).to_vec()
    };
    lock(&state.history).sync(chat_id, &messages)?;
    state.emit(ChatEvent::ChatsChanged);

    let config = lock(&state.api_config).get().clone();
    if let Err(e) = config.ensure_ready() {
        tracing::info!("[chat] not sending: {e}");
        return Ok(None);
    }

    let history: Vec<OpenAIMessage> = messages.iter().map(OpenAIMessage::from).collect();

    let placeholder = Message::pending_assistant();
    let message_id = placeholder.id.clone();
    lock(&state.conversations).append(chat_id, placeholder)?;

    state.emit(ChatEvent::Begin {
        chat_id: chat_id.to_string(),
        message_id: message_id.clone(),
    });

    Ok(Some((
        message_id,
        PreparedRequest {
            base_url: config.base_url,
            api_key: config.api_key,
            model: config.selected_model,
            messages: history,
        },
    )))
}

fn spawn_completion(
    state: Arc<AppState>,
    chat_id: String,
    message_id: String,
    request: PreparedRequest,
    slot: StreamSlot,
) -> JoinHandle<()> {
    let mut sink = StoreSink {
        state: state.clone(),
        chat_id: chat_id.clone(),
        message_id: message_id.clone(),
        content: String::new(),
        started: Instant::now(),
        slot: slot.clone(),
    };

    let worker = {
        let state = state.clone();
        let cancel = slot.token.clone();
        tokio::spawn(async move {
            let request = CompletionRequest {
                base_url: &request.base_url,
                api_key: &request.api_key,
                model: &request.model,
                messages: &request.messages,
            };
            state.client.run(request, &cancel, &mut sink).await;
        })
    };

    supervise(state, chat_id, message_id, slot, worker)
}

/// Wait for `worker`; if it panicked, clean up the way a failed request
/// would: drop the placeholder, free the slot and tell the user.
fn supervise(
    state: Arc<AppState>,
    chat_id: String,
    message_id: String,
    slot: StreamSlot,
    worker: JoinHandle<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Err(e) = worker.await else {
            return;
        };
        tracing::error!("[chat] completion task for {chat_id} failed: {e}");

        state.release_stream(&chat_id, &slot);
        if let Err(e) = lock(&state.conversations).remove(&chat_id, &message_id) {
            tracing::warn!("[chat] could not remove placeholder: {e}");
        }
        state.emit(ChatEvent::Failed {
            chat_id,
            message_id,
            error: UNEXPECTED_ERROR.to_string(),
        });
        state.toast(Toast::error(UNEXPECTED_ERROR));
    })
}

/// Feeds one completion into the conversation store and the event bus.
struct StoreSink {
    state: Arc<AppState>,
    chat_id: String,
    message_id: String,
    content: String,
    started: Instant,
    slot: StreamSlot,
}

impl StoreSink {
    fn patch(&self, patch: MessagePatch) {
        if let Err(e) = lock(&self.state.conversations).patch(&self.chat_id, &self.message_id, patch) {
            tracing::warn!("[chat] failed to persist message {}: {e}", self.message_id);
        }
    }

    fn remove_placeholder(&self) {
        if let Err(e) = lock(&self.state.conversations).remove(&self.chat_id, &self.message_id) {
            tracing::warn!("[chat] failed to remove placeholder {}: {e}", self.message_id);
        }
    }

    fn sync_history(&self) {
        let messages = get_chat_messages(&self.state, &self.chat_id);
        if let Err(e) = lock(&self.state.history).sync(&self.chat_id, &messages) {
            tracing::warn!("[chat] failed to update history for {}: {e}", self.chat_id);
        }
        self.state.emit(ChatEvent::ChatsChanged);
    }
}

impl CompletionSink for StoreSink {
    fn on_chunk(&mut self, chunk: &str) {
        if self.slot.token.is_cancelled() {
            return;
        }
        self.content.push_str(chunk);
        self.patch(MessagePatch::streaming(self.content.clone()));
        self.state.emit(ChatEvent::Delta {
            chat_id: self.chat_id.clone(),
            message_id: self.message_id.clone(),
            delta: chunk.to_string(),
        });
    }

    fn on_done(&mut self, end: StreamEnd) {
        if end == StreamEnd::Cancelled && self.content.is_empty() {
            self.remove_placeholder();
        } else {
            self.patch(MessagePatch::settled(self.content.clone()));
        }
        self.sync_history();
        self.state.release_stream(&self.chat_id, &self.slot);

        let duration_ms = self.started.elapsed().as_millis() as i64;
        tracing::info!(
            "[chat] {} finished ({end:?}) after {duration_ms} ms, {} bytes",
            self.message_id,
            self.content.len()
        );
        self.state.emit(ChatEvent::End {
            chat_id: self.chat_id.clone(),
            message_id: self.message_id.clone(),
            duration_ms,
        });
    }

    fn on_error(&mut self, error: ChatError) {
        tracing::warn!("[chat] completion for {} failed: {error}", self.chat_id);
        self.remove_placeholder();
        self.state.release_stream(&self.chat_id, &self.slot);

        let message = error.to_string();
        self.state.emit(ChatEvent::Failed {
            chat_id: self.chat_id.clone(),
            message_id: self.message_id.clone(),
            error: message.clone(),
        });
        self.state.toast(Toast::error(message));
    }
}

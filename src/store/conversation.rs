// src/store/conversation.rs

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::StoreError;
use crate::storage::KeyValueStore;
use crate::types::{Message, MessagePatch};

pub const NAMESPACE: &str = "conversation-storage";

/// Ordered message lists keyed by chat id. Each chat is its own storage key,
/// so a streaming patch rewrites one conversation, not all of them.
pub struct ConversationStore {
    storage: Arc<dyn KeyValueStore>,
    conversations: HashMap<String, Vec<Message>>,
}

impl ConversationStore {
    pub fn load(storage: Arc<dyn KeyValueStore>) -> Result<Self, StoreError> {
        let mut conversations = HashMap::new();
        for (chat_id, raw) in storage.entries(NAMESPACE)? {
            match serde_json::from_str::<Vec<Message>>(&raw) {
                Ok(messages) => {
                    conversations.insert(chat_id, messages);
                }
                Err(e) => tracing::warn!("[store] skipping unreadable conversation {chat_id}: {e}"),
            }
        }

        tracing::debug!("[store] hydrated {} conversations", conversations.len());
        Ok(Self {
            storage,
            conversations,
        })
    }

    /// Appends to the end of the chat, creating the chat if needed.
    pub fn append(&mut self, chat_id: &str, message: Message) -> Result<(), StoreError> {
        self.commit(chat_id, |messages| messages.push(message))
    }

    /// Merges `patch` into the matching message. Returns whether a message
    /// was found; an unknown chat or message id is a no-op.
    pub fn patch(&mut self, chat_id: &str, message_id: &str, patch: MessagePatch) -> Result<bool, StoreError> {
        if self.get(chat_id, message_id).is_none() {
            return Ok(false);
        }

        self.commit(chat_id, |messages| {
            if let Some(message) = messages.iter_mut().find(|m| m.id == message_id) {
                message.apply(patch);
            }
        })?;
        Ok(true)
    }

    pub fn remove(&mut self, chat_id: &str, message_id: &str) -> Result<bool, StoreError> {
        if self.get(chat_id, message_id).is_none() {
            return Ok(false);
        }

        self.commit(chat_id, |messages| messages.retain(|m| m.id != message_id))?;
        Ok(true)
    }

    pub fn list(&self, chat_id: &str) -> &[Message] {
        self.conversations
            .get(chat_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn get(&self, chat_id: &str, message_id: &str) -> Option<&Message> {
        self.list(chat_id).iter().find(|m| m.id == message_id)
    }

    pub fn chat_ids(&self) -> impl Iterator<Item = &str> {
        self.conversations.keys().map(String::as_str)
    }

    /// Settle messages left mid-stream by a previous process: empty
    /// placeholders are dropped, partial responses keep their text.
    pub fn settle_interrupted(&mut self) -> Result<usize, StoreError> {
        let interrupted: Vec<String> = self
            .conversations
            .iter()
            .filter(|(_, messages)| messages.iter().any(|m| m.pending || m.streaming))
            .map(|(chat_id, _)| chat_id.clone())
            .collect();

        for chat_id in &interrupted {
            self.commit(chat_id, |messages| {
                messages.retain(|m| !(m.pending && m.content.is_empty()));
                for m in messages.iter_mut() {
                    m.pending = false;
                    m.streaming = false;
                }
            })?;
        }
        Ok(interrupted.len())
    }

    pub fn clear(&mut self, chat_id: &str) -> Result<(), StoreError> {
        self.storage.delete(NAMESPACE, chat_id)?;
        self.conversations.remove(chat_id);
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<(), StoreError> {
        self.storage.clear(NAMESPACE)?;
        self.conversations.clear();
        Ok(())
    }

    /// Edit a copy of one chat and keep it only once it is stored, so a
    /// failed write never leaves memory ahead of disk.
    fn commit(&mut self, chat_id: &str, edit: impl FnOnce(&mut Vec<Message>)) -> Result<(), StoreError> {
        let mut messages = self.list(chat_id).to_vec();
        edit(&mut messages);
        let raw = serde_json::to_string(&messages)?;
        self.storage.put(NAMESPACE, chat_id, &raw)?;
        self.conversations.insert(chat_id.to_string(), messages);
        Ok(())
    }
}

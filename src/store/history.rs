// src/store/history.rs

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::Persisted;
use crate::error::StoreError;
use crate::storage::KeyValueStore;
use crate::types::{ChatItem, Message};

pub const NAMESPACE: &str = "chat-history-storage";

const TITLE_CHARS: usize = 30;
const UNTITLED: &str = "New Chat";

#[derive(Clone, Default, Serialize, Deserialize)]
struct HistoryState {
    chats: Vec<ChatItem>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryGroup {
    Today,
    Yesterday,
    PreviousSevenDays,
    Older,
}

impl HistoryGroup {
    pub const ALL: [HistoryGroup; 4] = [
        HistoryGroup::Today,
        HistoryGroup::Yesterday,
        HistoryGroup::PreviousSevenDays,
        HistoryGroup::Older,
    ];

    pub fn label(self) -> &'static str {
        match self {
            HistoryGroup::Today => "Today",
            HistoryGroup::Yesterday => "Yesterday",
            HistoryGroup::PreviousSevenDays => "Previous 7 days",
            HistoryGroup::Older => "Older",
        }
    }
}

/// Sidebar sessions, most recently created first.
pub struct ChatHistoryStore {
    state: Persisted<HistoryState>,
}

impl ChatHistoryStore {
    pub fn load(storage: Arc<dyn KeyValueStore>) -> Result<Self, StoreError> {
        Ok(Self {
            state: Persisted::load(storage, NAMESPACE)?,
        })
    }

    pub fn list(&self) -> &[ChatItem] {
        &self.state.get().chats
    }

    pub fn get(&self, chat_id: &str) -> Option<&ChatItem> {
        self.list().iter().find(|c| c.id == chat_id)
    }

    /// Prepends `chat` unless a session with that id already exists.
    pub fn add(&mut self, chat: ChatItem) -> Result<bool, StoreError> {
        if self.get(&chat.id).is_some() {
            return Ok(false);
        }
        self.state.update(|s| s.chats.insert(0, chat))?;
        Ok(true)
    }

    pub fn update(
        &mut self,
        chat_id: &str,
        title: Option<String>,
        last_message_time: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        self.state.update(|s| {
            let Some(chat) = s.chats.iter_mut().find(|c| c.id == chat_id) else {
                return false;
            };
            if let Some(title) = title {
                chat.title = title;
            }
            if let Some(t) = last_message_time {
                chat.last_message_time = t;
            }
            true
        })
    }

    pub fn delete(&mut self, chat_id: &str) -> Result<bool, StoreError> {
        self.state.update(|s| {
            let before = s.chats.len();
            s.chats.retain(|c| c.id != chat_id);
            s.chats.len() != before
        })
    }

    /// Create or refresh the session entry from the chat's messages. Does
    /// nothing for an empty chat.
    pub fn sync(&mut self, chat_id: &str, messages: &[Message]) -> Result<(), StoreError> {
        let Some(last) = messages.last() else {
            return Ok(());
        };
        let title = derive_title(messages);

        if !self.add(ChatItem {
            id: chat_id.to_string(),
            title: title.clone(),
            last_message_time: last.created_at,
        })? {
            self.update(chat_id, Some(title), Some(last.created_at))?;
        }
        Ok(())
    }

    /// Buckets sessions by calendar day of last activity, in the time zone
    /// of `now`. Empty buckets are omitted; newest first inside a bucket.
    pub fn grouped<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Vec<(HistoryGroup, Vec<ChatItem>)> {
        let tz = now.timezone();
        let today = now.date_naive();

        let mut groups: Vec<(HistoryGroup, Vec<ChatItem>)> =
            HistoryGroup::ALL.iter().map(|g| (*g, Vec::new())).collect();

        for chat in self.list() {
            let day = chat.last_message_time.with_timezone(&tz).date_naive();
            let group = match (today - day).num_days() {
                d if d <= 0 => HistoryGroup::Today,
                1 => HistoryGroup::Yesterday,
                2..=7 => HistoryGroup::PreviousSevenDays,
                _ => HistoryGroup::Older,
            };
            if let Some((_, chats)) = groups.iter_mut().find(|(g, _)| *g == group) {
                chats.push(chat.clone());
            }
        }

        for (_, chats) in groups.iter_mut() {
            chats.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
        }
        groups.retain(|(_, chats)| !chats.is_empty());
        groups
    }
}

/// Title from the first user message, truncated to a sidebar-friendly width.
pub fn derive_title(messages: &[Message]) -> String {
    let Some(first) = messages.iter().find(|m| m.is_user()) else {
        return UNTITLED.to_string();
    };

    let text = first.content.trim();
    if text.is_empty() {
        return UNTITLED.to_string();
    }

    let mut chars = text.chars();
    let head: String = chars.by_ref().take(TITLE_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head.trim_end())
    } else {
        head
    }
}

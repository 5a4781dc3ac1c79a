// src/types/chat.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Assistant,
}

impl Author {
    pub fn role(self) -> &'static str {
        match self {
            Author::User => "user",
            Author::Assistant => "assistant",
        }
    }
}

/// One turn in a conversation.
///
/// An assistant message moves through `pending` (no content yet) to
/// `streaming` (deltas arriving) to settled (both flags false).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub content: String,
    pub author: Author,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub streaming: bool,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            author: Author::User,
            created_at: Utc::now(),
            pending: false,
            streaming: false,
        }
    }

    /// Empty assistant placeholder awaiting its first delta.
    pub fn pending_assistant() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: String::new(),
            author: Author::Assistant,
            created_at: Utc::now(),
            pending: true,
            streaming: false,
        }
    }

    pub fn is_user(&self) -> bool {
        self.author == Author::User
    }

    /// Merge the fields present in `patch`. `id`, `author` and `created_at`
    /// are never touched.
    pub fn apply(&mut self, patch: MessagePatch) {
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(pending) = patch.pending {
            self.pending = pending;
        }
        if let Some(streaming) = patch.streaming {
            self.streaming = streaming;
        }
    }
}

/// Partial update for a stored message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessagePatch {
    pub content: Option<String>,
    pub pending: Option<bool>,
    pub streaming: Option<bool>,
}

impl MessagePatch {
    /// A delta arrived: the message now holds `content` and more is expected.
    pub fn streaming(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            pending: Some(false),
            streaming: Some(true),
        }
    }

    /// The stream ended or was cancelled; nothing more will arrive.
    pub fn settled(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            pending: Some(false),
            streaming: Some(false),
        }
    }
}

/// Sidebar entry for one chat session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatItem {
    pub id: String,
    pub title: String,
    pub last_message_time: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Error,
    Info,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
    pub duration_ms: u64,
}

impl Toast {
    pub const DEFAULT_DURATION_MS: u64 = 3000;

    pub fn new(kind: ToastKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            duration_ms: Self::DEFAULT_DURATION_MS,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Error, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Info, message)
    }
}

/// Everything the front end is told about. Mirrors the `chat:*` event names.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum ChatEvent {
    #[serde(rename = "chat:begin")]
    Begin { chat_id: String, message_id: String },
    #[serde(rename = "chat:delta")]
    Delta {
        chat_id: String,
        message_id: String,
        delta: String,
    },
    #[serde(rename = "chat:end")]
    End {
        chat_id: String,
        message_id: String,
        duration_ms: i64,
    },
    #[serde(rename = "chat:failed")]
    Failed {
        chat_id: String,
        message_id: String,
        error: String,
    },
    #[serde(rename = "chats:changed")]
    ChatsChanged,
    #[serde(rename = "config:required")]
    ConfigRequired { chat_id: String },
    #[serde(rename = "toast")]
    Toast(Toast),
}

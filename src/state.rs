// src/state.rs

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::client::ChatCompletionClient;
use crate::error::StoreError;
use crate::settings::SettingsStore;
use crate::storage::KeyValueStore;
use crate::store::{ApiConfigStore, ChatHistoryStore, ConversationStore, UserProfileStore};
use crate::types::{ChatEvent, Toast};

const EVENT_CAPACITY: usize = 256;

/// Lock a mutex, recovering the data if a previous holder panicked.
pub fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A chat's claim on its single in-flight generation.
#[derive(Clone, Debug)]
pub struct StreamSlot {
    id: u64,
    pub token: CancellationToken,
}

pub struct AppState {
    pub conversations: Mutex<ConversationStore>,
    pub history: Mutex<ChatHistoryStore>,
    pub api_config: Mutex<ApiConfigStore>,
    pub profile: Mutex<UserProfileStore>,
    pub settings: Mutex<SettingsStore>,
    /// In-flight generations, keyed by chat id.
    active_streams: Mutex<HashMap<String, StreamSlot>>,
    next_slot: AtomicU64,
    pub client: ChatCompletionClient,
    events: broadcast::Sender<ChatEvent>,
}

impl AppState {
    /// Hydrate every store from `storage` and settle messages a previous
    /// process left streaming.
    pub fn hydrate(storage: Arc<dyn KeyValueStore>) -> Result<Arc<Self>, StoreError> {
        let mut conversations = ConversationStore::load(storage.clone())?;
        let settled = conversations.settle_interrupted()?;
        if settled > 0 {
            tracing::info!("[state] settled interrupted messages in {settled} chats");
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Arc::new(Self {
            conversations: Mutex::new(conversations),
            history: Mutex::new(ChatHistoryStore::load(storage.clone())?),
            api_config: Mutex::new(ApiConfigStore::load(storage.clone())?),
            profile: Mutex::new(UserProfileStore::load(storage.clone())?),
            settings: Mutex::new(SettingsStore::load(storage)?),
            active_streams: Mutex::new(HashMap::new()),
            next_slot: AtomicU64::new(0),
            client: ChatCompletionClient::new(),
            events,
        }))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    /// Broadcast to every subscriber. Having none is not an error.
    pub fn emit(&self, event: ChatEvent) {
        tracing::trace!("[event] {event:?}");
        let _ = self.events.send(event);
    }

    pub fn toast(&self, toast: Toast) {
        self.emit(ChatEvent::Toast(toast));
    }

    pub fn is_streaming(&self, chat_id: &str) -> bool {
        lock(&self.active_streams).contains_key(chat_id)
    }

    /// Take `chat_id`'s in-flight slot, or `None` while another generation
    /// holds it.
    pub fn claim_stream(&self, chat_id: &str) -> Option<StreamSlot> {
        let mut streams = lock(&self.active_streams);
        if streams.contains_key(chat_id) {
            return None;
        }
        let slot = StreamSlot {
            id: self.next_slot.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        };
        streams.insert(chat_id.to_string(), slot.clone());
        Some(slot)
    }

    /// Give the slot back, unless a newer generation has already taken it.
    pub fn release_stream(&self, chat_id: &str, slot: &StreamSlot) {
        let mut streams = lock(&self.active_streams);
        if streams.get(chat_id).is_some_and(|s| s.id == slot.id) {
            streams.remove(chat_id);
        }
    }

    /// Cancel `chat_id`'s generation. Returns whether one was running.
    pub fn cancel_stream(&self, chat_id: &str) -> bool {
        match lock(&self.active_streams).get(chat_id) {
            Some(slot) => {
                slot.token.cancel();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::Message;

    #[test]
    fn test_hydrate_settles_interrupted_stream() {
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        {
            let mut conversations = ConversationStore::load(storage.clone()).unwrap();
            conversations.append("c", Message::user("hi")).unwrap();
            conversations.append("c", Message::pending_assistant()).unwrap();
        }

        let state = AppState::hydrate(storage).unwrap();
        let conversations = lock(&state.conversations);
        assert_eq!(conversations.list("c").len(), 1);
        assert!(conversations.list("c")[0].is_user());
    }

    #[test]
    fn test_cancel_stream_cancels_token() {
        let state = AppState::hydrate(Arc::new(MemoryStore::new())).unwrap();
        assert!(!state.cancel_stream("c"));

        let slot = state.claim_stream("c").unwrap();
        assert!(state.is_streaming("c"));
        assert!(state.claim_stream("c").is_none());
        assert!(state.cancel_stream("c"));
        assert!(slot.token.is_cancelled());
    }

    #[test]
    fn test_release_ignores_newer_stream() {
        let state = AppState::hydrate(Arc::new(MemoryStore::new())).unwrap();
        let old = state.claim_stream("c").unwrap();
        state.release_stream("c", &old);
        assert!(!state.is_streaming("c"));

        let new = state.claim_stream("c").unwrap();
        state.release_stream("c", &old);
        assert!(state.is_streaming("c"));
        state.release_stream("c", &new);
        assert!(!state.is_streaming("c"));
    }

    #[test]
    fn test_emit_reaches_subscribers() {
        let state = AppState::hydrate(Arc::new(MemoryStore::new())).unwrap();
        state.emit(ChatEvent::ChatsChanged);

        let mut rx = state.subscribe();
        state.toast(Toast::info("hello"));
        assert_eq!(rx.try_recv().unwrap(), ChatEvent::Toast(Toast::info("hello")));
    }
}

// src/store/mod.rs

pub mod api_config;
pub mod conversation;
pub mod history;
pub mod profile;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;
use crate::storage::KeyValueStore;

pub use api_config::{ApiConfig, ApiConfigStore, ModelOption};
pub use conversation::ConversationStore;
pub use history::{ChatHistoryStore, HistoryGroup};
pub use profile::{UserProfile, UserProfileStore};

const STATE_KEY: &str = "state";

/// A single JSON document kept in one storage namespace. Reads come from
/// memory; every `update` writes the whole document back before returning,
/// and memory only takes the new value once that write has succeeded.
pub struct Persisted<T> {
    storage: Arc<dyn KeyValueStore>,
    namespace: &'static str,
    value: T,
}

impl<T> Persisted<T>
where
    T: Serialize + DeserializeOwned + Default + Clone,
{
    /// Hydrate from storage. A missing or unreadable document falls back to
    /// `T::default()` so a corrupt namespace never blocks startup.
    pub fn load(storage: Arc<dyn KeyValueStore>, namespace: &'static str) -> Result<Self, StoreError> {
        let value = match storage.get(namespace, STATE_KEY)? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!("[store] discarding unreadable {namespace}: {e}");
                T::default()
            }),
            None => T::default(),
        };

        Ok(Self {
            storage,
            namespace,
            value,
        })
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn update<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> Result<R, StoreError> {
        let mut next = self.value.clone();
        let out = f(&mut next);
        let raw = serde_json::to_string(&next)?;
        self.storage.put(self.namespace, STATE_KEY, &raw)?;
        self.value = next;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::FlakyStore;
    use crate::storage::MemoryStore;
    use serde::Deserialize;

    #[derive(Clone, Default, Serialize, Deserialize, PartialEq, Debug)]
    struct Counter {
        n: u32,
    }

    #[test]
    fn test_update_is_visible_after_reload() {
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

        let mut counter = Persisted::<Counter>::load(storage.clone(), "counter").unwrap();
        counter.update(|c| c.n += 2).unwrap();

        let reloaded = Persisted::<Counter>::load(storage, "counter").unwrap();
        assert_eq!(reloaded.get(), &Counter { n: 2 });
    }

    #[test]
    fn test_failed_write_leaves_memory_unchanged() {
        let storage = Arc::new(FlakyStore::new());
        let mut counter = Persisted::<Counter>::load(storage.clone(), "counter").unwrap();
        counter.update(|c| c.n = 1).unwrap();

        storage.set_failing(true);
        assert!(counter.update(|c| c.n = 5).is_err());
        assert_eq!(counter.get(), &Counter { n: 1 });

        storage.set_failing(false);
        let reloaded = Persisted::<Counter>::load(storage, "counter").unwrap();
        assert_eq!(reloaded.get(), &Counter { n: 1 });
    }

    #[test]
    fn test_corrupt_document_falls_back_to_default() {
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        storage.put("counter", STATE_KEY, "{not json").unwrap();

        let counter = Persisted::<Counter>::load(storage, "counter").unwrap();
        assert_eq!(counter.get(), &Counter::default());
    }
}

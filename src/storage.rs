// src/storage.rs

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::StoreError;
use crate::state::lock;

/// Namespaced string key-value persistence. Every store in the app writes
/// JSON documents through this, so each write is durable by the time the
/// call returns.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, StoreError>;
    fn put(&self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError>;
    fn delete(&self, namespace: &str, key: &str) -> Result<(), StoreError>;
    /// All `(key, value)` pairs of a namespace, ordered by key.
    fn entries(&self, namespace: &str) -> Result<Vec<(String, String)>, StoreError>;
    fn clear(&self, namespace: &str) -> Result<(), StoreError>;
}

/// Volatile store for tests and `--ephemeral` sessions.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<BTreeMap<(String, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, StoreError> {
        let data = lock(&self.data);
        Ok(data.get(&(namespace.to_string(), key.to_string())).cloned())
    }

    fn put(&self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError> {
        lock(&self.data).insert((namespace.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<(), StoreError> {
        lock(&self.data).remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }

    fn entries(&self, namespace: &str) -> Result<Vec<(String, String)>, StoreError> {
        let data = lock(&self.data);
        Ok(data
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|((_, key), value)| (key.clone(), value.clone()))
            .collect())
    }

    fn clear(&self, namespace: &str) -> Result<(), StoreError> {
        lock(&self.data).retain(|(ns, _), _| ns != namespace);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    /// Memory store whose writes can be made to fail.
    #[derive(Default)]
    pub struct FlakyStore {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    impl FlakyStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), StoreError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Io(std::io::Error::other("disk full")));
            }
            Ok(())
        }
    }

    impl KeyValueStore for FlakyStore {
        fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(namespace, key)
        }

        fn put(&self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError> {
            self.check()?;
            self.inner.put(namespace, key, value)
        }

        fn delete(&self, namespace: &str, key: &str) -> Result<(), StoreError> {
            self.check()?;
            self.inner.delete(namespace, key)
        }

        fn entries(&self, namespace: &str) -> Result<Vec<(String, String)>, StoreError> {
            self.inner.entries(namespace)
        }

        fn clear(&self, namespace: &str) -> Result<(), StoreError> {
            self.check()?;
            self.inner.clear(namespace)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaces_are_independent() {
        let store = MemoryStore::new();
        store.put("a", "k", "1").unwrap();
        store.put("b", "k", "2").unwrap();

        assert_eq!(store.get("a", "k").unwrap().as_deref(), Some("1"));
        store.clear("a").unwrap();
        assert_eq!(store.get("a", "k").unwrap(), None);
        assert_eq!(store.get("b", "k").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_entries_are_ordered_by_key() {
        let store = MemoryStore::new();
        store.put("ns", "b", "2").unwrap();
        store.put("ns", "a", "1").unwrap();
        store.put("other", "c", "3").unwrap();

        let entries = store.entries("ns").unwrap();
        assert_eq!(
            entries,
            vec![("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]
        );
    }
}

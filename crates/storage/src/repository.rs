use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("quota exceeded: {needed} bytes needed, {available} available")]
    QuotaExceeded { needed: u64, available: u64 },

    #[error("value under {key} changed during the write")]
    Conflict { key: String },
}

/// Space accounting for a key-value backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageEstimate {
    /// Bytes currently used (keys plus values).
    pub used: u64,
    /// Total bytes allowed; `None` means unbounded.
    pub quota: Option<u64>,
}

impl StorageEstimate {
    /// Bytes still free, or `None` when unbounded.
    #[must_use]
    pub fn remaining(&self) -> Option<u64> {
        self.quota.map(|quota| quota.saturating_sub(self.used))
    }
}

/// Size an entry occupies for quota purposes.
#[must_use]
pub fn entry_size(key: &str, value: &[u8]) -> u64 {
    (key.len() + value.len()) as u64
}

/// Minimal byte-oriented key-value capability the session layer persists through.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::QuotaExceeded` if the write does not fit, or other
    /// storage errors.
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Store `value` under `key` only if the current value equals `expected`
    /// (`None` meaning the key is absent). Returns whether the write happened.
    ///
    /// The comparison and the write are one atomic step.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::QuotaExceeded` if the write does not fit, or other
    /// storage errors.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: &[u8],
    ) -> Result<bool, StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Current usage and quota.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be queried.
    async fn size_estimate(&self) -> Result<StorageEstimate, StorageError>;
}

/// Simple in-memory store for tests and ephemeral sessions.
#[derive(Clone, Default)]
pub struct InMemoryKeyValueStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    quota: Option<u64>,
}

impl InMemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects writes once `quota` bytes are in use.
    #[must_use]
    pub fn with_quota(quota: u64) -> Self {
        Self {
            entries: Arc::default(),
            quota: Some(quota),
        }
    }

    fn used(entries: &HashMap<String, Vec<u8>>) -> u64 {
        entries.iter().map(|(k, v)| entry_size(k, v)).sum()
    }

    fn insert(
        &self,
        entries: &mut HashMap<String, Vec<u8>>,
        key: &str,
        value: &[u8],
    ) -> Result<(), StorageError> {
        if let Some(quota) = self.quota {
            let existing = entries.get(key).map_or(0, |v| entry_size(key, v));
            let available = quota.saturating_sub(Self::used(entries)) + existing;
            let needed = entry_size(key, value);
            if needed > available {
                return Err(StorageError::QuotaExceeded { needed, available });
            }
        }
        entries.insert(key.to_owned(), value.to_vec());
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        self.insert(&mut guard, key, value)
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: &[u8],
    ) -> Result<bool, StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if guard.get(key).map(Vec::as_slice) != expected {
            return Ok(false);
        }
        self.insert(&mut guard, key, value)?;
        Ok(true)
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(key);
        Ok(())
    }

    async fn size_estimate(&self) -> Result<StorageEstimate, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(StorageEstimate {
            used: Self::used(&guard),
            quota: self.quota,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_remove() {
        let store = InMemoryKeyValueStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", b"value").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some(&b"value"[..]));
        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.remove("k").await.unwrap();
    }

    #[tokio::test]
    async fn compare_and_set_only_replaces_the_expected_value() {
        let store = InMemoryKeyValueStore::new();
        assert!(store.compare_and_set("k", None, b"one").await.unwrap());
        assert!(!store.compare_and_set("k", None, b"two").await.unwrap());
        assert!(!store.compare_and_set("k", Some(&b"zero"[..]), b"two").await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some(&b"one"[..]));

        assert!(store.compare_and_set("k", Some(&b"one"[..]), b"two").await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some(&b"two"[..]));
    }

    #[tokio::test]
    async fn quota_counts_replaced_entry_as_free() {
        let store = InMemoryKeyValueStore::with_quota(10);
        store.set("k", b"12345678").await.unwrap();
        // replacing the same key may reuse its space
        store.set("k", b"abcdefgh").await.unwrap();

        let err = store.set("other", b"xy").await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::QuotaExceeded {
                needed: 7,
                available: 1
            }
        ));

        let estimate = store.size_estimate().await.unwrap();
        assert_eq!(estimate.used, 9);
        assert_eq!(estimate.remaining(), Some(1));
    }

    #[tokio::test]
    async fn unbounded_store_reports_no_quota() {
        let store = InMemoryKeyValueStore::new();
        store.set("a", b"b").await.unwrap();
        let estimate = store.size_estimate().await.unwrap();
        assert_eq!(estimate, StorageEstimate { used: 2, quota: None });
        assert_eq!(estimate.remaining(), None);
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let store = InMemoryKeyValueStore::new();
        let shared: Arc<dyn KeyValueStore> = Arc::new(store.clone());
        shared.set("k", b"v").await.unwrap();
        assert!(store.get("k").await.unwrap().is_some());
    }
}

//! In-memory local replica store.
//!
//! Every node holds the full keyspace in a `tokio::sync::RwLock<HashMap>`.
//! The store is mutated by client-facing put/delete on this node and by
//! replicate/delete-replica requests arriving from peers.  Data is never
//! persisted; its lifetime is the process lifetime.

use std::collections::HashMap;

/// Thread-safe key-value map holding this node's authoritative replica.
///
/// Keys are opaque strings; values are opaque strings compared byte-exactly
/// by the read path.  Each operation takes the lock for the duration of a
/// single map access, so per-key state transitions are atomic.
pub struct LocalStore {
    entries: tokio::sync::RwLock<HashMap<String, String>>,
}

impl LocalStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    /// Write `value` under `key`, overwriting any existing value.
    /// Always succeeds.
    pub async fn put(&self, key: &str, value: &str) {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value.to_string());
        tracing::debug!(key, "stored value");
    }

    /// Read the value under `key`, if present.
    pub async fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().await;
        entries.get(key).cloned()
    }

    /// Remove `key`, returning the previous value if there was one.
    /// Deleting an absent key is a no-op.
    pub async fn delete(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.write().await;
        entries.remove(key)
    }

    /// Number of keys currently held.  Used by the metrics gauge.
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.len()
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ───────────────────────────────────────────────────────────

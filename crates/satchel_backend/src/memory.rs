//! In-memory backend for testing.

use crate::backend::{BackendStats, StoreBackend};
use crate::error::BackendResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory storage backend.
///
/// This backend keeps all data in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use satchel_backend::{MemoryBackend, StoreBackend};
///
/// let backend = MemoryBackend::new();
/// backend.put("tasks", "t1", b"data").unwrap();
/// assert_eq!(backend.stats().unwrap().item_count, 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryBackend {
    collections: RwLock<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreBackend for MemoryBackend {
    fn put(&self, collection: &str, id: &str, bytes: &[u8]) -> BackendResult<()> {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, collection: &str, id: &str) -> BackendResult<Option<Vec<u8>>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|entries| entries.get(id))
            .cloned())
    }

    fn get_all(&self, collection: &str) -> BackendResult<Vec<Vec<u8>>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default())
    }

    fn delete(&self, collection: &str, id: &str) -> BackendResult<()> {
        if let Some(entries) = self.collections.write().get_mut(collection) {
            entries.remove(id);
        }
        Ok(())
    }

    fn clear(&self, collection: &str) -> BackendResult<()> {
        // The collection stays known; only its entries go.
        if let Some(entries) = self.collections.write().get_mut(collection) {
            entries.clear();
        }
        Ok(())
    }

    fn collections(&self) -> BackendResult<Vec<String>> {
        Ok(self.collections.read().keys().cloned().collect())
    }

    fn stats(&self) -> BackendResult<BackendStats> {
        let collections = self.collections.read();
        let mut stats = BackendStats::default();
        for entries in collections.values() {
            stats.item_count += entries.len() as u64;
            stats.used_bytes += entries.values().map(|v| v.len() as u64).sum::<u64>();
        }
        Ok(stats)
    }
}

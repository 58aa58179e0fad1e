//! Remote endpoint abstraction.

use crate::error::{RemoteError, RemoteResult};
use parking_lot::Mutex;
use satchel_codec::Record;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// The remote side of synchronization: a per-collection upsert/fetch/
/// delete service.
///
/// This trait abstracts the network layer; implementations may speak any
/// protocol. Every failure - transport, timeout, non-success response -
/// is surfaced as a single [`RemoteError`] per operation, with no
/// partial-batch semantics.
pub trait RemoteEndpoint: Send + Sync {
    /// Creates or replaces a record in a remote collection.
    fn upsert(&self, collection: &str, record: &Record) -> RemoteResult<()>;

    /// Fetches every record of a remote collection.
    fn fetch_all(&self, collection: &str) -> RemoteResult<Vec<Record>>;

    /// Deletes a record from a remote collection.
    fn delete(&self, collection: &str, id: &str) -> RemoteResult<()>;
}

/// An in-memory remote endpoint for testing.
///
/// Holds records per collection, counts calls, and supports failure
/// injection: a total outage, per-key failures, and artificial latency
/// for exercising the engine's re-entrancy guard.
#[derive(Debug, Default)]
pub struct MockRemote {
    collections: Mutex<BTreeMap<String, BTreeMap<String, Record>>>,
    offline: AtomicBool,
    fail_keys: Mutex<BTreeSet<(String, String)>>,
    latency: Mutex<Option<Duration>>,
    upsert_calls: AtomicU64,
    fetch_calls: AtomicU64,
    delete_calls: AtomicU64,
}

impl MockRemote {
    /// Creates a new empty mock remote.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record directly into the remote state.
    pub fn seed(&self, collection: &str, record: Record) {
        let id = record
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        self.collections
            .lock()
            .entry(collection.to_string())
            .or_default()
            .insert(id, record);
    }

    /// Returns the remote records of a collection, in id order.
    #[must_use]
    pub fn records(&self, collection: &str) -> Vec<Record> {
        self.collections
            .lock()
            .get(collection)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Simulates a total outage: every operation fails.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes every operation against `(collection, id)` fail.
    pub fn fail_on(&self, collection: &str, id: &str) {
        self.fail_keys
            .lock()
            .insert((collection.to_string(), id.to_string()));
    }

    /// Clears all per-key failure injections.
    pub fn clear_failures(&self) {
        self.fail_keys.lock().clear();
    }

    /// Adds artificial latency to every operation.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Number of `upsert` calls observed.
    #[must_use]
    pub fn upsert_calls(&self) -> u64 {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// Number of `fetch_all` calls observed.
    #[must_use]
    pub fn fetch_calls(&self) -> u64 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Number of `delete` calls observed.
    #[must_use]
    pub fn delete_calls(&self) -> u64 {
        self.delete_calls.load(Ordering::SeqCst)
    }

    fn simulate(&self, collection: &str, id: Option<&str>) -> RemoteResult<()> {
        if let Some(latency) = *self.latency.lock() {
            std::thread::sleep(latency);
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::new("remote unreachable"));
        }
        if let Some(id) = id {
            let failing = self
                .fail_keys
                .lock()
                .contains(&(collection.to_string(), id.to_string()));
            if failing {
                return Err(RemoteError::new(format!(
                    "injected failure for {collection}/{id}"
                )));
            }
        }
        Ok(())
    }
}

impl RemoteEndpoint for MockRemote {
    fn upsert(&self, collection: &str, record: &Record) -> RemoteResult<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let id = record
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| RemoteError::fatal("record has no id"))?;
        self.simulate(collection, Some(id))?;

        self.collections
            .lock()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), record.clone());
        Ok(())
    }

    fn fetch_all(&self, collection: &str) -> RemoteResult<Vec<Record>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate(collection, None)?;
        Ok(self.records(collection))
    }

    fn delete(&self, collection: &str, id: &str) -> RemoteResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate(collection, Some(id))?;

        if let Some(records) = self.collections.lock().get_mut(collection) {
            records.remove(id);
        }
        Ok(())
    }
}

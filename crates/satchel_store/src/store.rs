//! The persistent record store.

use crate::auth::AuthProvider;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::timestamp::record_timestamp;
use parking_lot::RwLock;
use satchel_backend::StoreBackend;
use satchel_codec::{now_millis, EncryptionKey, Record, RecordCodec};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Salt for deriving the at-rest key from the configured passphrase.
/// Fixed so the same passphrase yields the same key on every device.
const KEY_SALT: &[u8] = b"satchel-store-v1";

/// Collection holding store bookkeeping records.
const META_COLLECTION: &str = "_meta";
/// Record id of the last-cleanup bookkeeping entry.
const LAST_CLEANUP_ID: &str = "last_cleanup";

/// Milliseconds per day.
const DAY_MS: i64 = 86_400_000;

/// Aggregate store statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    /// Payload bytes currently stored.
    pub used_bytes: u64,
    /// Configured quota in bytes.
    pub total_bytes: u64,
    /// Number of stored records.
    pub item_count: u64,
    /// When cleanup last completed, epoch milliseconds.
    pub last_cleanup: Option<i64>,
}

/// Result of a cleanup pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupReport {
    /// Collections examined.
    pub collections: usize,
    /// Records kept.
    pub retained: usize,
    /// Records purged.
    pub purged: usize,
}

/// The namespaced, encrypted persistent store.
///
/// All reads and writes go through the envelope codec; all collection
/// names are prefixed with the current user's id. Collections whose bare
/// name starts with `_` are internal bookkeeping (the offline queue, meta
/// records) and are excluded from cleanup and backup.
pub struct RecordStore {
    backend: Arc<dyn StoreBackend>,
    codec: RecordCodec,
    auth: Arc<dyn AuthProvider>,
    config: StoreConfig,
    /// Bare (un-namespaced) collection names seen by this store.
    known: RwLock<BTreeSet<String>>,
}

impl RecordStore {
    /// Opens a store over the given backend and auth collaborator.
    ///
    /// Validates the configuration, derives the encryption key from the
    /// configured passphrase, seeds the collection registry from the
    /// backend, and - when `auto_cleanup` is set - runs a cleanup pass if
    /// one is due.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, key derivation
    /// fails, or the backend cannot be read.
    pub fn open(
        backend: Arc<dyn StoreBackend>,
        auth: Arc<dyn AuthProvider>,
        config: StoreConfig,
    ) -> StoreResult<Self> {
        config.validate()?;

        let key = EncryptionKey::derive_from_passphrase(&config.encryption_key, KEY_SALT)?;
        let codec = RecordCodec::new(key, config.compression_enabled);

        let store = Self {
            backend,
            codec,
            auth,
            config,
            known: RwLock::new(BTreeSet::new()),
        };
        store.seed_known()?;

        if store.config.auto_cleanup && store.cleanup_due()? {
            let days = store.config.cleanup_threshold_days;
            store.cleanup(days)?;
        }

        Ok(store)
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the envelope codec.
    pub(crate) fn codec(&self) -> &RecordCodec {
        &self.codec
    }

    /// Stores a record. The record must carry a string `id` field.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidRecord`] when `id` is missing, or a
    /// codec/backend error.
    pub fn set(&self, collection: &str, record: &Record) -> StoreResult<()> {
        let id = require_id(record)?;
        let scoped = self.namespaced(collection);
        let bytes = self.codec.encode(record)?;
        self.backend.put(&scoped, &id, &bytes)?;
        debug!(collection = %scoped, id = %id, "stored record");
        Ok(())
    }

    /// Reads a record by id.
    ///
    /// An envelope that fails to decode is treated as unreadable: the
    /// failure is logged and `None` is returned.
    ///
    /// # Errors
    ///
    /// Returns an error only for backend failures.
    pub fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Record>> {
        let scoped = self.namespaced(collection);
        let Some(bytes) = self.backend.get(&scoped, id)? else {
            return Ok(None);
        };
        match self.codec.decode(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(error) => {
                warn!(collection = %scoped, id, %error, "skipping unreadable record");
                Ok(None)
            }
        }
    }

    /// Reads every record of a collection.
    ///
    /// Envelopes that fail to decode are skipped with a warning; one
    /// corrupt record never blocks access to the rest of the collection.
    ///
    /// # Errors
    ///
    /// Returns an error only for backend failures.
    pub fn get_all(&self, collection: &str) -> StoreResult<Vec<Record>> {
        let scoped = self.namespaced(collection);
        let envelopes = self.backend.get_all(&scoped)?;

        let mut records = Vec::with_capacity(envelopes.len());
        for bytes in envelopes {
            match self.codec.decode(&bytes) {
                Ok(record) => records.push(record),
                Err(error) => {
                    warn!(collection = %scoped, %error, "skipping unreadable record");
                }
            }
        }
        Ok(records)
    }

    /// Applies a partial update to an existing record.
    ///
    /// Read-modify-write: fetches the record, shallow-merges the partial
    /// fields over it (the `id` is preserved), and stores the result.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the record does not exist.
    pub fn update(&self, collection: &str, id: &str, partial: &Record) -> StoreResult<()> {
        let Some(mut record) = self.get(collection, id)? else {
            return Err(StoreError::not_found(collection, id));
        };

        for (key, value) in partial {
            record.insert(key.clone(), value.clone());
        }
        record.insert("id".into(), Value::from(id));

        self.set(collection, &record)
    }

    /// Deletes a record by id. Deleting an absent record is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error for backend failures.
    pub fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        let scoped = self.namespaced(collection);
        self.backend.delete(&scoped, id)?;
        Ok(())
    }

    /// Removes every record of a collection.
    ///
    /// # Errors
    ///
    /// Returns an error for backend failures.
    pub fn clear(&self, collection: &str) -> StoreResult<()> {
        let scoped = self.namespaced(collection);
        self.backend.clear(&scoped)?;
        Ok(())
    }

    /// Stores any serializable value as a record.
    ///
    /// The value must serialize to a JSON object with a string `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidRecord`] for non-object values.
    pub fn set_value<T: Serialize>(&self, collection: &str, value: &T) -> StoreResult<()> {
        let json = serde_json::to_value(value).map_err(satchel_codec::CodecError::from)?;
        let Value::Object(record) = json else {
            return Err(StoreError::invalid_record(
                "value does not serialize to an object",
            ));
        };
        self.set(collection, &record)
    }

    /// Reads a record and deserializes it into `T`.
    ///
    /// # Errors
    ///
    /// Returns a codec error when the stored record does not match `T`.
    pub fn get_value<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> StoreResult<Option<T>> {
        match self.get(collection, id)? {
            Some(record) => {
                let value = serde_json::from_value(Value::Object(record))
                    .map_err(satchel_codec::CodecError::from)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Reads a whole collection, deserialized into `T`.
    ///
    /// Records that do not match `T` are skipped with a warning, the same
    /// way undecodable envelopes are.
    ///
    /// # Errors
    ///
    /// Returns an error for backend failures.
    pub fn get_all_values<T: DeserializeOwned>(&self, collection: &str) -> StoreResult<Vec<T>> {
        let records = self.get_all(collection)?;
        let mut values = Vec::with_capacity(records.len());
        for record in records {
            match serde_json::from_value(Value::Object(record)) {
                Ok(value) => values.push(value),
                Err(error) => {
                    warn!(collection, %error, "skipping record that does not deserialize");
                }
            }
        }
        Ok(values)
    }

    /// Returns the application-visible collection names known to this
    /// store (internal `_`-prefixed collections are omitted).
    #[must_use]
    pub fn collections(&self) -> Vec<String> {
        self.known
            .read()
            .iter()
            .filter(|name| !name.starts_with('_'))
            .cloned()
            .collect()
    }

    /// Purges records older than `max_age_days` from every known
    /// collection.
    ///
    /// A record's age comes from its best-effort timestamp field
    /// (`timestamp`, `createdAt`, `startTime`); records with no readable
    /// timestamp are purged with the stale ones. Each collection is
    /// rewritten as clear-then-rewrite, which is atomic from the caller's
    /// point of view as long as no other writer touches the collection
    /// mid-pass.
    ///
    /// # Errors
    ///
    /// Returns an error for backend or codec failures.
    pub fn cleanup(&self, max_age_days: u32) -> StoreResult<CleanupReport> {
        let cutoff = now_millis() - i64::from(max_age_days) * DAY_MS;
        let names = self.collections();

        let mut report = CleanupReport {
            collections: names.len(),
            ..CleanupReport::default()
        };

        for name in &names {
            let records = self.get_all(name)?;
            let total = records.len();
            let keep: Vec<Record> = records
                .into_iter()
                .filter(|r| record_timestamp(r).is_some_and(|ts| ts > cutoff))
                .collect();

            report.retained += keep.len();
            report.purged += total - keep.len();

            if keep.len() == total {
                continue;
            }
            self.clear(name)?;
            for record in &keep {
                self.set(name, record)?;
            }
        }

        self.set_last_cleanup(now_millis())?;
        info!(
            collections = report.collections,
            retained = report.retained,
            purged = report.purged,
            "cleanup completed"
        );
        Ok(report)
    }

    /// Returns aggregate usage statistics.
    ///
    /// # Errors
    ///
    /// Returns an error for backend failures.
    pub fn stats(&self) -> StoreResult<StoreStats> {
        let backend = self.backend.stats()?;
        Ok(StoreStats {
            used_bytes: backend.used_bytes,
            total_bytes: self.config.max_storage_size_mb * 1024 * 1024,
            item_count: backend.item_count,
            last_cleanup: self.last_cleanup()?,
        })
    }

    /// Resolves the effective collection name for the current user and
    /// registers the bare name.
    pub(crate) fn namespaced(&self, collection: &str) -> String {
        self.known.write().insert(collection.to_string());
        match self.auth.current_user_id() {
            Some(user) => format!("{user}_{collection}"),
            None => collection.to_string(),
        }
    }

    /// Seeds the collection registry from what the backend already holds.
    fn seed_known(&self) -> StoreResult<()> {
        let names = self.backend.collections()?;
        let user = self.auth.current_user_id();
        let mut known = self.known.write();

        for name in names {
            match &user {
                Some(user) => {
                    if let Some(bare) = name.strip_prefix(&format!("{user}_")) {
                        known.insert(bare.to_string());
                    }
                    // Other users' collections are not ours to touch.
                }
                None => {
                    known.insert(name);
                }
            }
        }
        Ok(())
    }

    fn last_cleanup(&self) -> StoreResult<Option<i64>> {
        Ok(self
            .get(META_COLLECTION, LAST_CLEANUP_ID)?
            .as_ref()
            .and_then(record_timestamp))
    }

    fn set_last_cleanup(&self, at: i64) -> StoreResult<()> {
        let mut record = Record::new();
        record.insert("id".into(), Value::from(LAST_CLEANUP_ID));
        record.insert("timestamp".into(), Value::from(at));
        self.set(META_COLLECTION, &record)
    }

    fn cleanup_due(&self) -> StoreResult<bool> {
        let threshold = i64::from(self.config.cleanup_threshold_days) * DAY_MS;
        Ok(match self.last_cleanup()? {
            Some(at) => now_millis() - at > threshold,
            None => true,
        })
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("codec", &self.codec)
            .field("known", &*self.known.read())
            .finish()
    }
}

fn require_id(record: &Record) -> StoreResult<String> {
    record
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| StoreError::invalid_record("record has no string `id` field"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{NoAuth, SessionAuth};
    use satchel_backend::{FlatBackend, MemoryBackend};
    use serde::Deserialize;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    fn open_memory() -> (Arc<MemoryBackend>, RecordStore) {
        let backend = Arc::new(MemoryBackend::new());
        let store = RecordStore::open(
            backend.clone(),
            Arc::new(NoAuth),
            StoreConfig::new("test-passphrase").auto_cleanup(false),
        )
        .unwrap();
        (backend, store)
    }

    #[test]
    fn set_get_roundtrip() {
        let (_, store) = open_memory();
        let task = record(json!({"id": "t1", "title": "water the plants"}));

        store.set("tasks", &task).unwrap();
        assert_eq!(store.get("tasks", "t1").unwrap().unwrap(), task);
        assert_eq!(store.get("tasks", "missing").unwrap(), None);
    }

    #[test]
    fn set_requires_id() {
        let (_, store) = open_memory();
        let no_id = record(json!({"title": "nameless"}));

        let result = store.set("tasks", &no_id);
        assert!(matches!(result, Err(StoreError::InvalidRecord { .. })));
    }

    #[test]
    fn records_are_encrypted_at_rest() {
        let (backend, store) = open_memory();
        let task = record(json!({"id": "t1", "title": "secret plan"}));
        store.set("tasks", &task).unwrap();

        let raw = backend.get("tasks", "t1").unwrap().unwrap();
        let raw_text = String::from_utf8_lossy(&raw);
        assert!(!raw_text.contains("secret plan"));
    }

    #[test]
    fn namespace_isolation() {
        let backend = Arc::new(MemoryBackend::new());
        let auth = Arc::new(SessionAuth::new());

        auth.sign_in("alice");
        let store = RecordStore::open(
            backend.clone(),
            auth.clone(),
            StoreConfig::new("test-passphrase").auto_cleanup(false),
        )
        .unwrap();

        store
            .set("tasks", &record(json!({"id": "t1", "title": "alice's"})))
            .unwrap();

        auth.sign_in("bob");
        assert_eq!(store.get("tasks", "t1").unwrap(), None);
        assert!(store.get_all("tasks").unwrap().is_empty());

        auth.sign_in("alice");
        assert!(store.get("tasks", "t1").unwrap().is_some());
    }

    #[test]
    fn namespace_isolation_on_flat_backend() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FlatBackend::open(&dir.path().join("store.flat")).unwrap());
        let auth = Arc::new(SessionAuth::new());

        auth.sign_in("u1");
        let store = RecordStore::open(
            backend,
            auth.clone(),
            StoreConfig::new("test-passphrase").auto_cleanup(false),
        )
        .unwrap();

        store
            .set("tasks", &record(json!({"id": "t1", "v": 1})))
            .unwrap();

        auth.sign_in("u2");
        assert_eq!(store.get("tasks", "t1").unwrap(), None);
    }

    #[test]
    fn unauthenticated_namespacing_is_bare() {
        let (backend, store) = open_memory();
        store
            .set("tasks", &record(json!({"id": "t1", "v": 1})))
            .unwrap();

        // With no user, the effective collection is the bare name.
        assert!(backend.get("tasks", "t1").unwrap().is_some());
    }

    #[test]
    fn get_all_skips_corrupt_envelopes() {
        let (backend, store) = open_memory();

        for i in 0..3 {
            store
                .set("tasks", &record(json!({"id": format!("t{i}"), "n": i})))
                .unwrap();
        }
        backend.put("tasks", "zz-bad", b"not an envelope").unwrap();

        let all = store.get_all("tasks").unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn get_on_corrupt_envelope_is_none() {
        let (backend, store) = open_memory();
        backend.put("tasks", "bad", b"garbage").unwrap();

        assert_eq!(store.get("tasks", "bad").unwrap(), None);
    }

    #[test]
    fn update_merges_and_preserves_id() {
        let (_, store) = open_memory();
        store
            .set(
                "tasks",
                &record(json!({"id": "t1", "title": "draft", "priority": 1})),
            )
            .unwrap();

        store
            .update("tasks", "t1", &record(json!({"priority": 3, "id": "spoofed"})))
            .unwrap();

        let updated = store.get("tasks", "t1").unwrap().unwrap();
        assert_eq!(updated.get("title"), Some(&json!("draft")));
        assert_eq!(updated.get("priority"), Some(&json!(3)));
        assert_eq!(updated.get("id"), Some(&json!("t1")));
    }

    #[test]
    fn update_missing_record_is_not_found() {
        let (_, store) = open_memory();
        let result = store.update("tasks", "ghost", &record(json!({"a": 1})));
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn cleanup_purges_old_and_untimestamped_records() {
        let (_, store) = open_memory();
        let now = now_millis();

        store
            .set("tasks", &record(json!({"id": "fresh", "timestamp": now})))
            .unwrap();
        store
            .set(
                "tasks",
                &record(json!({"id": "stale", "timestamp": now - 100 * DAY_MS})),
            )
            .unwrap();
        store
            .set("tasks", &record(json!({"id": "ageless"})))
            .unwrap();

        let report = store.cleanup(30).unwrap();
        assert_eq!(report.retained, 1);
        assert_eq!(report.purged, 2);

        let remaining = store.get_all("tasks").unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].get("id"), Some(&json!("fresh")));
    }

    #[test]
    fn cleanup_skips_internal_collections() {
        let (_, store) = open_memory();
        store
            .set("_offline_queue", &record(json!({"id": "q1"})))
            .unwrap();

        store.cleanup(30).unwrap();
        assert_eq!(store.get_all("_offline_queue").unwrap().len(), 1);
    }

    #[test]
    fn stats_reflect_usage_and_cleanup() {
        let (_, store) = open_memory();
        store
            .set("tasks", &record(json!({"id": "t1", "title": "x"})))
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.item_count, 1);
        assert!(stats.used_bytes > 0);
        assert_eq!(stats.total_bytes, 100 * 1024 * 1024);
        assert_eq!(stats.last_cleanup, None);

        store.cleanup(30).unwrap();
        assert!(store.stats().unwrap().last_cleanup.is_some());
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Task {
        id: String,
        title: String,
        priority: u8,
    }

    #[test]
    fn typed_roundtrip() {
        let (_, store) = open_memory();
        let task = Task {
            id: "t1".into(),
            title: "typed".into(),
            priority: 2,
        };

        store.set_value("tasks", &task).unwrap();
        let loaded: Task = store.get_value("tasks", "t1").unwrap().unwrap();
        assert_eq!(loaded, task);

        let all: Vec<Task> = store.get_all_values("tasks").unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn collections_listing_excludes_internal() {
        let (_, store) = open_memory();
        store
            .set("tasks", &record(json!({"id": "t1"})))
            .unwrap();
        store
            .set("_meta", &record(json!({"id": "m1"})))
            .unwrap();

        assert_eq!(store.collections(), vec!["tasks".to_string()]);
    }
}

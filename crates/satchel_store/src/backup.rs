//! Full-state backup and restore.
//!
//! A backup is a single opaque blob: a JSON object holding a `metadata`
//! entry plus one array per application collection, sealed with the same
//! key the envelope codec uses. The blob is self-contained and portable
//! across backends - restoring replays every record through the normal
//! `set` path, so the receiving store re-encodes everything with its own
//! settings.
//!
//! Blob shape (before encryption):
//!
//! ```json
//! {
//!   "metadata": { "version": "1.0.0", "timestamp": 1700000000000, "config": { ... } },
//!   "tasks": [ { "id": "t1", ... }, ... ],
//!   "moods": []
//! }
//! ```
//!
//! Unknown metadata fields are ignored on restore, so old blobs keep
//! restoring into newer store versions.

use crate::error::{StoreError, StoreResult};
use crate::store::RecordStore;
use satchel_codec::{now_millis, CodecError, Record};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::info;

/// Version string written into backup metadata.
pub const BACKUP_VERSION: &str = "1.0.0";

/// Result of a restore.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreReport {
    /// Collections restored (including empty ones).
    pub collections: usize,
    /// Records written.
    pub records: usize,
}

impl RecordStore {
    /// Serializes the full cross-collection state into an encrypted blob.
    ///
    /// Covers every known application collection of the current
    /// namespace, including empty ones.
    ///
    /// # Errors
    ///
    /// Returns an error for backend, codec, or encryption failures.
    pub fn create_backup(&self) -> StoreResult<Vec<u8>> {
        let mut blob = Map::new();

        let mut metadata = Map::new();
        metadata.insert("version".into(), Value::from(BACKUP_VERSION));
        metadata.insert("timestamp".into(), Value::from(now_millis()));
        metadata.insert(
            "config".into(),
            serde_json::json!({
                "compressionEnabled": self.config().compression_enabled,
                "maxStorageSizeMB": self.config().max_storage_size_mb,
                "cleanupThresholdDays": self.config().cleanup_threshold_days,
            }),
        );
        blob.insert("metadata".into(), Value::Object(metadata));

        let names = self.collections();
        let mut records = 0usize;
        for name in &names {
            let collection = self.get_all(name)?;
            records += collection.len();
            blob.insert(
                name.clone(),
                Value::Array(collection.into_iter().map(Value::Object).collect()),
            );
        }

        let plaintext = serde_json::to_vec(&Value::Object(blob)).map_err(CodecError::from)?;
        let sealed = self.codec().crypto().encrypt(&plaintext)?;

        info!(
            collections = names.len(),
            records,
            bytes = sealed.len(),
            "backup created"
        );
        Ok(sealed)
    }

    /// Restores the store from a backup blob.
    ///
    /// The blob is decrypted and fully validated before anything is
    /// modified; a blob that fails validation leaves the store untouched.
    /// Restoring then clears every known application collection and
    /// replays the blob's records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Restore`] when the blob cannot be decrypted
    /// or is not a valid backup.
    pub fn restore_backup(&self, bytes: &[u8]) -> StoreResult<RestoreReport> {
        let collections = self.validate_blob(bytes)?;

        // Clear first: known collections plus incoming ones, so records
        // absent from the backup do not survive it.
        let mut targets: BTreeSet<String> = self.collections().into_iter().collect();
        targets.extend(collections.iter().map(|(name, _)| name.clone()));
        for name in &targets {
            self.clear(name)?;
        }

        let mut report = RestoreReport {
            collections: collections.len(),
            records: 0,
        };
        for (name, records) in &collections {
            // Registers the collection even when its array is empty.
            let _ = self.namespaced(name);
            for record in records {
                self.set(name, record)?;
                report.records += 1;
            }
        }

        info!(
            collections = report.collections,
            records = report.records,
            "backup restored"
        );
        Ok(report)
    }

    /// Decrypts and validates a blob without touching the store.
    fn validate_blob(&self, bytes: &[u8]) -> StoreResult<Vec<(String, Vec<Record>)>> {
        let plaintext = self
            .codec()
            .crypto()
            .decrypt(bytes)
            .map_err(|e| StoreError::restore(format!("backup cannot be decrypted: {e}")))?;

        let value: Value = serde_json::from_slice(&plaintext)
            .map_err(|e| StoreError::restore(format!("backup is not valid JSON: {e}")))?;
        let Value::Object(blob) = value else {
            return Err(StoreError::restore("backup is not a JSON object"));
        };

        let Some(Value::Object(metadata)) = blob.get("metadata") else {
            return Err(StoreError::restore("backup has no metadata"));
        };
        if !metadata.get("version").is_some_and(Value::is_string) {
            return Err(StoreError::restore("backup metadata has no version"));
        }

        let mut collections = Vec::new();
        for (name, value) in &blob {
            if name == "metadata" {
                continue;
            }
            let Value::Array(items) = value else {
                return Err(StoreError::restore(format!(
                    "collection {name} is not an array"
                )));
            };
            let mut records = Vec::with_capacity(items.len());
            for item in items {
                let Value::Object(record) = item else {
                    return Err(StoreError::restore(format!(
                        "collection {name} contains a non-object record"
                    )));
                };
                if !record.get("id").is_some_and(Value::is_string) {
                    return Err(StoreError::restore(format!(
                        "collection {name} contains a record without an id"
                    )));
                }
                records.push(record.clone());
            }
            collections.push((name.clone(), records));
        }

        Ok(collections)
    }
}

//! Conflict detection, resolution policies, and merging.

use satchel_codec::Record;
use satchel_store::record_timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Collection where unresolved conflicts and dead-lettered queue entries
/// are persisted for manual handling.
pub const CONFLICTS_COLLECTION: &str = "conflicts";

/// Timestamp tolerance below which two versions are considered the same
/// edit, in milliseconds.
pub const CONFLICT_WINDOW_MS: i64 = 1000;

/// A detected divergence between the local and remote version of one
/// record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// The record id.
    pub id: String,
    /// The collection holding the record.
    pub collection: String,
    /// The local version.
    pub local: Record,
    /// The remote version.
    pub remote: Record,
    /// Best-effort timestamp of the local version, epoch milliseconds.
    #[serde(rename = "localTimestamp")]
    pub local_timestamp: i64,
    /// Best-effort timestamp of the remote version, epoch milliseconds.
    #[serde(rename = "remoteTimestamp")]
    pub remote_timestamp: i64,
}

/// Process-wide policy for resolving detected conflicts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Keep the local version; the remote one is ignored.
    Local,
    /// Overwrite local with the remote version.
    Remote,
    /// Keep whichever version is newer; ties favor local.
    #[default]
    Timestamp,
    /// Persist the conflict for manual resolution; no destructive action
    /// until a caller resolves it.
    Manual,
}

impl ConflictPolicy {
    /// Returns true if this policy resolves conflicts without a human.
    #[must_use]
    pub fn auto_resolves(&self) -> bool {
        !matches!(self, Self::Manual)
    }
}

/// Caller-chosen resolution for a manually persisted conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManualResolution {
    /// Keep the local version.
    Local,
    /// Take the remote version.
    Remote,
    /// Merge both versions field-wise.
    Merge,
}

/// Compares a local and remote version of the same record.
///
/// Versions whose best-effort timestamps differ by more than
/// [`CONFLICT_WINDOW_MS`] are in conflict. A side with no readable
/// timestamp counts as 0, so any genuinely timestamped counterpart
/// differs by more than the window.
#[must_use]
pub fn detect_conflict(collection: &str, local: &Record, remote: &Record) -> Option<Conflict> {
    let local_timestamp = record_timestamp(local).unwrap_or(0);
    let remote_timestamp = record_timestamp(remote).unwrap_or(0);

    if (local_timestamp - remote_timestamp).abs() <= CONFLICT_WINDOW_MS {
        return None;
    }

    let id = local
        .get("id")
        .or_else(|| remote.get("id"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Some(Conflict {
        id,
        collection: collection.to_string(),
        local: local.clone(),
        remote: remote.clone(),
        local_timestamp,
        remote_timestamp,
    })
}

/// Merges a remote record into a local one, field-wise.
///
/// - array fields concatenate, local then remote, without deduplication
/// - object fields merge key-wise; remote values win per key
/// - scalar fields take the side whose companion `<field>At` /
///   `<field>Timestamp` value is newer, defaulting to local
#[must_use]
pub fn merge_records(local: &Record, remote: &Record) -> Record {
    let mut merged = local.clone();

    for (key, remote_value) in remote {
        match remote_value {
            Value::Array(items) => {
                let mut combined = merged
                    .get(key)
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                combined.extend(items.iter().cloned());
                merged.insert(key.clone(), Value::Array(combined));
            }
            Value::Object(remote_fields) => {
                let mut combined = merged
                    .get(key)
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                for (field, value) in remote_fields {
                    combined.insert(field.clone(), value.clone());
                }
                merged.insert(key.clone(), Value::Object(combined));
            }
            _ => {
                let local_ts = field_timestamp(&merged, key);
                let remote_ts = field_timestamp(remote, key);
                if remote_ts > local_ts {
                    merged.insert(key.clone(), remote_value.clone());
                }
            }
        }
    }

    merged
}

/// Looks up a scalar field's companion timestamp (`<field>At` or
/// `<field>Timestamp`).
fn field_timestamp(record: &Record, field: &str) -> i64 {
    record
        .get(&format!("{field}At"))
        .and_then(Value::as_i64)
        .or_else(|| {
            record
                .get(&format!("{field}Timestamp"))
                .and_then(Value::as_i64)
        })
        .unwrap_or(0)
}

//! Record envelope encoding and decoding.
//!
//! The at-rest form of a record is an encrypted JSON object carrying the
//! record's own fields plus three metadata fields:
//!
//! - `_storedAt` - epoch milliseconds at encode time
//! - `_schemaVersion` - envelope schema version string
//! - `_compressed` - whether the compaction transform was applied
//!
//! Compaction drops `null` fields and shortens the well-known field names
//! below. Reserved short names are one or two characters; records that use
//! a reserved short name as a field of their own will collide with the
//! transform, so application field names should be three characters or
//! longer when compaction is enabled.

use crate::crypto::{CryptoManager, EncryptionKey};
use crate::error::{CodecError, CodecResult};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// A record as seen by callers: a JSON object, conventionally carrying a
/// string `id` field.
pub type Record = Map<String, Value>;

/// Envelope schema version written into every encoded record.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Metadata field: epoch milliseconds at encode time.
pub const META_STORED_AT: &str = "_storedAt";
/// Metadata field: envelope schema version.
pub const META_SCHEMA_VERSION: &str = "_schemaVersion";
/// Metadata field: whether compaction was applied.
pub const META_COMPRESSED: &str = "_compressed";

/// Well-known field names and their compacted forms.
const SHORT_KEYS: &[(&str, &str)] = &[
    ("content", "c"),
    ("timestamp", "t"),
    ("createdAt", "ca"),
    ("updatedAt", "ua"),
    ("status", "s"),
    ("priority", "p"),
    ("energy", "e"),
    ("type", "ty"),
    ("description", "d"),
    ("title", "ti"),
];

fn short_key(key: &str) -> &str {
    SHORT_KEYS
        .iter()
        .find(|(full, _)| *full == key)
        .map_or(key, |(_, short)| *short)
}

fn full_key(key: &str) -> &str {
    SHORT_KEYS
        .iter()
        .find(|(_, short)| *short == key)
        .map_or(key, |(full, _)| *full)
}

/// Returns the current time as epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Encodes records into encrypted envelopes and back.
pub struct RecordCodec {
    crypto: CryptoManager,
    compaction: bool,
}

impl RecordCodec {
    /// Creates a codec with the given key and compaction setting.
    #[must_use]
    pub fn new(key: EncryptionKey, compaction: bool) -> Self {
        Self {
            crypto: CryptoManager::new(key),
            compaction,
        }
    }

    /// Returns the underlying crypto manager.
    ///
    /// Backup blobs are sealed with the same key through this handle.
    #[must_use]
    pub fn crypto(&self) -> &CryptoManager {
        &self.crypto
    }

    /// Returns whether compaction is enabled.
    #[must_use]
    pub fn compaction(&self) -> bool {
        self.compaction
    }

    /// Encodes a record into an encrypted envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or encryption fails.
    pub fn encode(&self, record: &Record) -> CodecResult<Vec<u8>> {
        let mut envelope = if self.compaction {
            compact(record)
        } else {
            record.clone()
        };

        envelope.insert(META_STORED_AT.into(), Value::from(now_millis()));
        envelope.insert(META_SCHEMA_VERSION.into(), Value::from(SCHEMA_VERSION));
        envelope.insert(META_COMPRESSED.into(), Value::from(self.compaction));

        let plaintext = serde_json::to_vec(&Value::Object(envelope))?;
        self.crypto.encrypt(&plaintext)
    }

    /// Decodes an encrypted envelope back into the caller-visible record.
    ///
    /// # Errors
    ///
    /// Returns an error if decryption fails, the plaintext is not valid
    /// JSON, or the envelope is not an object. Callers reading a whole
    /// collection treat this as "record unreadable" and skip the entry.
    pub fn decode(&self, bytes: &[u8]) -> CodecResult<Record> {
        let plaintext = self.crypto.decrypt(bytes)?;
        let value: Value = serde_json::from_slice(&plaintext)?;

        let Value::Object(mut envelope) = value else {
            return Err(CodecError::invalid_envelope("expected a JSON object"));
        };

        let compressed = envelope
            .remove(META_COMPRESSED)
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        envelope.remove(META_STORED_AT);
        envelope.remove(META_SCHEMA_VERSION);

        if compressed {
            Ok(expand(&envelope))
        } else {
            Ok(envelope)
        }
    }
}

impl std::fmt::Debug for RecordCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCodec")
            .field("compaction", &self.compaction)
            .finish()
    }
}

/// Applies the compaction transform: drops nulls, shortens known keys.
fn compact(record: &Record) -> Record {
    let mut out = Map::with_capacity(record.len());
    for (key, value) in record {
        if value.is_null() {
            continue;
        }
        out.insert(short_key(key).to_string(), value.clone());
    }
    out
}

/// Reverses the compaction transform.
fn expand(envelope: &Record) -> Record {
    let mut out = Map::with_capacity(envelope.len());
    for (key, value) in envelope {
        out.insert(full_key(key).to_string(), value.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    fn codec(compaction: bool) -> RecordCodec {
        RecordCodec::new(EncryptionKey::generate(), compaction)
    }

    #[test]
    fn roundtrip_without_compaction() {
        let codec = codec(false);
        let rec = record(json!({
            "id": "task-1",
            "title": "write report",
            "priority": 2,
            "done": false,
        }));

        let bytes = codec.encode(&rec).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, rec);
    }

    #[test]
    fn roundtrip_with_compaction() {
        let codec = codec(true);
        let rec = record(json!({
            "id": "task-1",
            "title": "write report",
            "content": "quarterly numbers",
            "timestamp": 1_700_000_000_000_i64,
            "createdAt": 1_700_000_000_000_i64,
            "status": "open",
        }));

        let bytes = codec.encode(&rec).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, rec);
    }

    #[test]
    fn compaction_drops_null_fields() {
        let codec = codec(true);
        let rec = record(json!({"id": "x", "title": "a", "notes": null}));

        let bytes = codec.encode(&rec).unwrap();
        let decoded = codec.decode(&bytes).unwrap();

        assert!(!decoded.contains_key("notes"));
        assert_eq!(decoded.get("title"), Some(&json!("a")));
    }

    #[test]
    fn nulls_survive_without_compaction() {
        let codec = codec(false);
        let rec = record(json!({"id": "x", "notes": null}));

        let decoded = codec.decode(&codec.encode(&rec).unwrap()).unwrap();
        assert_eq!(decoded.get("notes"), Some(&Value::Null));
    }

    #[test]
    fn metadata_is_stripped() {
        for compaction in [false, true] {
            let codec = codec(compaction);
            let rec = record(json!({"id": "x"}));

            let decoded = codec.decode(&codec.encode(&rec).unwrap()).unwrap();
            assert!(!decoded.contains_key(META_STORED_AT));
            assert!(!decoded.contains_key(META_SCHEMA_VERSION));
            assert!(!decoded.contains_key(META_COMPRESSED));
        }
    }

    #[test]
    fn envelopes_decode_across_compaction_settings() {
        // The flag travels in the envelope, not the codec, so a store that
        // toggles compaction still reads its old records.
        let key_bytes = [7u8; 32];
        let writer = RecordCodec::new(EncryptionKey::from_bytes(&key_bytes).unwrap(), true);
        let reader = RecordCodec::new(EncryptionKey::from_bytes(&key_bytes).unwrap(), false);

        let rec = record(json!({"id": "x", "title": "hello"}));
        let decoded = reader.decode(&writer.encode(&rec).unwrap()).unwrap();
        assert_eq!(decoded, rec);
    }

    #[test]
    fn decode_garbage_fails() {
        let codec = codec(true);
        assert!(codec.decode(b"not an envelope").is_err());
    }

    #[test]
    fn decode_wrong_key_fails() {
        let writer = codec(false);
        let reader = codec(false);

        let bytes = writer.encode(&record(json!({"id": "x"}))).unwrap();
        assert!(reader.decode(&bytes).is_err());
    }

    fn field_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::from),
            any::<i32>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,12}".prop_map(Value::from),
            proptest::collection::vec(any::<i32>(), 0..4).prop_map(Value::from),
        ]
    }

    // Field names of three or more characters cannot collide with the
    // reserved short names (all one or two characters).
    fn arb_record() -> impl Strategy<Value = Record> {
        proptest::collection::btree_map("[a-z]{3,10}", field_value(), 0..8)
            .prop_map(|m| m.into_iter().collect())
    }

    proptest! {
        #[test]
        fn roundtrip_law(rec in arb_record(), compaction in any::<bool>()) {
            let codec = RecordCodec::new(EncryptionKey::generate(), compaction);
            let decoded = codec.decode(&codec.encode(&rec).unwrap()).unwrap();
            prop_assert_eq!(decoded, rec);
        }
    }
}

//! # Satchel Codec
//!
//! Record encoding pipeline for Satchel.
//!
//! Every record that reaches disk goes through the same three stages:
//!
//! 1. **Serialize** - the record (a JSON object with a string `id`) is
//!    serialized together with envelope metadata (`_storedAt`,
//!    `_schemaVersion`, `_compressed`)
//! 2. **Compact** (optional) - `null` fields are dropped and well-known
//!    field names are shortened; the transform is reversible
//! 3. **Encrypt** - the serialized envelope is sealed with AES-256-GCM
//!
//! Decoding reverses the stages and strips the metadata, so
//! `decode(encode(r)) == r` holds for any record without explicit nulls,
//! with compaction on or off.
//!
//! ## Example
//!
//! ```rust
//! use satchel_codec::{EncryptionKey, RecordCodec};
//! use serde_json::json;
//!
//! let key = EncryptionKey::generate();
//! let codec = RecordCodec::new(key, true);
//!
//! let record = json!({"id": "t1", "title": "water the plants"});
//! let bytes = codec.encode(record.as_object().unwrap()).unwrap();
//! let decoded = codec.decode(&bytes).unwrap();
//! assert_eq!(serde_json::Value::Object(decoded), record);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod crypto;
mod envelope;
mod error;

pub use crypto::{CryptoManager, EncryptionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use envelope::{
    now_millis, Record, RecordCodec, META_COMPRESSED, META_SCHEMA_VERSION, META_STORED_AT,
    SCHEMA_VERSION,
};
pub use error::{CodecError, CodecResult};

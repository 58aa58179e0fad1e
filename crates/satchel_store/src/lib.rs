//! # Satchel Store
//!
//! The namespaced, encrypted persistent record store.
//!
//! [`RecordStore`] sits between application callers and the raw
//! [`satchel_backend`] byte store:
//!
//! - every record round-trips through the [`satchel_codec`] envelope
//!   pipeline (serialize, optionally compact, encrypt)
//! - every collection name is prefixed with the current user's id so two
//!   accounts on one device never see each other's records
//! - bulk reads tolerate individual corrupt envelopes instead of failing
//!   the whole collection
//! - cleanup, quota statistics, and encrypted full-state backup/restore
//!   operate across every known collection
//!
//! ## Example
//!
//! ```rust
//! use satchel_backend::MemoryBackend;
//! use satchel_store::{NoAuth, RecordStore, StoreConfig};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let store = RecordStore::open(
//!     Arc::new(MemoryBackend::new()),
//!     Arc::new(NoAuth),
//!     StoreConfig::new("a passphrase"),
//! ).unwrap();
//!
//! let task = json!({"id": "t1", "title": "water the plants"});
//! store.set("tasks", task.as_object().unwrap()).unwrap();
//! assert_eq!(store.get_all("tasks").unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod backup;
mod config;
mod error;
mod store;
mod timestamp;

pub use auth::{AuthProvider, NoAuth, SessionAuth, StaticAuth};
pub use backup::{RestoreReport, BACKUP_VERSION};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use store::{CleanupReport, RecordStore, StoreStats};
pub use timestamp::record_timestamp;

pub use satchel_codec::Record;

//! # Satchel Sync
//!
//! Offline-first synchronization engine for Satchel.
//!
//! This crate provides:
//! - [`RemoteEndpoint`] - the abstract per-collection upsert/fetch/delete
//!   surface of the remote side (plus [`MockRemote`] for tests)
//! - [`OfflineQueue`] - a durable FIFO of remote operations deferred by
//!   failure or connectivity, with bounded retry and dead-lettering
//! - [`SyncEngine`] - upload/download orchestration, conflict detection
//!   and resolution, auto-sync, and online/offline transitions
//!
//! ## Architecture
//!
//! A sync cycle is **upload, drain, download**:
//! 1. Upload every local record of every configured collection; a failed
//!    upsert becomes an offline-queue entry instead of an error
//! 2. Drain the offline queue against the same endpoint
//! 3. Download every collection; remote records are written locally, and
//!    records present on both sides go through conflict detection
//!
//! ## Key Invariants
//!
//! - At most one sync cycle is in flight (re-entrant calls are no-ops)
//! - A failing record never aborts its phase, and a failing phase never
//!   aborts the cycle
//! - `sync()` never returns an error; failures surface only through
//!   [`SyncStatus`] and the `conflicts` collection

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod engine;
mod error;
mod queue;
mod remote;

pub use conflict::{
    detect_conflict, merge_records, Conflict, ConflictPolicy, ManualResolution,
    CONFLICTS_COLLECTION, CONFLICT_WINDOW_MS,
};
pub use engine::{SyncConfig, SyncEngine, SyncReport, SyncStatus};
pub use error::{RemoteError, RemoteResult, SyncError, SyncResult};
pub use queue::{OfflineQueue, QueueAction, QueueEntry, QUEUE_COLLECTION};
pub use remote::{MockRemote, RemoteEndpoint};

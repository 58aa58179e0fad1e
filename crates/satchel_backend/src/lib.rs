//! # Satchel Backend
//!
//! Storage backend adapter for Satchel.
//!
//! Backends are **opaque byte stores keyed by (collection, id)**. They do
//! not interpret the envelopes they hold - encoding, encryption, and
//! namespacing all happen above this crate.
//!
//! ## Design Principles
//!
//! - Backends are simple keyed stores (put, get, get_all, delete, clear)
//! - No knowledge of envelope formats or user namespaces
//! - Must be `Send + Sync` for shared access
//!
//! ## Available Backends
//!
//! - [`FileBackend`] - Primary: directory per collection, file per record
//! - [`FlatBackend`] - Fallback: one flat key-value file
//! - [`MemoryBackend`] - For testing and ephemeral stores
//! - [`Backend`] - The two-variant adapter selected once at startup by a
//!   capability probe; callers never branch on which variant is active
//!
//! ## Example
//!
//! ```rust
//! use satchel_backend::{MemoryBackend, StoreBackend};
//!
//! let backend = MemoryBackend::new();
//! backend.put("tasks", "t1", b"envelope bytes").unwrap();
//! assert_eq!(backend.get("tasks", "t1").unwrap().as_deref(), Some(&b"envelope bytes"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod flat;
mod memory;
mod probe;

pub use backend::{BackendStats, StoreBackend};
pub use error::{BackendError, BackendResult};
pub use file::FileBackend;
pub use flat::FlatBackend;
pub use memory::MemoryBackend;
pub use probe::Backend;

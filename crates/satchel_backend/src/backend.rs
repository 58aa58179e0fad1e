//! Storage backend trait definition.

use crate::error::BackendResult;

/// Aggregate statistics over everything a backend holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Total payload bytes stored.
    pub used_bytes: u64,
    /// Total number of stored records.
    pub item_count: u64,
}

/// A keyed byte store over named collections.
///
/// Backends are **opaque byte stores**. They hold encrypted envelope bytes
/// under `(collection, id)` keys and never interpret them - Satchel owns
/// all envelope and namespace interpretation.
///
/// # Invariants
///
/// - `get` returns exactly the bytes previously `put` under the same key
/// - `put` with an existing key overwrites
/// - `delete` and `clear` are idempotent; removing an absent key is not an
///   error
/// - `get_all` returns entries in a stable (id) order
/// - Implementations must be `Send + Sync` for shared access
///
/// # Implementors
///
/// - [`super::FileBackend`] - Primary, for persistent storage
/// - [`super::FlatBackend`] - Fallback, one flat key-value file
/// - [`super::MemoryBackend`] - For testing
pub trait StoreBackend: Send + Sync {
    /// Stores `bytes` under `(collection, id)`, creating the collection on
    /// first use.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn put(&self, collection: &str, id: &str, bytes: &[u8]) -> BackendResult<()>;

    /// Reads the bytes stored under `(collection, id)`, or `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn get(&self, collection: &str, id: &str) -> BackendResult<Option<Vec<u8>>>;

    /// Reads every entry of `collection`, in id order.
    ///
    /// An unknown collection yields an empty vector.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn get_all(&self, collection: &str) -> BackendResult<Vec<Vec<u8>>>;

    /// Removes the entry under `(collection, id)` if present.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn delete(&self, collection: &str, id: &str) -> BackendResult<()>;

    /// Removes every entry of `collection`.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn clear(&self, collection: &str) -> BackendResult<()>;

    /// Returns the names of collections this backend has seen.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing cannot be produced.
    fn collections(&self) -> BackendResult<Vec<String>>;

    /// Returns aggregate usage statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the statistics cannot be computed.
    fn stats(&self) -> BackendResult<BackendStats>;
}

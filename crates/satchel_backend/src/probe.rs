//! One-time backend capability probe.

use crate::backend::{BackendStats, StoreBackend};
use crate::error::{BackendError, BackendResult};
use crate::file::FileBackend;
use crate::flat::FlatBackend;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// The backend adapter: primary or fallback, selected once at open.
///
/// [`Backend::open`] probes the primary file backend first and falls back
/// to the flat-file backend when the primary cannot be opened. The choice
/// is made exactly once; there is no mid-session migration between the
/// variants, and callers only ever see the [`StoreBackend`] interface.
#[derive(Debug)]
pub enum Backend {
    /// The file-per-record primary backend.
    Primary(FileBackend),
    /// The flat-file fallback backend.
    Fallback(FlatBackend),
}

impl Backend {
    /// Probes and opens a backend rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unavailable`] when neither the primary nor
    /// the fallback backend can be opened. This is fatal at
    /// initialization; there is nothing to degrade to.
    pub fn open(root: &Path) -> BackendResult<Self> {
        match FileBackend::open(root) {
            Ok(primary) => {
                info!(root = %root.display(), "opened primary backend");
                Ok(Self::Primary(primary))
            }
            Err(primary_err) => {
                warn!(
                    root = %root.display(),
                    error = %primary_err,
                    "primary backend unavailable, falling back to flat file"
                );
                let path = flat_path(root);
                match FlatBackend::open(&path) {
                    Ok(fallback) => Ok(Self::Fallback(fallback)),
                    Err(fallback_err) => Err(BackendError::unavailable(format!(
                        "primary: {primary_err}; fallback: {fallback_err}"
                    ))),
                }
            }
        }
    }

    /// Returns true when the primary backend is active.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        matches!(self, Self::Primary(_))
    }

    fn inner(&self) -> &dyn StoreBackend {
        match self {
            Self::Primary(backend) => backend,
            Self::Fallback(backend) => backend,
        }
    }
}

impl StoreBackend for Backend {
    fn put(&self, collection: &str, id: &str, bytes: &[u8]) -> BackendResult<()> {
        self.inner().put(collection, id, bytes)
    }

    fn get(&self, collection: &str, id: &str) -> BackendResult<Option<Vec<u8>>> {
        self.inner().get(collection, id)
    }

    fn get_all(&self, collection: &str) -> BackendResult<Vec<Vec<u8>>> {
        self.inner().get_all(collection)
    }

    fn delete(&self, collection: &str, id: &str) -> BackendResult<()> {
        self.inner().delete(collection, id)
    }

    fn clear(&self, collection: &str) -> BackendResult<()> {
        self.inner().clear(collection)
    }

    fn collections(&self) -> BackendResult<Vec<String>> {
        self.inner().collections()
    }

    fn stats(&self) -> BackendResult<BackendStats> {
        self.inner().stats()
    }
}

/// The fallback file sits next to the primary root: `<root>.flat`.
fn flat_path(root: &Path) -> PathBuf {
    let mut name = root
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("satchel"));
    name.push(".flat");
    root.with_file_name(name)
}

//! CLI command implementations.

pub mod backup;
pub mod cleanup;
pub mod inspect;

use satchel_backend::Backend;
use satchel_store::{AuthProvider, NoAuth, RecordStore, StaticAuth, StoreConfig};
use std::path::Path;
use std::sync::Arc;

/// Opens the store at `path` for CLI use.
///
/// Auto-cleanup is disabled: the CLI never rewrites collections unless
/// asked to via the `cleanup` command.
pub fn open_store(
    path: &Path,
    key: &str,
    user: Option<&str>,
) -> Result<RecordStore, Box<dyn std::error::Error>> {
    let backend = Arc::new(Backend::open(path)?);
    let auth: Arc<dyn AuthProvider> = match user {
        Some(user) => Arc::new(StaticAuth::new(user)),
        None => Arc::new(NoAuth),
    };
    let config = StoreConfig::new(key).auto_cleanup(false);

    Ok(RecordStore::open(backend, auth, config)?)
}

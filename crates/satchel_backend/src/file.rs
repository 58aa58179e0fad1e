//! File-backed primary backend.

use crate::backend::{BackendStats, StoreBackend};
use crate::error::{BackendError, BackendResult};
use fs2::FileExt;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

const LOCK_FILE: &str = "LOCK";

/// The primary, file-backed storage backend.
///
/// Layout: one subdirectory per collection (created on first use), one
/// file per record. Record ids are hex-encoded into filenames, so ids may
/// contain any character. Writes go through a temp file followed by an
/// atomic rename, so a record file is never observed half-written.
///
/// An exclusive `fs2` lock on a `LOCK` file in the root directory holds
/// for the backend's lifetime; a second process opening the same root
/// gets [`BackendError::Locked`].
///
/// A per-collection id index is built at open and maintained on every
/// mutation; `get_all`, `collections`, and `stats` are answered from it
/// without walking the directory tree again.
pub struct FileBackend {
    root: PathBuf,
    _lock: File,
    /// collection -> id -> stored size in bytes
    index: RwLock<BTreeMap<String, BTreeMap<String, u64>>>,
}

impl FileBackend {
    /// Opens (and creates if missing) a file backend rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Locked`] if another process holds the root,
    /// or an I/O error if the directory cannot be created or scanned.
    pub fn open(root: &Path) -> BackendResult<Self> {
        fs::create_dir_all(root)?;

        let lock = File::create(root.join(LOCK_FILE))?;
        lock.try_lock_exclusive()
            .map_err(|_| BackendError::Locked {
                path: root.to_path_buf(),
            })?;

        let index = Self::scan(root)?;

        Ok(Self {
            root: root.to_path_buf(),
            _lock: lock,
            index: RwLock::new(index),
        })
    }

    /// Builds the id index by walking the root directory once.
    fn scan(root: &Path) -> BackendResult<BTreeMap<String, BTreeMap<String, u64>>> {
        let mut index = BTreeMap::new();

        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let collection = entry.file_name().to_string_lossy().into_owned();
            let mut ids = BTreeMap::new();

            for record in fs::read_dir(entry.path())? {
                let record = record?;
                if !record.file_type()?.is_file() {
                    continue;
                }
                let name = record.file_name().to_string_lossy().into_owned();
                match decode_id(&name) {
                    Some(id) => {
                        ids.insert(id, record.metadata()?.len());
                    }
                    None => {
                        // Leftover temp files and foreign files are not records.
                        warn!(collection, file = %name, "skipping unrecognized file");
                    }
                }
            }

            index.insert(collection, ids);
        }

        Ok(index)
    }

    fn record_path(&self, collection: &str, id: &str) -> PathBuf {
        self.root.join(collection).join(encode_id(id))
    }
}

impl StoreBackend for FileBackend {
    fn put(&self, collection: &str, id: &str, bytes: &[u8]) -> BackendResult<()> {
        let dir = self.root.join(collection);
        fs::create_dir_all(&dir)?;

        let name = encode_id(id);
        let tmp = dir.join(format!(".tmp-{name}"));
        {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, dir.join(&name))?;

        self.index
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), bytes.len() as u64);
        Ok(())
    }

    fn get(&self, collection: &str, id: &str) -> BackendResult<Option<Vec<u8>>> {
        match fs::read(self.record_path(collection, id)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn get_all(&self, collection: &str) -> BackendResult<Vec<Vec<u8>>> {
        let ids: Vec<String> = self
            .index
            .read()
            .get(collection)
            .map(|ids| ids.keys().cloned().collect())
            .unwrap_or_default();

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match fs::read(self.record_path(collection, &id)) {
                Ok(bytes) => out.push(bytes),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(out)
    }

    fn delete(&self, collection: &str, id: &str) -> BackendResult<()> {
        match fs::remove_file(self.record_path(collection, id)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(ids) = self.index.write().get_mut(collection) {
            ids.remove(id);
        }
        Ok(())
    }

    fn clear(&self, collection: &str) -> BackendResult<()> {
        let mut index = self.index.write();
        if let Some(ids) = index.get_mut(collection) {
            for id in ids.keys() {
                let path = self.root.join(collection).join(encode_id(id));
                match fs::remove_file(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
            ids.clear();
        }
        Ok(())
    }

    fn collections(&self) -> BackendResult<Vec<String>> {
        Ok(self.index.read().keys().cloned().collect())
    }

    fn stats(&self) -> BackendResult<BackendStats> {
        let index = self.index.read();
        let mut stats = BackendStats::default();
        for ids in index.values() {
            stats.item_count += ids.len() as u64;
            stats.used_bytes += ids.values().sum::<u64>();
        }
        Ok(stats)
    }
}

impl std::fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend")
            .field("root", &self.root)
            .finish()
    }
}

fn encode_id(id: &str) -> String {
    use std::fmt::Write as _;

    let mut out = String::with_capacity(id.len() * 2);
    for byte in id.as_bytes() {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn decode_id(name: &str) -> Option<String> {
    if name.len() % 2 != 0 {
        return None;
    }
    let mut bytes = Vec::with_capacity(name.len() / 2);
    for pair in name.as_bytes().chunks(2) {
        let hi = (pair[0] as char).to_digit(16)?;
        let lo = (pair[1] as char).to_digit(16)?;
        bytes.push((hi * 16 + lo) as u8);
    }
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_encoding_roundtrip() {
        for id in ["t1", "a/b:c", "日本語", "", "1700000000000"] {
            assert_eq!(decode_id(&encode_id(id)).as_deref(), Some(id));
        }
    }

    #[test]
    fn put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        backend.put("tasks", "t1", b"envelope").unwrap();
        assert_eq!(backend.get("tasks", "t1").unwrap().unwrap(), b"envelope");
        assert_eq!(backend.get("tasks", "nope").unwrap(), None);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let backend = FileBackend::open(dir.path()).unwrap();
            backend.put("tasks", "t1", b"one").unwrap();
            backend.put("moods", "m1", b"two").unwrap();
        }

        let backend = FileBackend::open(dir.path()).unwrap();
        assert_eq!(backend.get("tasks", "t1").unwrap().unwrap(), b"one");
        assert_eq!(
            backend.collections().unwrap(),
            vec!["moods".to_string(), "tasks".to_string()]
        );
        assert_eq!(backend.stats().unwrap().item_count, 2);
    }

    #[test]
    fn second_open_is_locked() {
        let dir = tempfile::tempdir().unwrap();
        let _backend = FileBackend::open(dir.path()).unwrap();

        let result = FileBackend::open(dir.path());
        assert!(matches!(result, Err(BackendError::Locked { .. })));
    }

    #[test]
    fn get_all_in_id_order() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        backend.put("tasks", "b", b"2").unwrap();
        backend.put("tasks", "a", b"1").unwrap();

        let all = backend.get_all("tasks").unwrap();
        assert_eq!(all, vec![b"1".to_vec(), b"2".to_vec()]);
    }

    #[test]
    fn clear_removes_entries_keeps_collection() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        backend.put("tasks", "t1", b"x").unwrap();
        backend.put("tasks", "t2", b"y").unwrap();
        backend.clear("tasks").unwrap();

        assert!(backend.get_all("tasks").unwrap().is_empty());
        assert_eq!(backend.collections().unwrap(), vec!["tasks".to_string()]);
        assert_eq!(backend.stats().unwrap().item_count, 0);
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        backend.put("tasks", "t1", b"x").unwrap();
        backend.delete("tasks", "t1").unwrap();
        backend.delete("tasks", "t1").unwrap();

        assert_eq!(backend.get("tasks", "t1").unwrap(), None);
    }
}

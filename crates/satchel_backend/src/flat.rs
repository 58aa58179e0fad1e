//! Flat-file fallback backend.

use crate::backend::{BackendStats, StoreBackend};
use crate::error::{BackendError, BackendResult};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Magic bytes identifying a flat backend file.
const FLAT_MAGIC: [u8; 4] = *b"SATF";
/// Current flat file format version.
const FLAT_VERSION: u16 = 1;

#[derive(Debug, Clone)]
struct FlatEntry {
    collection: String,
    id: String,
    value: Vec<u8>,
}

/// The fallback backend: one flat key-value file.
///
/// Every record of every collection lives in a single map keyed by
/// `"<collection>_<id>"`; the whole map is loaded at open and the file is
/// rewritten on every mutation. This is the degraded path for
/// environments where the primary backend cannot be opened - simple and
/// synchronous, with none of the primary's per-record files.
///
/// On-disk format:
///
/// ```text
/// | magic (4) | version (2) | count (4) | entries... | crc32 (4) |
/// ```
///
/// where each entry is three length-prefixed fields (collection, id,
/// value). A bad checksum or truncated file fails the open with
/// [`BackendError::Corrupted`].
pub struct FlatBackend {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, FlatEntry>>,
}

impl FlatBackend {
    /// Opens a flat backend stored at `path`, loading any existing data.
    ///
    /// A missing file is created immediately, so opening doubles as a
    /// writability probe.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Corrupted`] if the file exists but fails
    /// validation, or an I/O error if it cannot be read or created.
    pub fn open(path: &Path) -> BackendResult<Self> {
        let exists = path.exists();
        let entries = if exists {
            Self::load(&fs::read(path)?)?
        } else {
            BTreeMap::new()
        };

        let backend = Self {
            path: path.to_path_buf(),
            entries: RwLock::new(entries),
        };
        if !exists {
            backend.persist(&backend.entries.read())?;
        }
        Ok(backend)
    }

    fn flat_key(collection: &str, id: &str) -> String {
        format!("{collection}_{id}")
    }

    fn load(data: &[u8]) -> BackendResult<BTreeMap<String, FlatEntry>> {
        if data.len() < 10 + 4 {
            return Err(BackendError::corrupted("flat file too short"));
        }

        let (body, footer) = data.split_at(data.len() - 4);
        let stored_crc = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
        let actual_crc = compute_crc32(body);
        if stored_crc != actual_crc {
            return Err(BackendError::corrupted(format!(
                "checksum mismatch: expected {stored_crc:08x}, got {actual_crc:08x}"
            )));
        }

        if body[..4] != FLAT_MAGIC {
            return Err(BackendError::corrupted("bad magic"));
        }
        let version = u16::from_le_bytes([body[4], body[5]]);
        if version != FLAT_VERSION {
            return Err(BackendError::corrupted(format!(
                "unsupported flat file version {version}"
            )));
        }
        let count = u32::from_le_bytes([body[6], body[7], body[8], body[9]]);

        let mut pos = 10usize;
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let collection = read_string(body, &mut pos)?;
            let id = read_string(body, &mut pos)?;
            let value = read_field(body, &mut pos)?.to_vec();
            entries.insert(
                Self::flat_key(&collection, &id),
                FlatEntry {
                    collection,
                    id,
                    value,
                },
            );
        }

        Ok(entries)
    }

    /// Rewrites the whole file from the in-memory map.
    fn persist(&self, entries: &BTreeMap<String, FlatEntry>) -> BackendResult<()> {
        let mut body = Vec::new();
        body.extend_from_slice(&FLAT_MAGIC);
        body.extend_from_slice(&FLAT_VERSION.to_le_bytes());
        body.extend_from_slice(&(entries.len() as u32).to_le_bytes());

        for entry in entries.values() {
            write_field(&mut body, entry.collection.as_bytes());
            write_field(&mut body, entry.id.as_bytes());
            write_field(&mut body, &entry.value);
        }

        let crc = compute_crc32(&body);
        body.extend_from_slice(&crc.to_le_bytes());

        let tmp = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl StoreBackend for FlatBackend {
    fn put(&self, collection: &str, id: &str, bytes: &[u8]) -> BackendResult<()> {
        let mut entries = self.entries.write();
        entries.insert(
            Self::flat_key(collection, id),
            FlatEntry {
                collection: collection.to_string(),
                id: id.to_string(),
                value: bytes.to_vec(),
            },
        );
        self.persist(&entries)
    }

    fn get(&self, collection: &str, id: &str) -> BackendResult<Option<Vec<u8>>> {
        Ok(self
            .entries
            .read()
            .get(&Self::flat_key(collection, id))
            .map(|e| e.value.clone()))
    }

    fn get_all(&self, collection: &str) -> BackendResult<Vec<Vec<u8>>> {
        Ok(self
            .entries
            .read()
            .values()
            .filter(|e| e.collection == collection)
            .map(|e| e.value.clone())
            .collect())
    }

    fn delete(&self, collection: &str, id: &str) -> BackendResult<()> {
        let mut entries = self.entries.write();
        if entries.remove(&Self::flat_key(collection, id)).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }

    fn clear(&self, collection: &str) -> BackendResult<()> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.collection != collection);
        if entries.len() != before {
            self.persist(&entries)?;
        }
        Ok(())
    }

    fn collections(&self) -> BackendResult<Vec<String>> {
        let names: BTreeSet<String> = self
            .entries
            .read()
            .values()
            .map(|e| e.collection.clone())
            .collect();
        Ok(names.into_iter().collect())
    }

    fn stats(&self) -> BackendResult<BackendStats> {
        let entries = self.entries.read();
        let mut stats = BackendStats {
            item_count: entries.len() as u64,
            used_bytes: 0,
        };
        for (key, entry) in entries.iter() {
            stats.used_bytes += (key.len() + entry.value.len()) as u64;
        }
        Ok(stats)
    }
}

impl std::fmt::Debug for FlatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatBackend")
            .field("path", &self.path)
            .finish()
    }
}

fn write_field(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn read_field<'a>(buf: &'a [u8], pos: &mut usize) -> BackendResult<&'a [u8]> {
    if *pos + 4 > buf.len() {
        return Err(BackendError::corrupted("truncated entry length"));
    }
    let len = u32::from_le_bytes([buf[*pos], buf[*pos + 1], buf[*pos + 2], buf[*pos + 3]]) as usize;
    *pos += 4;
    if *pos + len > buf.len() {
        return Err(BackendError::corrupted("truncated entry data"));
    }
    let field = &buf[*pos..*pos + len];
    *pos += len;
    Ok(field)
}

fn read_string(buf: &[u8], pos: &mut usize) -> BackendResult<String> {
    let bytes = read_field(buf, pos)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| BackendError::corrupted("entry key is not valid UTF-8"))
}

/// Computes CRC32 (IEEE polynomial) over `data`.
fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    crc ^ 0xFFFF_FFFF
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_in(dir: &tempfile::TempDir) -> FlatBackend {
        FlatBackend::open(&dir.path().join("satchel.flat")).unwrap()
    }

    #[test]
    fn crc32_known_value() {
        // Known test vector: "123456789" should give 0xCBF43926
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = open_in(&dir);

        backend.put("tasks", "t1", b"envelope").unwrap();
        assert_eq!(backend.get("tasks", "t1").unwrap().unwrap(), b"envelope");
        assert_eq!(backend.get("tasks", "nope").unwrap(), None);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("satchel.flat");

        {
            let backend = FlatBackend::open(&path).unwrap();
            backend.put("u1_tasks", "t1", b"one").unwrap();
            backend.put("u1_moods", "m1", b"two").unwrap();
        }

        let backend = FlatBackend::open(&path).unwrap();
        assert_eq!(backend.get("u1_tasks", "t1").unwrap().unwrap(), b"one");
        assert_eq!(
            backend.collections().unwrap(),
            vec!["u1_moods".to_string(), "u1_tasks".to_string()]
        );
    }

    #[test]
    fn detects_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("satchel.flat");

        {
            let backend = FlatBackend::open(&path).unwrap();
            backend.put("tasks", "t1", b"data").unwrap();
        }

        let mut bytes = fs::read(&path).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let result = FlatBackend::open(&path);
        assert!(matches!(result, Err(BackendError::Corrupted { .. })));
    }

    #[test]
    fn collections_are_isolated_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let backend = open_in(&dir);

        backend.put("u1_tasks", "t1", b"alice").unwrap();
        backend.put("u2_tasks", "t1", b"bob").unwrap();

        assert_eq!(backend.get("u1_tasks", "t1").unwrap().unwrap(), b"alice");
        assert_eq!(backend.get_all("u2_tasks").unwrap(), vec![b"bob".to_vec()]);
    }

    #[test]
    fn clear_removes_only_target_collection() {
        let dir = tempfile::tempdir().unwrap();
        let backend = open_in(&dir);

        backend.put("tasks", "t1", b"x").unwrap();
        backend.put("moods", "m1", b"y").unwrap();
        backend.clear("tasks").unwrap();

        assert!(backend.get_all("tasks").unwrap().is_empty());
        assert_eq!(backend.get_all("moods").unwrap(), vec![b"y".to_vec()]);
    }

    #[test]
    fn stats_counts_keys_and_values() {
        let dir = tempfile::tempdir().unwrap();
        let backend = open_in(&dir);

        backend.put("tasks", "t1", b"12345").unwrap();

        let stats = backend.stats().unwrap();
        assert_eq!(stats.item_count, 1);
        // key "tasks_t1" (8) + value (5)
        assert_eq!(stats.used_bytes, 13);
    }
}

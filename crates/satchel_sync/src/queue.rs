//! Durable offline operation queue.

use crate::conflict::CONFLICTS_COLLECTION;
use crate::error::SyncResult;
use crate::remote::RemoteEndpoint;
use parking_lot::Mutex;
use satchel_codec::{now_millis, Record};
use satchel_store::RecordStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Internal collection the queue persists itself into.
pub const QUEUE_COLLECTION: &str = "_offline_queue";

/// The remote operation a queue entry defers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueAction {
    /// Create the record remotely.
    Create,
    /// Update the record remotely.
    Update,
    /// Delete the record remotely.
    Delete,
}

/// A deferred remote operation.
///
/// `data` carries the record payload; for [`QueueAction::Delete`] it must
/// at least carry the target record's `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Unique entry id.
    pub id: String,
    /// The deferred operation.
    pub action: QueueAction,
    /// Target collection.
    pub collection: String,
    /// Record payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Record>,
    /// When the entry was enqueued, epoch milliseconds.
    #[serde(rename = "enqueuedAt")]
    pub enqueued_at: i64,
    /// Monotonic sequence preserving FIFO order across restarts.
    pub seq: u64,
    /// Failed delivery attempts so far.
    #[serde(default)]
    pub attempts: u32,
}

/// A durable FIFO of remote operations deferred by failure.
///
/// Every mutation is persisted through the record store before it is
/// visible in memory, so the queue survives process restart. Draining
/// attempts entries in enqueue order; a failing entry is re-appended at
/// the tail (keeping encounter order among failures) and never blocks the
/// entries behind it. After `max_retries` failed attempts an entry is
/// dead-lettered into the `conflicts` collection and dropped.
pub struct OfflineQueue {
    store: Arc<RecordStore>,
    entries: Mutex<VecDeque<QueueEntry>>,
    next_seq: AtomicU64,
    max_retries: u32,
}

impl OfflineQueue {
    /// Loads the queue persisted in `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted entries cannot be read.
    pub fn load(store: Arc<RecordStore>, max_retries: u32) -> SyncResult<Self> {
        let mut entries: Vec<QueueEntry> = store.get_all_values(QUEUE_COLLECTION)?;
        entries.sort_by_key(|e| e.seq);
        let next_seq = entries.last().map_or(0, |e| e.seq + 1);

        debug!(pending = entries.len(), "offline queue loaded");
        Ok(Self {
            store,
            entries: Mutex::new(entries.into()),
            next_seq: AtomicU64::new(next_seq),
            max_retries,
        })
    }

    /// Number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Appends a deferred operation at the tail.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be persisted.
    pub fn enqueue(
        &self,
        action: QueueAction,
        collection: &str,
        data: Option<Record>,
    ) -> SyncResult<()> {
        let entry = QueueEntry {
            id: Uuid::new_v4().to_string(),
            action,
            collection: collection.to_string(),
            data,
            enqueued_at: now_millis(),
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            attempts: 0,
        };

        self.store.set_value(QUEUE_COLLECTION, &entry)?;
        self.entries.lock().push_back(entry);
        Ok(())
    }

    /// Attempts every pending entry against `remote`.
    ///
    /// Returns the number of entries still pending afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error only when the queue's own persistence fails;
    /// remote failures are absorbed into retry bookkeeping.
    pub fn drain(&self, remote: &dyn RemoteEndpoint) -> SyncResult<usize> {
        let mut queue = self.entries.lock();
        let pending: Vec<QueueEntry> = queue.drain(..).collect();
        let mut kept = VecDeque::new();

        for mut entry in pending {
            let attempt = match entry.action {
                QueueAction::Delete => match delete_target(&entry) {
                    Some(id) => remote.delete(&entry.collection, &id),
                    None => {
                        warn!(entry = %entry.id, "dropping delete entry with no target id");
                        self.store.delete(QUEUE_COLLECTION, &entry.id)?;
                        continue;
                    }
                },
                QueueAction::Create | QueueAction::Update => match &entry.data {
                    Some(data) => remote.upsert(&entry.collection, data),
                    None => {
                        warn!(entry = %entry.id, "dropping entry with no payload");
                        self.store.delete(QUEUE_COLLECTION, &entry.id)?;
                        continue;
                    }
                },
            };

            match attempt {
                Ok(()) => {
                    self.store.delete(QUEUE_COLLECTION, &entry.id)?;
                }
                Err(error) => {
                    entry.attempts += 1;
                    if entry.attempts >= self.max_retries {
                        warn!(
                            entry = %entry.id,
                            collection = %entry.collection,
                            attempts = entry.attempts,
                            %error,
                            "retries exhausted, dead-lettering entry"
                        );
                        self.dead_letter(&entry)?;
                        self.store.delete(QUEUE_COLLECTION, &entry.id)?;
                    } else {
                        debug!(entry = %entry.id, attempts = entry.attempts, %error, "keeping entry for retry");
                        self.store.set_value(QUEUE_COLLECTION, &entry)?;
                        kept.push_back(entry);
                    }
                }
            }
        }

        *queue = kept;
        Ok(queue.len())
    }

    /// Persists an exhausted entry into the conflicts collection for
    /// manual handling.
    fn dead_letter(&self, entry: &QueueEntry) -> SyncResult<()> {
        let mut record = Record::new();
        record.insert("id".into(), Value::from(entry.id.clone()));
        record.insert("resolved".into(), Value::from(false));
        record.insert("reason".into(), Value::from("retries_exhausted"));
        record.insert("collection".into(), Value::from(entry.collection.clone()));
        let action = match entry.action {
            QueueAction::Create => "create",
            QueueAction::Update => "update",
            QueueAction::Delete => "delete",
        };
        record.insert("action".into(), Value::from(action));
        if let Some(data) = &entry.data {
            record.insert("data".into(), Value::Object(data.clone()));
        }
        record.insert("createdAt".into(), Value::from(now_millis()));

        self.store.set(CONFLICTS_COLLECTION, &record)?;
        Ok(())
    }
}

impl std::fmt::Debug for OfflineQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineQueue")
            .field("pending", &self.len())
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

fn delete_target(entry: &QueueEntry) -> Option<String> {
    entry
        .data
        .as_ref()
        .and_then(|data| data.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

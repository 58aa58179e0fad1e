//! The sync engine: upload/download orchestration and status.

use crate::conflict::{
    detect_conflict, merge_records, Conflict, ConflictPolicy, ManualResolution,
    CONFLICTS_COLLECTION,
};
use crate::error::{SyncError, SyncResult};
use crate::queue::{OfflineQueue, QueueAction};
use crate::remote::RemoteEndpoint;
use parking_lot::{Mutex, RwLock};
use satchel_codec::{now_millis, Record};
use satchel_store::RecordStore;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Collections kept in sync with the remote endpoint.
    pub collections: Vec<String>,
    /// Auto-sync interval in minutes.
    pub sync_interval_minutes: u64,
    /// Whether auto-sync restarts after a forced cycle.
    pub auto_sync: bool,
    /// Process-wide conflict resolution policy.
    pub conflict_resolution: ConflictPolicy,
    /// Failed delivery attempts before a queue entry is dead-lettered.
    pub max_retries: u32,
}

impl SyncConfig {
    /// Creates a configuration for the given collections with defaults
    /// for everything else.
    pub fn new<I, S>(collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            collections: collections.into_iter().map(Into::into).collect(),
            sync_interval_minutes: 5,
            auto_sync: true,
            conflict_resolution: ConflictPolicy::default(),
            max_retries: 3,
        }
    }

    /// Sets the auto-sync interval in minutes.
    #[must_use]
    pub fn with_interval_minutes(mut self, minutes: u64) -> Self {
        self.sync_interval_minutes = minutes;
        self
    }

    /// Sets whether auto-sync is used.
    #[must_use]
    pub fn with_auto_sync(mut self, value: bool) -> Self {
        self.auto_sync = value;
        self
    }

    /// Sets the conflict resolution policy.
    #[must_use]
    pub fn with_conflict_resolution(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_resolution = policy;
        self
    }

    /// Sets the retry bound for offline-queue entries.
    #[must_use]
    pub fn with_max_retries(mut self, value: u32) -> Self {
        self.max_retries = value;
        self
    }
}

/// The synchronization subsystem's observable condition.
///
/// One instance per engine, mutated only by the engine, read by anyone
/// through [`SyncEngine::status`].
#[derive(Debug, Clone)]
pub struct SyncStatus {
    /// Whether the engine believes the network is reachable.
    pub is_online: bool,
    /// When the last sync cycle finished, epoch milliseconds.
    pub last_sync_at: Option<i64>,
    /// Offline-queue entries waiting for delivery.
    pub pending_changes: usize,
    /// Whether a sync cycle is currently running.
    pub sync_in_progress: bool,
    /// The last cycle's failure, if it had one. Cleared by the next
    /// successful cycle.
    pub last_error: Option<String>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            is_online: true,
            last_sync_at: None,
            pending_changes: 0,
            sync_in_progress: false,
            last_error: None,
        }
    }
}

/// Counters from one sync cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncReport {
    /// Records upserted to the remote.
    pub uploaded: usize,
    /// Remote records written locally.
    pub downloaded: usize,
    /// Conflicts detected during the download phase.
    pub conflicts_detected: usize,
    /// Failed uploads converted into offline-queue entries.
    pub queued: usize,
    /// Whether the cycle finished without recording an error.
    pub success: bool,
}

struct AutoSyncHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Orchestrates synchronization between a [`RecordStore`] and a
/// [`RemoteEndpoint`].
///
/// At most one sync cycle runs at a time, enforced by an atomic guard
/// flag rather than a lock: a re-entrant [`sync`](Self::sync) call
/// observes the flag and returns immediately. [`sync`](Self::sync) never
/// returns an error - every failure is either absorbed into the offline
/// queue or recorded in [`SyncStatus::last_error`].
pub struct SyncEngine<R: RemoteEndpoint> {
    store: Arc<RecordStore>,
    remote: Arc<R>,
    queue: OfflineQueue,
    config: SyncConfig,
    status: RwLock<SyncStatus>,
    in_flight: AtomicBool,
    auto_sync: Mutex<Option<AutoSyncHandle>>,
}

impl<R: RemoteEndpoint> SyncEngine<R> {
    /// Creates an engine, loading any offline-queue entries persisted by
    /// a previous run.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted queue cannot be read.
    pub fn new(store: Arc<RecordStore>, remote: Arc<R>, config: SyncConfig) -> SyncResult<Self> {
        let queue = OfflineQueue::load(Arc::clone(&store), config.max_retries)?;
        let status = SyncStatus {
            pending_changes: queue.len(),
            ..SyncStatus::default()
        };

        Ok(Self {
            store,
            remote,
            queue,
            config,
            status: RwLock::new(status),
            in_flight: AtomicBool::new(false),
            auto_sync: Mutex::new(None),
        })
    }

    /// Returns a snapshot of the sync status.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.status.read().clone()
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Runs one sync cycle: upload, drain the offline queue, download.
    ///
    /// A call while another cycle is in flight is a guarded no-op. Phase
    /// failures are isolated per record (upload) or per collection
    /// (download); whatever fails is logged, queued, or recorded in
    /// [`SyncStatus::last_error`], and the cycle continues.
    pub fn sync(&self) -> SyncReport {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("sync already in progress");
            return SyncReport::default();
        }

        {
            let mut status = self.status.write();
            status.sync_in_progress = true;
            status.last_error = None;
        }

        let mut report = SyncReport::default();
        let mut error: Option<String> = None;

        self.upload_phase(&mut report, &mut error);

        if let Err(e) = self.queue.drain(self.remote.as_ref()) {
            warn!(error = %e, "offline queue drain failed");
            error = Some(e.to_string());
        }

        self.download_phase(&mut report, &mut error);

        report.success = error.is_none();
        {
            let mut status = self.status.write();
            status.sync_in_progress = false;
            status.last_sync_at = Some(now_millis());
            status.pending_changes = self.queue.len();
            status.last_error = error;
        }
        self.in_flight.store(false, Ordering::SeqCst);

        info!(
            uploaded = report.uploaded,
            downloaded = report.downloaded,
            conflicts = report.conflicts_detected,
            queued = report.queued,
            success = report.success,
            "sync cycle finished"
        );
        report
    }

    /// Uploads every local record of every configured collection.
    fn upload_phase(&self, report: &mut SyncReport, error: &mut Option<String>) {
        for collection in &self.config.collections {
            let records = match self.store.get_all(collection) {
                Ok(records) => records,
                Err(e) => {
                    warn!(collection = %collection, error = %e, "upload read failed");
                    *error = Some(e.to_string());
                    continue;
                }
            };

            for record in records {
                match self.remote.upsert(collection, &record) {
                    Ok(()) => report.uploaded += 1,
                    Err(e) => {
                        debug!(collection = %collection, error = %e, "upsert failed, queueing");
                        match self
                            .queue
                            .enqueue(QueueAction::Update, collection, Some(record))
                        {
                            Ok(()) => report.queued += 1,
                            Err(qe) => {
                                warn!(collection = %collection, error = %qe, "enqueue failed");
                                *error = Some(qe.to_string());
                            }
                        }
                    }
                }
            }
        }
    }

    /// Downloads every configured collection and reconciles it locally.
    fn download_phase(&self, report: &mut SyncReport, error: &mut Option<String>) {
        for collection in &self.config.collections {
            let remote_records = match self.remote.fetch_all(collection) {
                Ok(records) => records,
                Err(e) => {
                    warn!(collection = %collection, error = %e, "download failed");
                    *error = Some(e.to_string());
                    continue;
                }
            };

            for remote_record in remote_records {
                if let Err(e) = self.apply_remote(collection, remote_record, report) {
                    warn!(collection = %collection, error = %e, "applying remote record failed");
                    *error = Some(e.to_string());
                }
            }
        }
    }

    /// Writes one remote record locally, running conflict detection when
    /// a local counterpart exists.
    fn apply_remote(
        &self,
        collection: &str,
        remote_record: Record,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let Some(id) = remote_record.get("id").and_then(Value::as_str) else {
            warn!(collection = %collection, "skipping remote record with no id");
            return Ok(());
        };
        let id = id.to_string();

        match self.store.get(collection, &id)? {
            None => {
                self.store.set(collection, &remote_record)?;
                report.downloaded += 1;
            }
            Some(local) => match detect_conflict(collection, &local, &remote_record) {
                None => {
                    self.store.set(collection, &remote_record)?;
                    report.downloaded += 1;
                }
                Some(conflict) => {
                    report.conflicts_detected += 1;
                    self.resolve(conflict)?;
                }
            },
        }
        Ok(())
    }

    /// Applies the configured policy to a detected conflict.
    fn resolve(&self, conflict: Conflict) -> SyncResult<()> {
        match self.config.conflict_resolution {
            ConflictPolicy::Local => {
                debug!(id = %conflict.id, "conflict resolved: keeping local");
            }
            ConflictPolicy::Remote => {
                self.store.set(&conflict.collection, &conflict.remote)?;
                debug!(id = %conflict.id, "conflict resolved: took remote");
            }
            ConflictPolicy::Timestamp => {
                // Ties (and anything within the window) never get here, so
                // strictly-newer remote is the only overwrite case.
                if conflict.remote_timestamp > conflict.local_timestamp {
                    self.store.set(&conflict.collection, &conflict.remote)?;
                    debug!(id = %conflict.id, "conflict resolved: remote is newer");
                } else {
                    debug!(id = %conflict.id, "conflict resolved: local is newer");
                }
            }
            ConflictPolicy::Manual => {
                self.persist_conflict(&conflict)?;
                info!(id = %conflict.id, collection = %conflict.collection, "conflict stored for manual resolution");
            }
        }
        Ok(())
    }

    /// Persists a conflict into the conflicts collection, unresolved.
    fn persist_conflict(&self, conflict: &Conflict) -> SyncResult<()> {
        let value = serde_json::to_value(conflict).map_err(satchel_codec::CodecError::from)
            .map_err(satchel_store::StoreError::from)?;
        let Value::Object(mut record) = value else {
            unreachable!("Conflict serializes to an object");
        };
        record.insert("resolved".into(), Value::from(false));
        record.insert("createdAt".into(), Value::from(now_millis()));

        self.store.set(CONFLICTS_COLLECTION, &record)?;
        Ok(())
    }

    /// Returns the unresolved conflicts awaiting manual resolution.
    ///
    /// # Errors
    ///
    /// Returns an error for store failures.
    pub fn conflicts(&self) -> SyncResult<Vec<Record>> {
        let records = self.store.get_all(CONFLICTS_COLLECTION)?;
        Ok(records
            .into_iter()
            .filter(|r| r.get("resolved") == Some(&Value::Bool(false)))
            .collect())
    }

    /// Resolves a manually persisted conflict.
    ///
    /// `Local` keeps the local record, `Remote` overwrites it with the
    /// remote version, `Merge` combines both (see
    /// [`merge_records`]). The conflict record is then marked resolved.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ConflictNotFound`] for an unknown id.
    pub fn resolve_conflict(&self, id: &str, resolution: ManualResolution) -> SyncResult<()> {
        let Some(mut record) = self.store.get(CONFLICTS_COLLECTION, id)? else {
            return Err(SyncError::ConflictNotFound { id: id.to_string() });
        };

        let conflict: Conflict = serde_json::from_value(Value::Object(record.clone()))
            .map_err(|e| SyncError::MalformedConflict {
                id: id.to_string(),
                message: e.to_string(),
            })?;

        match resolution {
            ManualResolution::Local => {}
            ManualResolution::Remote => {
                self.store.set(&conflict.collection, &conflict.remote)?;
            }
            ManualResolution::Merge => {
                let merged = merge_records(&conflict.local, &conflict.remote);
                self.store.set(&conflict.collection, &merged)?;
            }
        }

        record.insert("resolved".into(), Value::from(true));
        record.insert("resolvedAt".into(), Value::from(now_millis()));
        self.store.set(CONFLICTS_COLLECTION, &record)?;

        info!(id, ?resolution, "conflict manually resolved");
        Ok(())
    }

    /// Records a network transition.
    ///
    /// Going online immediately attempts to drain the offline queue
    /// rather than waiting for the next timer tick; going offline only
    /// flips the flag, leaving in-flight operations to fail naturally.
    pub fn set_online(&self, online: bool) {
        self.status.write().is_online = online;

        if online {
            info!("network is back, draining offline queue");
            match self.queue.drain(self.remote.as_ref()) {
                Ok(remaining) => {
                    self.status.write().pending_changes = remaining;
                }
                Err(e) => {
                    warn!(error = %e, "offline queue drain failed");
                    self.status.write().last_error = Some(e.to_string());
                }
            }
        }
    }
}

impl<R: RemoteEndpoint + 'static> SyncEngine<R> {
    /// Starts the auto-sync timer.
    ///
    /// Every `sync_interval_minutes` the timer runs [`sync`](Self::sync),
    /// but only while the status is online and no cycle is already in
    /// flight. Starting an already-running timer is a no-op. The timer
    /// thread holds a handle to the engine, so
    /// [`stop_auto_sync`](Self::stop_auto_sync) must be called before the
    /// engine can be dropped.
    pub fn start_auto_sync(self: &Arc<Self>) {
        let mut guard = self.auto_sync.lock();
        if guard.is_some() {
            return;
        }

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let engine = Arc::clone(self);
        let interval = Duration::from_secs(self.config.sync_interval_minutes.max(1) * 60);

        let thread = std::thread::spawn(move || loop {
            std::thread::park_timeout(interval);
            if stop_flag.load(Ordering::SeqCst) {
                return;
            }
            let status = engine.status();
            if status.is_online && !status.sync_in_progress {
                engine.sync();
            }
        });

        *guard = Some(AutoSyncHandle { stop, thread });
        debug!(interval_minutes = self.config.sync_interval_minutes, "auto-sync started");
    }

    /// Stops the auto-sync timer. Stopping a stopped timer is a no-op.
    pub fn stop_auto_sync(&self) {
        if let Some(handle) = self.auto_sync.lock().take() {
            handle.stop.store(true, Ordering::SeqCst);
            handle.thread.thread().unpark();
            let _ = handle.thread.join();
            debug!("auto-sync stopped");
        }
    }

    /// Runs a cycle outside the timer: stops auto-sync, syncs, and
    /// restarts the timer when the configuration asks for it.
    pub fn force_sync(self: &Arc<Self>) -> SyncReport {
        self.stop_auto_sync();
        let report = self.sync();
        if self.config.auto_sync {
            self.start_auto_sync();
        }
        report
    }
}

impl<R: RemoteEndpoint> std::fmt::Debug for SyncEngine<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("status", &*self.status.read())
            .field("queue", &self.queue)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockRemote;
    use satchel_backend::MemoryBackend;
    use satchel_store::{NoAuth, StoreConfig};
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().unwrap().clone()
    }

    fn setup(config: SyncConfig) -> (Arc<RecordStore>, Arc<MockRemote>, SyncEngine<MockRemote>) {
        let store = Arc::new(
            RecordStore::open(
                Arc::new(MemoryBackend::new()),
                Arc::new(NoAuth),
                StoreConfig::new("sync-passphrase").auto_cleanup(false),
            )
            .unwrap(),
        );
        let remote = Arc::new(MockRemote::new());
        let engine = SyncEngine::new(store.clone(), remote.clone(), config).unwrap();
        (store, remote, engine)
    }

    #[test]
    fn sync_uploads_local_records() {
        let (store, remote, engine) = setup(SyncConfig::new(["tasks"]));
        store
            .set("tasks", &record(json!({"id": "t1", "title": "up"})))
            .unwrap();

        let report = engine.sync();
        assert!(report.success);
        assert_eq!(report.uploaded, 1);
        assert_eq!(remote.records("tasks").len(), 1);
    }

    #[test]
    fn sync_downloads_missing_records() {
        let (store, remote, engine) = setup(SyncConfig::new(["tasks"]));
        remote.seed("tasks", record(json!({"id": "r1", "title": "down"})));

        let report = engine.sync();
        assert!(report.success);
        assert_eq!(report.downloaded, 1);
        assert!(store.get("tasks", "r1").unwrap().is_some());
    }

    #[test]
    fn back_to_back_sync_is_idempotent() {
        let (store, remote, engine) = setup(SyncConfig::new(["tasks"]));
        store
            .set(
                "tasks",
                &record(json!({"id": "t1", "title": "same", "timestamp": 1000})),
            )
            .unwrap();

        let first = engine.sync();
        assert!(first.success);
        assert_eq!(first.conflicts_detected, 0);

        let local_before = store.get_all("tasks").unwrap();
        let remote_before = remote.records("tasks");

        let second = engine.sync();
        assert!(second.success);
        assert_eq!(second.conflicts_detected, 0);
        assert_eq!(store.get_all("tasks").unwrap(), local_before);
        assert_eq!(remote.records("tasks"), remote_before);
    }

    #[test]
    fn failed_upload_is_queued_not_fatal() {
        let (store, remote, engine) = setup(SyncConfig::new(["tasks"]).with_max_retries(10));
        store
            .set("tasks", &record(json!({"id": "t1", "n": 1})))
            .unwrap();
        store
            .set("tasks", &record(json!({"id": "t2", "n": 2})))
            .unwrap();
        remote.fail_on("tasks", "t1");

        let report = engine.sync();
        assert_eq!(report.uploaded, 1);
        assert_eq!(report.queued, 1);
        // The queue retried t1 once during the drain phase; still pending.
        assert_eq!(engine.status().pending_changes, 1);
    }

    /// Seeds a diverged record pair: the local version cannot be
    /// uploaded (so it is queued instead of clobbering the remote), and
    /// the download phase then sees the seeded remote version.
    fn seed_divergence(
        store: &RecordStore,
        remote: &MockRemote,
        local: serde_json::Value,
        remote_version: serde_json::Value,
    ) {
        store.set("tasks", &record(local)).unwrap();
        remote.seed("tasks", record(remote_version));
        remote.fail_on("tasks", "t1");
    }

    #[test]
    fn timestamp_policy_takes_newer_remote() {
        let (store, remote, engine) = setup(
            SyncConfig::new(["tasks"]).with_conflict_resolution(ConflictPolicy::Timestamp),
        );
        seed_divergence(
            &store,
            &remote,
            json!({"id": "t1", "title": "old local", "timestamp": 100_000}),
            json!({"id": "t1", "title": "new remote", "timestamp": 200_000}),
        );

        let report = engine.sync();
        assert_eq!(report.conflicts_detected, 1);

        let resolved = store.get("tasks", "t1").unwrap().unwrap();
        assert_eq!(resolved.get("title"), Some(&json!("new remote")));
    }

    #[test]
    fn timestamp_policy_keeps_newer_local() {
        let (store, remote, engine) = setup(
            SyncConfig::new(["tasks"]).with_conflict_resolution(ConflictPolicy::Timestamp),
        );
        seed_divergence(
            &store,
            &remote,
            json!({"id": "t1", "title": "new local", "timestamp": 300_000}),
            json!({"id": "t1", "title": "old remote", "timestamp": 100_000}),
        );

        let report = engine.sync();
        assert_eq!(report.conflicts_detected, 1);

        let resolved = store.get("tasks", "t1").unwrap().unwrap();
        assert_eq!(resolved.get("title"), Some(&json!("new local")));
    }

    #[test]
    fn local_policy_never_overwrites() {
        let (store, remote, engine) =
            setup(SyncConfig::new(["tasks"]).with_conflict_resolution(ConflictPolicy::Local));
        seed_divergence(
            &store,
            &remote,
            json!({"id": "t1", "title": "mine", "timestamp": 100_000}),
            json!({"id": "t1", "title": "theirs", "timestamp": 200_000}),
        );

        let report = engine.sync();
        assert_eq!(report.conflicts_detected, 1);

        let kept = store.get("tasks", "t1").unwrap().unwrap();
        assert_eq!(kept.get("title"), Some(&json!("mine")));
    }

    #[test]
    fn remote_policy_always_overwrites() {
        let (store, remote, engine) =
            setup(SyncConfig::new(["tasks"]).with_conflict_resolution(ConflictPolicy::Remote));
        seed_divergence(
            &store,
            &remote,
            json!({"id": "t1", "title": "mine", "timestamp": 900_000}),
            json!({"id": "t1", "title": "theirs", "timestamp": 100_000}),
        );

        engine.sync();
        let kept = store.get("tasks", "t1").unwrap().unwrap();
        assert_eq!(kept.get("title"), Some(&json!("theirs")));
    }

    #[test]
    fn manual_policy_persists_conflict_without_destruction() {
        let (store, remote, engine) =
            setup(SyncConfig::new(["tasks"]).with_conflict_resolution(ConflictPolicy::Manual));
        seed_divergence(
            &store,
            &remote,
            json!({"id": "t1", "title": "mine", "timestamp": 100_000}),
            json!({"id": "t1", "title": "theirs", "timestamp": 300_000}),
        );

        engine.sync();

        // Local record untouched, conflict stored unresolved.
        let local = store.get("tasks", "t1").unwrap().unwrap();
        assert_eq!(local.get("title"), Some(&json!("mine")));

        let conflicts = engine.conflicts().unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].get("id"), Some(&json!("t1")));
    }

    #[test]
    fn manual_conflict_resolves_remote() {
        let (store, remote, engine) =
            setup(SyncConfig::new(["tasks"]).with_conflict_resolution(ConflictPolicy::Manual));
        seed_divergence(
            &store,
            &remote,
            json!({"id": "t1", "title": "mine", "timestamp": 100_000}),
            json!({"id": "t1", "title": "theirs", "timestamp": 300_000}),
        );
        engine.sync();

        engine.resolve_conflict("t1", ManualResolution::Remote).unwrap();

        let resolved = store.get("tasks", "t1").unwrap().unwrap();
        assert_eq!(resolved.get("title"), Some(&json!("theirs")));
        assert!(engine.conflicts().unwrap().is_empty());
    }

    #[test]
    fn manual_conflict_resolves_merge() {
        let (store, remote, engine) =
            setup(SyncConfig::new(["tasks"]).with_conflict_resolution(ConflictPolicy::Manual));
        seed_divergence(
            &store,
            &remote,
            json!({"id": "t1", "tags": ["home"], "timestamp": 100_000}),
            json!({"id": "t1", "tags": ["work"], "timestamp": 300_000}),
        );
        engine.sync();

        engine.resolve_conflict("t1", ManualResolution::Merge).unwrap();

        let merged = store.get("tasks", "t1").unwrap().unwrap();
        assert_eq!(merged.get("tags"), Some(&json!(["home", "work"])));
    }

    #[test]
    fn resolve_unknown_conflict_fails() {
        let (_, _, engine) = setup(SyncConfig::new(["tasks"]));
        let result = engine.resolve_conflict("ghost", ManualResolution::Local);
        assert!(matches!(result, Err(SyncError::ConflictNotFound { .. })));
    }

    #[test]
    fn reentrant_sync_is_a_no_op() {
        let (store, remote, engine) = setup(SyncConfig::new(["tasks"]));
        store
            .set("tasks", &record(json!({"id": "t1", "n": 1})))
            .unwrap();
        remote.set_latency(Duration::from_millis(150));

        let engine = Arc::new(engine);
        let background = {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || engine.sync())
        };

        // Give the background cycle time to claim the guard.
        std::thread::sleep(Duration::from_millis(50));
        let overlapping = engine.sync();
        assert_eq!(overlapping.uploaded, 0);
        assert_eq!(overlapping.downloaded, 0);

        let first = background.join().unwrap();
        assert!(first.success);

        // Exactly one pass touched the remote.
        assert_eq!(remote.upsert_calls(), 1);
        assert_eq!(remote.fetch_calls(), 1);
    }

    #[test]
    fn download_failure_lands_in_status() {
        let (_, remote, engine) = setup(SyncConfig::new(["tasks"]));
        remote.set_offline(true);

        let report = engine.sync();
        assert!(!report.success);

        let status = engine.status();
        assert!(status.last_error.is_some());
        assert!(!status.sync_in_progress);
    }

    #[test]
    fn successful_sync_clears_last_error() {
        let (_, remote, engine) = setup(SyncConfig::new(["tasks"]));
        remote.set_offline(true);
        engine.sync();
        assert!(engine.status().last_error.is_some());

        remote.set_offline(false);
        let report = engine.sync();
        assert!(report.success);
        assert!(engine.status().last_error.is_none());
    }

    #[test]
    fn going_online_drains_queue_immediately() {
        let (store, remote, engine) = setup(SyncConfig::new(["tasks"]).with_max_retries(10));
        store
            .set("tasks", &record(json!({"id": "t1", "n": 1})))
            .unwrap();

        remote.set_offline(true);
        engine.set_online(false);
        engine.sync();
        assert!(engine.status().pending_changes > 0);

        remote.set_offline(false);
        engine.set_online(true);
        assert_eq!(engine.status().pending_changes, 0);
        assert_eq!(remote.records("tasks").len(), 1);
    }

    #[test]
    fn going_offline_only_flips_the_flag() {
        let (_, _, engine) = setup(SyncConfig::new(["tasks"]));
        engine.set_online(false);

        let status = engine.status();
        assert!(!status.is_online);
        assert!(status.last_error.is_none());
    }

    #[test]
    fn auto_sync_start_stop_is_idempotent() {
        let (_, _, engine) = setup(SyncConfig::new(["tasks"]).with_interval_minutes(60));
        let engine = Arc::new(engine);

        engine.start_auto_sync();
        engine.start_auto_sync();
        engine.stop_auto_sync();
        engine.stop_auto_sync();
    }
}

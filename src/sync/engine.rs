//! Reconciliation engine.
//!
//! Moves data between the [`LocalStore`] and a [`SheetsRemote`]:
//!
//! - **drain**: replay the durable queue in order
//! - **push**: send every unsynced record that has no queue entry
//! - **pull**: replace local collections with non-empty remote snapshots
//! - **diff**: compare a collection with its sheet and apply the changes
//!
//! Every public pass runs under one in-flight flag. A pass started while
//! another is running returns [`SyncOutcome::AlreadyRunning`] without
//! touching the queue, so two drains never interleave.
//!
//! Conflicts resolve last-write-wins: whichever of push or pull runs last
//! overwrites the other side. There are no version vectors.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::error::{Error, RemoteError, Result};
use crate::model::{Collection, Record, RemoteId, strip_reserved};
use crate::storage::LocalStore;
use crate::sync::connectivity::Connectivity;
use crate::sync::diff::{fields_differ, find_changes};
use crate::sync::queue::SyncQueue;
use crate::sync::remote::SheetsRemote;
use crate::sync::types::{
    ChangeKind, QueueAction, QueueEntry, RenderReason, SyncDirection, SyncOutcome, SyncReport,
    SyncTrigger,
};

/// Pause between queued replays, to stay under the endpoint's rate limit.
pub const DEFAULT_REPLAY_DELAY: Duration = Duration::from_millis(300);

/// Callback fired after local changes and finished sync passes.
pub type RenderHook = Box<dyn Fn(RenderReason) + Send + Sync>;

/// Releases the in-flight flag on drop.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Releases a claimed record on drop.
struct RecordClaim<'a> {
    set: &'a Mutex<HashSet<(Collection, i64)>>,
    key: (Collection, i64),
}

impl Drop for RecordClaim<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.key);
        }
    }
}

/// Reconciles the local store with the remote spreadsheet.
pub struct SyncEngine<R> {
    store: LocalStore,
    queue: SyncQueue,
    remote: R,
    connectivity: Connectivity,
    syncing: AtomicBool,
    in_flight: Mutex<HashSet<(Collection, i64)>>,
    replay_delay: Duration,
    render: Option<RenderHook>,
}

impl<R: SheetsRemote> SyncEngine<R> {
    #[must_use]
    pub fn new(store: LocalStore, queue: SyncQueue, remote: R, connectivity: Connectivity) -> Self {
        Self {
            store,
            queue,
            remote,
            connectivity,
            syncing: AtomicBool::new(false),
            in_flight: Mutex::new(HashSet::new()),
            replay_delay: DEFAULT_REPLAY_DELAY,
            render: None,
        }
    }

    /// Set the pause between queued replays.
    #[must_use]
    pub const fn with_replay_delay(mut self, delay: Duration) -> Self {
        self.replay_delay = delay;
        self
    }

    /// Install the re-render hook.
    #[must_use]
    pub fn with_render_hook(mut self, hook: impl Fn(RenderReason) + Send + Sync + 'static) -> Self {
        self.render = Some(Box::new(hook));
        self
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub const fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    pub const fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Whether a sync pass is currently running.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Fire the re-render hook, if one is installed.
    pub fn notify(&self, reason: RenderReason) {
        if let Some(hook) = &self.render {
            hook(reason);
        }
    }

    fn begin_pass(&self) -> Option<PassGuard<'_>> {
        self.syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PassGuard(&self.syncing))
    }

    fn claim(&self, collection: Collection, local_id: i64) -> Option<RecordClaim<'_>> {
        let key = (collection, local_id);
        let mut set = self.in_flight.lock().ok()?;
        set.insert(key).then_some(RecordClaim {
            set: &self.in_flight,
            key,
        })
    }

    /// Whether a record is currently being sent.
    #[must_use]
    pub fn is_in_flight(&self, collection: Collection, local_id: i64) -> bool {
        self.in_flight
            .lock()
            .is_ok_and(|set| set.contains(&(collection, local_id)))
    }

    /// Run `body` as a guarded pass: skipped when another pass is running or
    /// the remote is offline, followed by a re-render when it ran.
    async fn run_pass<'a, F, Fut>(&'a self, trigger: SyncTrigger, body: F) -> Result<SyncReport>
    where
        F: FnOnce(SyncReport) -> Fut,
        Fut: std::future::Future<Output = Result<SyncReport>> + 'a,
    {
        let Some(_guard) = self.begin_pass() else {
            debug!(?trigger, "Sync already in flight, skipping");
            return Ok(SyncReport::new(SyncOutcome::AlreadyRunning, trigger));
        };

        if !self.connectivity.is_online() {
            debug!(?trigger, "Offline, skipping sync");
            return Ok(SyncReport::new(SyncOutcome::Offline, trigger));
        }

        let report = body(SyncReport::new(SyncOutcome::Completed, trigger)).await?;
        self.notify(RenderReason::Reconciled);
        Ok(report)
    }

    // ==================
    // Public passes
    // ==================

    /// Drain the queue, then push or pull.
    ///
    /// # Errors
    ///
    /// Returns an error only for local storage failures. Remote failures
    /// stay queued and appear in the report.
    pub async fn sync_now(
        &self,
        direction: SyncDirection,
        trigger: SyncTrigger,
    ) -> Result<SyncReport> {
        self.run_pass(trigger, |mut report| async move {
            info!(%direction, ?trigger, "Starting sync");
            self.drain_step(&mut report).await?;
            match direction {
                SyncDirection::Push => self.push_step(&mut report).await?,
                SyncDirection::Pull => self.pull_step(&mut report).await?,
            }
            info!(
                pushed = report.pushed(),
                pulled = report.pulled(),
                queued = self.queue.size(),
                "Sync finished"
            );
            Ok(report)
        })
        .await
    }

    /// Replay the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue or store cannot be written.
    pub async fn drain_queue(&self, trigger: SyncTrigger) -> Result<SyncReport> {
        self.run_pass(trigger, |mut report| async move {
            self.drain_step(&mut report).await?;
            Ok(report)
        })
        .await
    }

    /// Push every unsynced record not already queued or in flight.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue or store cannot be written.
    pub async fn sync_all_to_remote(&self, trigger: SyncTrigger) -> Result<SyncReport> {
        self.run_pass(trigger, |mut report| async move {
            self.push_step(&mut report).await?;
            Ok(report)
        })
        .await
    }

    /// Replace each local collection whose sheet is non-empty.
    ///
    /// Destructive: unsynced local records in a replaced collection are
    /// lost. An empty or unreadable sheet leaves its collection untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub async fn load_from_remote(&self, trigger: SyncTrigger) -> Result<SyncReport> {
        self.run_pass(trigger, |mut report| async move {
            self.pull_step(&mut report).await?;
            Ok(report)
        })
        .await
    }

    /// Diff one collection against its sheet and apply the changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue or store cannot be written.
    pub async fn sync_collection_diff(
        &self,
        collection: Collection,
        trigger: SyncTrigger,
    ) -> Result<SyncReport> {
        self.run_pass(trigger, |mut report| async move {
            self.diff_step(collection, &mut report).await?;
            Ok(report)
        })
        .await
    }

    // ==================
    // Steps
    // ==================

    async fn drain_step(&self, report: &mut SyncReport) -> Result<()> {
        let delay = self.replay_delay;
        let stats = self
            .queue
            .drain(|entry| async move {
                let result = self.replay(entry).await;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                result
            })
            .await?;

        for message in &stats.rejections {
            report.reject(message.clone());
        }
        report.drain = stats;
        Ok(())
    }

    async fn push_step(&self, report: &mut SyncReport) -> Result<()> {
        for collection in Collection::ALL {
            let sheet = collection.sheet();
            let mut failed = false;

            for record in self.store.unsynced(collection)? {
                if self.queue.has_pending(sheet, record.local_id) {
                    continue;
                }
                let Some(_claim) = self.claim(collection, record.local_id) else {
                    continue;
                };

                match self.send(&record).await {
                    Ok(remote_id) => {
                        let added = record.remote_id.is_none();
                        Self::absorb(self.confirm(collection, record.local_id, &remote_id, &record.payload(), added));
                        report.summary_mut(collection).pushed += 1;
                    }
                    Err(err) => {
                        failed = true;
                        warn!(%collection, local_id = record.local_id, error = %err, "Push failed, queued for retry");
                        if err.is_user_visible() {
                            report.reject(format!("{sheet} {}: {err}", record.local_id));
                        }
                        self.queue.enqueue(entry_for(&record))?;
                        report.summary_mut(collection).queued += 1;
                    }
                }
            }

            if !failed {
                self.store.record_push(collection)?;
            }
        }
        Ok(())
    }

    async fn pull_step(&self, report: &mut SyncReport) -> Result<()> {
        for collection in Collection::ALL {
            let rows = self.remote.get_all(collection.sheet()).await;
            if rows.is_empty() {
                debug!(%collection, "Remote sheet empty, keeping local collection");
                continue;
            }
            let pulled = self.store.replace_collection(collection, &rows)?;
            self.store.record_pull(collection)?;
            report.summary_mut(collection).pulled += pulled;
        }
        Ok(())
    }

    async fn diff_step(&self, collection: Collection, report: &mut SyncReport) -> Result<()> {
        let sheet = collection.sheet();
        let remote_rows = match self.remote.try_get_all(sheet).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(%collection, error = %err, "Could not fetch sheet for diff");
                if err.is_user_visible() {
                    report.reject(format!("{sheet} getAll: {err}"));
                }
                return Ok(());
            }
        };

        let local = self.store.all(collection)?;
        let changes = find_changes(&local, &remote_rows);
        info!(%collection, changes = changes.len(), "Computed diff");

        for change in changes {
            if let Some(local_id) = change.local_id {
                if self.queue.has_pending(sheet, local_id) {
                    continue;
                }
            }

            let result = match (change.kind, change.local_id, &change.remote_id) {
                (ChangeKind::Add, Some(local_id), None) => {
                    let Some(_claim) = self.claim(collection, local_id) else {
                        continue;
                    };
                    match self.remote.add(sheet, &change.data).await {
                        Ok(id) => {
                            Self::absorb(self.confirm(collection, local_id, &id, &change.data, true));
                            Ok(())
                        }
                        Err(e) => Err((e, QueueEntry::for_record(collection, local_id, QueueAction::Add, change.data))),
                    }
                }
                (ChangeKind::Add, Some(local_id), Some(gone)) => {
                    // Re-adding would assign a second remote id to the record.
                    warn!(%collection, local_id, remote_id = %gone, "Remote row missing for synced record, not re-adding");
                    continue;
                }
                (ChangeKind::Update, Some(local_id), Some(id)) => {
                    let Some(_claim) = self.claim(collection, local_id) else {
                        continue;
                    };
                    match self.remote.update(sheet, id, &change.data).await {
                        Ok(()) => {
                            Self::absorb(self.confirm(collection, local_id, id, &change.data, false));
                            Ok(())
                        }
                        Err(e) => Err((e, QueueEntry::for_record(collection, local_id, QueueAction::Update, with_id(change.data, id)))),
                    }
                }
                (ChangeKind::Delete, None, Some(id)) => match self.remote.delete(sheet, id).await {
                    Ok(()) => Ok(()),
                    Err(e) => Err((e, QueueEntry::remote_delete(sheet, id))),
                },
                _ => continue,
            };

            match result {
                Ok(()) => report.summary_mut(collection).pushed += 1,
                Err((err, entry)) => {
                    warn!(%collection, kind = ?change.kind, error = %err, "Diff change failed, queued for retry");
                    if err.is_user_visible() {
                        report.reject(format!("{sheet} {:?}: {err}", change.kind));
                    }
                    self.queue.enqueue(entry)?;
                    report.summary_mut(collection).queued += 1;
                }
            }
        }
        Ok(())
    }

    // ==================
    // Remote effects
    // ==================

    /// Send a record as an add (no remote id yet) or an update.
    async fn send(&self, record: &Record) -> std::result::Result<RemoteId, RemoteError> {
        let sheet = record.collection.sheet();
        let payload = record.payload();
        match &record.remote_id {
            Some(id) => {
                self.remote.update(sheet, id, &payload).await?;
                Ok(id.clone())
            }
            None => self.remote.add(sheet, &payload).await,
        }
    }

    /// Replay one queue entry.
    async fn replay(&self, entry: QueueEntry) -> std::result::Result<(), RemoteError> {
        let collection = entry.collection();
        let sheet = entry.sheet;
        let _claim = entry.local_id.and_then(|id| self.claim(collection, id));

        match entry.action {
            QueueAction::Add => {
                let id = self.remote.add(sheet, &entry.data).await?;
                if let Some(local_id) = entry.local_id {
                    Self::absorb(self.confirm(collection, local_id, &id, &entry.data, true));
                }
            }
            QueueAction::Update => {
                let id = entry.remote_id().or_else(|| {
                    let local_id = entry.local_id?;
                    self.store.get(collection, local_id).ok().flatten()?.remote_id
                });
                match (id, entry.local_id) {
                    (Some(id), local_id) => {
                        self.remote.update(sheet, &id, &entry.data).await?;
                        if let Some(local_id) = local_id {
                            Self::absorb(self.confirm(collection, local_id, &id, &entry.data, false));
                        }
                    }
                    (None, Some(local_id)) => {
                        if self.store.get(collection, local_id).ok().flatten().is_none() {
                            debug!(%collection, local_id, "Update for deleted, never-sent record dropped");
                            return Ok(());
                        }
                        // Never delivered: send the latest payload as an add.
                        let id = self.remote.add(sheet, &entry.data).await?;
                        Self::absorb(self.confirm(collection, local_id, &id, &entry.data, true));
                    }
                    (None, None) => {
                        warn!(%sheet, id = %entry.id, "Update without any id dropped");
                    }
                }
            }
            QueueAction::Delete => match entry.remote_id() {
                Some(id) => self.remote.delete(sheet, &id).await?,
                None => debug!(%sheet, id = %entry.id, "Delete without remote id dropped"),
            },
        }
        Ok(())
    }

    /// Record a confirmed remote write for a local record.
    ///
    /// Marks the record synced when its fields still match what was sent,
    /// otherwise only stores the remote id. If an added record was deleted
    /// while the write was in flight, queues a delete for the orphaned row.
    fn confirm(
        &self,
        collection: Collection,
        local_id: i64,
        remote_id: &RemoteId,
        sent: &Map<String, Value>,
        added: bool,
    ) -> Result<()> {
        let Some(current) = self.store.get(collection, local_id)? else {
            if !added {
                // The local delete queued its own remote delete.
                return Ok(());
            }
            info!(%collection, local_id, %remote_id, "Record deleted while in flight, queueing remote delete");
            self.queue.enqueue(QueueEntry::for_record(
                collection,
                local_id,
                QueueAction::Delete,
                with_id(Map::new(), remote_id),
            ))?;
            return Ok(());
        };

        // Queued payloads carry `id` and `createdAt`; stored fields never do.
        if fields_differ(&current.fields, &strip_reserved(sent.clone())) {
            debug!(%collection, local_id, "Record changed while in flight, keeping unsynced");
            self.store.set_remote_id(collection, local_id, remote_id)
        } else {
            self.store.mark_synced(collection, local_id, remote_id)
        }
    }

    /// Log a local failure that happened after a remote write landed.
    ///
    /// The remote effect is done, so the queue entry must not be retried.
    fn absorb(result: Result<()>) {
        if let Err(e) = result {
            match e {
                Error::RemoteIdReassigned { .. } | Error::NotFound { .. } => {
                    error!(error = %e, "Local record out of step with remote");
                }
                other => error!(error = %other, "Could not record remote confirmation"),
            }
        }
    }
}

/// Queue entry that re-sends a record's current state.
fn entry_for(record: &Record) -> QueueEntry {
    match &record.remote_id {
        Some(id) => QueueEntry::for_record(
            record.collection,
            record.local_id,
            QueueAction::Update,
            with_id(record.payload(), id),
        ),
        None => QueueEntry::for_record(
            record.collection,
            record.local_id,
            QueueAction::Add,
            record.payload(),
        ),
    }
}

fn with_id(mut data: Map<String, Value>, id: &RemoteId) -> Map<String, Value> {
    data.insert("id".to_string(), Value::String(id.to_string()));
    data
}

//! Durable queue of pending remote operations.
//!
//! The queue lives in one JSON file next to the database and is rewritten
//! atomically on every change, so a crash loses at most the effect of the
//! entry that was in flight (which is then replayed again).
//!
//! Several processes may share the file (`lt watch` next to one-off
//! commands). Every change takes `queue.json.lock`, re-reads the file,
//! applies itself and writes back, so no process overwrites another's
//! entries. Only one process drains at a time, guarded by
//! `queue.json.drain`, and the entry being replayed is marked `inFlight` on
//! disk.
//!
//! Enqueue coalesces operations on the same record:
//! - an update folds into a pending add/update of the same record
//! - a delete cancels pending adds/updates of the same record, and is itself
//!   dropped when the record never reached the remote
//!
//! The entry currently being replayed is never coalesced into.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, RemoteError, Result};
use crate::model::Sheet;
use crate::sync::file::{FileLock, atomic_write, read_optional, sidecar_path};
use crate::sync::types::{DrainStats, QueueAction, QueueEntry};

/// What [`SyncQueue::enqueue`] did with an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Appended at the back of the queue.
    Appended,
    /// Folded into an existing pending entry.
    Coalesced,
    /// Dropped: it cancelled out pending work and has no remote effect.
    Dropped,
}

/// Result of claiming one snapshot entry for replay.
enum Claim {
    /// Removed since the snapshot, by coalescing or another process.
    Gone,
    /// An earlier entry of the same sheet failed this pass.
    Deferred,
    Ready(QueueEntry),
}

/// Durable, ordered queue of remote operations.
#[derive(Debug)]
pub struct SyncQueue {
    path: PathBuf,
    lock_path: PathBuf,
    drain_path: PathBuf,
    /// Last state read from or written to disk.
    cache: Mutex<Vec<QueueEntry>>,
}

impl SyncQueue {
    /// Load the queue from `path`, starting empty if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueStorage`] if the file exists but cannot be read
    /// or parsed, or the lock file cannot be created.
    pub fn open(path: &Path) -> Result<Self> {
        let queue = Self {
            path: path.to_path_buf(),
            lock_path: sidecar_path(path, ".lock"),
            drain_path: sidecar_path(path, ".drain"),
            cache: Mutex::new(Vec::new()),
        };
        let entries = queue.commit(|entries| entries.len())?;
        debug!(path = %path.display(), entries, "Loaded sync queue");
        Ok(queue)
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<QueueEntry>>> {
        self.cache.lock().map_err(|_| Error::QueueStorage {
            path: self.path.clone(),
            message: "queue lock poisoned".to_string(),
        })
    }

    /// Read the file, filling in ids and keys missing from older layouts.
    /// The flag reports whether anything was filled in.
    fn load(&self) -> Result<(Vec<QueueEntry>, bool)> {
        let mut entries: Vec<QueueEntry> = match read_optional(&self.path) {
            Ok(None) => Vec::new(),
            Ok(Some(content)) if content.trim().is_empty() => Vec::new(),
            Ok(Some(content)) => {
                serde_json::from_str(&content).map_err(|e| storage_error(&self.path, &e))?
            }
            Err(e) => return Err(storage_error(&self.path, &e)),
        };

        let mut filled = false;
        for entry in &mut entries {
            if entry.id.is_empty() {
                entry.id = format!("local_{}", Uuid::new_v4());
                filled = true;
            }
            if entry.key.is_empty() {
                entry.key = new_key();
                filled = true;
            }
        }
        Ok((entries, filled))
    }

    fn persist(&self, entries: &[QueueEntry]) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        atomic_write(&self.path, &json).map_err(|e| storage_error(&self.path, &e))
    }

    /// Apply `mutate` to the entries on disk under the file lock, persisting
    /// when anything changed. A failed write leaves the file untouched.
    fn commit<R>(&self, mutate: impl FnOnce(&mut Vec<QueueEntry>) -> R) -> Result<R> {
        let mut cache = self.lock()?;
        let _file_lock =
            FileLock::acquire(&self.lock_path).map_err(|e| storage_error(&self.lock_path, &e))?;

        let (mut entries, filled) = self.load()?;
        let before = entries.clone();
        let result = mutate(&mut entries);
        if filled || entries != before {
            self.persist(&entries)?;
        }
        *cache = entries;
        Ok(result)
    }

    /// Current entries, re-read from disk. Falls back to the last known
    /// state when the file cannot be read.
    fn current(&self) -> Vec<QueueEntry> {
        match self.commit(|entries| entries.clone()) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Could not re-read sync queue, using last known state");
                self.lock().map(|cache| cache.clone()).unwrap_or_default()
            }
        }
    }

    /// Add an operation, coalescing with pending work on the same record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueStorage`] if the queue cannot be persisted; the
    /// queue is unchanged in that case.
    pub fn enqueue(&self, entry: QueueEntry) -> Result<Enqueued> {
        let sheet = entry.sheet;
        let action = entry.action;
        let outcome = self.commit(move |entries| coalesce(entries, entry))?;
        debug!(%sheet, %action, ?outcome, "Enqueued sync operation");
        Ok(outcome)
    }

    /// Replay the entries present when the drain starts, in order.
    ///
    /// A successful replay removes its entry and persists immediately. A
    /// failed one stays in place with `attempts` incremented, and every later
    /// entry of the same sheet is deferred to the next drain so per-sheet
    /// order holds. Entries enqueued during the drain wait for the next one.
    ///
    /// Returns empty stats without replaying anything while another handle
    /// or process is draining the same file. Neither lock is held while
    /// `replay` runs except the drain lock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueStorage`] if the queue cannot be persisted.
    pub async fn drain<F, Fut>(&self, mut replay: F) -> Result<DrainStats>
    where
        F: FnMut(QueueEntry) -> Fut,
        Fut: Future<Output = std::result::Result<(), RemoteError>>,
    {
        let Some(_drain_lock) = FileLock::try_acquire(&self.drain_path)
            .map_err(|e| storage_error(&self.drain_path, &e))?
        else {
            debug!(path = %self.path.display(), "Queue is being drained elsewhere, skipping");
            return Ok(DrainStats::default());
        };

        // Markers left by a drain that crashed mid-replay.
        let snapshot: Vec<String> = self.commit(|entries| {
            for entry in entries.iter_mut() {
                entry.in_flight = false;
            }
            entries.iter().map(|e| e.key.clone()).collect()
        })?;
        if snapshot.is_empty() {
            return Ok(DrainStats::default());
        }

        info!(entries = snapshot.len(), "Draining sync queue");
        let mut stats = DrainStats::default();
        let mut blocked: HashSet<Sheet> = HashSet::new();

        for key in snapshot {
            let claim = self.commit(|entries| {
                let Some(entry) = entries.iter_mut().find(|e| e.key == key) else {
                    return Claim::Gone;
                };
                if blocked.contains(&entry.sheet) {
                    return Claim::Deferred;
                }
                entry.in_flight = true;
                Claim::Ready(entry.clone())
            })?;
            let entry = match claim {
                Claim::Gone => continue,
                Claim::Deferred => {
                    stats.deferred += 1;
                    continue;
                }
                Claim::Ready(entry) => entry,
            };

            let sheet = entry.sheet;
            let action = entry.action;
            let id = entry.id.clone();
            let result = replay(entry).await;

            match result {
                Ok(()) => {
                    self.commit(|entries| entries.retain(|e| e.key != key))?;
                    stats.succeeded += 1;
                    debug!(%sheet, %action, id = %id, "Replayed queued operation");
                }
                Err(err) => {
                    let message = err.to_string();
                    self.commit(|entries| {
                        if let Some(entry) = entries.iter_mut().find(|e| e.key == key) {
                            entry.in_flight = false;
                            entry.attempts += 1;
                            entry.last_error = Some(message.clone());
                        }
                    })?;
                    warn!(%sheet, %action, id = %id, error = %err, "Queued operation failed, will retry");
                    if err.is_user_visible() {
                        stats.rejections.push(format!("{sheet} {action}: {message}"));
                    }
                    stats.failed += 1;
                    blocked.insert(sheet);
                }
            }
        }

        info!(
            succeeded = stats.succeeded,
            failed = stats.failed,
            deferred = stats.deferred,
            "Queue drain finished"
        );
        Ok(stats)
    }

    /// Number of pending entries.
    #[must_use]
    pub fn size(&self) -> usize {
        self.current().len()
    }

    /// Copy of the pending entries, in order.
    #[must_use]
    pub fn entries(&self) -> Vec<QueueEntry> {
        self.current()
    }

    /// Whether a record has a pending entry other than the one in flight.
    #[must_use]
    pub fn has_pending(&self, sheet: Sheet, local_id: i64) -> bool {
        self.current()
            .iter()
            .any(|e| e.is_for(sheet, local_id) && !e.in_flight)
    }

    /// Drop every pending entry. Returns how many were removed.
    ///
    /// An entry being replayed by a running drain is kept; its outcome is
    /// settled by that drain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueStorage`] if the empty queue cannot be persisted.
    pub fn clear(&self) -> Result<usize> {
        let idle = FileLock::try_acquire(&self.drain_path)
            .map_err(|e| storage_error(&self.drain_path, &e))?;
        let draining = idle.is_none();
        let removed = self.commit(|entries| {
            let before = entries.len();
            entries.retain(|e| draining && e.in_flight);
            before - entries.len()
        })?;
        info!(removed, "Cleared sync queue");
        Ok(removed)
    }
}

fn new_key() -> String {
    Uuid::new_v4().simple().to_string()
}

fn coalesce(entries: &mut Vec<QueueEntry>, mut entry: QueueEntry) -> Enqueued {
    let pending_for_record = |e: &QueueEntry, entry: &QueueEntry| {
        entry.local_id.is_some()
            && e.sheet == entry.sheet
            && e.local_id == entry.local_id
            && !e.in_flight
            && e.action != QueueAction::Delete
    };

    match entry.action {
        QueueAction::Update => {
            if let Some(pending) = entries.iter_mut().find(|e| pending_for_record(e, &entry)) {
                pending.data = entry.data;
                pending.timestamp = entry.timestamp;
                return Enqueued::Coalesced;
            }
        }
        QueueAction::Delete => {
            entries.retain(|e| !pending_for_record(e, &entry));
            if entry.remote_id().is_none() {
                // Nothing reached the remote under a known id. An add still
                // in flight is cleaned up once it lands.
                return Enqueued::Dropped;
            }
        }
        QueueAction::Add => {}
    }

    entry.key = new_key();
    entry.in_flight = false;
    entries.push(entry);
    Enqueued::Appended
}

fn storage_error(path: &Path, err: &dyn std::fmt::Display) -> Error {
    Error::QueueStorage {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

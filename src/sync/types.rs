//! Sync types shared by the queue, the engine and the CLI.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::model::{Collection, RemoteId, Sheet};

// ── Queue entries ─────────────────────────────────────────────

/// Remote operation recorded in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueAction {
    Add,
    Update,
    Delete,
}

impl QueueAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for QueueAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending remote operation.
///
/// Serialized as `{sheet, action, data, timestamp, id}` plus bookkeeping
/// fields that default when absent, so a queue file written without them
/// still loads. `data` is a copy of the payload taken at enqueue time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub sheet: Sheet,
    pub action: QueueAction,
    pub data: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    /// Dedupe id: `local_<collection>_<localId>` or `remote_<sheet>_<remoteId>`.
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<i64>,
    /// Failed replay attempts so far.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Unique handle for this entry, assigned when it is appended.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) key: String,
    /// Set while some process is replaying the entry.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) in_flight: bool,
}

impl QueueEntry {
    /// An operation on a local record.
    #[must_use]
    pub fn for_record(
        collection: Collection,
        local_id: i64,
        action: QueueAction,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            sheet: collection.sheet(),
            action,
            data,
            timestamp: Utc::now(),
            id: format!("local_{}_{local_id}", collection.name()),
            local_id: Some(local_id),
            attempts: 0,
            last_error: None,
            key: String::new(),
            in_flight: false,
        }
    }

    /// A delete of a remote row with no local counterpart.
    #[must_use]
    pub fn remote_delete(sheet: Sheet, remote_id: &RemoteId) -> Self {
        let mut data = Map::new();
        data.insert("id".to_string(), Value::String(remote_id.to_string()));
        Self {
            sheet,
            action: QueueAction::Delete,
            data,
            timestamp: Utc::now(),
            id: format!("remote_{sheet}_{remote_id}"),
            local_id: None,
            attempts: 0,
            last_error: None,
            key: String::new(),
            in_flight: false,
        }
    }

    #[must_use]
    pub const fn collection(&self) -> Collection {
        self.sheet.collection()
    }

    /// Remote id carried in the payload, if any.
    #[must_use]
    pub fn remote_id(&self) -> Option<RemoteId> {
        self.data.get("id").and_then(RemoteId::from_value)
    }

    /// Whether this entry targets the given local record.
    #[must_use]
    pub fn is_for(&self, sheet: Sheet, local_id: i64) -> bool {
        self.sheet == sheet && self.local_id == Some(local_id)
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// Result of one pass over the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainStats {
    /// Entries replayed and removed.
    pub succeeded: usize,
    /// Entries whose replay failed this pass.
    pub failed: usize,
    /// Entries skipped because an earlier entry of the same sheet failed.
    pub deferred: usize,
    /// Messages from entries the remote explicitly rejected.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejections: Vec<String>,
}

impl DrainStats {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.succeeded == 0 && self.failed == 0 && self.deferred == 0
    }
}

// ── Sync passes ───────────────────────────────────────────────

/// Which way a sync pass moves data after draining the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    /// Push unsynced local records.
    #[default]
    Push,
    /// Replace local collections from the remote.
    Pull,
}

impl SyncDirection {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.trim().to_lowercase().as_str() {
            "push" | "up" => Ok(Self::Push),
            "pull" | "down" => Ok(Self::Pull),
            other => Err(Error::InvalidArgument(format!(
                "Unknown sync direction: {other} (expected push or pull)"
            ))),
        }
    }
}

/// Who asked for a sync pass.
///
/// Rejections are surfaced only for manual passes; background passes retry
/// silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncTrigger {
    Manual,
    Background,
}

/// How a sync pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The pass ran.
    Completed,
    /// Another pass was in flight; nothing was done.
    AlreadyRunning,
    /// The remote was known to be offline; nothing was sent.
    Offline,
}

/// Per-collection counts from a sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSummary {
    pub collection: Collection,
    /// Records confirmed remotely in this pass.
    pub pushed: usize,
    /// Records written locally from the remote.
    pub pulled: usize,
    /// Operations left in (or added to) the queue.
    pub queued: usize,
}

impl CollectionSummary {
    #[must_use]
    pub const fn new(collection: Collection) -> Self {
        Self {
            collection,
            pushed: 0,
            pulled: 0,
            queued: 0,
        }
    }
}

/// What a sync pass did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    pub trigger: SyncTrigger,
    pub drain: DrainStats,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<CollectionSummary>,
    /// Rejections worth showing to the user (manual passes only).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejections: Vec<String>,
}

impl SyncReport {
    #[must_use]
    pub const fn new(outcome: SyncOutcome, trigger: SyncTrigger) -> Self {
        Self {
            outcome,
            trigger,
            drain: DrainStats {
                succeeded: 0,
                failed: 0,
                deferred: 0,
                rejections: Vec::new(),
            },
            collections: Vec::new(),
            rejections: Vec::new(),
        }
    }

    /// Whether the pass actually ran.
    #[must_use]
    pub fn ran(&self) -> bool {
        self.outcome == SyncOutcome::Completed
    }

    /// Total records confirmed remotely, including queue replays.
    #[must_use]
    pub fn pushed(&self) -> usize {
        self.drain.succeeded + self.collections.iter().map(|c| c.pushed).sum::<usize>()
    }

    /// Total records written locally from the remote.
    #[must_use]
    pub fn pulled(&self) -> usize {
        self.collections.iter().map(|c| c.pulled).sum()
    }

    /// Summary for a collection, created on first use.
    pub fn summary_mut(&mut self, collection: Collection) -> &mut CollectionSummary {
        let index = match self.collections.iter().position(|c| c.collection == collection) {
            Some(index) => index,
            None => {
                self.collections.push(CollectionSummary::new(collection));
                self.collections.len() - 1
            }
        };
        &mut self.collections[index]
    }

    /// Record a rejection, keeping it only for manually triggered passes.
    pub fn reject(&mut self, message: String) {
        if self.trigger == SyncTrigger::Manual {
            self.rejections.push(message);
        }
    }
}

/// Why the re-render hook fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderReason {
    /// A user mutation was written locally.
    LocalChange(Collection),
    /// A reconciliation pass finished.
    Reconciled,
}

// ── Diff ──────────────────────────────────────────────────────

/// Kind of change found by a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Update,
    Delete,
}

/// One change needed to make the remote match the local collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub kind: ChangeKind,
    /// Local record the change comes from (`None` for deletes).
    pub local_id: Option<i64>,
    /// Remote row it applies to (`None` for adds).
    pub remote_id: Option<RemoteId>,
    /// Payload to send (empty for deletes).
    pub data: Map<String, Value>,
}

// ── Status ────────────────────────────────────────────────────

/// Sync state of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStatus {
    pub collection: Collection,
    pub total: usize,
    pub unsynced: usize,
    pub queued: usize,
    pub last_push_at: Option<DateTime<Utc>>,
    pub last_pull_at: Option<DateTime<Utc>>,
}

/// Overall sync state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub online: bool,
    pub endpoint: Option<String>,
    pub queue_path: String,
    pub queue_size: usize,
    pub queue_bytes: u64,
    /// Queued entries that failed at least once.
    pub failing: usize,
    pub collections: Vec<CollectionStatus>,
}

impl SyncStatus {
    #[must_use]
    pub fn total_unsynced(&self) -> usize {
        self.collections.iter().map(|c| c.unsynced).sum()
    }

    #[must_use]
    pub fn total_records(&self) -> usize {
        self.collections.iter().map(|c| c.total).sum()
    }
}

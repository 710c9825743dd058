//! Remote synchronization.
//!
//! Local writes always land in SQLite first. This module carries them to the
//! spreadsheet endpoint and back:
//!
//! - **Queue**: durable JSON file of pending add/update/delete operations
//! - **Client**: HTTP adapter for the spreadsheet endpoint
//! - **Engine**: drain, push, pull and diff passes under one in-flight guard
//! - **Connectivity**: online flag and the monitor that syncs on reconnect
//! - **Status**: counts and queue depth for display
//!
//! # Queue File Format
//!
//! A JSON array, oldest first:
//! ```json
//! [{"sheet":"Mood","action":"add","data":{"date":"2024-01-01","mood":4},"timestamp":"2024-01-01T08:00:00.000Z","id":"local_moodEntries_1","localId":1}]
//! ```
//!
//! # Example
//!
//! ```ignore
//! use lt::sync::{Connectivity, SheetsClient, SyncEngine, SyncQueue, SyncDirection, SyncTrigger};
//!
//! let engine = SyncEngine::new(store, SyncQueue::open(&queue_path)?, client, Connectivity::new(true));
//! let report = engine.sync_now(SyncDirection::Push, SyncTrigger::Manual).await?;
//! ```

mod client;
mod connectivity;
mod diff;
mod engine;
#[cfg(test)]
pub(crate) mod fake;
mod file;
mod queue;
mod remote;
mod status;
mod types;

pub use client::{DEFAULT_TIMEOUT, SheetsClient};
pub use connectivity::{Connectivity, ConnectivityMonitor, DEFAULT_INTERVAL, Transition};
pub use diff::{IGNORED_FIELDS, fields_differ, find_changes};
pub use engine::{DEFAULT_REPLAY_DELAY, RenderHook, SyncEngine};
pub use file::{atomic_write, file_size, read_optional};
pub use queue::{Enqueued, SyncQueue};
pub use remote::{RemoteResult, SheetsRemote};
pub use status::{get_sync_status, print_status};
pub use types::{
    Change, ChangeKind, CollectionStatus, CollectionSummary, DrainStats, QueueAction, QueueEntry,
    RenderReason, SyncDirection, SyncOutcome, SyncReport, SyncStatus, SyncTrigger,
};

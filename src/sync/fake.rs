//! In-memory remote for engine tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Map, Value};
use tempfile::TempDir;

use crate::error::RemoteError;
use crate::model::{RemoteId, RemoteRecord, Sheet};
use crate::storage::LocalStore;
use crate::sync::connectivity::Connectivity;
use crate::sync::engine::SyncEngine;
use crate::sync::queue::SyncQueue;
use crate::sync::remote::{RemoteResult, SheetsRemote};
use crate::tracker::Tracker;

/// Spreadsheet held in memory. Ids are assigned "1", "2", ...
#[derive(Default)]
pub struct FakeSheets {
    rows: Mutex<HashMap<Sheet, Vec<RemoteRecord>>>,
    next_id: AtomicU64,
    offline: AtomicBool,
    reject: AtomicBool,
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl FakeSheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every mutating call, to hold a pass open.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Answer every call with a `success: false` envelope.
    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn rows(&self, sheet: Sheet) -> Vec<RemoteRecord> {
        self.rows.lock().unwrap().get(&sheet).cloned().unwrap_or_default()
    }

    /// Insert a row directly, as if another device had written it.
    pub fn seed(&self, sheet: Sheet, fields: Value) -> RemoteId {
        let id = self.assign_id();
        self.rows.lock().unwrap().entry(sheet).or_default().push(RemoteRecord {
            id: id.clone(),
            fields: fields.as_object().cloned().unwrap(),
            created_at: None,
        });
        id
    }

    /// Calls seen so far, as `"<action> <sheet>[ <id>]"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn assign_id(&self) -> RemoteId {
        RemoteId::new((self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string())
    }

    async fn enter(&self, call: String) -> RemoteResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unreachable("offline".to_string()));
        }
        self.calls.lock().unwrap().push(call);
        if self.reject.load(Ordering::SeqCst) {
            return Err(RemoteError::Rejected("Sheet not found".to_string()));
        }
        Ok(())
    }
}

impl SheetsRemote for FakeSheets {
    async fn ping(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }

    async fn try_get_all(&self, sheet: Sheet) -> RemoteResult<Vec<RemoteRecord>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unreachable("offline".to_string()));
        }
        self.calls.lock().unwrap().push(format!("getAll {sheet}"));
        Ok(self.rows(sheet))
    }

    async fn add(&self, sheet: Sheet, data: &Map<String, Value>) -> RemoteResult<RemoteId> {
        self.enter(format!("add {sheet}")).await?;
        let id = self.assign_id();
        self.rows.lock().unwrap().entry(sheet).or_default().push(RemoteRecord {
            id: id.clone(),
            fields: crate::model::strip_reserved(data.clone()),
            created_at: None,
        });
        Ok(id)
    }

    async fn update(&self, sheet: Sheet, id: &RemoteId, data: &Map<String, Value>) -> RemoteResult<()> {
        self.enter(format!("update {sheet} {id}")).await?;
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(&sheet)
            .and_then(|rows| rows.iter_mut().find(|r| &r.id == id))
            .ok_or_else(|| RemoteError::Rejected(format!("Row {id} not found")))?;
        row.fields = crate::model::strip_reserved(data.clone());
        Ok(())
    }

    async fn delete(&self, sheet: Sheet, id: &RemoteId) -> RemoteResult<()> {
        self.enter(format!("delete {sheet} {id}")).await?;
        if let Some(rows) = self.rows.lock().unwrap().get_mut(&sheet) {
            rows.retain(|r| &r.id != id);
        }
        Ok(())
    }
}

/// Engine over an in-memory store, a temp queue file and a fake remote.
pub struct Fixture {
    pub engine: SyncEngine<FakeSheets>,
    pub renders: Arc<AtomicUsize>,
    pub dir: TempDir,
}

impl Fixture {
    pub fn tracker(&self) -> Tracker<'_, FakeSheets> {
        Tracker::new(&self.engine)
    }

    /// Reopen the queue file, as a restarted process would.
    pub fn reopened_queue(&self) -> SyncQueue {
        SyncQueue::open(self.engine.queue().path()).unwrap()
    }
}

pub fn fixture(remote: FakeSheets, online: bool) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::open_memory().unwrap();
    let queue = SyncQueue::open(&dir.path().join("queue.json")).unwrap();
    let renders = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&renders);
    let engine = SyncEngine::new(store, queue, remote, Connectivity::new(online))
        .with_replay_delay(Duration::ZERO)
        .with_render_hook(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    Fixture { engine, renders, dir }
}

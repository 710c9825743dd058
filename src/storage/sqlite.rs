//! SQLite storage implementation.
//!
//! [`LocalStore`] is the always-available side of sync: every user mutation
//! lands here first, synchronously, before any remote call is attempted.
//! Writes go through [`LocalStore::write`] so each operation commits or
//! rolls back as a unit.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::model::{Collection, DEFAULT_HABITS, Record, RemoteId, RemoteRecord, strip_reserved};
use crate::storage::schema::apply_schema;

const COLUMNS: &str = "local_id, remote_id, synced, fields, created_at";

/// SQLite-backed local record store.
///
/// The connection sits behind a mutex so the store can be shared by
/// reference across the async sync tasks. No lock is held past the end of
/// a method call.
#[derive(Debug)]
pub struct LocalStore {
    conn: Mutex<Connection>,
}

/// Last push/pull times for a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStamp {
    pub last_push_at: Option<DateTime<Utc>>,
    pub last_pull_at: Option<DateTime<Utc>>,
}

impl LocalStore {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(timeout_ms.unwrap_or(5000)))?;
        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Other("local store lock poisoned".to_string()))
    }

    /// Run a write inside an IMMEDIATE transaction.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or a database error if the transaction
    /// cannot begin or commit. Nothing is written on error.
    pub fn write<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction) -> Result<R>,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    // ==================
    // Record Operations
    // ==================

    /// Create a record. Returns its new local id.
    ///
    /// The record starts unsynced with no remote id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidField`] if the fields don't match the
    /// collection schema.
    pub fn create(&self, collection: Collection, fields: Map<String, Value>) -> Result<i64> {
        let fields = strip_reserved(fields);
        collection.validate(&fields)?;

        let now = Utc::now().timestamp_millis();
        let local_id = self.write(|tx| {
            tx.execute(
                &format!(
                    "INSERT INTO {} (remote_id, synced, date, habit_id, fields, created_at)
                     VALUES (NULL, 0, ?1, ?2, ?3, ?4)",
                    collection.table()
                ),
                params![
                    date_column(&fields),
                    habit_column(&fields),
                    serde_json::to_string(&fields)?,
                    now
                ],
            )?;
            Ok(tx.last_insert_rowid())
        })?;

        tracing::debug!(%collection, local_id, "Created record");
        Ok(local_id)
    }

    /// Get a record by local id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, collection: Collection, local_id: i64) -> Result<Option<Record>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM {} WHERE local_id = ?1", collection.table()),
                [local_id],
                |row| map_record_row(collection, row),
            )
            .optional()?;
        Ok(record)
    }

    /// Get a record by local id, failing if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if there is no such record.
    pub fn require(&self, collection: Collection, local_id: i64) -> Result<Record> {
        self.get(collection, local_id)?
            .ok_or_else(|| not_found(collection, local_id))
    }

    /// Merge `patch` into a record's fields.
    ///
    /// Marks the record unsynced and refreshes `createdAt`. Keys set to
    /// `null` in the patch are stored as `null`, not removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the record is absent, or
    /// [`Error::InvalidField`] if the merged fields fail validation.
    pub fn update(
        &self,
        collection: Collection,
        local_id: i64,
        patch: Map<String, Value>,
    ) -> Result<Record> {
        let mut record = self.require(collection, local_id)?;
        record.fields.extend(strip_reserved(patch));
        collection.validate(&record.fields)?;

        let now = Utc::now();
        self.write(|tx| {
            tx.execute(
                &format!(
                    "UPDATE {} SET fields = ?1, date = ?2, habit_id = ?3, synced = 0, created_at = ?4
                     WHERE local_id = ?5",
                    collection.table()
                ),
                params![
                    serde_json::to_string(&record.fields)?,
                    date_column(&record.fields),
                    habit_column(&record.fields),
                    now.timestamp_millis(),
                    local_id
                ],
            )?;
            Ok(())
        })?;

        record.synced = false;
        record.created_at = now;
        tracing::debug!(%collection, local_id, "Updated record");
        Ok(record)
    }

    /// Delete a record. Returns the removed record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the record is absent.
    pub fn delete(&self, collection: Collection, local_id: i64) -> Result<Record> {
        let record = self.require(collection, local_id)?;
        self.write(|tx| {
            tx.execute(
                &format!("DELETE FROM {} WHERE local_id = ?1", collection.table()),
                [local_id],
            )?;
            Ok(())
        })?;
        tracing::debug!(%collection, local_id, "Deleted record");
        Ok(record)
    }

    /// Query records matching `predicate`.
    ///
    /// The collection is read once when this is called; the predicate runs
    /// lazily as the returned iterator is consumed. Later writes are not
    /// visible through an iterator already handed out.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot query fails.
    pub fn query<P>(
        &self,
        collection: Collection,
        predicate: P,
    ) -> Result<impl Iterator<Item = Record> + use<P>>
    where
        P: FnMut(&Record) -> bool,
    {
        Ok(self.all(collection)?.into_iter().filter(predicate))
    }

    /// All records in a collection, ordered by local id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn all(&self, collection: Collection) -> Result<Vec<Record>> {
        self.select(collection, "1 = 1 ORDER BY local_id", [])
    }

    /// Records whose local state hasn't been confirmed remotely.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn unsynced(&self, collection: Collection) -> Result<Vec<Record>> {
        self.select(collection, "synced = 0 ORDER BY local_id", [])
    }

    /// First record in a daily collection for the given ISO date.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_by_date(&self, collection: Collection, date: &str) -> Result<Option<Record>> {
        Ok(self
            .select(collection, "date = ?1 ORDER BY local_id LIMIT 1", [date])?
            .into_iter()
            .next())
    }

    /// The completion for a habit on a given date, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_completion(&self, habit_id: i64, date: &str) -> Result<Option<Record>> {
        Ok(self
            .select(
                Collection::HygieneCompletions,
                "habit_id = ?1 AND date = ?2 ORDER BY local_id LIMIT 1",
                params![habit_id, date],
            )?
            .into_iter()
            .next())
    }

    /// Every completion recorded for a habit.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn completions_for_habit(&self, habit_id: i64) -> Result<Vec<Record>> {
        self.select(
            Collection::HygieneCompletions,
            "habit_id = ?1 ORDER BY local_id",
            [habit_id],
        )
    }

    fn select<P: rusqlite::Params>(
        &self,
        collection: Collection,
        clause: &str,
        params: P,
    ) -> Result<Vec<Record>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM {} WHERE {clause}",
            collection.table()
        ))?;
        let records = stmt
            .query_map(params, |row| map_record_row(collection, row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    // ==================
    // Remote Confirmation
    // ==================

    /// Record a confirmed remote write: store the remote id and mark synced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the record is gone, or
    /// [`Error::RemoteIdReassigned`] if it already has a different remote id.
    pub fn mark_synced(
        &self,
        collection: Collection,
        local_id: i64,
        remote_id: &RemoteId,
    ) -> Result<()> {
        self.confirm_remote(collection, local_id, remote_id, true)
    }

    /// Store a remote id without marking the record synced.
    ///
    /// Used when an add landed but the record changed locally while the
    /// request was in flight.
    ///
    /// # Errors
    ///
    /// Same as [`LocalStore::mark_synced`].
    pub fn set_remote_id(
        &self,
        collection: Collection,
        local_id: i64,
        remote_id: &RemoteId,
    ) -> Result<()> {
        self.confirm_remote(collection, local_id, remote_id, false)
    }

    fn confirm_remote(
        &self,
        collection: Collection,
        local_id: i64,
        remote_id: &RemoteId,
        synced: bool,
    ) -> Result<()> {
        self.write(|tx| {
            let existing: Option<Option<String>> = tx
                .query_row(
                    &format!("SELECT remote_id FROM {} WHERE local_id = ?1", collection.table()),
                    [local_id],
                    |row| row.get(0),
                )
                .optional()?;

            match existing {
                None => return Err(not_found(collection, local_id)),
                Some(Some(current)) if current != remote_id.as_str() => {
                    return Err(Error::RemoteIdReassigned {
                        collection: collection.name().to_string(),
                        local_id,
                        existing: current,
                        attempted: remote_id.to_string(),
                    });
                }
                Some(_) => {}
            }

            tx.execute(
                &format!(
                    "UPDATE {} SET remote_id = ?1, synced = ?2 WHERE local_id = ?3",
                    collection.table()
                ),
                params![remote_id.as_str(), synced, local_id],
            )?;
            Ok(())
        })
    }

    /// Insert a row fetched from the remote. Returns its new local id.
    ///
    /// Remote rows are stored as-is (synced, no schema check): the
    /// spreadsheet is the authority for what it holds.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_from_remote(&self, collection: Collection, remote: &RemoteRecord) -> Result<i64> {
        self.write(|tx| insert_remote_row(tx, collection, remote))
    }

    /// Replace a whole collection with a remote snapshot.
    ///
    /// Afterwards the collection holds exactly the snapshot rows, all
    /// synced. Local-only and unsynced records are discarded. A record whose
    /// remote id appears in the snapshot keeps its local id, so references
    /// to it (a completion's `habitId`) stay valid. Runs in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails; the collection is left as it
    /// was.
    pub fn replace_collection(
        &self,
        collection: Collection,
        snapshot: &[RemoteRecord],
    ) -> Result<usize> {
        let table = collection.table();
        let (kept, discarded) = self.write(|tx| {
            let mut existing: HashMap<String, i64> = tx
                .prepare(&format!(
                    "SELECT remote_id, local_id FROM {table} WHERE remote_id IS NOT NULL"
                ))?
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<_, _>>()?;
            let incoming: HashSet<&str> = snapshot.iter().map(|r| r.id.as_str()).collect();

            let mut discarded = 0;
            let stale: Vec<i64> = tx
                .prepare(&format!("SELECT local_id, remote_id FROM {table}"))?
                .query_map([], |row| {
                    let local_id: i64 = row.get(0)?;
                    let remote_id: Option<String> = row.get(1)?;
                    Ok((local_id, remote_id))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?
                .into_iter()
                .filter(|(_, remote_id)| {
                    remote_id
                        .as_deref()
                        .is_none_or(|id| !incoming.contains(id))
                })
                .map(|(local_id, _)| local_id)
                .collect();
            for local_id in stale {
                discarded += tx.execute(&format!("DELETE FROM {table} WHERE local_id = ?1"), [local_id])?;
            }

            let mut kept = 0;
            for remote in snapshot {
                match existing.remove(remote.id.as_str()) {
                    Some(local_id) => {
                        overwrite_from_remote(tx, collection, local_id, remote)?;
                        kept += 1;
                    }
                    None => {
                        insert_remote_row(tx, collection, remote)?;
                    }
                }
            }
            Ok((kept, discarded))
        })?;

        tracing::info!(
            %collection,
            discarded,
            kept,
            total = snapshot.len(),
            "Replaced local collection from remote snapshot"
        );
        Ok(snapshot.len())
    }

    // ==================
    // Counts & Maintenance
    // ==================

    /// Number of records in a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self, collection: Collection) -> Result<usize> {
        self.count_where(collection, "1 = 1")
    }

    /// Number of unsynced records in a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_unsynced(&self, collection: Collection) -> Result<usize> {
        self.count_where(collection, "synced = 0")
    }

    fn count_where(&self, collection: Collection, clause: &str) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE {clause}", collection.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Delete every record in every collection. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if any delete fails; nothing is removed in that case.
    pub fn clear_all(&self) -> Result<usize> {
        self.write(|tx| {
            let mut removed = 0;
            for collection in Collection::ALL {
                removed += tx.execute(&format!("DELETE FROM {}", collection.table()), [])?;
            }
            tx.execute("DELETE FROM sync_state", [])?;
            Ok(removed)
        })
    }

    /// Create the default habit set if no habits exist yet.
    ///
    /// Returns the local ids of the habits created (empty when habits were
    /// already present).
    ///
    /// # Errors
    ///
    /// Returns an error if a habit cannot be created.
    pub fn seed_default_habits(&self) -> Result<Vec<i64>> {
        if self.count(Collection::HygieneHabits)? > 0 {
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(DEFAULT_HABITS.len());
        for (order, (name, description)) in (1_i64..).zip(DEFAULT_HABITS) {
            let mut fields = Map::new();
            fields.insert("name".to_string(), Value::from(name));
            fields.insert("description".to_string(), Value::from(description));
            fields.insert("order".to_string(), Value::from(order));
            ids.push(self.create(Collection::HygieneHabits, fields)?);
        }

        tracing::info!(count = ids.len(), "Seeded default habits");
        Ok(ids)
    }

    // ==================
    // Sync State
    // ==================

    /// Record a completed push for a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn record_push(&self, collection: Collection) -> Result<()> {
        self.stamp(collection, "last_push_at")
    }

    /// Record a completed pull for a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn record_pull(&self, collection: Collection) -> Result<()> {
        self.stamp(collection, "last_pull_at")
    }

    fn stamp(&self, collection: Collection, column: &str) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        self.write(|tx| {
            tx.execute(
                &format!(
                    "INSERT INTO sync_state (collection, {column}) VALUES (?1, ?2)
                     ON CONFLICT(collection) DO UPDATE SET {column} = excluded.{column}"
                ),
                params![collection.name(), now],
            )?;
            Ok(())
        })
    }

    /// Last push/pull times for a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn sync_stamp(&self, collection: Collection) -> Result<SyncStamp> {
        let conn = self.conn()?;
        let stamp = conn
            .query_row(
                "SELECT last_push_at, last_pull_at FROM sync_state WHERE collection = ?1",
                [collection.name()],
                |row| {
                    let push: Option<i64> = row.get(0)?;
                    let pull: Option<i64> = row.get(1)?;
                    Ok(SyncStamp {
                        last_push_at: push.and_then(DateTime::from_timestamp_millis),
                        last_pull_at: pull.and_then(DateTime::from_timestamp_millis),
                    })
                },
            )
            .optional()?;
        Ok(stamp.unwrap_or_default())
    }
}

fn not_found(collection: Collection, local_id: i64) -> Error {
    Error::NotFound {
        collection: collection.name().to_string(),
        local_id,
    }
}

fn date_column(fields: &Map<String, Value>) -> Option<&str> {
    fields.get("date").and_then(Value::as_str)
}

fn habit_column(fields: &Map<String, Value>) -> Option<i64> {
    fields.get("habitId").and_then(Value::as_i64)
}

fn insert_remote_row(tx: &Transaction, collection: Collection, remote: &RemoteRecord) -> Result<i64> {
    let created_at = remote.created_at.unwrap_or_else(Utc::now);
    tx.execute(
        &format!(
            "INSERT INTO {} (remote_id, synced, date, habit_id, fields, created_at)
             VALUES (?1, 1, ?2, ?3, ?4, ?5)",
            collection.table()
        ),
        params![
            remote.id.as_str(),
            date_column(&remote.fields),
            habit_column(&remote.fields),
            serde_json::to_string(&remote.fields)?,
            created_at.timestamp_millis()
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

fn overwrite_from_remote(
    tx: &Transaction,
    collection: Collection,
    local_id: i64,
    remote: &RemoteRecord,
) -> Result<()> {
    let created_at = remote.created_at.unwrap_or_else(Utc::now);
    tx.execute(
        &format!(
            "UPDATE {} SET remote_id = ?1, synced = 1, date = ?2, habit_id = ?3, fields = ?4, created_at = ?5
             WHERE local_id = ?6",
            collection.table()
        ),
        params![
            remote.id.as_str(),
            date_column(&remote.fields),
            habit_column(&remote.fields),
            serde_json::to_string(&remote.fields)?,
            created_at.timestamp_millis(),
            local_id
        ],
    )?;
    Ok(())
}

fn map_record_row(collection: Collection, row: &rusqlite::Row) -> rusqlite::Result<Record> {
    let remote_id: Option<String> = row.get(1)?;
    let fields_json: String = row.get(3)?;
    let fields: Map<String, Value> = serde_json::from_str(&fields_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    let created_at: i64 = row.get(4)?;

    Ok(Record {
        local_id: row.get(0)?,
        collection,
        remote_id: remote_id.map(RemoteId::new),
        synced: row.get(2)?,
        fields,
        created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_default(),
    })
}

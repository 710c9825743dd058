//! User-facing tracker operations.
//!
//! Every mutation runs in two phases. Phase one writes the local store and
//! records a queue entry; it never touches the network, so it succeeds
//! offline. Phase two asks the engine to drain the queue if the remote is
//! believed reachable. A failed delivery leaves the entry queued for the
//! next pass.

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::error::Result;
use crate::model::{
    Collection, DopamineEntry, DopamineStatus, Entry, HygieneCompletion, HygieneHabit, MoodEntry,
    Record, RemoteId,
};
use crate::sync::{
    Enqueued, QueueAction, QueueEntry, RenderReason, SheetsRemote, SyncEngine, SyncTrigger,
};

/// Result of deleting a habit together with its completions.
#[derive(Debug, Clone)]
pub struct HabitRemoval {
    pub habit: Record,
    pub completions: usize,
}

/// Application session over a [`SyncEngine`].
pub struct Tracker<'a, R> {
    engine: &'a SyncEngine<R>,
}

impl<'a, R: SheetsRemote> Tracker<'a, R> {
    #[must_use]
    pub const fn new(engine: &'a SyncEngine<R>) -> Self {
        Self { engine }
    }

    #[must_use]
    pub const fn engine(&self) -> &'a SyncEngine<R> {
        self.engine
    }

    // ==================
    // Daily logs
    // ==================

    /// Log the day's mood, replacing any entry already on that date.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidField`](crate::error::Error::InvalidField) for
    /// a bad date or a rating outside 1-5, or a storage error.
    pub async fn log_mood(
        &self,
        date: &str,
        mood: i64,
        energy: i64,
        numb: i64,
        notes: Option<&str>,
    ) -> Result<Record> {
        let entry = MoodEntry {
            date: date.to_string(),
            mood,
            energy,
            numb,
            notes: notes.unwrap_or_default().to_string(),
        };
        entry.check()?;
        self.upsert_daily(entry).await
    }

    /// Log the day's dopamine status, replacing any entry already on that date.
    ///
    /// # Errors
    ///
    /// Returns an error for a bad date or a storage failure.
    pub async fn log_dopamine(
        &self,
        date: &str,
        status: DopamineStatus,
        notes: Option<&str>,
    ) -> Result<Record> {
        let entry = DopamineEntry {
            date: date.to_string(),
            status,
            notes: notes.unwrap_or_default().to_string(),
        };
        entry.check()?;
        self.upsert_daily(entry).await
    }

    async fn upsert_daily<E: Entry>(&self, entry: E) -> Result<Record> {
        let collection = E::COLLECTION;
        let fields = entry.into_fields()?;
        let date = fields
            .get("date")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match self.engine.store().find_by_date(collection, &date)? {
            Some(existing) => self.update_record(collection, existing.local_id, fields).await,
            None => self.create(collection, fields).await,
        }
    }

    // ==================
    // Habits
    // ==================

    /// Add a habit at the end of the list.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty name or a storage failure.
    pub async fn add_habit(&self, name: &str, description: Option<&str>) -> Result<Record> {
        let order = i64::try_from(self.engine.store().count(Collection::HygieneHabits)?)
            .unwrap_or(i64::MAX - 1)
            + 1;
        let habit = HygieneHabit {
            name: name.trim().to_string(),
            description: description.unwrap_or_default().to_string(),
            order,
        };
        habit.check()?;
        self.create(Collection::HygieneHabits, habit.into_fields()?).await
    }

    /// Seed the default habits on an empty habit list. Returns how many were
    /// created.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or queue cannot be written.
    pub async fn seed_default_habits(&self) -> Result<usize> {
        let ids = self.engine.store().seed_default_habits()?;
        for &local_id in &ids {
            let record = self.engine.store().require(Collection::HygieneHabits, local_id)?;
            self.engine.queue().enqueue(QueueEntry::for_record(
                Collection::HygieneHabits,
                local_id,
                QueueAction::Add,
                record.payload(),
            ))?;
        }
        if !ids.is_empty() {
            self.finish(Collection::HygieneHabits).await?;
        }
        Ok(ids.len())
    }

    /// Flip a habit's completion for a day. The first toggle marks it done.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`](crate::error::Error::NotFound) if the habit
    /// does not exist, or a validation or storage error.
    pub async fn toggle_completion(&self, habit_id: i64, date: &str) -> Result<Record> {
        self.engine.store().require(Collection::HygieneHabits, habit_id)?;

        match self.engine.store().find_completion(habit_id, date)? {
            Some(existing) => {
                let done = existing
                    .fields
                    .get("completed")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let mut patch = Map::new();
                patch.insert("completed".to_string(), Value::Bool(!done));
                self.update_record(Collection::HygieneCompletions, existing.local_id, patch)
                    .await
            }
            None => {
                let completion = HygieneCompletion {
                    habit_id,
                    date: date.to_string(),
                    completed: true,
                };
                completion.check()?;
                self.create(Collection::HygieneCompletions, completion.into_fields()?)
                    .await
            }
        }
    }

    /// Delete a habit and every completion that points at it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`](crate::error::Error::NotFound) if the habit
    /// does not exist, or a storage error.
    pub async fn delete_habit(&self, habit_id: i64) -> Result<HabitRemoval> {
        let completions = self.engine.store().completions_for_habit(habit_id)?;
        let habit = self.engine.store().delete(Collection::HygieneHabits, habit_id)?;
        self.record_delete(&habit)?;

        for completion in &completions {
            let removed = self
                .engine
                .store()
                .delete(Collection::HygieneCompletions, completion.local_id)?;
            self.record_delete(&removed)?;
        }

        info!(habit_id, completions = completions.len(), "Deleted habit");
        self.finish(Collection::HygieneHabits).await?;
        Ok(HabitRemoval {
            habit,
            completions: completions.len(),
        })
    }

    // ==================
    // Generic records
    // ==================

    /// Merge `patch` into a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is missing, the merged fields are
    /// invalid, or storage fails.
    pub async fn update_record(
        &self,
        collection: Collection,
        local_id: i64,
        patch: Map<String, Value>,
    ) -> Result<Record> {
        let record = self.engine.store().update(collection, local_id, patch)?;
        let data = match &record.remote_id {
            Some(id) => with_id(record.payload(), id),
            None => record.payload(),
        };
        let queued = self.engine.queue().enqueue(QueueEntry::for_record(
            collection,
            local_id,
            QueueAction::Update,
            data,
        ))?;
        debug!(%collection, local_id, ?queued, "Recorded update");
        self.finish(collection).await?;
        Ok(record)
    }

    /// Delete a record.
    ///
    /// Deleting a habit this way leaves its completions in place; use
    /// [`Tracker::delete_habit`] to cascade.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is missing or storage fails.
    pub async fn delete_record(&self, collection: Collection, local_id: i64) -> Result<Record> {
        let record = self.engine.store().delete(collection, local_id)?;
        self.record_delete(&record)?;
        self.finish(collection).await?;
        Ok(record)
    }

    // ==================
    // Export
    // ==================

    /// Everything not yet confirmed by the remote: queued operations plus
    /// unsynced records, as one JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn export_pending(&self) -> Result<Value> {
        let mut unsynced = Map::new();
        for collection in Collection::ALL {
            let records = self.engine.store().unsynced(collection)?;
            if !records.is_empty() {
                unsynced.insert(collection.name().to_string(), serde_json::to_value(records)?);
            }
        }

        Ok(json!({
            "exportedAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "queue": self.engine.queue().entries(),
            "unsynced": unsynced,
        }))
    }

    // ==================
    // Phases
    // ==================

    async fn create(&self, collection: Collection, fields: Map<String, Value>) -> Result<Record> {
        let local_id = self.engine.store().create(collection, fields)?;
        let record = self.engine.store().require(collection, local_id)?;
        self.engine.queue().enqueue(QueueEntry::for_record(
            collection,
            local_id,
            QueueAction::Add,
            record.payload(),
        ))?;
        debug!(%collection, local_id, "Recorded add");
        self.finish(collection).await?;
        Ok(record)
    }

    /// Queue the remote side of a local delete.
    fn record_delete(&self, record: &Record) -> Result<()> {
        let data = record
            .remote_id
            .as_ref()
            .map_or_else(Map::new, |id| with_id(Map::new(), id));
        let queued = self.engine.queue().enqueue(QueueEntry::for_record(
            record.collection,
            record.local_id,
            QueueAction::Delete,
            data,
        ))?;
        if queued == Enqueued::Dropped {
            debug!(collection = %record.collection, local_id = record.local_id, "Delete of unsent record needs no remote call");
        }
        Ok(())
    }

    /// Phase two: deliver if online, then re-render.
    async fn finish(&self, collection: Collection) -> Result<()> {
        if self.engine.connectivity().is_online() {
            self.engine.drain_queue(SyncTrigger::Background).await?;
        }
        self.engine.notify(RenderReason::LocalChange(collection));
        Ok(())
    }
}

fn with_id(mut data: Map<String, Value>, id: &RemoteId) -> Map<String, Value> {
    data.insert("id".to_string(), Value::String(id.to_string()));
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::Sheet;
    use crate::sync::fake::{FakeSheets, fixture};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_offline_write_is_queued() {
        let fx = fixture(FakeSheets::new(), false);
        let record = fx
            .tracker()
            .log_mood("2024-01-01", 4, 3, 2, Some("ok"))
            .await
            .unwrap();

        assert!(!record.synced);
        assert_eq!(fx.engine.queue().size(), 1);
        assert!(fx.engine.remote().calls().is_empty());
        assert_eq!(fx.renders.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_online_write_is_delivered() {
        let fx = fixture(FakeSheets::new(), true);
        let record = fx
            .tracker()
            .log_dopamine("2024-01-01", DopamineStatus::Passed, None)
            .await
            .unwrap();

        let stored = fx
            .engine
            .store()
            .require(Collection::DopamineEntries, record.local_id)
            .unwrap();
        assert!(stored.synced);
        assert_eq!(stored.remote_id, Some(RemoteId::new("1")));
        assert_eq!(fx.engine.queue().size(), 0);
        assert_eq!(fx.engine.remote().rows(Sheet::Dopamine)[0].fields["status"], "passed");
    }

    #[tokio::test]
    async fn test_log_mood_upserts_by_date() {
        let fx = fixture(FakeSheets::new(), false);
        let tracker = fx.tracker();
        let first = tracker.log_mood("2024-01-01", 2, 2, 2, None).await.unwrap();
        let second = tracker.log_mood("2024-01-01", 5, 4, 1, None).await.unwrap();

        assert_eq!(first.local_id, second.local_id);
        assert_eq!(fx.engine.store().count(Collection::MoodEntries).unwrap(), 1);
        // The update folded into the pending add.
        let entries = fx.engine.queue().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, QueueAction::Add);
        assert_eq!(entries[0].data["mood"], 5);
    }

    #[tokio::test]
    async fn test_invalid_rating_writes_nothing() {
        let fx = fixture(FakeSheets::new(), false);
        let err = fx
            .tracker()
            .log_mood("2024-01-01", 9, 3, 3, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidField { .. }));
        assert_eq!(fx.engine.store().count(Collection::MoodEntries).unwrap(), 0);
        assert_eq!(fx.engine.queue().size(), 0);
    }

    #[tokio::test]
    async fn test_update_of_synced_record_carries_remote_id() {
        let fx = fixture(FakeSheets::new(), true);
        let tracker = fx.tracker();
        let record = tracker.log_mood("2024-01-01", 3, 3, 3, None).await.unwrap();

        fx.engine.connectivity().set_online(false);
        tracker.log_mood("2024-01-01", 1, 3, 3, None).await.unwrap();

        let entries = fx.engine.queue().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, QueueAction::Update);
        assert_eq!(entries[0].local_id, Some(record.local_id));
        assert_eq!(entries[0].remote_id(), Some(RemoteId::new("1")));

        fx.engine.connectivity().set_online(true);
        let report = fx.engine.drain_queue(SyncTrigger::Manual).await.unwrap();
        assert_eq!(report.drain.succeeded, 1);

        let after = fx.engine.store().require(Collection::MoodEntries, record.local_id).unwrap();
        assert!(after.synced);
        assert_eq!(after.remote_id, Some(RemoteId::new("1")));
        assert_eq!(fx.engine.remote().rows(Sheet::Mood)[0].fields["mood"], 1);
    }

    #[tokio::test]
    async fn test_toggle_completion() {
        let fx = fixture(FakeSheets::new(), false);
        let tracker = fx.tracker();
        let habit = tracker.add_habit("Floss", None).await.unwrap();

        let done = tracker.toggle_completion(habit.local_id, "2024-01-01").await.unwrap();
        assert_eq!(done.fields["completed"], true);
        assert_eq!(done.fields["habitId"], habit.local_id);

        let undone = tracker.toggle_completion(habit.local_id, "2024-01-01").await.unwrap();
        assert_eq!(undone.local_id, done.local_id);
        assert_eq!(undone.fields["completed"], false);
        assert_eq!(fx.engine.store().count(Collection::HygieneCompletions).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_toggle_unknown_habit() {
        let fx = fixture(FakeSheets::new(), false);
        let err = fx
            .tracker()
            .toggle_completion(42, "2024-01-01")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_add_habit_appends_order() {
        let fx = fixture(FakeSheets::new(), false);
        let tracker = fx.tracker();
        assert_eq!(tracker.seed_default_habits().await.unwrap(), 5);
        assert_eq!(tracker.seed_default_habits().await.unwrap(), 0);

        let habit = tracker.add_habit("  Floss ", Some("Nightly")).await.unwrap();
        assert_eq!(habit.fields["name"], "Floss");
        assert_eq!(habit.fields["order"], 6);
        assert_eq!(fx.engine.queue().size(), 6);
    }

    #[tokio::test]
    async fn test_delete_habit_cascades() {
        let fx = fixture(FakeSheets::new(), true);
        let tracker = fx.tracker();
        let habit = tracker.add_habit("Floss", None).await.unwrap();
        tracker.toggle_completion(habit.local_id, "2024-01-01").await.unwrap();
        tracker.toggle_completion(habit.local_id, "2024-01-02").await.unwrap();
        assert_eq!(fx.engine.remote().rows(Sheet::HygieneCompletions).len(), 2);

        let removal = tracker.delete_habit(habit.local_id).await.unwrap();
        assert_eq!(removal.completions, 2);
        assert_eq!(fx.engine.store().count(Collection::HygieneCompletions).unwrap(), 0);
        assert!(fx.engine.remote().rows(Sheet::HygieneHabits).is_empty());
        assert!(fx.engine.remote().rows(Sheet::HygieneCompletions).is_empty());
        assert_eq!(fx.engine.queue().size(), 0);
    }

    #[tokio::test]
    async fn test_delete_of_unsent_record_is_local_only() {
        let fx = fixture(FakeSheets::new(), false);
        let tracker = fx.tracker();
        let record = tracker.log_mood("2024-01-01", 3, 3, 3, None).await.unwrap();
        tracker
            .delete_record(Collection::MoodEntries, record.local_id)
            .await
            .unwrap();

        assert_eq!(fx.engine.queue().size(), 0);
        fx.engine.connectivity().set_online(true);
        fx.engine.drain_queue(SyncTrigger::Manual).await.unwrap();
        assert!(fx.engine.remote().calls().is_empty());
    }

    #[tokio::test]
    async fn test_export_pending() {
        let fx = fixture(FakeSheets::new(), false);
        let tracker = fx.tracker();
        tracker.log_mood("2024-01-01", 3, 3, 3, None).await.unwrap();
        tracker
            .log_dopamine("2024-01-01", DopamineStatus::Failed, Some("rough day"))
            .await
            .unwrap();

        let export = tracker.export_pending().unwrap();
        assert_eq!(export["queue"].as_array().unwrap().len(), 2);
        assert_eq!(export["unsynced"]["moodEntries"][0]["fields"]["mood"], 3);
        assert_eq!(export["unsynced"]["dopamineEntries"][0]["fields"]["notes"], "rough day");
    }
}

//! Database schema definitions.
//!
//! One table per collection. Every table shares the same layout: the record
//! payload lives in `fields` as JSON, with `date` and `habit_id` lifted out
//! into columns so the upsert-by-date lookups can use an index.

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The base SQL schema for the Lifetrack database.
///
/// Timestamps are stored as INTEGER (Unix milliseconds).
pub const SCHEMA_SQL: &str = r"
-- ====================
-- Schema Version Tracking
-- ====================

CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- ====================
-- Collections
-- ====================

-- Dopamine log: one pass/fail entry per day
CREATE TABLE IF NOT EXISTS dopamine_entries (
    local_id INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_id TEXT,
    synced INTEGER NOT NULL DEFAULT 0,
    date TEXT,
    habit_id INTEGER,
    fields TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    CHECK (synced = 0 OR remote_id IS NOT NULL)
);

CREATE INDEX IF NOT EXISTS idx_dopamine_date ON dopamine_entries(date);

-- Habit definitions
CREATE TABLE IF NOT EXISTS hygiene_habits (
    local_id INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_id TEXT,
    synced INTEGER NOT NULL DEFAULT 0,
    date TEXT,
    habit_id INTEGER,
    fields TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    CHECK (synced = 0 OR remote_id IS NOT NULL)
);

-- Habit completions: one per (habit, day)
CREATE TABLE IF NOT EXISTS hygiene_completions (
    local_id INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_id TEXT,
    synced INTEGER NOT NULL DEFAULT 0,
    date TEXT,
    habit_id INTEGER,
    fields TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    CHECK (synced = 0 OR remote_id IS NOT NULL)
);

CREATE INDEX IF NOT EXISTS idx_completions_habit_date ON hygiene_completions(habit_id, date);

-- Mood log: one entry per day
CREATE TABLE IF NOT EXISTS mood_entries (
    local_id INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_id TEXT,
    synced INTEGER NOT NULL DEFAULT 0,
    date TEXT,
    habit_id INTEGER,
    fields TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    CHECK (synced = 0 OR remote_id IS NOT NULL)
);

CREATE INDEX IF NOT EXISTS idx_mood_date ON mood_entries(date);
";

/// Apply the schema to a database connection.
///
/// Sets pragmas, creates tables, then runs pending migrations.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)?;

    super::migrations::run_migrations(conn)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}

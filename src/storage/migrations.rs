//! Database migrations embedded at compile time.
//!
//! Migrations are sourced from `/migrations/` at the crate root and
//! embedded into the binary using `include_str!`, so an existing database
//! picks up schema changes on the next open.

use rusqlite::{Connection, Result};
use tracing::info;

/// A single migration with version identifier and SQL content.
struct Migration {
    version: &'static str,
    sql: &'static str,
}

/// All migrations in order, embedded at compile time.
///
/// Version names match the SQL filenames (without .sql extension).
/// The `schema_migrations` table tracks which have been applied.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "001_remote_id_indexes",
        sql: include_str!("../../migrations/001_remote_id_indexes.sql"),
    },
    Migration {
        version: "002_sync_state",
        sql: include_str!("../../migrations/002_sync_state.sql"),
    },
];

/// Run all pending migrations on the database.
///
/// Already-applied migrations (tracked in `schema_migrations`) are skipped,
/// so this is safe to call on every open.
///
/// # Errors
///
/// Returns an error if a migration fails to apply. A failed migration is
/// not recorded, so the next open retries it.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    apply(conn, MIGRATIONS)
}

fn apply(conn: &Connection, migrations: &[Migration]) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let applied: std::collections::HashSet<String> = conn
        .prepare("SELECT version FROM schema_migrations")?
        .query_map([], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    for migration in migrations {
        if applied.contains(migration.version) {
            continue;
        }

        info!(version = migration.version, "Applying migration");

        conn.execute_batch(migration.sql)?;

        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![migration.version, chrono::Utc::now().timestamp_millis()],
        )?;

        info!(version = migration.version, "Migration complete");
    }

    Ok(())
}

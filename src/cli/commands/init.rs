//! Initialize the local database.
//!
//! Creates the database at the resolved path (default
//! `~/.lifetrack/data/lifetrack.db`), an empty queue beside it, and seeds the
//! default hygiene habits. Seeded habits are queued, not sent; the first
//! sync delivers them.

use std::fs;
use std::path::PathBuf;

use serde::Serialize;

use crate::cli::commands::app::{Access, App, RemoteOpts, runtime};
use crate::config::{queue_path_for, resolve_db_path};
use crate::error::{Error, Result};

#[derive(Serialize)]
struct InitOutput {
    database: PathBuf,
    queue: PathBuf,
    habits_seeded: usize,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns [`Error::AlreadyInitialized`] if the database exists and `force`
/// is not set, or an error if the directory or database cannot be created.
pub fn execute(force: bool, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let db_path = resolve_db_path(db_path.map(PathBuf::as_path)).ok_or_else(|| {
        Error::Config("Could not determine the lifetrack data directory".to_string())
    })?;
    let queue_path = queue_path_for(&db_path);

    if db_path.exists() {
        if !force {
            return Err(Error::AlreadyInitialized { path: db_path });
        }
        fs::remove_file(&db_path)?;
        for suffix in ["-wal", "-shm"] {
            let sidecar = PathBuf::from(format!("{}{suffix}", db_path.display()));
            if sidecar.exists() {
                fs::remove_file(sidecar)?;
            }
        }
        if queue_path.exists() {
            fs::remove_file(&queue_path)?;
        }
    }

    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let offline = RemoteOpts {
        endpoint: None,
        offline: true,
    };
    let app = App::open_at(db_path.clone(), &offline, Access::Writes)?;
    let habits_seeded = runtime()?.block_on(app.tracker().seed_default_habits())?;

    if json {
        let output = InitOutput {
            database: db_path,
            queue: queue_path,
            habits_seeded,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if !crate::is_silent() {
        println!("Initialized lifetrack database");
        println!("  Database: {}", db_path.display());
        println!("  Queue:    {}", queue_path.display());
        println!("  Seeded {habits_seeded} default habits");
        println!();
        println!("Next: run 'lt config set endpoint <url>' to enable sync.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Collection;
    use crate::storage::LocalStore;
    use crate::sync::SyncQueue;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_database_and_seeds_habits() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("data").join("lifetrack.db");

        execute(false, Some(&db_path), true).unwrap();

        assert!(db_path.exists());
        let store = LocalStore::open(&db_path).unwrap();
        assert_eq!(store.count(Collection::HygieneHabits).unwrap(), 5);
        let queue = SyncQueue::open(&queue_path_for(&db_path)).unwrap();
        assert_eq!(queue.size(), 5);
    }

    #[test]
    fn test_init_fails_if_already_initialized() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("lifetrack.db");

        execute(false, Some(&db_path), true).unwrap();
        let result = execute(false, Some(&db_path), true);
        assert!(matches!(result, Err(Error::AlreadyInitialized { .. })));
    }

    #[test]
    fn test_init_force_starts_over() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("lifetrack.db");

        execute(false, Some(&db_path), true).unwrap();
        execute(true, Some(&db_path), true).unwrap();

        let queue = SyncQueue::open(&queue_path_for(&db_path)).unwrap();
        assert_eq!(queue.size(), 5);
        let store = LocalStore::open(&db_path).unwrap();
        assert_eq!(store.count(Collection::HygieneHabits).unwrap(), 5);
    }
}

//! Configuration management.
//!
//! Everything lives under one global directory, `~/.lifetrack/`:
//! - **Database**: `~/.lifetrack/data/lifetrack.db`
//! - **Queue**: `queue.json` next to the database
//! - **Settings**: `~/.lifetrack/config.json`

mod settings;

pub use settings::{AppConfig, ConfigKey, ResolvedConfig};

use std::path::{Path, PathBuf};

/// File name of the durable sync queue.
pub const QUEUE_FILE: &str = "queue.json";

/// Get the global lifetrack directory location.
#[must_use]
pub fn global_lifetrack_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".lifetrack"))
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `LT_DB` environment variable
/// 3. Global location: `~/.lifetrack/data/lifetrack.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Ok(db_path) = std::env::var("LT_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    global_lifetrack_dir().map(|dir| global_db_path(&dir))
}

/// Queue file for a database: a sibling `queue.json`.
///
/// Keeping the queue beside the database means `--db` also isolates the
/// queue, so two databases never share pending operations.
#[must_use]
pub fn queue_path_for(db_path: &Path) -> PathBuf {
    db_path
        .parent()
        .map_or_else(|| PathBuf::from(QUEUE_FILE), |dir| dir.join(QUEUE_FILE))
}

/// Settings file location.
///
/// A database outside the global directory gets a `config.json` beside it;
/// the global database uses `~/.lifetrack/config.json`.
#[must_use]
pub fn config_path_for(db_path: &Path) -> PathBuf {
    match global_lifetrack_dir() {
        Some(dir) if db_path == global_db_path(&dir) => dir.join("config.json"),
        _ => db_path
            .parent()
            .map_or_else(|| PathBuf::from("config.json"), |dir| dir.join("config.json")),
    }
}

fn global_db_path(dir: &Path) -> PathBuf {
    dir.join("data").join("lifetrack.db")
}

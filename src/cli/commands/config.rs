//! Config command implementations.

use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::cli::ConfigCommands;
use crate::cli::commands::app::{RemoteOpts, load_config};
use crate::config::{AppConfig, ConfigKey, resolve_db_path};
use crate::error::{Error, Result};

/// Execute config commands.
///
/// Settings live beside the database, so this works before `lt init`.
///
/// # Errors
///
/// Returns an error for an unknown key, an invalid value, or a settings file
/// that cannot be read or written.
pub fn execute(
    command: &ConfigCommands,
    db_path: Option<&PathBuf>,
    remote: &RemoteOpts,
    json: bool,
) -> Result<()> {
    let db_path = resolve_db_path(db_path.map(PathBuf::as_path)).ok_or_else(|| {
        Error::Config("Could not determine the lifetrack data directory".to_string())
    })?;

    match command {
        ConfigCommands::Show => show(&db_path, remote, json),
        ConfigCommands::Set { key, value } => set(&db_path, remote, key, value, json),
    }
}

fn show(db_path: &Path, remote: &RemoteOpts, json: bool) -> Result<()> {
    let config = load_config(db_path, remote)?;

    if json {
        let output = serde_json::json!({
            "path": config.path.display().to_string(),
            "endpoint": config.endpoint,
            "settings": config.file,
        });
        println!("{output}");
        return Ok(());
    }

    println!("{}", "Settings".bold());
    println!("  File: {}", config.path.display().to_string().dimmed());
    println!();
    let endpoint = config.endpoint.as_deref().unwrap_or("(not set)");
    let overridden = config.endpoint != config.file.endpoint;
    println!(
        "  {:<18}{}{}",
        ConfigKey::Endpoint.as_str(),
        endpoint,
        if overridden {
            " (from flag or LT_ENDPOINT)".dimmed().to_string()
        } else {
            String::new()
        }
    );
    println!("  {:<18}{}s", ConfigKey::Timeout.as_str(), config.file.timeout_secs);
    println!("  {:<18}{}", ConfigKey::Direction.as_str(), config.file.direction);
    println!("  {:<18}{}", ConfigKey::AutoSync.as_str(), config.file.auto_sync);
    println!(
        "  {:<18}{}s",
        ConfigKey::MonitorInterval.as_str(),
        config.file.monitor_interval_secs
    );
    Ok(())
}

fn set(db_path: &Path, remote: &RemoteOpts, key: &str, value: &str, json: bool) -> Result<()> {
    let key: ConfigKey = key.parse()?;
    let path = load_config(db_path, remote)?.path;

    let mut settings = AppConfig::load(&path)?;
    settings.set(key, value)?;
    settings.save(&path)?;

    if json {
        let output = serde_json::json!({
            "path": path.display().to_string(),
            "settings": settings,
        });
        println!("{output}");
    } else if !crate::is_silent() {
        println!("Set {key} in {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::config_path_for;
    use crate::sync::SyncDirection;
    use tempfile::TempDir;

    #[test]
    fn test_set_persists_beside_database() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("lifetrack.db");
        let remote = RemoteOpts::default();

        set(&db_path, &remote, "direction", "pull", true).unwrap();
        set(&db_path, &remote, "endpoint", "https://sheets.example/exec", true).unwrap();

        let saved = AppConfig::load(&config_path_for(&db_path)).unwrap();
        assert_eq!(saved.direction, SyncDirection::Pull);
        assert_eq!(saved.endpoint.as_deref(), Some("https://sheets.example/exec"));
    }

    #[test]
    fn test_set_rejects_bad_value_without_writing() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("lifetrack.db");

        let result = set(&db_path, &RemoteOpts::default(), "timeout", "0", true);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert!(!config_path_for(&db_path).exists());
    }

    #[test]
    fn test_set_rejects_unknown_key() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("lifetrack.db");

        let result = set(&db_path, &RemoteOpts::default(), "colour", "red", true);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }
}

//! Persisted settings.
//!
//! `config.json` holds the endpoint URL and sync tuning. Values resolve as
//! CLI flag, then environment, then file, then default.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::sync::{DEFAULT_INTERVAL, DEFAULT_TIMEOUT, SyncDirection, atomic_write, read_optional};

/// Contents of `config.json`. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Spreadsheet endpoint URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
    pub direction: SyncDirection,
    /// Deliver each change right after it is written.
    pub auto_sync: bool,
    pub monitor_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            direction: SyncDirection::Push,
            auto_sync: true,
            monitor_interval_secs: DEFAULT_INTERVAL.as_secs(),
        }
    }
}

/// A settable key, as named on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    Endpoint,
    Timeout,
    Direction,
    AutoSync,
    MonitorInterval,
}

impl ConfigKey {
    pub const ALL: [Self; 5] = [
        Self::Endpoint,
        Self::Timeout,
        Self::Direction,
        Self::AutoSync,
        Self::MonitorInterval,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Endpoint => "endpoint",
            Self::Timeout => "timeout",
            Self::Direction => "direction",
            Self::AutoSync => "auto-sync",
            Self::MonitorInterval => "monitor-interval",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| {
                let keys: Vec<&str> = Self::ALL.iter().map(|k| k.as_str()).collect();
                Error::InvalidArgument(format!(
                    "Unknown config key: {s} (expected one of: {})",
                    keys.join(", ")
                ))
            })
    }
}

impl AppConfig {
    /// Load settings, or defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file exists but cannot be parsed.
    pub fn load(path: &Path) -> Result<Self> {
        match read_optional(path)? {
            None => Ok(Self::default()),
            Some(content) if content.trim().is_empty() => Ok(Self::default()),
            Some(content) => serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display()))),
        }
    }

    /// Write settings atomically, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        atomic_write(path, &serde_json::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Set a key from its command-line string form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the value does not parse.
    pub fn set(&mut self, key: ConfigKey, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            ConfigKey::Endpoint => {
                self.endpoint = match value {
                    "" | "none" | "-" => None,
                    url if url.starts_with("http://") || url.starts_with("https://") => {
                        Some(url.to_string())
                    }
                    other => {
                        return Err(Error::InvalidArgument(format!(
                            "Endpoint must be an http(s) URL, got: {other}"
                        )));
                    }
                };
            }
            ConfigKey::Timeout => self.timeout_secs = parse_secs(key, value)?,
            ConfigKey::MonitorInterval => self.monitor_interval_secs = parse_secs(key, value)?,
            ConfigKey::Direction => self.direction = value.parse()?,
            ConfigKey::AutoSync => {
                self.auto_sync = match value.to_lowercase().as_str() {
                    "true" | "yes" | "on" | "1" => true,
                    "false" | "no" | "off" | "0" => false,
                    other => {
                        return Err(Error::InvalidArgument(format!(
                            "auto-sync must be true or false, got: {other}"
                        )));
                    }
                };
            }
        }
        Ok(())
    }

    /// Apply the environment and command-line overrides.
    #[must_use]
    pub fn resolve(self, path: PathBuf, endpoint_flag: Option<&str>) -> ResolvedConfig {
        let env_endpoint = std::env::var("LT_ENDPOINT").ok();
        self.resolve_with(path, endpoint_flag, env_endpoint.as_deref())
    }

    fn resolve_with(
        self,
        path: PathBuf,
        endpoint_flag: Option<&str>,
        env_endpoint: Option<&str>,
    ) -> ResolvedConfig {
        let endpoint = endpoint_flag
            .or(env_endpoint)
            .map(str::to_string)
            .or(self.endpoint.clone())
            .filter(|e| !e.trim().is_empty());
        ResolvedConfig {
            path,
            endpoint,
            file: self,
        }
    }
}

fn parse_secs(key: ConfigKey, value: &str) -> Result<u64> {
    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(Error::InvalidArgument(format!(
            "{key} must be a positive number of seconds, got: {value}"
        ))),
    }
}

/// Settings after overrides, ready to use.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub path: PathBuf,
    pub endpoint: Option<String>,
    pub file: AppConfig,
}

impl ResolvedConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.file.timeout_secs)
    }

    #[must_use]
    pub const fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.file.monitor_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.timeout_secs, 15);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.set(ConfigKey::Endpoint, "https://example.test/exec").unwrap();
        config.set(ConfigKey::Direction, "pull").unwrap();
        config.set(ConfigKey::AutoSync, "off").unwrap();
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.direction, SyncDirection::Pull);
        assert!(!loaded.auto_sync);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"endpoint": "https://example.test/exec"}"#).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.endpoint.as_deref(), Some("https://example.test/exec"));
        assert_eq!(config.monitor_interval_secs, 30);
    }

    #[test]
    fn test_corrupt_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut config = AppConfig::default();
        assert!(config.set(ConfigKey::Endpoint, "ftp://nope").is_err());
        assert!(config.set(ConfigKey::Timeout, "0").is_err());
        assert!(config.set(ConfigKey::AutoSync, "maybe").is_err());
        assert!("colour".parse::<ConfigKey>().is_err());
        assert_eq!("auto_sync".parse::<ConfigKey>().unwrap(), ConfigKey::AutoSync);
    }

    #[test]
    fn test_flag_beats_env_beats_file() {
        let file = AppConfig {
            endpoint: Some("https://file.test".to_string()),
            ..AppConfig::default()
        };
        let path = PathBuf::from("config.json");

        let resolved = file
            .clone()
            .resolve_with(path.clone(), Some("https://flag.test"), Some("https://env.test"));
        assert_eq!(resolved.endpoint.as_deref(), Some("https://flag.test"));

        let resolved = file.clone().resolve_with(path.clone(), None, Some("https://env.test"));
        assert_eq!(resolved.endpoint.as_deref(), Some("https://env.test"));

        let resolved = file.resolve_with(path, None, None);
        assert_eq!(resolved.endpoint.as_deref(), Some("https://file.test"));
        assert_eq!(resolved.timeout(), Duration::from_secs(15));
    }
}

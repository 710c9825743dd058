//! Shared setup for commands that touch the database.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{AppConfig, ResolvedConfig, config_path_for, queue_path_for, resolve_db_path};
use crate::error::{Error, Result};
use crate::storage::LocalStore;
use crate::sync::{Connectivity, SheetsClient, SyncEngine, SyncQueue};
use crate::tracker::Tracker;

/// Global flags that shape how the remote is reached.
#[derive(Debug, Clone, Default)]
pub struct RemoteOpts {
    pub endpoint: Option<String>,
    pub offline: bool,
}

/// What an [`App`] is opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    /// Explicit sync and read commands: always reach the remote if possible.
    Sync,
    /// User mutations: reach the remote only with `auto-sync` on.
    Writes,
}

/// An opened database, queue and remote client.
pub struct App {
    pub db_path: PathBuf,
    pub config: ResolvedConfig,
    pub engine: SyncEngine<SheetsClient>,
}

impl App {
    /// Open the initialized database for sync and read commands.
    ///
    /// The remote starts out online when an endpoint is configured and
    /// `--offline` was not given. No request is made here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] if the database does not exist, or a
    /// storage or config error.
    pub fn open(db_path: Option<&PathBuf>, remote: &RemoteOpts) -> Result<Self> {
        Self::open_existing(db_path, remote, Access::Sync)
    }

    /// Open the initialized database for user mutations.
    ///
    /// Like [`App::open`], but with `auto-sync` off the remote starts offline
    /// and every change is only queued.
    ///
    /// # Errors
    ///
    /// Same as [`App::open`].
    pub fn open_for_writes(db_path: Option<&PathBuf>, remote: &RemoteOpts) -> Result<Self> {
        Self::open_existing(db_path, remote, Access::Writes)
    }

    fn open_existing(
        db_path: Option<&PathBuf>,
        remote: &RemoteOpts,
        access: Access,
    ) -> Result<Self> {
        let db_path = resolve_db_path(db_path.map(PathBuf::as_path)).ok_or(Error::NotInitialized)?;
        if !db_path.exists() {
            return Err(Error::NotInitialized);
        }
        Self::open_at(db_path, remote, access)
    }

    pub(crate) fn open_at(db_path: PathBuf, remote: &RemoteOpts, access: Access) -> Result<Self> {
        let config = load_config(&db_path, remote)?;
        let store = LocalStore::open(&db_path)?;
        let queue = SyncQueue::open(&queue_path_for(&db_path))?;
        let client = SheetsClient::new(config.endpoint.clone(), config.timeout());

        let deliver = access == Access::Sync || config.file.auto_sync;
        let online = !remote.offline && config.endpoint.is_some() && deliver;
        debug!(db = %db_path.display(), online, ?access, "Opened app");

        let engine = SyncEngine::new(store, queue, client, Connectivity::new(online));
        Ok(Self {
            db_path,
            config,
            engine,
        })
    }

    /// Tracker over this app's engine.
    #[must_use]
    pub fn tracker(&self) -> Tracker<'_, SheetsClient> {
        Tracker::new(&self.engine)
    }

    /// Fail unless a remote is reachable in principle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no endpoint is configured.
    pub fn require_endpoint(&self) -> Result<&str> {
        self.config
            .endpoint
            .as_deref()
            .ok_or_else(|| Error::Config("No endpoint configured".to_string()))
    }
}

/// Load settings for a database, applying flag and environment overrides.
///
/// # Errors
///
/// Returns [`Error::Config`] if the settings file is malformed.
pub fn load_config(db_path: &Path, remote: &RemoteOpts) -> Result<ResolvedConfig> {
    let path = config_path_for(db_path);
    Ok(AppConfig::load(&path)?.resolve(path, remote.endpoint.as_deref()))
}

/// Create the async runtime for remote work.
///
/// # Errors
///
/// Returns an error if the runtime cannot be created.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))
}

//! Connectivity tracking.
//!
//! [`Connectivity`] is a shared online/offline flag. [`ConnectivityMonitor`]
//! polls the remote and starts a background sync on each offline to online
//! transition.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::sync::engine::SyncEngine;
use crate::sync::remote::SheetsRemote;
use crate::sync::types::{SyncDirection, SyncReport, SyncTrigger};

/// Default polling interval for the monitor.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Effect of setting the online flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    WentOnline,
    WentOffline,
    Unchanged,
}

/// Shared online/offline flag.
#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    #[must_use]
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Update the flag and report whether it changed.
    pub fn set_online(&self, online: bool) -> Transition {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        match (changed, online) {
            (false, _) => Transition::Unchanged,
            (true, true) => Transition::WentOnline,
            (true, false) => Transition::WentOffline,
        }
    }

    /// Receiver notified on every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Polls the remote and syncs when connectivity returns.
pub struct ConnectivityMonitor<'a, R> {
    engine: &'a SyncEngine<R>,
    interval: Duration,
    direction: SyncDirection,
}

impl<'a, R: SheetsRemote> ConnectivityMonitor<'a, R> {
    #[must_use]
    pub const fn new(engine: &'a SyncEngine<R>, interval: Duration, direction: SyncDirection) -> Self {
        Self {
            engine,
            interval,
            direction,
        }
    }

    /// Apply an observed connectivity state.
    ///
    /// On an offline to online transition this runs a background sync and
    /// returns its report. Going offline only flips the flag; in-flight calls
    /// fail on their own and stay queued.
    ///
    /// # Errors
    ///
    /// Returns an error if the triggered sync hits a local storage failure.
    pub async fn handle(&self, online: bool) -> Result<Option<SyncReport>> {
        match self.engine.connectivity().set_online(online) {
            Transition::WentOnline => {
                info!(pending = self.engine.queue().size(), "Back online, syncing");
                let report = self
                    .engine
                    .sync_now(self.direction, SyncTrigger::Background)
                    .await?;
                Ok(Some(report))
            }
            Transition::WentOffline => {
                info!("Went offline, queueing changes");
                Ok(None)
            }
            Transition::Unchanged => Ok(None),
        }
    }

    /// Ping the remote once and apply the result.
    ///
    /// # Errors
    ///
    /// See [`ConnectivityMonitor::handle`].
    pub async fn check(&self) -> Result<Option<SyncReport>> {
        let online = self.engine.remote().ping().await;
        debug!(online, "Connectivity check");
        self.handle(online).await
    }

    /// Poll until `shutdown` resolves.
    ///
    /// A failed sync is logged and polling continues.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    debug!("Connectivity monitor stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.check().await {
                        error!(error = %e, "Background sync failed");
                    }
                }
            }
        }
    }
}

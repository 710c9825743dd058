//! Foreground connectivity monitor.
//!
//! Polls the endpoint and runs a background sync each time it comes back,
//! until Ctrl-C.

use std::path::PathBuf;
use std::time::Duration;

use colored::Colorize;
use tokio::sync::watch;
use tracing::warn;

use crate::cli::DirectionArg;
use crate::cli::commands::app::{App, RemoteOpts, runtime};
use crate::error::{Error, Result};
use crate::sync::ConnectivityMonitor;

/// Execute the watch command.
///
/// # Errors
///
/// Returns [`Error::Config`] if no endpoint is configured, or
/// [`Error::InvalidArgument`] with `--offline`.
pub fn execute(
    interval: Option<u64>,
    direction: Option<DirectionArg>,
    db_path: Option<&PathBuf>,
    remote: &RemoteOpts,
    json: bool,
) -> Result<()> {
    if remote.offline {
        return Err(Error::InvalidArgument(
            "watch needs the network; drop --offline".to_string(),
        ));
    }
    if interval == Some(0) {
        return Err(Error::InvalidArgument(
            "interval must be a positive number of seconds".to_string(),
        ));
    }

    let app = App::open(db_path, remote)?;
    let endpoint = app.require_endpoint()?.to_string();
    let interval = interval.map_or_else(|| app.config.monitor_interval(), Duration::from_secs);
    let direction = direction.map_or(app.config.file.direction, Into::into);

    // Start offline so the first successful ping counts as a reconnect.
    let connectivity = app.engine.connectivity();
    connectivity.set_online(false);
    let transitions = connectivity.subscribe();

    if !json && !crate::is_silent() {
        println!(
            "Watching {endpoint} every {}s ({direction}). Ctrl-C to stop.",
            interval.as_secs()
        );
    }

    let monitor = ConnectivityMonitor::new(&app.engine, interval, direction);
    runtime()?.block_on(async {
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Could not listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };
        tokio::select! {
            () = monitor.run(shutdown) => {}
            () = announce(&app, transitions, json) => {}
        }
    });

    if !json && !crate::is_silent() {
        println!("Stopped. {} operation(s) queued.", app.engine.queue().size());
    }
    Ok(())
}

async fn announce(app: &App, mut transitions: watch::Receiver<bool>, json: bool) {
    while transitions.changed().await.is_ok() {
        let online = *transitions.borrow_and_update();
        let queued = app.engine.queue().size();
        if json {
            println!("{}", serde_json::json!({ "online": online, "queued": queued }));
        } else if crate::is_silent() {
            continue;
        } else if online {
            println!("{} syncing {queued} queued operation(s)", "online".green());
        } else {
            println!("{} changes will queue", "offline".yellow());
        }
    }
}

//! Sync command implementations.
//!
//! Every pass here is a manual one: remote rejections are reported and turn
//! into a non-zero exit, while unreachable-endpoint failures just stay
//! queued.

use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::cli::SyncCommands;
use crate::cli::commands::app::{App, RemoteOpts, runtime};
use crate::error::{Error, Result};
use crate::model::Collection;
use crate::sync::{
    SheetsRemote, SyncDirection, SyncOutcome, SyncReport, SyncTrigger, atomic_write,
    get_sync_status, print_status,
};

/// Execute sync commands.
///
/// # Errors
///
/// Returns [`Error::SyncRejected`] if the endpoint rejected operations,
/// [`Error::Config`] if no endpoint is configured, or a storage error.
pub fn execute(
    command: &SyncCommands,
    db_path: Option<&PathBuf>,
    remote: &RemoteOpts,
    json: bool,
) -> Result<()> {
    let app = App::open(db_path, remote)?;
    match command {
        SyncCommands::Now { direction } => {
            let direction = direction.map_or(app.config.file.direction, Into::into);
            run_pass(&app, remote, json, |app| {
                app.engine.sync_now(direction, SyncTrigger::Manual)
            })
        }
        SyncCommands::Push => run_pass(&app, remote, json, |app| {
            app.engine.sync_now(SyncDirection::Push, SyncTrigger::Manual)
        }),
        SyncCommands::Pull => run_pass(&app, remote, json, |app| {
            app.engine.sync_now(SyncDirection::Pull, SyncTrigger::Manual)
        }),
        SyncCommands::Drain => run_pass(&app, remote, json, |app| {
            app.engine.drain_queue(SyncTrigger::Manual)
        }),
        SyncCommands::Diff { collection } => {
            let collections = match collection {
                Some(name) => vec![name.parse::<Collection>()?],
                None => Collection::ALL.to_vec(),
            };
            run_pass(&app, remote, json, |app| async move {
                let mut combined = SyncReport::new(SyncOutcome::Completed, SyncTrigger::Manual);
                for collection in collections {
                    let report = app
                        .engine
                        .sync_collection_diff(collection, SyncTrigger::Manual)
                        .await?;
                    combined.outcome = report.outcome;
                    combined.collections.extend(report.collections);
                    combined.rejections.extend(report.rejections);
                }
                Ok(combined)
            })
        }
        SyncCommands::Status => status(&app, remote, json),
        SyncCommands::Queue => queue(&app, json),
        SyncCommands::Export { output } => export(&app, output.as_deref(), json),
        SyncCommands::ClearQueue { force } => clear_queue(&app, *force, json),
    }
}

fn run_pass<'a, F, Fut>(app: &'a App, remote: &RemoteOpts, json: bool, pass: F) -> Result<()>
where
    F: FnOnce(&'a App) -> Fut,
    Fut: std::future::Future<Output = Result<SyncReport>>,
{
    if !remote.offline {
        app.require_endpoint()?;
    }
    let report = runtime()?.block_on(pass(app))?;
    print_report(app, &report, json)?;

    if report.rejections.is_empty() {
        Ok(())
    } else {
        Err(Error::SyncRejected {
            messages: report.rejections,
            pending: app.engine.queue().size(),
        })
    }
}

fn print_report(app: &App, report: &SyncReport, json: bool) -> Result<()> {
    let queued = app.engine.queue().size();
    if json {
        let output = serde_json::json!({
            "report": report,
            "queued": queued,
        });
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }
    if crate::is_silent() {
        return Ok(());
    }

    match report.outcome {
        SyncOutcome::Offline => {
            println!("{}", "Offline: nothing sent.".yellow());
            println!("  {queued} operation(s) queued");
        }
        SyncOutcome::AlreadyRunning => println!("{}", "A sync is already running.".yellow()),
        SyncOutcome::Completed => {
            println!("{}", "Sync complete".green().bold());
            if !report.drain.is_empty() {
                println!(
                    "  Queue:  {} replayed, {} failed, {} deferred",
                    report.drain.succeeded, report.drain.failed, report.drain.deferred
                );
            }
            for summary in &report.collections {
                println!(
                    "  {:<20} {} pushed, {} pulled, {} queued",
                    summary.collection.to_string(),
                    summary.pushed,
                    summary.pulled,
                    summary.queued
                );
            }
            if queued > 0 {
                println!("  {} operation(s) still queued", queued.to_string().yellow());
            }
        }
    }
    Ok(())
}

fn status(app: &App, remote: &RemoteOpts, json: bool) -> Result<()> {
    let online = if remote.offline || app.config.endpoint.is_none() {
        false
    } else {
        runtime()?.block_on(app.engine.remote().ping())
    };
    let status = get_sync_status(
        app.engine.store(),
        app.engine.queue(),
        online,
        app.config.endpoint.as_deref(),
    )?;

    if json {
        println!("{}", serde_json::to_string(&status)?);
    } else {
        print_status(&status);
    }
    Ok(())
}

fn queue(app: &App, json: bool) -> Result<()> {
    let entries = app.engine.queue().entries();
    if json {
        println!("{}", serde_json::to_string(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("{}", "Queue is empty.".green());
        return Ok(());
    }

    for (position, entry) in entries.iter().enumerate() {
        let retry = if entry.attempts > 0 {
            format!(
                " ({} attempts: {})",
                entry.attempts,
                entry.last_error.as_deref().unwrap_or("unknown error")
            )
            .red()
            .to_string()
        } else {
            String::new()
        };
        println!(
            "{:>3}. {:<20} {:<6} {}  {}{}",
            position + 1,
            entry.sheet.to_string(),
            entry.action.to_string(),
            entry.id,
            entry.timestamp.format("%Y-%m-%d %H:%M").to_string().dimmed(),
            retry
        );
    }
    Ok(())
}

fn export(app: &App, output: Option<&Path>, json: bool) -> Result<()> {
    let document = app.tracker().export_pending()?;
    let content = serde_json::to_string_pretty(&document)?;

    match output {
        None => println!("{content}"),
        Some(path) => {
            atomic_write(path, &content)?;
            let queued = app.engine.queue().size();
            if json {
                let output = serde_json::json!({
                    "path": path.display().to_string(),
                    "queued": queued,
                });
                println!("{output}");
            } else if !crate::is_silent() {
                println!("Exported {queued} queued operation(s) to {}", path.display());
            }
        }
    }
    Ok(())
}

fn clear_queue(app: &App, force: bool, json: bool) -> Result<()> {
    let pending = app.engine.queue().size();
    if pending > 0 && !force {
        return Err(Error::InvalidArgument(format!(
            "{pending} queued operation(s) would be lost; export them with \
             'lt sync export --output pending.json' and rerun with --force"
        )));
    }

    let removed = app.engine.queue().clear()?;
    if json {
        println!("{}", serde_json::json!({ "removed": removed }));
    } else if !crate::is_silent() {
        println!("Removed {removed} queued operation(s)");
    }
    Ok(())
}

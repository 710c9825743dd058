//! Raw record commands.

use std::path::PathBuf;

use colored::Colorize;

use crate::cli::RecordsCommands;
use crate::cli::commands::app::{App, RemoteOpts, runtime};
use crate::cli::commands::log::sync_badge;
use crate::error::Result;
use crate::model::Collection;

/// Execute record commands.
///
/// # Errors
///
/// Returns an error for an unknown collection, a missing record, or a
/// storage failure.
pub fn execute(
    command: &RecordsCommands,
    db_path: Option<&PathBuf>,
    remote: &RemoteOpts,
    json: bool,
) -> Result<()> {
    let app = App::open_for_writes(db_path, remote)?;
    match command {
        RecordsCommands::List {
            collection,
            unsynced,
            limit,
        } => {
            let collection: Collection = collection.parse()?;
            let mut records = if *unsynced {
                app.engine.store().unsynced(collection)?
            } else {
                app.engine.store().all(collection)?
            };
            records.truncate(*limit);

            if json {
                println!("{}", serde_json::to_string(&records)?);
                return Ok(());
            }
            if records.is_empty() {
                println!("No {collection} records.");
                return Ok(());
            }
            for record in &records {
                let remote_id = record
                    .remote_id
                    .as_ref()
                    .map_or_else(|| "-".dimmed().to_string(), ToString::to_string);
                println!(
                    "#{:<4} remote {:<8} {}  {}",
                    record.local_id,
                    remote_id,
                    sync_badge(record),
                    serde_json::Value::Object(record.fields.clone())
                );
            }
            Ok(())
        }
        RecordsCommands::Delete { collection, id } => {
            let collection: Collection = collection.parse()?;
            let tracker = app.tracker();
            let record = if collection == Collection::HygieneHabits {
                runtime()?.block_on(tracker.delete_habit(*id))?.habit
            } else {
                runtime()?.block_on(tracker.delete_record(collection, *id))?
            };

            if json {
                println!("{}", serde_json::to_string(&record)?);
            } else if !crate::is_silent() {
                println!("Deleted {collection} #{}", record.local_id);
            }
            Ok(())
        }
    }
}

//! Daily log commands: mood and dopamine.

use std::path::PathBuf;

use colored::Colorize;

use crate::cli::commands::app::{App, RemoteOpts, runtime};
use crate::cli::{DopamineCommands, DopamineLogArgs, MoodCommands, MoodLogArgs, ShowArgs};
use crate::error::{Error, Result};
use crate::model::{Collection, DopamineStatus, Record};
use crate::validate::resolve_date_arg;

/// Execute mood commands.
///
/// # Errors
///
/// Returns an error for invalid input or a storage failure.
pub fn execute_mood(
    command: &MoodCommands,
    db_path: Option<&PathBuf>,
    remote: &RemoteOpts,
    json: bool,
) -> Result<()> {
    let app = App::open_for_writes(db_path, remote)?;
    match command {
        MoodCommands::Log(args) => log_mood(&app, args, json),
        MoodCommands::Show(args) => show(&app, Collection::MoodEntries, args, json),
    }
}

/// Execute dopamine commands.
///
/// # Errors
///
/// Returns an error for invalid input or a storage failure.
pub fn execute_dopamine(
    command: &DopamineCommands,
    db_path: Option<&PathBuf>,
    remote: &RemoteOpts,
    json: bool,
) -> Result<()> {
    let app = App::open_for_writes(db_path, remote)?;
    match command {
        DopamineCommands::Log(args) => log_dopamine(&app, args, json),
        DopamineCommands::Show(args) => show(&app, Collection::DopamineEntries, args, json),
    }
}

fn log_mood(app: &App, args: &MoodLogArgs, json: bool) -> Result<()> {
    let date = resolve_date_arg(args.date.as_deref()).map_err(Error::InvalidArgument)?;
    let record = runtime()?.block_on(app.tracker().log_mood(
        &date,
        args.mood,
        args.energy,
        args.numb,
        args.notes.as_deref(),
    ))?;
    print_logged(app, &record, json)
}

fn log_dopamine(app: &App, args: &DopamineLogArgs, json: bool) -> Result<()> {
    let date = resolve_date_arg(args.date.as_deref()).map_err(Error::InvalidArgument)?;
    let status: DopamineStatus = args.status.parse()?;
    let record = runtime()?.block_on(app.tracker().log_dopamine(
        &date,
        status,
        args.notes.as_deref(),
    ))?;
    print_logged(app, &record, json)
}

fn print_logged(app: &App, record: &Record, json: bool) -> Result<()> {
    // Re-read: delivery may have marked it synced.
    let record = app
        .engine
        .store()
        .get(record.collection, record.local_id)?
        .unwrap_or_else(|| record.clone());

    if crate::is_silent() {
        println!("{}", record.local_id);
    } else if json {
        println!("{}", serde_json::to_string(&record)?);
    } else {
        println!(
            "Logged {} for {} (#{}) {}",
            record.collection,
            record.field_str("date").unwrap_or("?"),
            record.local_id,
            sync_badge(&record)
        );
    }
    Ok(())
}

fn show(app: &App, collection: Collection, args: &ShowArgs, json: bool) -> Result<()> {
    let date = args
        .date
        .as_deref()
        .map(|d| resolve_date_arg(Some(d)))
        .transpose()
        .map_err(Error::InvalidArgument)?;

    let mut records: Vec<Record> = app
        .engine
        .store()
        .query(collection, |r| {
            date.as_deref().is_none_or(|d| r.field_str("date") == Some(d))
        })?
        .collect();
    records.sort_by(|a, b| b.field_str("date").cmp(&a.field_str("date")));
    records.truncate(args.limit);

    if json {
        println!("{}", serde_json::to_string(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No {collection} yet.");
        return Ok(());
    }

    for record in &records {
        let date = record.field_str("date").unwrap_or("?");
        let summary = match collection {
            Collection::MoodEntries => format!(
                "mood {}  energy {}  numb {}",
                rating(record.field_i64("mood")),
                rating(record.field_i64("energy")),
                rating(record.field_i64("numb")),
            ),
            _ => match record.field_str("status") {
                Some("passed") => "passed".green().to_string(),
                Some("failed") => "failed".red().to_string(),
                other => other.unwrap_or("?").to_string(),
            },
        };
        let notes = record.field_str("notes").filter(|n| !n.is_empty());
        println!(
            "{}  {}  {}{}",
            date.bold(),
            summary,
            sync_badge(record),
            notes.map(|n| format!("\n            {}", n.dimmed())).unwrap_or_default()
        );
    }
    Ok(())
}

fn rating(value: Option<i64>) -> String {
    value.map_or_else(|| "?".to_string(), |v| v.to_string())
}

/// Short marker for a record's sync state.
pub(crate) fn sync_badge(record: &Record) -> String {
    if record.synced {
        "synced".green().to_string()
    } else {
        "pending".yellow().to_string()
    }
}

//! Habit commands.

use std::path::PathBuf;

use colored::Colorize;
use serde::Serialize;

use crate::cli::HabitCommands;
use crate::cli::commands::app::{App, RemoteOpts, runtime};
use crate::cli::commands::log::sync_badge;
use crate::error::{Error, Result};
use crate::model::{Collection, Record};
use crate::validate::resolve_date_arg;

#[derive(Serialize)]
struct HabitDay<'a> {
    habit: &'a Record,
    completed: bool,
}

/// Execute habit commands.
///
/// # Errors
///
/// Returns an error for invalid input, a missing habit, or a storage failure.
pub fn execute(
    command: &HabitCommands,
    db_path: Option<&PathBuf>,
    remote: &RemoteOpts,
    json: bool,
) -> Result<()> {
    let app = App::open_for_writes(db_path, remote)?;
    match command {
        HabitCommands::Add { name, description } => {
            let record =
                runtime()?.block_on(app.tracker().add_habit(name, description.as_deref()))?;
            if crate::is_silent() {
                println!("{}", record.local_id);
            } else if json {
                println!("{}", serde_json::to_string(&record)?);
            } else {
                println!(
                    "Added habit #{}: {}",
                    record.local_id,
                    record.field_str("name").unwrap_or_default()
                );
            }
            Ok(())
        }
        HabitCommands::List { date } => list(&app, date.as_deref(), json),
        HabitCommands::Done { id, date } => {
            let date = resolve_date_arg(date.as_deref()).map_err(Error::InvalidArgument)?;
            let record = runtime()?.block_on(app.tracker().toggle_completion(*id, &date))?;
            let done = record
                .fields
                .get("completed")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false);
            if crate::is_silent() {
                println!("{}", record.local_id);
            } else if json {
                println!("{}", serde_json::to_string(&record)?);
            } else if done {
                println!("Habit #{id} done for {date}");
            } else {
                println!("Habit #{id} unchecked for {date}");
            }
            Ok(())
        }
        HabitCommands::Delete { id } => {
            let removal = runtime()?.block_on(app.tracker().delete_habit(*id))?;
            if json {
                let output = serde_json::json!({
                    "deleted": removal.habit.local_id,
                    "completions": removal.completions,
                });
                println!("{output}");
            } else if !crate::is_silent() {
                println!(
                    "Deleted habit #{} ({} completions)",
                    removal.habit.local_id, removal.completions
                );
            }
            Ok(())
        }
    }
}

fn list(app: &App, date: Option<&str>, json: bool) -> Result<()> {
    let date = resolve_date_arg(date).map_err(Error::InvalidArgument)?;
    let store = app.engine.store();

    let mut habits = store.all(Collection::HygieneHabits)?;
    habits.sort_by_key(|h| h.field_i64("order").unwrap_or(i64::MAX));

    let mut days = Vec::with_capacity(habits.len());
    for habit in &habits {
        let completed = store
            .find_completion(habit.local_id, &date)?
            .and_then(|c| c.fields.get("completed").and_then(serde_json::Value::as_bool))
            .unwrap_or(false);
        days.push(HabitDay { habit, completed });
    }

    if json {
        println!("{}", serde_json::to_string(&days)?);
        return Ok(());
    }

    if days.is_empty() {
        println!("No habits yet. Add one with 'lt habit add <name>'.");
        return Ok(());
    }

    println!("{}", format!("Habits for {date}").bold());
    for day in &days {
        let mark = if day.completed {
            "[x]".green().to_string()
        } else {
            "[ ]".to_string()
        };
        println!(
            "  {mark} #{:<3} {:<20} {}",
            day.habit.local_id,
            day.habit.field_str("name").unwrap_or_default(),
            sync_badge(day.habit)
        );
    }
    Ok(())
}

//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::sync::SyncDirection;

pub mod commands;

/// lifetrack - local-first habit and mood tracker
#[derive(Parser, Debug)]
#[command(name = "lt", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.lifetrack/data/lifetrack.db)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Spreadsheet endpoint URL (overrides LT_ENDPOINT and config.json)
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Work offline: write locally and queue everything
    #[arg(long, global = true)]
    pub offline: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Output only the local ID (for scripting)
    #[arg(long, global = true)]
    pub silent: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the local database and seed default habits
    Init {
        /// Discard the existing database and queue
        #[arg(long)]
        force: bool,
    },

    /// Print version information
    Version,

    /// Daily mood log
    Mood {
        #[command(subcommand)]
        command: MoodCommands,
    },

    /// Daily dopamine log
    Dopamine {
        #[command(subcommand)]
        command: DopamineCommands,
    },

    /// Hygiene habits and completions
    Habit {
        #[command(subcommand)]
        command: HabitCommands,
    },

    /// Raw record access
    Records {
        #[command(subcommand)]
        command: RecordsCommands,
    },

    /// Sync with the spreadsheet endpoint
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },

    /// Watch connectivity and sync whenever the endpoint comes back
    Watch {
        /// Seconds between connectivity checks
        #[arg(long)]
        interval: Option<u64>,

        /// Direction of the sync run on reconnect
        #[arg(long, value_enum)]
        direction: Option<DirectionArg>,
    },

    /// Show or change settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

/// Sync direction as accepted on the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirectionArg {
    Push,
    Pull,
}

impl From<DirectionArg> for SyncDirection {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Push => Self::Push,
            DirectionArg::Pull => Self::Pull,
        }
    }
}

// ============================================================================
// Daily Log Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum MoodCommands {
    /// Log mood, energy and numbness (1-5) for a day
    Log(MoodLogArgs),

    /// Show recent mood entries
    Show(ShowArgs),
}

#[derive(Args, Debug)]
pub struct MoodLogArgs {
    /// Mood rating (1-5)
    pub mood: i64,

    /// Energy rating (1-5)
    pub energy: i64,

    /// Numbness rating (1-5)
    pub numb: i64,

    /// Day to log: YYYY-MM-DD, today, or yesterday
    #[arg(short, long)]
    pub date: Option<String>,

    /// Free-form notes
    #[arg(short, long)]
    pub notes: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum DopamineCommands {
    /// Log the day's status (passed or failed)
    Log(DopamineLogArgs),

    /// Show recent dopamine entries
    Show(ShowArgs),
}

#[derive(Args, Debug)]
pub struct DopamineLogArgs {
    /// passed or failed (synonyms like clean or relapse are accepted)
    pub status: String,

    /// Day to log: YYYY-MM-DD, today, or yesterday
    #[arg(short, long)]
    pub date: Option<String>,

    /// Free-form notes
    #[arg(short, long)]
    pub notes: Option<String>,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Only this day
    #[arg(short, long)]
    pub date: Option<String>,

    /// Maximum entries to show, newest first
    #[arg(short, long, default_value = "14")]
    pub limit: usize,
}

// ============================================================================
// Habit Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum HabitCommands {
    /// Add a habit
    Add {
        /// Habit name
        name: String,

        /// Short description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List habits with their completion for a day
    List {
        /// Day to show: YYYY-MM-DD, today, or yesterday
        #[arg(short, long)]
        date: Option<String>,
    },

    /// Toggle a habit's completion for a day
    Done {
        /// Habit local ID
        id: i64,

        /// Day to toggle: YYYY-MM-DD, today, or yesterday
        #[arg(short, long)]
        date: Option<String>,
    },

    /// Delete a habit and its completions
    Delete {
        /// Habit local ID
        id: i64,
    },
}

// ============================================================================
// Record Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum RecordsCommands {
    /// List records in a collection
    List {
        /// Collection: mood, dopamine, habits, or completions
        collection: String,

        /// Only records not yet confirmed by the endpoint
        #[arg(long)]
        unsynced: bool,

        /// Maximum records to return
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Delete a record by local ID
    Delete {
        /// Collection: mood, dopamine, habits, or completions
        collection: String,

        /// Record local ID
        id: i64,
    },
}

// ============================================================================
// Sync Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum SyncCommands {
    /// Deliver the queue, then push or pull
    Now {
        /// Override the configured direction
        #[arg(long, value_enum)]
        direction: Option<DirectionArg>,
    },

    /// Deliver the queue and push every unsynced record
    Push,

    /// Deliver the queue, then replace local data from the endpoint
    Pull,

    /// Compare collections with their sheets and apply the differences
    Diff {
        /// Only this collection (default: all)
        collection: Option<String>,
    },

    /// Replay the queue only
    Drain,

    /// Show sync status
    Status,

    /// List queued operations
    Queue,

    /// Write queued operations and unsynced records to a JSON file
    Export {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Drop every queued operation
    ClearQueue {
        /// Confirm dropping operations that were never delivered
        #[arg(long)]
        force: bool,
    },
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show effective settings
    Show,

    /// Set a value: endpoint, timeout, direction, auto-sync, monitor-interval
    Set {
        /// Setting name
        key: String,

        /// New value
        value: String,
    },
}

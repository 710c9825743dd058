//! Collection kinds and their remote sheet names.
//!
//! The set of collections is closed. Each kind is bound to its local table,
//! its remote sheet and its field schema here, so nothing downstream has to
//! dispatch on collection-name strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::model::entries::{DopamineEntry, Entry, HygieneCompletion, HygieneHabit, MoodEntry};

/// A local record collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    /// Daily pass/fail status log.
    DopamineEntries,
    /// Habit definitions.
    HygieneHabits,
    /// One completion flag per habit per day.
    HygieneCompletions,
    /// Daily mood ratings.
    MoodEntries,
}

impl Collection {
    /// Every collection, in sync order.
    ///
    /// Habits come before completions so a fresh remote sees a habit row
    /// before the completions that point at it.
    pub const ALL: [Self; 4] = [
        Self::DopamineEntries,
        Self::HygieneHabits,
        Self::HygieneCompletions,
        Self::MoodEntries,
    ];

    /// Collection name as used in exports and the persisted queue.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::DopamineEntries => "dopamineEntries",
            Self::HygieneHabits => "hygieneHabits",
            Self::HygieneCompletions => "hygieneCompletions",
            Self::MoodEntries => "moodEntries",
        }
    }

    /// SQLite table holding this collection.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::DopamineEntries => "dopamine_entries",
            Self::HygieneHabits => "hygiene_habits",
            Self::HygieneCompletions => "hygiene_completions",
            Self::MoodEntries => "mood_entries",
        }
    }

    /// Remote sheet this collection is mirrored to.
    #[must_use]
    pub const fn sheet(self) -> Sheet {
        match self {
            Self::DopamineEntries => Sheet::Dopamine,
            Self::HygieneHabits => Sheet::HygieneHabits,
            Self::HygieneCompletions => Sheet::HygieneCompletions,
            Self::MoodEntries => Sheet::Mood,
        }
    }

    /// Whether records are unique per `date` (upsert-by-date).
    #[must_use]
    pub const fn is_daily(self) -> bool {
        matches!(self, Self::DopamineEntries | Self::MoodEntries)
    }

    /// Check a field payload against this collection's schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidField`] if a field is missing, has the wrong
    /// type, or fails a range/format check.
    pub fn validate(self, fields: &Map<String, Value>) -> Result<()> {
        match self {
            Self::DopamineEntries => DopamineEntry::from_fields(fields)?.check(),
            Self::HygieneHabits => HygieneHabit::from_fields(fields)?.check(),
            Self::HygieneCompletions => HygieneCompletion::from_fields(fields)?.check(),
            Self::MoodEntries => MoodEntry::from_fields(fields)?.check(),
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Collection {
    type Err = Error;

    /// Accepts collection names, sheet names and short aliases.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "dopamineentries" | "dopamine" => Ok(Self::DopamineEntries),
            "hygienehabits" | "habits" | "habit" => Ok(Self::HygieneHabits),
            "hygienecompletions" | "completions" | "completion" => Ok(Self::HygieneCompletions),
            "moodentries" | "mood" => Ok(Self::MoodEntries),
            other => Err(Error::InvalidArgument(format!(
                "Unknown collection: {other} (expected dopamine, habits, completions, or mood)"
            ))),
        }
    }
}

/// A sheet on the remote spreadsheet endpoint.
///
/// Serialized with the exact sheet names the endpoint expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sheet {
    Dopamine,
    HygieneHabits,
    HygieneCompletions,
    Mood,
}

impl Sheet {
    /// Sheet name sent as the `sheet` query parameter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dopamine => "Dopamine",
            Self::HygieneHabits => "HygieneHabits",
            Self::HygieneCompletions => "HygieneCompletions",
            Self::Mood => "Mood",
        }
    }

    /// Local collection backing this sheet.
    #[must_use]
    pub const fn collection(self) -> Collection {
        match self {
            Self::Dopamine => Collection::DopamineEntries,
            Self::HygieneHabits => Collection::HygieneHabits,
            Self::HygieneCompletions => Collection::HygieneCompletions,
            Self::Mood => Collection::MoodEntries,
        }
    }
}

impl fmt::Display for Sheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

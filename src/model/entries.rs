//! Typed field payloads for each collection.
//!
//! Records are stored and transported as JSON objects; these structs give the
//! payloads a schema. Conversion goes through `serde_json`, so unknown keys
//! coming back from the spreadsheet are tolerated and missing optional keys
//! take their defaults.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::model::Collection;
use crate::validate::{validate_date, validate_rating};

/// A collection-specific field payload.
pub trait Entry: Serialize + DeserializeOwned {
    /// The collection this payload belongs to.
    const COLLECTION: Collection;

    /// Parse a payload out of a raw field map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidField`] if a required field is missing or has
    /// the wrong type.
    fn from_fields(fields: &Map<String, Value>) -> Result<Self> {
        serde_json::from_value(Value::Object(fields.clone())).map_err(|e| Error::InvalidField {
            collection: Self::COLLECTION.name().to_string(),
            message: e.to_string(),
        })
    }

    /// Convert the payload back into a raw field map.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn into_fields(self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(Error::Other(format!(
                "{} payload serialized to non-object: {other}",
                Self::COLLECTION
            ))),
        }
    }

    /// Range and format checks beyond what deserialization enforces.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidField`] describing the first failed check.
    fn check(&self) -> Result<()>;
}

fn invalid<E: Entry>(message: String) -> Error {
    Error::InvalidField {
        collection: E::COLLECTION.name().to_string(),
        message,
    }
}

// ── Dopamine ──────────────────────────────────────────────────

/// Outcome of a day on the dopamine log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DopamineStatus {
    Passed,
    Failed,
}

impl DopamineStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for DopamineStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match crate::validate::normalize_dopamine_status(s) {
            Ok(status) if status == "passed" => Ok(Self::Passed),
            Ok(_) => Ok(Self::Failed),
            Err((input, suggestion)) => {
                let hint = suggestion.map_or(String::new(), |s| format!(" (did you mean '{s}'?)"));
                Err(Error::InvalidArgument(format!(
                    "Unknown status '{input}'{hint}; expected passed or failed"
                )))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DopamineEntry {
    pub date: String,
    pub status: DopamineStatus,
    #[serde(default)]
    pub notes: String,
}

impl Entry for DopamineEntry {
    const COLLECTION: Collection = Collection::DopamineEntries;

    fn check(&self) -> Result<()> {
        validate_date(&self.date).map_err(invalid::<Self>)?;
        Ok(())
    }
}

// ── Hygiene ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HygieneHabit {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub order: i64,
}

impl Entry for HygieneHabit {
    const COLLECTION: Collection = Collection::HygieneHabits;

    fn check(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(invalid::<Self>("habit name cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Habits created on first run.
pub const DEFAULT_HABITS: [(&str, &str); 5] = [
    ("Brush Teeth", "Morning and evening routine"),
    ("Face Wash", "Cleanse and refresh your skin"),
    ("Bath / Shower", "Full body cleanse"),
    ("Hair Care", "Style and maintain hair"),
    ("Perfume / Cologne", "Apply your favorite scent"),
];

/// Whether a habit was done on a given day.
///
/// `habit_id` is the habit's local id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HygieneCompletion {
    pub habit_id: i64,
    pub date: String,
    pub completed: bool,
}

impl Entry for HygieneCompletion {
    const COLLECTION: Collection = Collection::HygieneCompletions;

    fn check(&self) -> Result<()> {
        if self.habit_id <= 0 {
            return Err(invalid::<Self>(format!(
                "habitId must be positive, got {}",
                self.habit_id
            )));
        }
        validate_date(&self.date).map_err(invalid::<Self>)?;
        Ok(())
    }
}

// ── Mood ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoodEntry {
    pub date: String,
    pub mood: i64,
    pub energy: i64,
    pub numb: i64,
    #[serde(default)]
    pub notes: String,
}

impl Entry for MoodEntry {
    const COLLECTION: Collection = Collection::MoodEntries;

    fn check(&self) -> Result<()> {
        validate_date(&self.date).map_err(invalid::<Self>)?;
        validate_rating("mood", self.mood).map_err(invalid::<Self>)?;
        validate_rating("energy", self.energy).map_err(invalid::<Self>)?;
        validate_rating("numb", self.numb).map_err(invalid::<Self>)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_mood_rating_out_of_range() {
        let fields = map(json!({"date": "2024-01-01", "mood": 6, "energy": 3, "numb": 2}));
        let entry = MoodEntry::from_fields(&fields).unwrap();
        let err = entry.check().unwrap_err();
        assert!(err.to_string().contains("mood must be between 1 and 5"));
    }

    #[test]
    fn test_missing_field_is_invalid() {
        let fields = map(json!({"date": "2024-01-01", "mood": 3}));
        let err = MoodEntry::from_fields(&fields).unwrap_err();
        assert!(matches!(err, Error::InvalidField { .. }));
    }

    #[test]
    fn test_completion_uses_camel_case() {
        let completion = HygieneCompletion {
            habit_id: 3,
            date: "2024-01-01".to_string(),
            completed: true,
        };
        let fields = completion.into_fields().unwrap();
        assert_eq!(fields["habitId"], 3);
        assert!(fields.get("habit_id").is_none());
    }

    #[test]
    fn test_dopamine_status_parsing() {
        assert_eq!("pass".parse::<DopamineStatus>().unwrap(), DopamineStatus::Passed);
        assert_eq!("Failed".parse::<DopamineStatus>().unwrap(), DopamineStatus::Failed);
        let err = "pased".parse::<DopamineStatus>().unwrap_err();
        assert!(err.to_string().contains("did you mean 'passed'"));
    }

    #[test]
    fn test_optional_fields_default() {
        let fields = map(json!({"name": "Floss"}));
        let habit = HygieneHabit::from_fields(&fields).unwrap();
        assert_eq!(habit.order, 0);
        assert!(habit.description.is_empty());
        assert!(habit.check().is_ok());

        let blank = map(json!({"name": "  "}));
        assert!(HygieneHabit::from_fields(&blank).unwrap().check().is_err());
    }
}

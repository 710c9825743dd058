//! Stored records and remote rows.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::model::Collection;

/// Keys that carry bookkeeping rather than record fields.
///
/// They are stripped from incoming payloads so a row fetched from the
/// spreadsheet can't smuggle its own `synced` flag or id into `fields`.
pub const RESERVED_KEYS: [&str; 5] = ["id", "synced", "createdAt", "remoteId", "googleId"];

/// Drop [`RESERVED_KEYS`] from a field map.
#[must_use]
pub fn strip_reserved(mut fields: Map<String, Value>) -> Map<String, Value> {
    for key in RESERVED_KEYS {
        fields.remove(key);
    }
    fields
}

/// Identifier assigned by the remote spreadsheet.
///
/// The endpoint returns row ids as numbers or strings depending on the
/// sheet; both normalize to a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract an id from a JSON value, if it holds a usable one.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(Self(s.trim().to_string())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for RemoteId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid remote id: {value}")))
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RemoteId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A record in the local store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Store-assigned id, stable for the lifetime of the record.
    pub local_id: i64,
    pub collection: Collection,
    /// Set once the remote confirms a write; never reassigned.
    pub remote_id: Option<RemoteId>,
    /// True iff the local state matches a confirmed remote write.
    pub synced: bool,
    pub fields: Map<String, Value>,
    /// Creation time, refreshed on each local mutation.
    pub created_at: DateTime<Utc>,
}

impl Record {
    /// Fields plus `createdAt`, as sent to the remote on add/update.
    #[must_use]
    pub fn payload(&self) -> Map<String, Value> {
        let mut payload = self.fields.clone();
        payload.insert(
            "createdAt".to_string(),
            Value::String(self.created_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        payload
    }

    /// Read a string field.
    #[must_use]
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Read an integer field.
    #[must_use]
    pub fn field_i64(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(Value::as_i64)
    }
}

/// A row as returned by the remote `getAll` action.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRecord {
    pub id: RemoteId,
    pub fields: Map<String, Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl RemoteRecord {
    /// Parse a remote row. Returns `None` for non-objects and rows without
    /// a usable `id`.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(map) = value else {
            return None;
        };
        let id = map.get("id").and_then(RemoteId::from_value)?;
        let created_at = map
            .get("createdAt")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Some(Self {
            id,
            fields: strip_reserved(map),
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remote_id_accepts_numbers_and_strings() {
        let from_num: RemoteId = serde_json::from_value(json!(42)).unwrap();
        let from_str: RemoteId = serde_json::from_value(json!("42")).unwrap();
        assert_eq!(from_num, from_str);
        assert!(serde_json::from_value::<RemoteId>(json!(null)).is_err());
        assert!(serde_json::from_value::<RemoteId>(json!("")).is_err());
    }

    #[test]
    fn test_remote_record_strips_reserved_keys() {
        let row = json!({
            "id": 7,
            "date": "2024-01-01",
            "mood": 4,
            "synced": false,
            "createdAt": "2024-01-01T08:00:00.000Z"
        });
        let record = RemoteRecord::from_value(row).unwrap();
        assert_eq!(record.id.as_str(), "7");
        assert_eq!(record.fields.len(), 2);
        assert!(record.fields.get("synced").is_none());
        assert!(record.created_at.is_some());
    }

    #[test]
    fn test_remote_record_without_id_is_skipped() {
        assert!(RemoteRecord::from_value(json!({"date": "2024-01-01"})).is_none());
        assert!(RemoteRecord::from_value(json!([1, 2])).is_none());
    }

    #[test]
    fn test_payload_includes_created_at() {
        let record = Record {
            local_id: 1,
            collection: Collection::MoodEntries,
            remote_id: None,
            synced: false,
            fields: json!({"date": "2024-01-01"}).as_object().cloned().unwrap(),
            created_at: Utc::now(),
        };
        let payload = record.payload();
        assert!(payload.contains_key("createdAt"));
        assert_eq!(payload["date"], "2024-01-01");
    }
}

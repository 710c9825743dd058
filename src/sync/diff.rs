//! Diff between a local collection and a remote snapshot.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::model::{Record, RemoteId, RemoteRecord};
use crate::sync::types::{Change, ChangeKind};

/// Fields never compared: they describe sync state, not content.
pub const IGNORED_FIELDS: [&str; 2] = ["synced", "createdAt"];

/// Compute the changes that make `remote` match `local`.
///
/// Records are keyed by remote id. Each local record yields an `add` when
/// the remote has no row with its id (or it has no id yet) and an `update`
/// when the row differs; every remote row with no local counterpart yields a
/// `delete`. Field comparison is shallow value equality.
///
/// Adds and updates come first in local order, then deletes in remote order.
#[must_use]
pub fn find_changes(local: &[Record], remote: &[RemoteRecord]) -> Vec<Change> {
    let remote_by_id: HashMap<&RemoteId, &RemoteRecord> =
        remote.iter().map(|r| (&r.id, r)).collect();
    let mut matched: HashSet<&RemoteId> = HashSet::new();
    let mut changes = Vec::new();

    for record in local {
        let counterpart = record
            .remote_id
            .as_ref()
            .and_then(|id| remote_by_id.get(id).copied());

        match counterpart {
            None => changes.push(Change {
                kind: ChangeKind::Add,
                local_id: Some(record.local_id),
                remote_id: record.remote_id.clone(),
                data: record.payload(),
            }),
            Some(row) => {
                matched.insert(&row.id);
                if fields_differ(&record.fields, &row.fields) {
                    changes.push(Change {
                        kind: ChangeKind::Update,
                        local_id: Some(record.local_id),
                        remote_id: Some(row.id.clone()),
                        data: record.payload(),
                    });
                }
            }
        }
    }

    let mut deleted: HashSet<&RemoteId> = HashSet::new();
    for row in remote {
        if !matched.contains(&row.id) && deleted.insert(&row.id) {
            changes.push(Change {
                kind: ChangeKind::Delete,
                local_id: None,
                remote_id: Some(row.id.clone()),
                data: Map::new(),
            });
        }
    }

    changes
}

/// Whether two field maps differ on any compared key.
#[must_use]
pub fn fields_differ(a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
    a.keys()
        .chain(b.keys())
        .filter(|k| !IGNORED_FIELDS.contains(&k.as_str()))
        .any(|k| a.get(k) != b.get(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Collection;
    use chrono::Utc;
    use serde_json::json;

    fn local(local_id: i64, remote_id: Option<&str>, fields: Value) -> Record {
        Record {
            local_id,
            collection: Collection::MoodEntries,
            remote_id: remote_id.map(RemoteId::new),
            synced: remote_id.is_some(),
            fields: fields.as_object().cloned().unwrap(),
            created_at: Utc::now(),
        }
    }

    fn remote(id: &str, fields: Value) -> RemoteRecord {
        RemoteRecord {
            id: RemoteId::new(id),
            fields: fields.as_object().cloned().unwrap(),
            created_at: None,
        }
    }

    fn kinds(changes: &[Change]) -> Vec<ChangeKind> {
        changes.iter().map(|c| c.kind).collect()
    }

    #[test]
    fn test_classifies_add_update_delete() {
        let local_set = vec![
            local(1, None, json!({"date": "2024-01-01", "mood": 4})),
            local(2, Some("a"), json!({"date": "2024-01-02", "mood": 3})),
            local(3, Some("b"), json!({"date": "2024-01-03", "mood": 1})),
        ];
        let remote_set = vec![
            remote("a", json!({"date": "2024-01-02", "mood": 3})),
            remote("b", json!({"date": "2024-01-03", "mood": 5})),
            remote("c", json!({"date": "2023-12-31", "mood": 2})),
        ];

        let changes = find_changes(&local_set, &remote_set);
        assert_eq!(
            kinds(&changes),
            vec![ChangeKind::Add, ChangeKind::Update, ChangeKind::Delete]
        );
        assert_eq!(changes[0].local_id, Some(1));
        assert_eq!(changes[1].remote_id, Some(RemoteId::new("b")));
        assert_eq!(changes[1].data["mood"], 1);
        assert_eq!(changes[2].remote_id, Some(RemoteId::new("c")));
    }

    #[test]
    fn test_identical_sets_have_no_changes() {
        let local_set = vec![
            local(1, Some("a"), json!({"date": "2024-01-01", "mood": 4})),
            local(2, Some("b"), json!({"date": "2024-01-02", "mood": 2})),
        ];
        let remote_set = vec![
            remote("a", json!({"date": "2024-01-01", "mood": 4})),
            remote("b", json!({"date": "2024-01-02", "mood": 2})),
        ];
        assert!(find_changes(&local_set, &remote_set).is_empty());
    }

    #[test]
    fn test_ignores_sync_state_fields() {
        let a = json!({"mood": 4, "createdAt": "2024-01-01T00:00:00Z", "synced": true});
        let b = json!({"mood": 4, "createdAt": "2025-06-01T00:00:00Z"});
        assert!(!fields_differ(
            a.as_object().unwrap(),
            b.as_object().unwrap()
        ));
    }

    #[test]
    fn test_missing_key_counts_as_difference() {
        let a = json!({"mood": 4, "notes": "tired"});
        let b = json!({"mood": 4});
        assert!(fields_differ(a.as_object().unwrap(), b.as_object().unwrap()));
    }

    #[test]
    fn test_local_id_without_remote_row_is_add() {
        // The remote row was removed elsewhere; the record is still local.
        let local_set = vec![local(1, Some("gone"), json!({"mood": 4}))];
        let changes = find_changes(&local_set, &[]);
        assert_eq!(kinds(&changes), vec![ChangeKind::Add]);
        assert_eq!(changes[0].remote_id, Some(RemoteId::new("gone")));
    }

    #[test]
    fn test_empty_local_deletes_everything() {
        let remote_set = vec![remote("a", json!({})), remote("b", json!({}))];
        let changes = find_changes(&[], &remote_set);
        assert_eq!(kinds(&changes), vec![ChangeKind::Delete, ChangeKind::Delete]);
    }
}

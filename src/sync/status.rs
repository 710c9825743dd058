//! Sync status display.
//!
//! Collects per-collection record counts, queue depth and the last push/pull
//! times into a [`SyncStatus`], and prints it for humans.

use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::error::Result;
use crate::model::Collection;
use crate::storage::LocalStore;
use crate::sync::file::file_size;
use crate::sync::queue::SyncQueue;
use crate::sync::types::{CollectionStatus, SyncStatus};

/// Get the current sync status.
///
/// # Errors
///
/// Returns an error if database queries fail.
pub fn get_sync_status(
    store: &LocalStore,
    queue: &SyncQueue,
    online: bool,
    endpoint: Option<&str>,
) -> Result<SyncStatus> {
    let entries = queue.entries();

    let mut collections = Vec::with_capacity(Collection::ALL.len());
    for collection in Collection::ALL {
        let stamp = store.sync_stamp(collection)?;
        collections.push(CollectionStatus {
            collection,
            total: store.count(collection)?,
            unsynced: store.count_unsynced(collection)?,
            queued: entries
                .iter()
                .filter(|e| e.collection() == collection)
                .count(),
            last_push_at: stamp.last_push_at,
            last_pull_at: stamp.last_pull_at,
        });
    }

    Ok(SyncStatus {
        online,
        endpoint: endpoint.map(str::to_string),
        queue_path: queue.path().display().to_string(),
        queue_size: entries.len(),
        queue_bytes: file_size(queue.path()),
        failing: entries.iter().filter(|e| e.attempts > 0).count(),
        collections,
    })
}

/// Print sync status to stdout in a human-readable format.
pub fn print_status(status: &SyncStatus) {
    println!("{}", "Sync Status".bold().underline());
    println!();

    match (&status.endpoint, status.online) {
        (None, _) => println!(
            "  Remote: {}",
            "not configured (run 'lt config set endpoint <url>')".yellow()
        ),
        (Some(url), true) => println!("  Remote: {} {}", url, "(online)".green()),
        (Some(url), false) => println!("  Remote: {} {}", url, "(offline)".red()),
    }
    println!();

    println!("{}", "Collections:".blue().bold());
    for c in &status.collections {
        let pending = if c.unsynced > 0 || c.queued > 0 {
            format!("{} unsynced, {} queued", c.unsynced, c.queued)
                .yellow()
                .to_string()
        } else {
            "in sync".green().to_string()
        };
        println!(
            "  {:<20} {:>5} records  {}",
            c.collection.to_string(),
            c.total,
            pending
        );
        println!(
            "  {:<20} pushed {}  pulled {}",
            "",
            format_when(c.last_push_at).dimmed(),
            format_when(c.last_pull_at).dimmed()
        );
    }
    println!();

    if status.queue_size > 0 {
        println!("{}", "Pending Queue:".yellow().bold());
        println!(
            "  {} operations ({})",
            status.queue_size,
            format_size(status.queue_bytes)
        );
        if status.failing > 0 {
            println!("  {} failed at least once", status.failing.to_string().red());
        }
        println!();
        println!("{}", "Run 'lt sync now' to deliver pending changes.".dimmed());
    } else if status.total_unsynced() > 0 {
        println!("{}", "Unsynced records not yet queued.".yellow());
        println!("{}", "Run 'lt sync push' to send them.".dimmed());
    } else if status.total_records() == 0 {
        println!("{}", "No data yet.".dimmed());
    } else {
        println!("{}", "Nothing pending.".green());
    }
}

fn format_when(when: Option<DateTime<Utc>>) -> String {
    when.map_or_else(
        || "never".to_string(),
        |t| t.format("%Y-%m-%d %H:%M").to_string(),
    )
}

/// Format a byte size as a human-readable string.
#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RemoteId;
    use crate::sync::types::{QueueAction, QueueEntry};
    use serde_json::json;
    use tempfile::TempDir;

    fn mood(date: &str) -> serde_json::Map<String, serde_json::Value> {
        json!({"date": date, "mood": 3, "energy": 3, "numb": 3})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
    }

    #[test]
    fn test_get_sync_status_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::open_memory().unwrap();
        let queue = SyncQueue::open(&temp_dir.path().join("queue.json")).unwrap();

        let status = get_sync_status(&store, &queue, false, None).unwrap();

        assert_eq!(status.collections.len(), 4);
        assert_eq!(status.queue_size, 0);
        assert_eq!(status.queue_bytes, 0);
        assert_eq!(status.total_records(), 0);
        assert!(status.endpoint.is_none());
    }

    #[test]
    fn test_get_sync_status_counts_pending() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::open_memory().unwrap();
        let queue = SyncQueue::open(&temp_dir.path().join("queue.json")).unwrap();

        let queued = store.create(Collection::MoodEntries, mood("2024-01-01")).unwrap();
        store.create(Collection::MoodEntries, mood("2024-01-02")).unwrap();
        let synced = store.create(Collection::MoodEntries, mood("2024-01-03")).unwrap();
        store
            .mark_synced(Collection::MoodEntries, synced, &RemoteId::new("9"))
            .unwrap();
        queue
            .enqueue(QueueEntry::for_record(
                Collection::MoodEntries,
                queued,
                QueueAction::Add,
                mood("2024-01-01"),
            ))
            .unwrap();

        let status = get_sync_status(&store, &queue, true, Some("https://example.test/exec")).unwrap();
        let mood_status = status
            .collections
            .iter()
            .find(|c| c.collection == Collection::MoodEntries)
            .unwrap();

        assert_eq!(mood_status.total, 3);
        assert_eq!(mood_status.unsynced, 2);
        assert_eq!(mood_status.queued, 1);
        assert_eq!(status.queue_size, 1);
        assert!(status.queue_bytes > 0);
        assert_eq!(status.failing, 0);
        assert_eq!(status.total_unsynced(), 2);
    }
}

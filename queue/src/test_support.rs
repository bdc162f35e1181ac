//! Test-only helpers for constructing queue documents and stores.

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use crate::core::builder::QueuePlan;
use crate::core::types::{ItemStatus, QueueDocument, QueueItem, SecretEntry};
use crate::io::store::QueueStore;

/// Fixed timestamp so serialized fixtures stay stable.
pub fn fixed_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_767_225_600, 0).expect("valid timestamp")
}

/// Create an item in `status` with the fields that status requires.
pub fn item(id: &str, status: ItemStatus) -> QueueItem {
    item_with_models(id, "guesser", "answerer", status)
}

/// Like [`item`] with explicit model ids.
pub fn item_with_models(id: &str, guesser: &str, answerer: &str, status: ItemStatus) -> QueueItem {
    let secret = SecretEntry::new("creature", "octopus");
    let mut item = QueueItem::pending(id, guesser, answerer, secret);
    item.status = status;
    match status {
        ItemStatus::Pending => {}
        ItemStatus::Running => item.run_id = Some(format!("run-{id}")),
        ItemStatus::Completed => {
            item.run_id = Some(format!("run-{id}"));
            item.completed_at = Some(fixed_time());
        }
        ItemStatus::Failed => {
            item.run_id = Some(format!("run-{id}"));
            item.completed_at = Some(fixed_time());
            item.error = Some("scripted failure".to_string());
        }
    }
    item
}

/// Wrap items in a document. `completedCount` starts at 0; tests set it when needed.
pub fn document(items: Vec<QueueItem>) -> QueueDocument {
    QueueDocument::new(fixed_time(), items)
}

/// Small deterministic plan: 3 guessers × 2 answerers × 5 secrets.
pub fn sample_plan() -> QueuePlan {
    QueuePlan {
        guessers: vec!["gpt5_2_high".into(), "gemini3Pro_high".into(), "grok4".into()],
        answerers: vec!["claudeSonnet4_5_high".into(), "kimi_k2_5".into()],
        secrets: vec![
            SecretEntry::new("celebrity", "Taylor Swift"),
            SecretEntry::new("creature", "tardigrade"),
            SecretEntry::new("historical figure", "Hammurabi"),
            SecretEntry::new("place", "Svalbard"),
            SecretEntry::new("historical event", "D-Day"),
        ],
        iterations: 1,
    }
}

/// Store rooted in a fresh temp directory. Keep the `TempDir` alive for the test.
pub fn temp_store() -> (TempDir, QueueStore) {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = QueueStore::new(temp.path().join("state").join("queue.json"));
    (temp, store)
}

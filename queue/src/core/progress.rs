//! Progress accounting over item statuses.

use serde::Serialize;

use crate::core::types::{ItemStatus, QueueDocument};

/// Snapshot of queue progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub running: usize,
    pub failed: usize,
    /// `round(100 * completed / total)`, half rounds up; 0 for an empty queue.
    pub percent_complete: u32,
}

/// Count items by status. Never fails, including for an empty document.
pub fn progress(doc: &QueueDocument) -> Progress {
    let mut summary = Progress {
        total: doc.items.len(),
        completed: 0,
        pending: 0,
        running: 0,
        failed: 0,
        percent_complete: 0,
    };
    for item in &doc.items {
        match item.status {
            ItemStatus::Pending => summary.pending += 1,
            ItemStatus::Running => summary.running += 1,
            ItemStatus::Completed => summary.completed += 1,
            ItemStatus::Failed => summary.failed += 1,
        }
    }
    summary.percent_complete = percent(summary.completed, summary.total);
    summary
}

fn percent(completed: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let scaled = (200 * completed as u64 + total as u64) / (2 * total as u64);
    scaled as u32
}

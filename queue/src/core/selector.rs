//! Deterministic selection of the next schedulable item.

use crate::core::types::{ItemStatus, QueueDocument, QueueItem};

/// First `pending` item in generation order.
///
/// Returns `None` once nothing is left to schedule.
pub fn next_pending(doc: &QueueDocument) -> Option<&QueueItem> {
    doc.items
        .iter()
        .find(|item| item.status == ItemStatus::Pending)
}

//! In-memory item state transitions.
//!
//! These functions only touch the document they are given. Persistence is the
//! store's job; it applies a transition to a copy and publishes the copy once
//! the write succeeds.

use chrono::{DateTime, Utc};

use crate::core::types::{ItemStatus, QueueDocument, Transition};
use crate::error::{QueueError, Result};

/// `pending → running`, recording the execution attempt id.
pub fn start_item(doc: &mut QueueDocument, id: &str, run_id: &str) -> Result<()> {
    if run_id.trim().is_empty() {
        return Err(QueueError::InvalidInput(format!(
            "run id for item '{id}' must be non-empty"
        )));
    }
    let item = doc
        .item_mut(id)
        .ok_or_else(|| QueueError::UnknownItem(id.to_string()))?;
    if item.status != ItemStatus::Pending {
        return Err(QueueError::InvalidTransition {
            id: id.to_string(),
            from: item.status,
            to: ItemStatus::Running,
        });
    }
    item.status = ItemStatus::Running;
    item.run_id = Some(run_id.to_string());
    Ok(())
}

/// `pending | running → completed`.
///
/// Repeating the call on a completed item is a no-op, so the counter is
/// incremented at most once per item.
pub fn complete_item(doc: &mut QueueDocument, id: &str, now: DateTime<Utc>) -> Result<Transition> {
    let item = doc
        .item_mut(id)
        .ok_or_else(|| QueueError::UnknownItem(id.to_string()))?;
    match item.status {
        ItemStatus::Completed => return Ok(Transition::Unchanged),
        ItemStatus::Failed => {
            return Err(QueueError::InvalidTransition {
                id: id.to_string(),
                from: item.status,
                to: ItemStatus::Completed,
            });
        }
        ItemStatus::Pending | ItemStatus::Running => {}
    }
    item.status = ItemStatus::Completed;
    item.completed_at = Some(now);
    doc.completed_count += 1;
    Ok(Transition::Applied)
}

/// `pending | running → failed`, keeping the diagnostic text.
///
/// A repeated call keeps the first error and timestamp.
pub fn fail_item(
    doc: &mut QueueDocument,
    id: &str,
    error: &str,
    now: DateTime<Utc>,
) -> Result<Transition> {
    let item = doc
        .item_mut(id)
        .ok_or_else(|| QueueError::UnknownItem(id.to_string()))?;
    match item.status {
        ItemStatus::Failed => return Ok(Transition::Unchanged),
        ItemStatus::Completed => {
            return Err(QueueError::InvalidTransition {
                id: id.to_string(),
                from: item.status,
                to: ItemStatus::Failed,
            });
        }
        ItemStatus::Pending | ItemStatus::Running => {}
    }
    item.status = ItemStatus::Failed;
    item.completed_at = Some(now);
    item.error = Some(error.to_string());
    Ok(Transition::Applied)
}

/// `running → pending` for every interrupted item. Returns how many were reset.
pub fn reset_running(doc: &mut QueueDocument) -> usize {
    let mut reset = 0;
    for item in doc
        .items
        .iter_mut()
        .filter(|item| item.status == ItemStatus::Running)
    {
        item.status = ItemStatus::Pending;
        item.run_id = None;
        reset += 1;
    }
    reset
}

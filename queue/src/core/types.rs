//! Persisted queue types.
//!
//! Field names serialize to camelCase so the document layout stays stable
//! across tools that read `queue.json`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Running => "running",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed => "failed",
        }
    }

    /// Completed and failed items are never scheduled again.
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Failed)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque `(category, secret)` pair the answerer knows and the guesser deduces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretEntry {
    pub category: String,
    pub secret: String,
}

impl SecretEntry {
    pub fn new(category: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            secret: secret.into(),
        }
    }
}

/// One scheduled benchmark run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,
    pub guesser_model_id: String,
    pub answerer_model_id: String,
    pub secret: SecretEntry,
    pub status: ItemStatus,
    /// Execution attempt identifier; join key for logged transcripts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueueItem {
    /// Fresh `pending` item.
    pub fn pending(
        id: impl Into<String>,
        guesser_model_id: impl Into<String>,
        answerer_model_id: impl Into<String>,
        secret: SecretEntry,
    ) -> Self {
        Self {
            id: id.into(),
            guesser_model_id: guesser_model_id.into(),
            answerer_model_id: answerer_model_id.into(),
            secret,
            status: ItemStatus::Pending,
            run_id: None,
            completed_at: None,
            error: None,
        }
    }
}

/// The whole durable unit (`queue.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueDocument {
    pub created_at: DateTime<Utc>,
    /// Fixed at generation; always equals `items.len()`.
    pub total_items: usize,
    /// Number of items that reached `completed`. Failed items do not count.
    pub completed_count: usize,
    pub items: Vec<QueueItem>,
}

impl QueueDocument {
    pub fn new(created_at: DateTime<Utc>, items: Vec<QueueItem>) -> Self {
        Self {
            created_at,
            total_items: items.len(),
            completed_count: 0,
            items,
        }
    }

    pub fn item(&self, id: &str) -> Option<&QueueItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub(crate) fn item_mut(&mut self, id: &str) -> Option<&mut QueueItem> {
        self.items.iter_mut().find(|item| item.id == id)
    }
}

/// Whether a transition changed the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// The item was already in the requested terminal status.
    Unchanged,
}

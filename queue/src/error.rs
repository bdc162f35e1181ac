//! Error types for queue storage and state transitions.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::types::ItemStatus;

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors surfaced by the queue store.
///
/// Item-level execution failures are not errors here: they are recorded on the
/// item via `mark_failed` and leave the document usable.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Persisted bytes could not be decoded as a valid queue document.
    #[error("corrupt queue document {}: {reason}", path.display())]
    CorruptDocument { path: PathBuf, reason: String },

    /// A transition named an item id that is not in the document.
    #[error("unknown queue item '{0}'")]
    UnknownItem(String),

    /// The requested transition is not allowed from the item's current status.
    #[error("item '{id}' cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: ItemStatus,
        to: ItemStatus,
    },

    /// Another dispatch session holds the queue lock.
    #[error("queue is locked by another session ({})", path.display())]
    Locked { path: PathBuf },

    /// Filesystem failure while reading or persisting state.
    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Document could not be encoded for persistence.
    #[error("serialize queue document: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Caller supplied input the operation cannot use.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The compiled-in document schema could not be loaded.
    #[error("queue schema unavailable: {0}")]
    Schema(String),
}

impl QueueError {
    pub(crate) fn io(
        action: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptDocument {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

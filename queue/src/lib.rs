//! Persistent benchmark work queue with crash recovery.
//!
//! A queue document lists every scheduled guesser × answerer × secret run and
//! tracks each one through `pending → running → completed | failed`. The
//! crate keeps a strict split:
//!
//! - **[`core`]**: Pure logic (generation, selection, transitions, progress,
//!   invariants). No I/O; time and randomness are injected.
//! - **[`io`]**: The durable [`QueueStore`](io::store::QueueStore) and the
//!   single-writer [`SessionLock`](io::lock::SessionLock).

pub mod core;
pub mod error;
pub mod io;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use crate::core::builder::{GenerationPolicy, QueuePlan, build_queue};
pub use crate::core::progress::Progress;
pub use crate::core::types::{ItemStatus, QueueDocument, QueueItem, SecretEntry, Transition};
pub use crate::error::{QueueError, Result};
pub use crate::io::lock::SessionLock;
pub use crate::io::store::QueueStore;

//! Deterministic, pure queue logic.
//!
//! Core modules must be free of I/O side effects. Time and randomness are
//! passed in so every operation is reproducible under test.

pub mod builder;
pub mod invariants;
pub mod progress;
pub mod reassign;
pub mod selector;
pub mod transitions;
pub mod types;

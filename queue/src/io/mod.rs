//! Side-effecting queue operations (filesystem persistence and locking).

pub mod lock;
pub mod store;

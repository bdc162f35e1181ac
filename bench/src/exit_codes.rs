//! Stable exit codes for bench CLI commands.

/// Command succeeded (or `bench next` found a pending item).
pub const OK: i32 = 0;
/// Command failed: bad config, corrupt or locked queue, or other errors.
pub const INVALID: i32 = 1;
/// `bench next` found no pending item.
pub const EXHAUSTED: i32 = 2;

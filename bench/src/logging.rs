//! Diagnostic tracing for bench sessions.
//!
//! - **Tracing (this module)**: Operator diagnostics via `RUST_LOG`, output to
//!   stderr. Not persisted.
//! - **Result log (`results`)**: Product artifacts appended to the JSONL
//!   results file. Always written, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn` if unset, which still surfaces
/// recoveries and failed runs.
///
/// # Example
/// ```bash
/// RUST_LOG=bench=info,queue=debug bench run
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

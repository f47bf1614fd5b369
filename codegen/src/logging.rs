//! Development-time tracing.
//!
//! Diagnostics go to stderr and are controlled by `RUST_LOG`. Results and
//! records are separate: the CLI prints results on stdout and the record
//! store persists them, regardless of the log filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=codegen=debug codegen run --repo https://github.com/owner/repo --prompt "..."
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

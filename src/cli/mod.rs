//! CLI command handlers

pub mod commands;

pub use commands::{calc, export, list, load, new_estimate, read_estimate, save, show, write_estimate};

use tracing_subscriber::EnvFilter;

/// Initialise `tracing` from `RUST_LOG`, falling back to `default_filter`.
///
/// Logs go to stderr so command output on stdout stays clean. Safe to call
/// more than once; later calls are no-ops.
pub fn init_logging(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

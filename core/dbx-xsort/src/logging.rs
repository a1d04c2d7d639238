//! Logging utilities for the DBX external sort
//!
//! Spill I/O is traced under two targets:
//!
//! - `xsort`: per-batch writes/reads of a spilled run, close summaries
//! - `spill`: stream opens, deletions and spill directory cleanup
//!
//! Without the `logging` feature every initializer is a no-op, so callers
//! never need their own `cfg`.

#[cfg(feature = "logging")]
use tracing_subscriber::{EnvFilter, fmt};

/// Targets emitted by this crate.
pub const TARGETS: [&str; 2] = ["xsort", "spill"];

/// Filter directive that applies `level` to the sort targets only; everything
/// else stays at `warn`.
///
/// ```rust
/// assert_eq!(
///     dbx_xsort::logging::directives("debug"),
///     "warn,xsort=debug,spill=debug"
/// );
/// ```
pub fn directives(level: &str) -> String {
    let mut out = String::from("warn");
    for target in TARGETS {
        out.push(',');
        out.push_str(target);
        out.push('=');
        out.push_str(level);
    }
    out
}

/// Initialize logging at `info` for the sort targets
///
/// # Environment Variables
/// - `RUST_LOG` - Overrides the filter entirely, e.g. `RUST_LOG=xsort=trace`
///
/// # Example
/// ```rust
/// dbx_xsort::logging::init();
/// ```
#[cfg(feature = "logging")]
pub fn init() {
    init_with_level("info")
}

/// Initialize logging with a specific level for the sort targets
///
/// A subscriber installed earlier (by the host engine, say) is left alone.
///
/// # Arguments
/// * `level` - Log level (trace, debug, info, warn, error)
///
/// # Example
/// ```rust
/// dbx_xsort::logging::init_with_level("debug");
/// ```
#[cfg(feature = "logging")]
pub fn init_with_level(level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(level)));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .try_init();
}

/// Initialize logging for tests: per-batch spill tracing, captured by the test harness.
#[cfg(feature = "logging")]
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new(directives("trace")))
        .with_test_writer()
        .try_init();
}

#[cfg(not(feature = "logging"))]
pub fn init() {}

#[cfg(not(feature = "logging"))]
pub fn init_with_level(_level: &str) {}

#[cfg(not(feature = "logging"))]
pub fn init_test() {}

//! Tracing subscriber setup
//!
//! `RUST_LOG` wins over the configured level. Logs go to stderr so command
//! output on stdout stays clean for piping.

use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor `level` parse
const FALLBACK_FILTER: &str = "warn";

pub fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(FALLBACK_FILTER))
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_for(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

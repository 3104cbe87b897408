//! Tracing setup driven by `[logging]` in the settings.
//!
//! `level` is an `EnvFilter` directive string, so besides a bare level it
//! accepts per-module overrides such as `info,chatrelay::hub=debug`.
//! `RUST_LOG` is not consulted.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

const FALLBACK_DIRECTIVES: &str = "info";

/// Parses the configured directives, falling back to `info` when they do
/// not parse.
pub fn filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives).unwrap_or_else(|e| {
        eprintln!("invalid logging.level {directives:?} ({e}), using {FALLBACK_DIRECTIVES}");
        EnvFilter::new(FALLBACK_DIRECTIVES)
    })
}

pub fn init(settings: &LoggingSettings) {
    // try_init: a second call (tests) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(&settings.level))
        .try_init();
}

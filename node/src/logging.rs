//! # Structured Logging
//!
//! Installs the global `tracing` subscriber for the node. Output goes to
//! stderr. `RUST_LOG` replaces [`DEFAULT_FILTER`] when it parses; a
//! malformed value is reported and the default is used instead.

use clap::ValueEnum;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Trade decisions at info, HTTP requests only when something goes wrong.
pub const DEFAULT_FILTER: &str = "shardtrade_node=info,shardtrade_protocol=info,tower_http=warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable, colored output.
    Pretty,
    /// One flat JSON object per line, for log aggregation.
    Json,
}

/// The filter built from `rust_log`, or [`DEFAULT_FILTER`] when it is
/// absent or malformed. The second value is the parse error, if any.
pub fn build_filter(rust_log: Option<&str>) -> (EnvFilter, Option<String>) {
    match rust_log.map(str::trim).filter(|s| !s.is_empty()) {
        Some(directives) => match EnvFilter::try_new(directives) {
            Ok(filter) => (filter, None),
            Err(e) => (EnvFilter::new(DEFAULT_FILTER), Some(e.to_string())),
        },
        None => (EnvFilter::new(DEFAULT_FILTER), None),
    }
}

/// Initialize the global tracing subscriber. Fails if one is already set.
pub fn init_logging(format: LogFormat) -> Result<(), TryInitError> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let (env_filter, rejected) = build_filter(rust_log.as_deref());

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_line_number(true),
            )
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init()?,
    }

    if let Some(error) = rejected {
        tracing::warn!(%error, fallback = DEFAULT_FILTER, "ignoring malformed RUST_LOG");
    }
    tracing::debug!(?format, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_blank_rust_log_uses_default() {
        for input in [None, Some(""), Some("   ")] {
            let (filter, rejected) = build_filter(input);
            assert_eq!(filter.to_string(), EnvFilter::new(DEFAULT_FILTER).to_string());
            assert!(rejected.is_none());
        }
    }

    #[test]
    fn valid_rust_log_wins() {
        let (filter, rejected) = build_filter(Some("shardtrade_protocol=trace"));
        assert_eq!(filter.to_string(), "shardtrade_protocol=trace");
        assert!(rejected.is_none());
    }

    #[test]
    fn malformed_rust_log_falls_back() {
        let (filter, rejected) = build_filter(Some("shardtrade_protocol=loud"));
        assert_eq!(filter.to_string(), EnvFilter::new(DEFAULT_FILTER).to_string());
        assert!(rejected.is_some());
    }
}

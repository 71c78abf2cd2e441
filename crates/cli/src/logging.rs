//! Logging setup for the captioner CLI.
//!
//! Supports two modes:
//! - Development: Pretty-printed human-readable logs
//! - Machine-readable: JSON-formatted logs
//!
//! Set `CAPTIONER_LOG_FORMAT=json` for JSON logs.
//! Set `RUST_LOG` to control log levels (default: info).
//!
//! Logs go to stderr so that captions on stdout stay pipeable.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Log format mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Pretty-printed human-readable logs (default).
    Pretty,
    /// JSON-formatted logs.
    Json,
}

impl LogFormat {
    /// Detect log format from environment.
    pub fn from_env() -> Self {
        Self::parse(&std::env::var("CAPTIONER_LOG_FORMAT").unwrap_or_default())
    }

    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Initialize the logging subsystem.
///
/// `level` is used when `RUST_LOG` is unset. Returns an error when a global
/// subscriber is already installed.
pub fn init(level: &str) -> anyhow::Result<()> {
    init_with_format(level, LogFormat::from_env())
}

/// Initialize the logging subsystem with a specific format.
pub fn init_with_format(level: &str, format: LogFormat) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let fmt_layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = match format {
        LogFormat::Pretty => Box::new(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        ),
        LogFormat::Json => Box::new(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE)
                .with_current_span(true)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        ),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("logging subscriber init failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse(""), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        // Case insensitive
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
    }

    #[test]
    fn init_twice_does_not_panic() {
        // The second call fails because a subscriber is already set; both
        // are allowed to race with other tests in this binary.
        let _ = init_with_format("warn", LogFormat::Pretty);
        assert!(init_with_format("warn", LogFormat::Json).is_err());
    }
}

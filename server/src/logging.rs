//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Filter priority:
//! 1. `--log-level` flag (if provided)
//! 2. `DEPLOYD_LOG` environment variable, any `EnvFilter` directive (e.g. "joblib=debug")
//! 3. `RUST_LOG`
//! 4. default to `info`

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogLevel;

const LOG_ENV: &str = "DEPLOYD_LOG";

/// Initialise the global subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(level) => EnvFilter::new(directive(level)),
        None => EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info")),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("cannot install log subscriber: {err}"))
}

fn directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use joblib::CoordinatorConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Trigger deploy scripts over HTTP and stream their logs back.
#[derive(Debug, Clone, Parser)]
#[command(name = "deployd", version, about)]
pub struct Config {
    /// Shared secret every trigger request must present.
    #[arg(long, env = "DEPLOY_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Directory holding job logs.
    #[arg(long, env = "DEPLOY_LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    /// JSON file listing the servers a deploy may target.
    #[arg(long, env = "DEPLOY_INVENTORY", default_value = "servers.json")]
    pub inventory: PathBuf,

    /// Deploy script run for every trigger unless the target overrides it.
    #[arg(long, env = "DEPLOY_SCRIPT", default_value = "./deploy.sh")]
    pub script: PathBuf,

    #[arg(long, env = "DEPLOY_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// Job logs older than this many days are removed on each trigger.
    #[arg(long, default_value_t = 7)]
    pub retention_days: u64,

    /// How long a stream waits for new output before checking the job again.
    #[arg(long, default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Prefix for the URLs returned by /trigger. Empty means relative URLs.
    #[arg(long, env = "DEPLOY_PUBLIC_URL", default_value = "")]
    pub public_url: String,

    /// Run the deploy script directly instead of through the exit status wrapper.
    #[arg(long)]
    pub no_exit_marker: bool,

    /// Overrides DEPLOYD_LOG and RUST_LOG.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            bail!("DEPLOY_TOKEN must not be empty");
        }
        if self.retention_days == 0 {
            bail!("--retention-days must be at least 1");
        }
        if self.poll_interval_ms == 0 {
            bail!("--poll-interval-ms must be at least 1");
        }
        Ok(())
    }

    pub fn coordinator_config(&self, log_dir: PathBuf) -> CoordinatorConfig {
        let mut config = CoordinatorConfig::new(log_dir);
        config.retention = Duration::from_secs(self.retention_days * 24 * 60 * 60);
        config.poll_interval = Duration::from_millis(self.poll_interval_ms);
        config.exit_marker = !self.no_exit_marker;
        config
    }

    pub fn public_url(&self) -> &str {
        self.public_url.trim_end_matches('/')
    }
}

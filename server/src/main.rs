mod config;
mod interceptors;
mod logging;
mod services;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use interceptors::token::TokenGuard;
use joblib::error::InventoryError;
use joblib::inventory::Inventory;
use joblib::launcher::ScriptLauncher;
use joblib::liveness::ProcessTableProbe;
use joblib::registry::JobRegistry;
use joblib::JobCoordinator;
use services::{AppState, SharedState};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    logging::init_logging(config.log_level)?;
    config.validate()?;

    let state = build_state(&config).await?;
    serve(config.bind, state).await
}

async fn build_state(config: &Config) -> Result<SharedState> {
    JobRegistry::new(&config.log_dir).ensure_dir().await?;
    // the liveness probe matches the log path as given on the deploy command line, so it must be
    // the same absolute path for every job regardless of how the directory was configured
    let log_dir = tokio::fs::canonicalize(&config.log_dir)
        .await
        .with_context(|| format!("cannot resolve log directory {}", config.log_dir.display()))?;

    let inventory = load_inventory(&config.inventory)?;
    if !config.script.exists() {
        warn!(script = %config.script.display(), "deploy script not found; triggers will fail until it exists");
    }
    let launcher = ScriptLauncher::new(&config.script).with_exit_marker(!config.no_exit_marker);

    info!(
        log_dir = %log_dir.display(),
        servers = inventory.servers().len(),
        script = %config.script.display(),
        "starting job coordinator"
    );
    let coordinator = JobCoordinator::spawn(
        config.coordinator_config(log_dir),
        inventory,
        Arc::new(launcher),
        Arc::new(ProcessTableProbe::default()),
    );

    Ok(Arc::new(AppState {
        coordinator,
        token: TokenGuard::new(&config.token),
        public_url: config.public_url().to_string(),
    }))
}

fn load_inventory(path: &Path) -> Result<Inventory> {
    match Inventory::load(path) {
        Ok(inventory) => Ok(inventory),
        Err(InventoryError::Read { source, .. }) if source.kind() == ErrorKind::NotFound => {
            warn!(inventory = %path.display(), "inventory file not found; only untargeted deploys are possible");
            Ok(Inventory::default())
        }
        Err(err) => Err(err.into()),
    }
}

async fn serve(addr: SocketAddr, state: SharedState) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, services::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutting down"),
        Err(err) => {
            warn!(error = %err, "cannot listen for ctrl-c; running until killed");
            std::future::pending::<()>().await
        }
    }
}

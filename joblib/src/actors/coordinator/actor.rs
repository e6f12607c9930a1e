use super::messages::CoordinatorMessage;
use super::CoordinatorConfig;
use crate::actors::tailer;
use crate::error::{self, TriggerError};
use crate::events::StatusLine;
use crate::inventory::{Inventory, Server};
use crate::launcher::Launcher;
use crate::liveness::LivenessProbe;
use crate::registry::JobRegistry;
use crate::retention;
use crate::types::JobId;
use chrono::Local;
use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

pub struct JobCoordinator {
    inbox: mpsc::Receiver<CoordinatorMessage>,
    config: CoordinatorConfig,
    registry: JobRegistry,
    inventory: Arc<Inventory>,
    launcher: Arc<dyn Launcher>,
    probe: Arc<dyn LivenessProbe>,
}

impl JobCoordinator {
    pub fn spawn(
        inbox: mpsc::Receiver<CoordinatorMessage>,
        config: CoordinatorConfig,
        inventory: Inventory,
        launcher: Arc<dyn Launcher>,
        probe: Arc<dyn LivenessProbe>,
    ) {
        let actor = Self {
            inbox,
            registry: JobRegistry::new(&config.log_dir),
            config,
            inventory: Arc::new(inventory),
            launcher,
            probe,
        };
        tokio::spawn(async move { actor.run().await });
    }

    /// Triggers are handled one at a time so a job's status lines and launch are never
    /// interleaved with another trigger's. Everything else only reads, and runs on its own task
    /// so a slow probe or a large log never holds up a trigger.
    async fn run(mut self) {
        use self::CoordinatorMessage::*;
        while let Some(msg) = self.inbox.recv().await {
            match msg {
                Trigger { target, response } => {
                    let result = self.trigger(target).await;
                    let _ = response.send(result);
                }
                ListJobs { response } => {
                    let registry = self.registry.clone();
                    fork(response, async move { registry.list().await });
                }
                ReadJob { job, response } => {
                    let registry = self.registry.clone();
                    fork(response, async move { registry.read(&job).await });
                }
                ReadJobBytes { job, response } => {
                    let registry = self.registry.clone();
                    fork(response, async move { registry.read_bytes(&job).await });
                }
                GetInfo { job, response } => {
                    let registry = self.registry.clone();
                    let probe = self.probe.clone();
                    fork(response, async move { registry.info(&job, probe.as_ref()).await });
                }
                StreamJob { job, response } => {
                    let registry = self.registry.clone();
                    let probe = self.probe.clone();
                    let poll_interval = self.config.poll_interval;
                    let exit_marker = self.config.exit_marker;
                    fork(response, async move {
                        let path = registry.existing_path(&job).await?;
                        Ok(tailer::spawn(path, probe, poll_interval, exit_marker))
                    });
                }
                ListServers { response } => {
                    let _ = response.send(self.inventory.servers().to_vec());
                }
                ResolveServer { ident, response } => {
                    let server = self.inventory.resolve(&ident).cloned();
                    let _ = response.send(server.map_err(error::Error::from));
                }
            }
        }
    }

    async fn trigger(&self, target: Option<String>) -> Result<JobId, TriggerError> {
        // unknown targets are rejected before anything touches the disk
        let server: Option<Server> = match target.as_deref() {
            Some(ident) => Some(self.inventory.resolve(ident)?.clone()),
            None => None,
        };

        let report =
            retention::sweep(self.registry.log_dir(), self.config.retention, SystemTime::now())
                .await;
        if !report.removed.is_empty() || report.errors > 0 {
            info!(
                removed = report.removed.len(),
                kept = report.kept,
                errors = report.errors,
                "retention sweep"
            );
        }

        self.registry
            .ensure_dir()
            .await
            .map_err(TriggerError::Registry)?;
        let job = self
            .registry
            .create_job(Local::now().naive_local())
            .await
            .map_err(TriggerError::Registry)?;
        let target_ip = server.as_ref().map(|s| s.ip.as_str());
        self.status(&job, StatusLine::Received { target: target_ip })
            .await
            .map_err(TriggerError::Registry)?;

        let log_path = self.registry.path(&job);
        match self.launcher.launch(&log_path, server.as_ref()) {
            Ok(pid) => {
                info!(%job, pid, target = target_ip, "deploy triggered");
                // the process is running now; failing to annotate its log must not fail the job
                for line in [StatusLine::Spawned { pid }, StatusLine::Streaming] {
                    if let Err(err) = self.status(&job, line).await {
                        warn!(%job, error = %err, "cannot write status line");
                    }
                }
                Ok(job)
            }
            Err(source) => {
                error!(%job, error = %source, "deploy process failed to start");
                if let Err(err) = self
                    .status(&job, StatusLine::LaunchFailed { error: &source })
                    .await
                {
                    warn!(%job, error = %err, "cannot record launch failure");
                }
                Err(TriggerError::Launch { job, source })
            }
        }
    }

    async fn status(&self, job: &JobId, line: StatusLine<'_>) -> error::Result<()> {
        self.registry.append_line(job, &line.to_string()).await
    }
}

/// Answer `response` from a task of its own.
fn fork<T, F>(response: oneshot::Sender<T>, work: F)
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    tokio::spawn(async move {
        let _ = response.send(work.await);
    });
}

mod actor;
mod messages;

use self::{
    actor::JobCoordinator,
    messages::CoordinatorMessage::{
        self, GetInfo, ListJobs, ListServers, ReadJob, ReadJobBytes, ResolveServer, StreamJob,
        Trigger,
    },
};
use crate::actors::tailer::DEFAULT_POLL_INTERVAL;
use crate::error::{self, Error, TriggerError};
use crate::events::{JobInfo, TailEvent};
use crate::inventory::{Inventory, Server};
use crate::launcher::Launcher;
use crate::liveness::LivenessProbe;
use crate::retention::DEFAULT_RETENTION;
use crate::types::JobId;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    pub log_dir: PathBuf,
    /// Job logs older than this are swept on each trigger.
    pub retention: Duration,
    /// Sleep between liveness probes while a stream waits for output.
    pub poll_interval: Duration,
    /// Whether deploys are launched with the exit-status wrapper, so streams may complete on its
    /// marker line. Must match the launcher.
    pub exit_marker: bool,
    /// Capacity of the coordinator's message queue.
    pub message_capacity: usize,
}

impl CoordinatorConfig {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            retention: DEFAULT_RETENTION,
            poll_interval: DEFAULT_POLL_INTERVAL,
            exit_marker: true,
            message_capacity: 64,
        }
    }
}

/// A `JobCoordinator` which accepts deploy triggers and answers questions about jobs.
///
/// This struct is actually an actor handle, the real work is done in the actor spawned by
/// `JobCoordinatorHandle::spawn`. The handle can be cloned freely into request handlers without
/// any locking; every clone talks to the same actor.
#[derive(Clone)]
pub struct JobCoordinatorHandle {
    sender: mpsc::Sender<CoordinatorMessage>,
}

impl JobCoordinatorHandle {
    /// Spawn a new coordinator. Must be called from within a tokio runtime.
    pub fn spawn(
        config: CoordinatorConfig,
        inventory: Inventory,
        launcher: Arc<dyn Launcher>,
        probe: Arc<dyn LivenessProbe>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.message_capacity);
        JobCoordinator::spawn(receiver, config, inventory, launcher, probe);
        Self { sender }
    }

    /// Accept a deploy request: validate the target, sweep old logs, create the job log and
    /// start the deploy process.
    ///
    /// `Ok` means the process was started, not that the deployment succeeded; the outcome is
    /// only visible in the job's log. A `Launch` error still leaves a log behind that records
    /// the failure.
    pub async fn trigger(&self, target: Option<String>) -> Result<JobId, TriggerError> {
        self.request(|response| Trigger { target, response })
            .await
            .map_err(|_| TriggerError::CoordinatorExited)?
    }

    /// All job logs, most recent first.
    pub async fn list_jobs(&self) -> error::Result<Vec<JobId>> {
        self.request(|response| ListJobs { response }).await?
    }

    pub async fn read_job(&self, job: JobId) -> error::Result<String> {
        self.request(|response| ReadJob { job, response }).await?
    }

    /// Raw log contents, for downloads.
    pub async fn read_job_bytes(&self, job: JobId) -> error::Result<Vec<u8>> {
        self.request(|response| ReadJobBytes { job, response }).await?
    }

    pub async fn job_info(&self, job: JobId) -> error::Result<JobInfo> {
        self.request(|response| GetInfo { job, response }).await?
    }

    /// Stream a job's log from the beginning; see [`crate::actors::tailer::spawn`].
    pub async fn stream_job(&self, job: JobId) -> error::Result<mpsc::Receiver<TailEvent>> {
        self.request(|response| StreamJob { job, response }).await?
    }

    pub async fn servers(&self) -> error::Result<Vec<Server>> {
        self.request(|response| ListServers { response }).await
    }

    pub async fn resolve_server(&self, ident: String) -> error::Result<Server> {
        self.request(|response| ResolveServer { ident, response })
            .await?
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> CoordinatorMessage,
    ) -> error::Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(message(tx))
            .await
            .map_err(|_| Error::CoordinatorExited)?;
        rx.await.map_err(|_| Error::CoordinatorExited)
    }
}

use crate::error::{self, TriggerError};
use crate::events::{JobInfo, TailEvent};
use crate::inventory::Server;
use crate::types::JobId;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug)]
pub enum CoordinatorMessage {
    Trigger {
        target: Option<String>,
        response: oneshot::Sender<Result<JobId, TriggerError>>,
    },
    ListJobs {
        response: oneshot::Sender<error::Result<Vec<JobId>>>,
    },
    ReadJob {
        job: JobId,
        response: oneshot::Sender<error::Result<String>>,
    },
    ReadJobBytes {
        job: JobId,
        response: oneshot::Sender<error::Result<Vec<u8>>>,
    },
    GetInfo {
        job: JobId,
        response: oneshot::Sender<error::Result<JobInfo>>,
    },
    StreamJob {
        job: JobId,
        response: oneshot::Sender<error::Result<mpsc::Receiver<TailEvent>>>,
    },
    ListServers {
        response: oneshot::Sender<Vec<Server>>,
    },
    ResolveServer {
        ident: String,
        response: oneshot::Sender<error::Result<Server>>,
    },
}

use crate::types::JobId;
use std::{io, path::PathBuf, result};
use thiserror;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("no such job: {0}")]
    NotFound(JobId),
    #[error("invalid log file name: {0:?}")]
    InvalidName(String),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    #[error("job coordinator exited")]
    CoordinatorExited,
}

pub type Result<T> = result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// The process table as a whole could not be inspected.
///
/// This is never a "not running" answer: callers must treat it as inconclusive.
#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("cannot enumerate processes under {}: {source}", root.display())]
    Enumerate {
        root: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("process scan aborted: {0}")]
    Aborted(String),
}

#[derive(thiserror::Error, Debug)]
pub enum InventoryError {
    #[error("unknown server: {0}")]
    Unknown(String),
    #[error("server {0} is not active")]
    Inactive(String),
    #[error("duplicate inventory entry for {0}")]
    Duplicate(String),
    #[error("cannot read inventory {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse inventory {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum TriggerError {
    #[error(transparent)]
    Target(#[from] InventoryError),
    #[error("cannot create job log: {0}")]
    Registry(#[source] Error),
    #[error("failed to start deploy process for {job}: {source}")]
    Launch {
        job: JobId,
        #[source]
        source: io::Error,
    },
    #[error("job coordinator exited")]
    CoordinatorExited,
}

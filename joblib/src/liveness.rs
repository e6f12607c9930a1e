//! Deciding whether a job is still executing.
//!
//! Deploy processes are launched detached and the server keeps no handle to them, so liveness is
//! re-derived from the process table: a job is running while any process has the job's log path
//! in its command line. This is a heuristic. "No such process" is equally true for a deploy that
//! finished cleanly, one that crashed on startup, and a stale log from a previous server, which is
//! why the launcher also appends an explicit exit marker that the tailer prefers when present.

use crate::error::ProbeError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Whether some process still references `log_path`.
    ///
    /// An `Err` means the answer is unknown, not that the job is finished.
    async fn is_running(&self, log_path: &Path) -> Result<bool, ProbeError>;
}

/// Scans `/proc/<pid>/cmdline` for the log path.
#[derive(Clone, Debug)]
pub struct ProcessTableProbe {
    proc_root: PathBuf,
}

impl Default for ProcessTableProbe {
    fn default() -> Self {
        Self::with_root("/proc")
    }
}

impl ProcessTableProbe {
    pub fn with_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }
}

#[async_trait]
impl LivenessProbe for ProcessTableProbe {
    async fn is_running(&self, log_path: &Path) -> Result<bool, ProbeError> {
        let root = self.proc_root.clone();
        let needle = log_path.as_os_str().as_bytes().to_vec();
        tokio::task::spawn_blocking(move || scan_process_table(&root, &needle))
            .await
            .map_err(|err| ProbeError::Aborted(err.to_string()))?
    }
}

fn scan_process_table(root: &Path, needle: &[u8]) -> Result<bool, ProbeError> {
    if needle.is_empty() {
        return Ok(false);
    }
    let entries = fs::read_dir(root).map_err(|source| ProbeError::Enumerate {
        root: root.to_path_buf(),
        source,
    })?;
    for entry in entries {
        // processes come and go while we walk the table; anything unreadable is skipped
        let Ok(entry) = entry else { continue };
        let is_pid = entry
            .file_name()
            .to_str()
            .is_some_and(|name| !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()));
        if !is_pid {
            continue;
        }
        let Ok(cmdline) = fs::read(entry.path().join("cmdline")) else {
            continue;
        };
        if cmdline.windows(needle.len()).any(|window| window == needle) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// In-memory stand-in for the process table.
#[derive(Debug, Default)]
pub struct InMemoryProbe {
    running: Mutex<HashSet<PathBuf>>,
    failures: AtomicUsize,
    calls: AtomicUsize,
}

impl InMemoryProbe {
    pub fn set_running(&self, log_path: impl Into<PathBuf>, running: bool) {
        let mut set = self.running.lock();
        let log_path = log_path.into();
        if running {
            set.insert(log_path);
        } else {
            set.remove(&log_path);
        }
    }

    /// Make the next `count` probes fail as if the process table could not be read.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Number of probes answered so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LivenessProbe for InMemoryProbe {
    async fn is_running(&self, log_path: &Path) -> Result<bool, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ProbeError::Aborted("injected failure".into()));
        }
        Ok(self.running.lock().contains(log_path))
    }
}

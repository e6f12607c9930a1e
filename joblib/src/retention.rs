use crate::types::JobId;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, warn};

/// Job logs older than this are removed when a new job is triggered.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub removed: Vec<JobId>,
    pub kept: usize,
    pub errors: usize,
}

/// Delete job logs in `log_dir` last modified more than `max_age` before `now`.
///
/// Best-effort: failures are counted and logged, never returned. Files that are not job logs are
/// left alone.
pub async fn sweep(log_dir: &Path, max_age: Duration, now: SystemTime) -> RetentionReport {
    let mut report = RetentionReport::default();
    let mut entries = match fs::read_dir(log_dir).await {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %log_dir.display(), error = %err, "retention sweep: cannot list log directory");
            report.errors += 1;
            return report;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                warn!(dir = %log_dir.display(), error = %err, "retention sweep: listing interrupted");
                report.errors += 1;
                break;
            }
        };
        let Some(job) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<JobId>().ok())
            .filter(JobId::is_job_log)
        else {
            continue;
        };

        let modified = match entry.metadata().await.and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(err) => {
                warn!(job = %job, error = %err, "retention sweep: cannot stat log");
                report.errors += 1;
                continue;
            }
        };
        // a clock behind the file's mtime means the file is new
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age <= max_age {
            report.kept += 1;
            continue;
        }

        match fs::remove_file(entry.path()).await {
            Ok(()) => {
                debug!(job = %job, age_secs = age.as_secs(), "retention sweep: removed log");
                report.removed.push(job);
            }
            Err(err) => {
                warn!(job = %job, error = %err, "retention sweep: cannot remove log");
                report.errors += 1;
            }
        }
    }
    report.removed.sort();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn touch(dir: &Path, name: &str, mtime: SystemTime) {
        let file = File::create(dir.join(name)).unwrap();
        file.set_modified(mtime).unwrap();
    }

    #[tokio::test]
    async fn removes_only_logs_past_the_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        touch(dir.path(), "trigger-20240101-000000.log", now - 8 * DAY);
        touch(dir.path(), "trigger-20240103-000000.log", now - 6 * DAY);
        touch(dir.path(), "keep-me.log", now - 30 * DAY);

        let report = sweep(dir.path(), 7 * DAY, now).await;
        assert_eq!(
            report.removed,
            vec!["trigger-20240101-000000.log".parse::<JobId>().unwrap()]
        );
        assert_eq!(report.kept, 1);
        assert_eq!(report.errors, 0);
        assert!(!dir.path().join("trigger-20240101-000000.log").exists());
        assert!(dir.path().join("trigger-20240103-000000.log").exists());
        assert!(dir.path().join("keep-me.log").exists());
    }

    #[tokio::test]
    async fn sweeping_twice_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        touch(dir.path(), "trigger-20240101-000000.log", now - 10 * DAY);
        touch(dir.path(), "trigger-20240105-000000.log", now - DAY);
        touch(dir.path(), "trigger-20240106-000000.log", now);

        let first = sweep(dir.path(), DEFAULT_RETENTION, now).await;
        let second = sweep(dir.path(), DEFAULT_RETENTION, now).await;
        assert_eq!(first.removed.len(), 1);
        assert_eq!(first.kept, 2);
        assert!(second.removed.is_empty());
        assert_eq!(second.kept, first.kept);
    }

    #[tokio::test]
    async fn missing_directory_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let report = sweep(&dir.path().join("nope"), DEFAULT_RETENTION, SystemTime::now()).await;
        assert_eq!(report.errors, 1);
        assert!(report.removed.is_empty());
    }
}

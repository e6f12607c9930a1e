use crate::error::{Error, Result};
use crate::events::{parse_target, JobInfo};
use crate::liveness::LivenessProbe;
use crate::types::JobId;
use chrono::{DateTime, Local, NaiveDateTime};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Jobs created within the same second get a numeric suffix; past this many we give up.
const MAX_SAME_SECOND: u32 = 100;

/// The flat directory of job logs. There is no index: the directory listing is the job list.
#[derive(Clone, Debug)]
pub struct JobRegistry {
    log_dir: PathBuf,
}

impl JobRegistry {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn path(&self, job: &JobId) -> PathBuf {
        self.log_dir.join(job.as_str())
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.log_dir)
            .await
            .map_err(|err| Error::io(&self.log_dir, err))
    }

    /// Create a new, empty log file for a job started at `now`.
    pub async fn create_job(&self, now: NaiveDateTime) -> Result<JobId> {
        for seq in 1..=MAX_SAME_SECOND {
            let job = JobId::for_time(now, seq);
            let path = self.path(&job);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => return Ok(job),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(Error::io(path, err)),
            }
        }
        Err(Error::io(
            &self.log_dir,
            ErrorKind::AlreadyExists.into(),
        ))
    }

    /// All job logs, most recent first.
    pub async fn list(&self) -> Result<Vec<JobId>> {
        let mut entries = fs::read_dir(&self.log_dir)
            .await
            .map_err(|err| Error::io(&self.log_dir, err))?;
        let mut jobs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| Error::io(&self.log_dir, err))?
        {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if let Ok(job) = name.parse::<JobId>() {
                if job.is_job_log() {
                    jobs.push(job);
                }
            }
        }
        jobs.sort_by(|a, b| b.recency_key().cmp(&a.recency_key()));
        Ok(jobs)
    }

    /// Path of an existing log, or `NotFound`.
    pub async fn existing_path(&self, job: &JobId) -> Result<PathBuf> {
        let path = self.path(job);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(Error::NotFound(job.clone())),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(Error::NotFound(job.clone())),
            Err(err) => Err(Error::io(path, err)),
        }
    }

    /// Current contents of a log. Output that is not UTF-8 is replaced lossily.
    pub async fn read(&self, job: &JobId) -> Result<String> {
        let bytes = self.read_bytes(job).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn read_bytes(&self, job: &JobId) -> Result<Vec<u8>> {
        let path = self.path(job);
        fs::read(&path).await.map_err(|err| match err.kind() {
            ErrorKind::NotFound => Error::NotFound(job.clone()),
            _ => Error::io(path, err),
        })
    }

    /// Append one line. Each call opens the file in append mode, so writes never clobber
    /// output the deploy process has already added.
    pub async fn append_line(&self, job: &JobId, line: &str) -> Result<()> {
        let path = self.path(job);
        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(|err| Error::io(&path, err))?;
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        file.write_all(&buf)
            .await
            .map_err(|err| Error::io(&path, err))
    }

    pub async fn info(&self, job: &JobId, probe: &dyn LivenessProbe) -> Result<JobInfo> {
        let path = self.existing_path(job).await?;
        let content = self.read(job).await?;
        let created_at = match job.created_at() {
            Some(at) => Some(at),
            None => fs::metadata(&path)
                .await
                .and_then(|meta| meta.modified())
                .ok()
                .map(|mtime| DateTime::<Local>::from(mtime).naive_local()),
        };
        let running = probe.is_running(&path).await?;
        Ok(JobInfo {
            log_file: job.clone(),
            created_at,
            target: parse_target(&content),
            running,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::StatusLine;
    use crate::liveness::InMemoryProbe;
    use chrono::NaiveDate;

    fn at(s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, s)
            .unwrap()
    }

    #[tokio::test]
    async fn same_second_jobs_get_distinct_logs() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new(dir.path());

        let first = registry.create_job(at(0)).await.unwrap();
        let second = registry.create_job(at(0)).await.unwrap();
        let third = registry.create_job(at(1)).await.unwrap();

        assert_eq!(first.as_str(), "trigger-20240501-120000.log");
        assert_eq!(second.as_str(), "trigger-20240501-120000-2.log");
        assert_eq!(registry.read(&first).await.unwrap(), "");

        let listed = registry.list().await.unwrap();
        assert_eq!(listed, vec![third, second, first]);
    }

    #[tokio::test]
    async fn list_skips_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::write(dir.path().join("build.log"), "x").unwrap();
        let registry = JobRegistry::new(dir.path());
        let job = registry.create_job(at(5)).await.unwrap();

        assert_eq!(registry.list().await.unwrap(), vec![job]);
    }

    #[tokio::test]
    async fn append_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new(dir.path());
        let job = registry.create_job(at(0)).await.unwrap();

        registry.append_line(&job, "one").await.unwrap();
        registry.append_line(&job, "two").await.unwrap();
        assert_eq!(registry.read(&job).await.unwrap(), "one\ntwo\n");

        let missing: JobId = "trigger-20000101-000000.log".parse().unwrap();
        assert!(matches!(
            registry.read(&missing).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            registry.append_line(&missing, "x").await,
            Err(Error::Io { .. })
        ));
    }

    #[tokio::test]
    async fn info_derives_target_and_running() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new(dir.path());
        let job = registry.create_job(at(0)).await.unwrap();
        let line = StatusLine::Received {
            target: Some("10.1.2.3"),
        };
        registry.append_line(&job, &line.to_string()).await.unwrap();

        let probe = InMemoryProbe::default();
        probe.set_running(registry.path(&job), true);

        let info = registry.info(&job, &probe).await.unwrap();
        assert_eq!(info.created_at, Some(at(0)));
        assert_eq!(info.target.as_deref(), Some("10.1.2.3"));
        assert!(info.running);

        probe.set_running(registry.path(&job), false);
        assert!(!registry.info(&job, &probe).await.unwrap().running);
    }
}

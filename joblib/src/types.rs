use crate::error::Error;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

pub const JOB_PREFIX: &str = "trigger-";
pub const JOB_SUFFIX: &str = ".log";
const STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
const STAMP_LEN: usize = "YYYYmmdd-HHMMSS".len();

/// The name of a job's log file, e.g. `trigger-20240131-093000.log`.
///
/// The file name is the only identifier a job has. Parsing accepts any plain `.log` file name made
/// of `[A-Za-z0-9._-]` (so never a path) so that other logs in the log directory can be fetched,
/// but only `trigger-*` names are considered jobs by the registry and the janitor.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Name for a job created at `at`. A `seq` above 1 disambiguates jobs created within the
    /// same second: `trigger-20240131-093000-2.log`.
    pub fn for_time(at: NaiveDateTime, seq: u32) -> Self {
        let stamp = at.format(STAMP_FORMAT);
        if seq <= 1 {
            Self(format!("{JOB_PREFIX}{stamp}{JOB_SUFFIX}"))
        } else {
            Self(format!("{JOB_PREFIX}{stamp}-{seq}{JOB_SUFFIX}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if this name was produced by [`JobId::for_time`].
    pub fn is_job_log(&self) -> bool {
        self.stamp().is_some()
    }

    /// Creation time encoded in the name.
    pub fn created_at(&self) -> Option<NaiveDateTime> {
        let (stamp, _) = self.stamp()?;
        NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()
    }

    /// Sort key for "most recent first" listings. Plain byte order would put
    /// `...-093000-2.log` before `...-093000.log`.
    pub fn recency_key(&self) -> (&str, u32) {
        self.stamp().unwrap_or((self.as_str(), 0))
    }

    fn stamp(&self) -> Option<(&str, u32)> {
        let body = self.0.strip_prefix(JOB_PREFIX)?.strip_suffix(JOB_SUFFIX)?;
        if body.len() < STAMP_LEN || !body.is_char_boundary(STAMP_LEN) {
            return None;
        }
        let (stamp, rest) = body.split_at(STAMP_LEN);
        NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()?;
        let seq = match rest.strip_prefix('-') {
            None if rest.is_empty() => 1,
            Some(n) => n.parse().ok().filter(|n| *n > 1)?,
            None => return None,
        };
        Some((stamp, seq))
    }
}

impl FromStr for JobId {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let invalid = !name.ends_with(JOB_SUFFIX)
            || name.len() == JOB_SUFFIX.len()
            || name.starts_with('.')
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if invalid {
            return Err(Error::InvalidName(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn names_embed_the_timestamp() {
        let job = JobId::for_time(at(9, 30, 0), 1);
        assert_eq!(job.as_str(), "trigger-20240131-093000.log");
        assert_eq!(job.created_at(), Some(at(9, 30, 0)));
        assert!(job.is_job_log());

        let second = JobId::for_time(at(9, 30, 0), 2);
        assert_eq!(second.as_str(), "trigger-20240131-093000-2.log");
        assert_eq!(second.created_at(), Some(at(9, 30, 0)));
        assert!(second.recency_key() > job.recency_key());
    }

    #[test]
    fn parse_rejects_paths_and_other_extensions() {
        for bad in ["", ".log", "../secret.log", "a/b.log", "notes.txt", ".hidden.log", "a\"b.log"] {
            assert!(bad.parse::<JobId>().is_err(), "{bad:?} should be rejected");
        }
        let other: JobId = "build.log".parse().unwrap();
        assert!(!other.is_job_log());
        assert!(other.created_at().is_none());
    }

    #[test]
    fn malformed_trigger_names_are_not_jobs() {
        for name in [
            "trigger-2024013-093000.log",
            "trigger-20240131-093000-1.log",
            "trigger-20240131-093000-x.log",
            "trigger-20241331-093000.log",
        ] {
            let id: JobId = name.parse().unwrap();
            assert!(!id.is_job_log(), "{name} should not be a job log");
        }
    }
}

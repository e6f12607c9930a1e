use crate::types::JobId;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

/// Appended to the log by the launch wrapper once the deploy script has exited.
pub const EXIT_MARKER: &str = "[deploy-exit] status=";

/// One event of a log stream. `Complete` and `Failed` are terminal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TailEvent {
    Line(String),
    Complete { exit_code: Option<i32> },
    Failed(String),
}

impl TailEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TailEvent::Line(_))
    }
}

/// Exit status recorded by an exit marker line. The marker only counts at the start of a line;
/// deploy output that merely quotes it (relayed from a remote host, say) is ordinary output.
pub fn parse_exit_marker(line: &str) -> Option<i32> {
    line.strip_prefix(EXIT_MARKER)?.trim().parse().ok()
}

#[derive(Clone, Debug, Serialize)]
pub struct JobInfo {
    pub log_file: JobId,
    pub created_at: Option<NaiveDateTime>,
    pub target: Option<String>,
    pub running: bool,
}

/// Bracketed status lines the coordinator writes into a job's log around the launch.
#[derive(Clone, Copy)]
pub enum StatusLine<'a> {
    Received { target: Option<&'a str> },
    Spawned { pid: u32 },
    Streaming,
    LaunchFailed { error: &'a (dyn fmt::Display + Sync) },
}

const RECEIVED: &str = "[trigger] request received (target: ";
const DEFAULT_TARGET: &str = "default";

impl fmt::Display for StatusLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusLine::Received { target } => {
                write!(f, "{RECEIVED}{})", target.unwrap_or(DEFAULT_TARGET))
            }
            StatusLine::Spawned { pid } => write!(f, "[trigger] deploy process started (pid {pid})"),
            StatusLine::Streaming => f.write_str("[trigger] streaming deploy output"),
            StatusLine::LaunchFailed { error } => {
                write!(f, "[trigger] ERROR could not start deploy process: {error}")
            }
        }
    }
}

/// Recover the target recorded by the receipt line of a job log.
pub fn parse_target(log: &str) -> Option<String> {
    log.lines()
        .find_map(|line| line.strip_prefix(RECEIVED)?.strip_suffix(')'))
        .filter(|target| *target != DEFAULT_TARGET)
        .map(str::to_string)
}

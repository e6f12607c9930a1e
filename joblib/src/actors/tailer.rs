mod actor;

use crate::events::TailEvent;
use crate::liveness::LivenessProbe;
use actor::Actor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How long the tailer sleeps at end-of-file while the job is still running.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const EVENT_CAPACITY: usize = 256;

/// Follow a job log from its first byte until the job is done.
///
/// With `exit_marker` set, a line starting with [`crate::events::EXIT_MARKER`] completes the
/// stream with the recorded status and no further probing. If the log is removed or replaced
/// while being followed the stream ends with `Failed`, never `Complete`.
///
/// The real work is done by the spawned actor; the caller only holds the receiving end of its
/// event channel. Lines arrive in file order and the last event is always terminal. Dropping the
/// receiver cancels the tail: the actor notices within one poll interval, closes the file and
/// stops probing.
pub fn spawn(
    log_path: PathBuf,
    probe: Arc<dyn LivenessProbe>,
    poll_interval: Duration,
    exit_marker: bool,
) -> mpsc::Receiver<TailEvent> {
    let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
    Actor::spawn(log_path, probe, poll_interval, exit_marker, events_tx);
    events_rx
}

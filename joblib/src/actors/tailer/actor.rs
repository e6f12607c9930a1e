use crate::events::{parse_exit_marker, TailEvent};
use crate::liveness::LivenessProbe;
use bytes::BytesMut;
use std::io::ErrorKind;
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::{
    fs::{self, File},
    io::AsyncReadExt,
    select,
    sync::mpsc,
    time,
};
use tracing::{debug, warn};

const READ_CHUNK: usize = 8 * 1024;
/// Output without a newline (`\r` progress bars) is emitted in pieces of at most this size.
const MAX_LINE: usize = 64 * 1024;

pub struct Actor {
    log_path: PathBuf,
    probe: Arc<dyn LivenessProbe>,
    poll_interval: Duration,
    // complete on an exit marker line instead of waiting for the probe
    exit_marker: bool,
    events_tx: mpsc::Sender<TailEvent>,
    // bytes read but not yet emitted: at most one unterminated line
    pending: BytesMut,
}

impl Actor {
    pub fn spawn(
        log_path: PathBuf,
        probe: Arc<dyn LivenessProbe>,
        poll_interval: Duration,
        exit_marker: bool,
        events_tx: mpsc::Sender<TailEvent>,
    ) {
        let actor = Self {
            log_path,
            probe,
            poll_interval,
            exit_marker,
            events_tx,
            pending: BytesMut::with_capacity(READ_CHUNK),
        };
        tokio::spawn(async move { actor.run().await });
    }

    async fn run(mut self) {
        let terminal = match File::open(&self.log_path).await {
            Ok(file) => self.follow(file).await,
            Err(err) => Some(TailEvent::Failed(format!(
                "cannot open {}: {err}",
                self.log_path.display()
            ))),
        };
        match terminal {
            Some(event) => {
                debug!(log = %self.log_path.display(), ?event, "tail finished");
                let _ = self.events_tx.send(event).await;
            }
            None => debug!(log = %self.log_path.display(), "tail cancelled by subscriber"),
        }
        // the file handle was dropped with `follow`
    }

    /// Emit lines until the job is done. Returns the terminal event, or `None` if the subscriber
    /// went away first.
    async fn follow(&mut self, mut file: File) -> Option<TailEvent> {
        let mut job_done = false;
        loop {
            while let Some(line) = self.next_line() {
                let exit_code = self.exit_code(&line);
                if !self.emit(line).await {
                    return None;
                }
                if exit_code.is_some() {
                    return Some(TailEvent::Complete { exit_code });
                }
            }

            self.pending.reserve(READ_CHUNK);
            match file.read_buf(&mut self.pending).await {
                Ok(0) => {}
                Ok(_) => continue,
                Err(err) => {
                    return Some(TailEvent::Failed(format!(
                        "cannot read {}: {err}",
                        self.log_path.display()
                    )))
                }
            }

            // caught up with the writer
            if let Some(reason) = self.log_gone(&file).await {
                return Some(TailEvent::Failed(reason));
            }
            if job_done {
                let mut exit_code = None;
                if let Some(rest) = self.take_fragment() {
                    exit_code = self.exit_code(&rest);
                    if !self.emit(rest).await {
                        return None;
                    }
                }
                return Some(TailEvent::Complete { exit_code });
            }
            if self.events_tx.is_closed() {
                return None;
            }
            match self.probe.is_running(&self.log_path).await {
                Ok(true) => {}
                Ok(false) => {
                    // the process may have written its last lines after our read hit EOF,
                    // so drain once more before completing
                    job_done = true;
                    continue;
                }
                Err(err) => {
                    warn!(log = %self.log_path.display(), error = %err, "liveness probe failed, will retry");
                }
            }
            select! {
                _ = time::sleep(self.poll_interval) => {}
                _ = self.events_tx.closed() => return None,
            }
        }
    }

    /// The open handle keeps reading an unlinked file, so removal only shows up by comparing the
    /// handle with what the path names now.
    async fn log_gone(&self, file: &File) -> Option<String> {
        let path = self.log_path.display();
        let open = match file.metadata().await {
            Ok(meta) => meta,
            Err(err) => return Some(format!("cannot stat {path}: {err}")),
        };
        match fs::metadata(&self.log_path).await {
            Ok(now) if now.dev() == open.dev() && now.ino() == open.ino() => None,
            Ok(_) => Some(format!("{path} was replaced while streaming")),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Some(format!("{path} was removed while streaming"))
            }
            Err(err) => Some(format!("cannot stat {path}: {err}")),
        }
    }

    fn exit_code(&self, line: &str) -> Option<i32> {
        if self.exit_marker {
            parse_exit_marker(line)
        } else {
            None
        }
    }

    async fn emit(&self, line: String) -> bool {
        self.events_tx.send(TailEvent::Line(line)).await.is_ok()
    }

    fn next_line(&mut self) -> Option<String> {
        let end = match self.pending.iter().position(|b| *b == b'\n') {
            Some(newline) => newline + 1,
            None if self.pending.len() >= MAX_LINE => char_boundary(&self.pending, MAX_LINE),
            None => return None,
        };
        let raw = self.pending.split_to(end);
        Some(decode(&raw))
    }

    fn take_fragment(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = self.pending.split();
        Some(decode(&raw))
    }
}

/// Largest cut at or below `at` that does not split a UTF-8 sequence (at most 4 bytes long).
fn char_boundary(buf: &[u8], at: usize) -> usize {
    let mut cut = at;
    while cut + 3 > at && cut > 0 && buf.get(cut).is_some_and(|b| b & 0xC0 == 0x80) {
        cut -= 1;
    }
    cut
}

fn decode(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

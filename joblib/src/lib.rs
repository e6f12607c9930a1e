//! Deploy jobs: launching detached deploy scripts and following their logs.
//!
//! A job is nothing more than a `trigger-<timestamp>.log` file in the log directory. Triggering
//! a job creates the file and starts the deploy script with the file's path as an argument; the
//! script writes its output there. Following a job tails the file from the start, consulting a
//! [`liveness::LivenessProbe`] whenever it catches up, until the job is done.

mod actors;
pub mod error;
pub mod events;
pub mod health;
pub mod inventory;
pub mod launcher;
pub mod liveness;
pub mod registry;
pub mod retention;
pub mod types;

// re-export the job coord handle as if it is the job coordinator itself.
pub use actors::coordinator::{CoordinatorConfig, JobCoordinatorHandle as JobCoordinator};
pub use actors::tailer::DEFAULT_POLL_INTERVAL;
pub use events::{JobInfo, TailEvent};
pub use types::JobId;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{Inventory, Server};
    use crate::launcher::ScriptLauncher;
    use crate::liveness::ProcessTableProbe;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;
    use std::time::Duration;

    async fn follow(coordinator: &JobCoordinator, job: JobId) -> (Vec<String>, TailEvent) {
        let mut events = coordinator.stream_job(job).await.expect("stream");
        let mut lines = vec![];
        while let Some(event) = events.recv().await {
            match event {
                TailEvent::Line(line) => lines.push(line),
                terminal => return (lines, terminal),
            }
        }
        panic!("stream ended without a terminal event");
    }

    #[tokio::test]
    async fn deploy_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let script = dir.path().join("deploy.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\nfor i in 1 2 3; do echo \"step $i ${2:-local}\" >> \"$1\"; sleep 0.1; done\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = CoordinatorConfig::new(&log_dir);
        config.poll_interval = Duration::from_millis(50);
        let inventory = Inventory::from_servers(vec![Server::new("10.9.9.9").with_alias("box")])
            .unwrap();
        let coordinator = JobCoordinator::spawn(
            config,
            inventory,
            Arc::new(ScriptLauncher::new(&script)),
            Arc::new(ProcessTableProbe::default()),
        );

        let job = coordinator.trigger(Some("box".into())).await.expect("trigger");
        let (lines, terminal) = follow(&coordinator, job.clone()).await;

        assert_eq!(terminal, TailEvent::Complete { exit_code: Some(0) });
        assert_eq!(lines[0], "[trigger] request received (target: 10.9.9.9)");
        let steps: Vec<_> = lines.iter().filter(|l| l.starts_with("step")).collect();
        assert_eq!(steps, ["step 1 10.9.9.9", "step 2 10.9.9.9", "step 3 10.9.9.9"]);
        assert!(lines.last().unwrap().starts_with("[deploy-exit]"));

        // a late follower replays the same history
        let (replayed, terminal) = follow(&coordinator, job.clone()).await;
        assert_eq!(replayed, lines);
        assert_eq!(terminal, TailEvent::Complete { exit_code: Some(0) });

        // the wrapper shell lingers for a moment after writing the marker
        let mut running = true;
        for _ in 0..40 {
            running = coordinator.job_info(job.clone()).await.unwrap().running;
            if !running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!running);
    }
}

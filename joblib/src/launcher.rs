use crate::events::EXIT_MARKER;
use crate::inventory::Server;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Runs the script, then records its exit status in the log named by `$1`, on a line of its own
/// even if the script's last output had no newline.
/// Being a compound command it keeps `sh` (and with it the log path) in the process table until
/// the marker is written.
const EXIT_MARKER_WRAPPER: &str = concat!(
    r#""$0" "$@"; status=$?; "#,
    r#"if [ -s "$1" ] && [ -n "$(tail -c 1 "$1")" ]; then echo >> "$1"; fi; "#,
    r#"printf '%s%s\n' '"#,
    "[deploy-exit] status=",
    r#"' "$status" >> "$1""#
);

/// Starts a deployment that outlives the request that asked for it.
pub trait Launcher: Send + Sync {
    /// Start the deploy process for the job logging to `log_path` and return its pid.
    ///
    /// The process is not supervised. Its output goes wherever the script sends it; the only
    /// link back to the job is the log path on its command line.
    fn launch(&self, log_path: &Path, target: Option<&Server>) -> io::Result<u32>;
}

/// Launches a deploy shell script detached from the server.
#[derive(Clone, Debug)]
pub struct ScriptLauncher {
    script: PathBuf,
    exit_marker: bool,
}

impl ScriptLauncher {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            exit_marker: true,
        }
    }

    /// Whether to wrap the script so its exit status is appended to the log.
    pub fn with_exit_marker(mut self, enabled: bool) -> Self {
        self.exit_marker = enabled;
        self
    }

    fn command(&self, script: &Path, log_path: &Path, target: Option<&Server>) -> Command {
        let mut cmd = if self.exit_marker {
            let mut sh = Command::new("sh");
            sh.arg("-c").arg(EXIT_MARKER_WRAPPER).arg(script);
            sh
        } else {
            Command::new(script)
        };
        cmd.arg(log_path);
        if let Some(server) = target {
            cmd.arg(&server.ip)
                .env("DEPLOY_TARGET", &server.ip)
                .env("DEPLOY_USER", server.ssh_user())
                .env("DEPLOY_PORT", server.ssh_port().to_string());
            if let Some(alias) = &server.alias {
                cmd.env("DEPLOY_ALIAS", alias);
            }
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            // own process group: signals aimed at the server (Ctrl-C, worker restarts) do not
            // reach the deployment
            .process_group(0)
            .kill_on_drop(false);
        cmd
    }
}

impl Launcher for ScriptLauncher {
    fn launch(&self, log_path: &Path, target: Option<&Server>) -> io::Result<u32> {
        let script = target
            .and_then(|server| server.script.as_deref())
            .unwrap_or(&self.script);
        check_executable(script)?;

        let mut child = self.command(script, log_path, target).spawn()?;
        let pid = child.id().unwrap_or_default();
        info!(
            pid,
            script = %script.display(),
            log = %log_path.display(),
            target = target.map(|s| s.ip.as_str()),
            "deploy process started"
        );

        // reap the child so it does not linger as a zombie; nothing waits on the result
        let log = log_path.display().to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!(pid, %status, log = %log, "deploy process exited"),
                Err(err) => warn!(pid, error = %err, log = %log, "failed to reap deploy process"),
            }
        });
        Ok(pid)
    }
}

/// With the exit-marker wrapper a missing script would only surface as status 127 in the log;
/// checking up front turns it into a launch failure the caller sees.
fn check_executable(script: &Path) -> io::Result<()> {
    let meta = std::fs::metadata(script).map_err(|err| {
        io::Error::new(err.kind(), format!("{}: {err}", script.display()))
    })?;
    if !meta.is_file() || meta.permissions().mode() & 0o111 == 0 {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("{} is not an executable file", script.display()),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::parse_exit_marker;
    use std::time::Duration;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    async fn wait_for(log: &Path, needle: &str) -> String {
        for _ in 0..100 {
            let content = std::fs::read_to_string(log).unwrap_or_default();
            if content.contains(needle) {
                return content;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("{needle:?} never appeared in {}", log.display());
    }

    #[test]
    fn wrapper_marker_matches_parser() {
        assert!(EXIT_MARKER_WRAPPER.contains(EXIT_MARKER));
    }

    #[tokio::test]
    async fn passes_log_path_and_records_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "deploy.sh",
            r#"echo "args: $#" >> "$1"; exit 3"#,
        );
        let log = dir.path().join("trigger-20240101-000000.log");
        std::fs::write(&log, "").unwrap();

        let pid = ScriptLauncher::new(&script).launch(&log, None).unwrap();
        assert!(pid > 0);

        let content = wait_for(&log, EXIT_MARKER).await;
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], "args: 1");
        assert_eq!(parse_exit_marker(lines[1]), Some(3));
    }

    #[tokio::test]
    async fn marker_gets_its_own_line_after_unterminated_output() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "deploy.sh", r#"printf 'progress 100%%' >> "$1""#);
        let log = dir.path().join("trigger-20240101-000003.log");
        std::fs::write(&log, "").unwrap();

        ScriptLauncher::new(&script).launch(&log, None).unwrap();

        let content = wait_for(&log, EXIT_MARKER).await;
        assert_eq!(content, "progress 100%\n[deploy-exit] status=0\n");
    }

    #[tokio::test]
    async fn target_adds_one_argument_and_environment() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "deploy.sh",
            r#"echo "$# $2 $DEPLOY_USER $DEPLOY_PORT $DEPLOY_ALIAS" >> "$1""#,
        );
        let log = dir.path().join("trigger-20240101-000001.log");
        std::fs::write(&log, "").unwrap();
        let mut server = Server::new("10.0.0.5").with_alias("web-5");
        server.user = Some("deploy".into());

        ScriptLauncher::new(&script)
            .launch(&log, Some(&server))
            .unwrap();

        let content = wait_for(&log, EXIT_MARKER).await;
        assert!(content.starts_with("2 10.0.0.5 deploy 22 web-5\n"));
    }

    #[tokio::test]
    async fn without_marker_runs_the_script_directly() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "deploy.sh", r#"echo "plain" >> "$1""#);
        let log = dir.path().join("trigger-20240101-000002.log");
        std::fs::write(&log, "").unwrap();

        ScriptLauncher::new(&script)
            .with_exit_marker(false)
            .launch(&log, None)
            .unwrap();

        let content = wait_for(&log, "plain").await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(std::fs::read_to_string(&log).unwrap(), content);
        assert!(!content.contains(EXIT_MARKER));
    }

    #[tokio::test]
    async fn missing_or_non_executable_scripts_fail_to_launch() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("x.log");

        let missing = ScriptLauncher::new(dir.path().join("nope.sh")).launch(&log, None);
        assert_eq!(missing.unwrap_err().kind(), io::ErrorKind::NotFound);

        let plain = dir.path().join("plain.sh");
        std::fs::write(&plain, "echo hi").unwrap();
        std::fs::set_permissions(&plain, std::fs::Permissions::from_mode(0o644)).unwrap();
        let denied = ScriptLauncher::new(&plain).launch(&log, None);
        assert_eq!(denied.unwrap_err().kind(), io::ErrorKind::PermissionDenied);
    }
}

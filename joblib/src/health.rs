//! On-demand reachability and resource checks for inventory servers and arbitrary hosts.
//!
//! Nothing here is scheduled; every check runs when asked and shells out to the system `ping` and
//! `ssh` clients.

use crate::inventory::Server;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io;
use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

const PING_COUNT: u32 = 3;
const SSH_TIMEOUT: Duration = Duration::from_secs(10);

const CPU_PROBE: &str = "top -bn1 | awk '/Cpu\\(s\\)/ {print 100 - $8}'";
const MEM_PROBE: &str = "free | awk '/Mem:/ {printf \"%.1f\", $3 / $2 * 100}'";
const DISK_PROBE: &str = "df -P / | awk 'NR == 2 {sub(\"%\", \"\", $5); print $5}'";

#[derive(Clone, Debug, Serialize)]
pub struct PingReport {
    pub reachable: bool,
    pub output: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    pub server: String,
    pub reachable: bool,
    pub cpu_percent: Option<f64>,
    pub mem_percent: Option<f64>,
    pub disk_percent: Option<f64>,
    pub checked_at: DateTime<Utc>,
}

/// Host names are handed to `ping` and `ssh` as arguments, so anything that could be read as an
/// option or is not a plausible host name is refused.
pub fn validate_host(host: &str) -> Result<&str, String> {
    let valid = !host.is_empty()
        && host.len() <= 253
        && !host.starts_with('-')
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '_'));
    if valid {
        Ok(host)
    } else {
        Err(format!("invalid host name: {host:?}"))
    }
}

pub async fn resolve_host(host: &str) -> io::Result<Vec<IpAddr>> {
    let mut addrs: Vec<IpAddr> = tokio::net::lookup_host((host, 0))
        .await?
        .map(|addr| addr.ip())
        .collect();
    addrs.sort();
    addrs.dedup();
    Ok(addrs)
}

/// Send a few ICMP echo requests with the system `ping`.
pub async fn ping(host: &str) -> io::Result<PingReport> {
    let output = Command::new("ping")
        .arg("-c")
        .arg(PING_COUNT.to_string())
        .args(["-W", "2"])
        .arg(host)
        .stdin(Stdio::null())
        .output()
        .await?;
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(PingReport {
        reachable: output.status.success(),
        output: text,
    })
}

/// Ping the server and, if it answers, read CPU, memory and disk usage over ssh.
pub async fn check_server(server: &Server) -> HealthReport {
    let reachable = match ping(&server.ip).await {
        Ok(report) => report.reachable,
        Err(err) => {
            debug!(server = %server.ip, error = %err, "ping failed to run");
            false
        }
    };
    let mut report = HealthReport {
        server: server.ip.clone(),
        reachable,
        cpu_percent: None,
        mem_percent: None,
        disk_percent: None,
        checked_at: Utc::now(),
    };
    if reachable {
        let (cpu, mem, disk) = tokio::join!(
            ssh_metric(server, CPU_PROBE),
            ssh_metric(server, MEM_PROBE),
            ssh_metric(server, DISK_PROBE),
        );
        report.cpu_percent = cpu;
        report.mem_percent = mem;
        report.disk_percent = disk;
    }
    report
}

async fn ssh_metric(server: &Server, remote_cmd: &str) -> Option<f64> {
    let mut cmd = Command::new("ssh");
    cmd.args(["-o", "BatchMode=yes", "-o", "ConnectTimeout=5"])
        .arg("-p")
        .arg(server.ssh_port().to_string())
        .arg(format!("{}@{}", server.ssh_user(), server.ip))
        .arg(remote_cmd)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    let output = match timeout(SSH_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) if output.status.success() => output,
        Ok(Ok(output)) => {
            debug!(server = %server.ip, status = %output.status, "ssh metric command failed");
            return None;
        }
        Ok(Err(err)) => {
            debug!(server = %server.ip, error = %err, "cannot run ssh");
            return None;
        }
        Err(_) => {
            debug!(server = %server.ip, "ssh metric command timed out");
            return None;
        }
    };
    parse_percent(&String::from_utf8_lossy(&output.stdout))
}

fn parse_percent(raw: &str) -> Option<f64> {
    let value: f64 = raw.trim().parse().ok()?;
    (0.0..=100.0).contains(&value).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_validation() {
        assert!(validate_host("example.com").is_ok());
        assert!(validate_host("10.0.0.1").is_ok());
        assert!(validate_host("fe80::1").is_ok());
        assert!(validate_host("").is_err());
        assert!(validate_host("-c1").is_err());
        assert!(validate_host("a b").is_err());
        assert!(validate_host("host;reboot").is_err());
    }

    #[test]
    fn percent_parsing() {
        assert_eq!(parse_percent("12.5\n"), Some(12.5));
        assert_eq!(parse_percent("100"), Some(100.0));
        assert_eq!(parse_percent("101"), None);
        assert_eq!(parse_percent(""), None);
        assert_eq!(parse_percent("n/a"), None);
    }

    #[tokio::test]
    async fn resolves_literal_addresses() {
        let addrs = resolve_host("127.0.0.1").await.unwrap();
        assert_eq!(addrs, vec![IpAddr::from([127, 0, 0, 1])]);
    }
}

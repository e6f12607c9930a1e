use crate::sse::{SseEvent, SseParser};
use anyhow::{anyhow, bail, Context, Result};
use joblib::events::parse_exit_marker;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;

/// Data of the event that ends a successful stream.
const COMPLETE_MESSAGE: &str = "Deploy complete";

#[derive(Debug, Deserialize)]
pub struct TriggerResponse {
    pub log_file: String,
    pub view_log_url: String,
    pub stream_log_url: String,
}

#[derive(Debug, Deserialize)]
struct LogList {
    logs: Vec<String>,
}

/// How a followed job ended.
#[derive(Debug, PartialEq, Eq)]
pub enum FollowOutcome {
    /// The exit status from the log's exit marker, if it had one.
    Complete(Option<i32>),
    /// The server could not keep reading the log.
    Failed(String),
}

pub struct ClientCli {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl ClientCli {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn trigger(&self, server: Option<&str>) -> Result<TriggerResponse> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| anyhow!("a token is required to trigger (--token or DEPLOY_TOKEN)"))?;
        let mut body = serde_json::json!({ "token": token });
        if let Some(server) = server {
            body["server"] = server.into();
        }
        let response = self.http.post(self.url("/trigger")).json(&body).send().await?;
        let response: TriggerResponse = checked(response).await?.json().await?;
        println!("Started deploy: {}", response.log_file);
        println!("  view:   {}", self.absolute(&response.view_log_url));
        println!("  stream: {}", self.absolute(&response.stream_log_url));
        Ok(response)
    }

    pub async fn list(&self) -> Result<()> {
        let response = self.http.get(self.url("/logs")).send().await?;
        let list: LogList = checked(response).await?.json().await?;
        if list.logs.is_empty() {
            println!("No deploy logs");
        }
        for log in list.logs {
            println!("{log}");
        }
        Ok(())
    }

    pub async fn show(&self, log_file: &str) -> Result<()> {
        let response = self.http.get(self.url(&format!("/logs/{log_file}"))).send().await?;
        print!("{}", checked(response).await?.text().await?);
        Ok(())
    }

    pub async fn info(&self, log_file: &str) -> Result<()> {
        let response = self
            .http
            .get(self.url(&format!("/logs/{log_file}/info")))
            .send()
            .await?;
        let info: Value = checked(response).await?.json().await?;
        let state = if info["running"].as_bool().unwrap_or(false) {
            "running"
        } else {
            "finished"
        };
        println!("{log_file}: {state}");
        if let Some(target) = info["target"].as_str() {
            println!("  target:  {target}");
        }
        if let Some(created) = info["created_at"].as_str() {
            println!("  created: {created}");
        }
        Ok(())
    }

    /// Print a job's log lines as the server streams them.
    pub async fn follow(&self, log_file: &str) -> Result<FollowOutcome> {
        let response = self
            .http
            .get(self.url(&format!("/logs/{log_file}/stream")))
            .send()
            .await?;
        let mut response = checked(response).await?;
        let mut parser = SseParser::default();
        let mut last_line: Option<String> = None;
        while let Some(chunk) = response.chunk().await.context("stream interrupted")? {
            for event in parser.feed(&chunk) {
                if let Some(outcome) = handle_event(event, &mut last_line) {
                    return Ok(outcome);
                }
            }
        }
        bail!("stream ended before the deploy completed")
    }

    pub async fn servers(&self) -> Result<()> {
        let response = self.http.get(self.url("/servers")).send().await?;
        let servers: Vec<Value> = checked(response).await?.json().await?;
        for server in servers {
            let ip = server["ip"].as_str().unwrap_or("?");
            let alias = server["alias"].as_str().unwrap_or("-");
            let active = if server["active"].as_bool().unwrap_or(true) {
                ""
            } else {
                " (inactive)"
            };
            println!("{ip:<16} {alias}{active}");
        }
        Ok(())
    }

    pub async fn diagnose(&self, host: &str) -> Result<()> {
        let response = self
            .http
            .get(self.url("/diagnose"))
            .query(&[("host", host)])
            .send()
            .await?;
        let report: Value = checked(response).await?.json().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }

    fn absolute(&self, url: &str) -> String {
        if url.starts_with('/') {
            self.url(url)
        } else {
            url.to_string()
        }
    }
}

/// Print line events and report a terminal one. Line events carry an id; the completion event
/// does not, so a log line that happens to read "Deploy complete" is not mistaken for the end.
fn handle_event(event: SseEvent, last_line: &mut Option<String>) -> Option<FollowOutcome> {
    match (event.event.as_deref(), event.id) {
        (Some("error"), _) => Some(FollowOutcome::Failed(event.data)),
        (None, None) if event.data == COMPLETE_MESSAGE => Some(FollowOutcome::Complete(
            last_line.as_deref().and_then(parse_exit_marker),
        )),
        _ => {
            println!("{}", event.data);
            *last_line = Some(event.data);
            None
        }
    }
}

/// Turn a `{ error, status }` reply into an error.
async fn checked(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|value| value["error"].as_str().map(str::to_string))
        .unwrap_or(body);
    bail!("server returned {status}: {message}")
}

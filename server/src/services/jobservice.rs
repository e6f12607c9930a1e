mod stream;

use super::{ApiError, AppState, SharedState};
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use joblib::{JobId, JobInfo};
use serde::{Deserialize, Serialize};
use tracing::info;

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/trigger", get(trigger_from_query).post(trigger_from_body))
        .route("/logs", get(list_logs))
        .route("/logs/{name}", get(log_content))
        .route("/logs/{name}/info", get(log_info))
        .route("/logs/{name}/stream", get(stream::stream_log))
        .route("/download/{name}", get(download_log))
}

#[derive(Debug, Default, Deserialize)]
pub struct TriggerParams {
    pub token: Option<String>,
    /// IP or alias of an inventory server; absent or blank means the script's default target.
    pub server: Option<String>,
}

impl TriggerParams {
    /// Body fields win over query fields.
    fn merge(self, body: TriggerParams) -> Self {
        Self {
            token: body.token.or(self.token),
            server: body.server.or(self.server),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub log_file: JobId,
    pub view_log_url: String,
    pub stream_log_url: String,
}

#[derive(Debug, Serialize)]
pub struct LogList {
    pub logs: Vec<JobId>,
}

async fn trigger_from_query(
    State(state): State<SharedState>,
    Query(params): Query<TriggerParams>,
) -> Result<Json<TriggerResponse>, ApiError> {
    trigger(&state, params).await
}

async fn trigger_from_body(
    State(state): State<SharedState>,
    Query(query): Query<TriggerParams>,
    body: Bytes,
) -> Result<Json<TriggerResponse>, ApiError> {
    let params = if body.iter().all(u8::is_ascii_whitespace) {
        query
    } else {
        let from_body: TriggerParams = serde_json::from_slice(&body)
            .map_err(|err| ApiError::BadRequest(format!("invalid JSON body: {err}")))?;
        query.merge(from_body)
    };
    trigger(&state, params).await
}

async fn trigger(state: &AppState, params: TriggerParams) -> Result<Json<TriggerResponse>, ApiError> {
    state.token.check(params.token.as_deref())?;
    let target = params
        .server
        .map(|server| server.trim().to_string())
        .filter(|server| !server.is_empty());

    let job = state.coordinator.trigger(target).await?;
    info!(%job, "deploy triggered");
    Ok(Json(TriggerResponse {
        view_log_url: state.url(&format!("/logs/{job}")),
        stream_log_url: state.url(&format!("/logs/{job}/stream")),
        log_file: job,
    }))
}

async fn list_logs(State(state): State<SharedState>) -> Result<Json<LogList>, ApiError> {
    let logs = state.coordinator.list_jobs().await?;
    Ok(Json(LogList { logs }))
}

async fn log_content(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job: JobId = name.parse()?;
    let content = state.coordinator.read_job(job).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], content))
}

async fn log_info(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<JobInfo>, ApiError> {
    let job: JobId = name.parse()?;
    Ok(Json(state.coordinator.job_info(job).await?))
}

async fn download_log(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job: JobId = name.parse()?;
    let content = state.coordinator.read_job_bytes(job.clone()).await?;
    // JobId only admits [A-Za-z0-9._-], so the name needs no quoting
    let disposition = format!("attachment; filename=\"{job}\"");
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        content,
    ))
}

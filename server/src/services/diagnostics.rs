//! Read-only views of the inventory and on-demand host checks. Nothing here needs the token.

use super::{ApiError, SharedState};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use joblib::health::{self, HealthReport, PingReport};
use joblib::inventory::Server;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/servers", get(list_servers))
        .route("/servers/{ident}/health", get(server_health))
        .route("/diagnose", get(diagnose))
}

#[derive(Debug, Deserialize)]
pub struct DiagnoseParams {
    pub host: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Diagnosis {
    pub host: String,
    pub resolved: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolve_error: Option<String>,
    pub ping: Option<PingReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping_error: Option<String>,
}

async fn list_servers(State(state): State<SharedState>) -> Result<Json<Vec<Server>>, ApiError> {
    Ok(Json(state.coordinator.servers().await?))
}

async fn server_health(
    State(state): State<SharedState>,
    Path(ident): Path<String>,
) -> Result<Json<HealthReport>, ApiError> {
    let server = state.coordinator.resolve_server(ident).await?;
    Ok(Json(health::check_server(&server).await))
}

async fn diagnose(Query(params): Query<DiagnoseParams>) -> Result<Json<Diagnosis>, ApiError> {
    let host = params
        .host
        .ok_or_else(|| ApiError::BadRequest("missing host parameter".into()))?;
    let host = health::validate_host(host.trim()).map_err(ApiError::BadRequest)?;

    let (resolved, ping) = tokio::join!(health::resolve_host(host), health::ping(host));
    debug!(host, "diagnosed host");

    let (resolved, resolve_error) = match resolved {
        Ok(addrs) => (addrs.iter().map(ToString::to_string).collect(), None),
        Err(err) => (vec![], Some(err.to_string())),
    };
    let (ping, ping_error) = match ping {
        Ok(report) => (Some(report), None),
        Err(err) => (None, Some(format!("cannot run ping: {err}"))),
    };
    Ok(Json(Diagnosis {
        host: host.to_string(),
        resolved,
        resolve_error,
        ping,
        ping_error,
    }))
}

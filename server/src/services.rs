pub mod diagnostics;
pub mod jobservice;

use crate::interceptors::token::TokenGuard;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use joblib::error::{Error, InventoryError, TriggerError};
use joblib::{JobCoordinator, JobId};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

pub struct AppState {
    pub coordinator: JobCoordinator,
    pub token: TokenGuard,
    /// Prefix for URLs handed back to clients, without a trailing slash.
    pub public_url: String,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.public_url)
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .merge(jobservice::routes())
        .merge(diagnostics::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Internal(String),
    /// The job log exists and records why the deploy could not start.
    LaunchFailed { log_file: JobId, message: String },
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) | ApiError::LaunchFailed { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::LaunchFailed { log_file, message } => serde_json::json!({
                "error": message,
                "status": status.as_u16(),
                "log_file": log_file,
            }),
            ApiError::BadRequest(message)
            | ApiError::Forbidden(message)
            | ApiError::NotFound(message)
            | ApiError::Internal(message) => serde_json::json!({
                "error": message,
                "status": status.as_u16(),
            }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(_) | Error::Inventory(InventoryError::Unknown(_)) => {
                ApiError::NotFound(err.to_string())
            }
            Error::InvalidName(_) | Error::Inventory(InventoryError::Inactive(_)) => {
                ApiError::BadRequest(err.to_string())
            }
            err => {
                error!(error = %err, "request failed");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<TriggerError> for ApiError {
    fn from(err: TriggerError) -> Self {
        match err {
            TriggerError::Target(err) => ApiError::BadRequest(err.to_string()),
            TriggerError::Launch { ref job, .. } => ApiError::LaunchFailed {
                log_file: job.clone(),
                message: err.to_string(),
            },
            err => {
                error!(error = %err, "trigger failed");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures reported by the external scanning tool.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("'{0}' was not found in path")]
    NotInstalled(String),
    #[error("permission denied running '{0}'")]
    PermissionDenied(String),
    #[error("{0}")]
    InvalidOptions(String),
    #[error("{0}")]
    InvalidTarget(String),
    #[error("{0}")]
    ToolFailed(String),
    #[error("could not parse scanner output: {0}")]
    Parse(String),
    #[error("scanner i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced to API clients as `{"error": message}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Nmap error: {0}")]
    ScanExecution(#[from] ScanError),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::ScanExecution(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(format!("{e:#}"))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

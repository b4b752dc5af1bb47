//! Mapping of domain errors onto HTTP responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

use crate::assets::ConfigError;
use crate::core::SupervisorError;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "internal",
            message: message.into(),
        }
    }
}

impl From<SupervisorError> for ApiError {
    fn from(err: SupervisorError) -> Self {
        let status = match &err {
            SupervisorError::NotFound(_) | SupervisorError::ArtifactMissing { .. } => {
                StatusCode::NOT_FOUND
            }
            SupervisorError::AlreadyRunning(_)
            | SupervisorError::InvalidId(_)
            | SupervisorError::DownloadInProgress => StatusCode::BAD_REQUEST,
            SupervisorError::Spawn { .. } | SupervisorError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        let (status, kind) = match &err {
            ConfigError::UnknownName(_) => (StatusCode::BAD_REQUEST, "invalid_config"),
            ConfigError::ContentRequired => (StatusCode::BAD_REQUEST, "content_required"),
            ConfigError::InvalidFieldPath(_) => (StatusCode::BAD_REQUEST, "invalid_field_path"),
            ConfigError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ConfigError::Parse { .. } | ConfigError::Io { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        Self {
            status,
            kind,
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{:#}", err))
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::internal(format!("Background task failed: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("API error: {} - {}", self.status, self.message);
        } else {
            warn!("API error: {} - {}", self.status, self.message);
        }

        let body = Json(ErrorBody {
            error: self.message,
            kind: self.kind,
        });
        (self.status, body).into_response()
    }
}

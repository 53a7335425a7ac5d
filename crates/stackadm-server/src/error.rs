//! HTTP error types for the `stackadm` server.
//!
//! Maps domain errors from `stackadm-core` into HTTP responses. Every error
//! produces the JSON body the console's scripts expect:
//! `{"success": false, "message": "..."}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use stackadm_core::error::{
    BackupError, ContainerError, EnvError, KeycloakError, RestoreError, SetupError, VersionError,
};

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Client sent invalid or missing input.
    BadRequest(String),
    /// Requested resource not found.
    NotFound(String),
    /// Internal server error.
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(m) | Self::NotFound(m) | Self::Internal(m) => m,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), message = %self.message(), "request failed");
        }
        let body = ErrorBody {
            success: false,
            message: match self {
                Self::BadRequest(m) | Self::NotFound(m) | Self::Internal(m) => m,
            },
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<SetupError> for AppError {
    fn from(err: SetupError) -> Self {
        match err {
            SetupError::NotPending { .. }
            | SetupError::InvalidInput { .. }
            | SetupError::UnknownStep { .. } => Self::BadRequest(err.to_string()),
            SetupError::Storage(_) | SetupError::Serialize { .. } | SetupError::WorkerUnavailable => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<BackupError> for AppError {
    fn from(err: BackupError) -> Self {
        match err {
            BackupError::NotFound { .. } => Self::NotFound(err.to_string()),
            BackupError::InvalidTimestamp { .. } => Self::BadRequest(err.to_string()),
            BackupError::Io { .. } | BackupError::CommandFailed { .. } | BackupError::Command(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<RestoreError> for AppError {
    fn from(err: RestoreError) -> Self {
        match err {
            RestoreError::Backup(inner) => inner.into(),
            RestoreError::Failed { .. } | RestoreError::RecoveryFailed { .. } => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<VersionError> for AppError {
    fn from(err: VersionError) -> Self {
        match err {
            VersionError::UpToDate => Self::BadRequest(err.to_string()),
            VersionError::LatestUnavailable
            | VersionError::Client { .. }
            | VersionError::Env(_)
            | VersionError::Restart(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<EnvError> for AppError {
    fn from(err: EnvError) -> Self {
        match err {
            EnvError::NoUpdates => Self::BadRequest(err.to_string()),
            EnvError::Read { .. } | EnvError::Write { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<ContainerError> for AppError {
    fn from(err: ContainerError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<KeycloakError> for AppError {
    fn from(err: KeycloakError) -> Self {
        match err {
            KeycloakError::InvalidInput { .. } => Self::BadRequest(err.to_string()),
            KeycloakError::CommandFailed { .. }
            | KeycloakError::Parse { .. }
            | KeycloakError::Command(_) => Self::Internal(err.to_string()),
        }
    }
}

//! HTTP error mapping

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::sync::SyncError;

/// Seconds a client is asked to wait when the sync lock is contended
const RETRY_AFTER_SECS: &str = "5";

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("{0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Sync(e) => match e {
                SyncError::InvalidRequest(_) | SyncError::InvalidPath { .. } => StatusCode::BAD_REQUEST,
                SyncError::Busy => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "unauthorized",
            AppError::BadRequest(_) => "bad_request",
            AppError::Sync(e) => match e {
                SyncError::InvalidRequest(_) | SyncError::InvalidPath { .. } => "bad_request",
                SyncError::Busy => "busy",
                SyncError::Staging { .. } => "staging_failed",
                SyncError::VaultIo { .. } => "vault_io",
                SyncError::MergeTool { .. } => "merge_failed",
                SyncError::Archive(_) => "archive_failed",
                SyncError::Task(_) => "internal_error",
            },
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!("Sync request failed: {:?}", self);
        } else {
            tracing::debug!(status = status.as_u16(), "Sync request rejected: {}", self);
        }

        let details = if cfg!(debug_assertions) {
            std::error::Error::source(&self).map(|source| source.to_string())
        } else {
            None
        };

        let body = Json(ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            details,
        });

        let mut response = (status, body).into_response();
        match &self {
            AppError::Unauthorized(_) => {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            AppError::Sync(SyncError::Busy) => {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
            }
            _ => {}
        }
        response
    }
}

// BSD 3-Clause License
// Copyright (c) 2025, Shipyard Contributors
//
//! Crate-wide error kind and its mapping onto HTTP status codes (spec 7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::driver::DriverError;
use crate::repository::RepositoryError;

#[derive(Debug, thiserror::Error)]
pub enum ShipyardError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("capacity exhausted: {0}")]
    CapacityExhausted(String),

    #[error("startup failed: {0}")]
    StartupFailed(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ShipyardError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ShipyardError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ShipyardError::Unauthorized => StatusCode::UNAUTHORIZED,
            ShipyardError::NotFound(_) => StatusCode::NOT_FOUND,
            ShipyardError::IllegalState(_) => StatusCode::CONFLICT,
            ShipyardError::CapacityExhausted(_) => StatusCode::TOO_MANY_REQUESTS,
            ShipyardError::StartupFailed(_) => StatusCode::BAD_GATEWAY,
            ShipyardError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ShipyardError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
            ShipyardError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ShipyardError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }
        let body = Json(serde_json::json!({
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

impl From<DriverError> for ShipyardError {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::NotFound(m) => ShipyardError::NotFound(m),
            DriverError::AlreadyExists(m) => ShipyardError::IllegalState(m),
            DriverError::BackendUnavailable(m) => ShipyardError::Unavailable(m),
            DriverError::Timeout(m) => ShipyardError::DeadlineExceeded(m),
        }
    }
}

impl From<RepositoryError> for ShipyardError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(m) => ShipyardError::NotFound(m),
            RepositoryError::Backend(m) => ShipyardError::Internal(m),
        }
    }
}

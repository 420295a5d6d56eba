use std::io::Error as IoError;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use nimbus_prober::monitoring::ServiceId;
use nimbus_prober::{CheckError, QueryError};
use serde_json::json;
use thiserror::Error;

/// Startup and shutdown failures of the server binary
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0:#}")]
    Io(#[from] IoError),
    #[error("Address parsing error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
    #[error("Configuration error: {0}")]
    Config(#[from] nimbus_prober::config::Error),
    #[error(transparent)]
    Startup(#[from] anyhow::Error),
}

/// Request failures, rendered as `{"error": "..."}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("service {0} not found")]
    NotFound(ServiceId),
    #[error("service {0} belongs to another user")]
    Forbidden(ServiceId),
    #[error("missing or invalid X-User-Id header")]
    Unauthorized,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::ServiceNotFound(id) => ApiError::NotFound(id),
            err if err.is_caller_error() => ApiError::BadRequest(err.to_string()),
            err => {
                tracing::error!("Query failed: {}", err);
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<CheckError> for ApiError {
    fn from(err: CheckError) -> Self {
        match err {
            CheckError::ServiceNotFound(id) => ApiError::NotFound(id),
            err => {
                tracing::error!("Check failed: {}", err);
                ApiError::Internal(err.to_string())
            }
        }
    }
}

//! HTTP error responses

use adwatch_api::{ErrorBody, ErrorCode, ErrorInfo};
use adwatch_core::{CoreError, ErrorKind};
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::time::Duration;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing X-User-Id header")]
    Unauthenticated,

    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Core(e) => match e {
                CoreError::NoActiveSession(_) | CoreError::DurationNotMet { .. } => {
                    StatusCode::CONFLICT
                }
                CoreError::CooldownActive { .. } | CoreError::RateLimited { .. } => {
                    StatusCode::TOO_MANY_REQUESTS
                }
                _ => match e.kind() {
                    ErrorKind::NotFound => StatusCode::NOT_FOUND,
                    ErrorKind::ValidationFailure => StatusCode::BAD_REQUEST,
                    ErrorKind::ConcurrencyConflict => StatusCode::SERVICE_UNAVAILABLE,
                    ErrorKind::PolicyViolation | ErrorKind::Internal => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                },
            },
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            ApiError::Unauthenticated => ErrorCode::Unauthenticated,
            ApiError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            ApiError::Internal(_) => ErrorCode::InternalError,
            ApiError::Core(e) => match e {
                CoreError::AdNotFound(_) => ErrorCode::AdNotFound,
                CoreError::Validation(_) | CoreError::InvalidAmount(_) => {
                    ErrorCode::InvalidRequest
                }
                CoreError::NoActiveSession(_) => ErrorCode::NoActiveSession,
                CoreError::DurationNotMet { .. } => ErrorCode::DurationNotMet,
                CoreError::CooldownActive { .. } => ErrorCode::CooldownActive,
                CoreError::RateLimited { .. } => ErrorCode::RateLimited,
                CoreError::Conflict { .. } => ErrorCode::Conflict,
                CoreError::Store(_) => ErrorCode::InternalError,
            },
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::Core(e) => e.retry_after(),
            _ => None,
        }
    }
}

/// Whole seconds, rounded up so a countdown never reaches zero early
fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let mut info = ErrorInfo::new(self.error_code(), message);
        let retry_after = self.retry_after().map(ceil_secs);
        if let Some(secs) = retry_after {
            info = info.with_retry_after(secs);
        }

        let mut response = (status, Json(ErrorBody { error: info })).into_response();

        if status == StatusCode::TOO_MANY_REQUESTS {
            if let Some(secs) = retry_after {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(secs));
            }
        }

        response
    }
}

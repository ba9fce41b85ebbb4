use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

/// API error response body: a stable machine-readable code plus a
/// human-readable message. Internal detail never leaks to callers.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Insufficient permissions")]
    Forbidden,

    /// Also returned for entities that exist in another tenant, so callers
    /// cannot probe for records across tenant boundaries.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("A subscription for this payment reference already exists")]
    DuplicatePayment,

    #[error("Class is fully booked")]
    Full,

    #[error("Class has been cancelled")]
    ClassCancelled,

    #[error("No valid pass available for this booking")]
    NoValidPass,

    #[error("No remaining credits on this pass")]
    InsufficientCredit,

    #[error("Upstream dependency timed out")]
    Timeout,

    #[error("Database error")]
    Database(#[from] surrealdb::Error),

    #[error("Internal error")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Forbidden => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::DuplicatePayment => "DUPLICATE_PAYMENT",
            ApiError::Full => "CLASS_FULL",
            ApiError::ClassCancelled => "CLASS_CANCELLED",
            ApiError::NoValidPass => "NO_VALID_PASS",
            ApiError::InsufficientCredit => "INSUFFICIENT_CREDIT",
            ApiError::Timeout => "TIMEOUT",
            ApiError::Database(_) | ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True when retrying the same request later could succeed; payment
    /// providers use this to decide whether to redeliver a webhook.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Timeout | ApiError::Database(_) | ApiError::Internal(_)
        )
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::Validation(errors.to_string())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) | ApiError::NoValidPass | ApiError::InsufficientCredit => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Conflict(_)
            | ApiError::DuplicatePayment
            | ApiError::Full
            | ApiError::ClassCancelled => StatusCode::CONFLICT,
            ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if matches!(self, ApiError::Database(_) | ApiError::Internal(_)) {
            log::error!("internal API error: {self:?}");
        }

        let message = match self {
            // Never expose the underlying store or panic detail.
            ApiError::Database(_) | ApiError::Internal(_) => "Internal error".to_string(),
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: ErrorDetail {
                code: self.code(),
                message,
            },
        })
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;
use crate::token::TokenError;
use crate::utils::response::failure;

/// Faults and issuance-time validation failures. Expected check-in
/// rejections are not represented here; they travel as `CheckInOutcome`
/// values and never surface as errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("An active ticket already exists for this student and exam")]
    DuplicateTicket,

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Token minting failed")]
    Token(#[from] TokenError),

    #[error("Storage error")]
    Store(#[from] StoreError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidReference(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateTicket => StatusCode::CONFLICT,
            AppError::Token(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::DuplicateTicket => "DUPLICATE_TICKET",
            AppError::InvalidReference(_) => "INVALID_REFERENCE",
            AppError::Token(_) => "TOKEN_ERROR",
            AppError::Store(_) => "STORE_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        match &self {
            AppError::Store(e) => error!(error = ?e, "Storage error"),
            other => error!(error = ?other, "Request failed"),
        }

        // A persistence fault leaves the request outcome indeterminate; the
        // caller is told it is safe to retry (check-in is idempotent).
        let details = match &self {
            AppError::Store(_) => json!({ "code": code, "retryable": true }),
            _ => json!({ "code": code }),
        };

        // Keep internal storage detail out of the public message
        let public_message = match &self {
            AppError::Store(_) => "A storage error occurred, please retry".to_string(),
            other => other.to_string(),
        };

        failure(public_message, Some(details), status)
    }
}

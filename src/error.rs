//! Error types for Biblio server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Stable error codes returned to clients alongside the HTTP status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    StorageFailure = 3,
    NoSuchRecord = 5,
    BookUnavailable = 7,
    Duplicate = 8,
    MaxLoansReached = 11,
    NoActiveLoan = 12,
    AlreadyBorrowed = 13,
    BookHasOpenLoans = 14,
    BadValue = 18,
    UserIdentityAlreadyExists = 19,
    AccountBlocked = 20,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Duplicate book id: {0}")]
    DuplicateId(String),

    #[error("Duplicate identity: {0}")]
    DuplicateIdentity(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No copies available for loan: {0}")]
    BookUnavailable(String),

    #[error("No active loan: {0}")]
    NoActiveLoan(String),

    #[error("Already borrowed: {0}")]
    AlreadyBorrowed(String),

    #[error("Loan limit reached ({current}/{max})")]
    LoanLimitExceeded { current: i64, max: i64 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Account is blocked")]
    AccountBlocked,

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::StorageUnavailable(_) => true,
            AppError::Database(e) => is_connection_error(e),
            _ => false,
        }
    }
}

fn is_connection_error(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
    )
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .map(|e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string())
            })
            .next()
            .unwrap_or_else(|| "Invalid input".to_string());
        AppError::Validation(message)
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
    /// Open loans held by the user (loan limit errors only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_loans: Option<i64>,
    /// Configured loan limit (loan limit errors only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_loans: Option<i64>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut limits = None;

        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone()),
            AppError::DuplicateId(msg) => (StatusCode::CONFLICT, ErrorCode::Duplicate, msg.clone()),
            AppError::DuplicateIdentity(msg) => (
                StatusCode::CONFLICT,
                ErrorCode::UserIdentityAlreadyExists,
                msg.clone(),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchRecord, msg.clone()),
            AppError::BookUnavailable(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BookUnavailable, msg.clone())
            }
            AppError::NoActiveLoan(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::NoActiveLoan, msg.clone())
            }
            AppError::AlreadyBorrowed(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::AlreadyBorrowed, msg.clone())
            }
            AppError::LoanLimitExceeded { current, max } => {
                limits = Some((*current, *max));
                (
                    StatusCode::BAD_REQUEST,
                    ErrorCode::MaxLoansReached,
                    format!("Loan limit reached ({}/{})", current, max),
                )
            }
            AppError::Conflict(msg) => {
                (StatusCode::CONFLICT, ErrorCode::BookHasOpenLoans, msg.clone())
            }
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                ErrorCode::NotAuthorized,
                self.to_string(),
            ),
            AppError::AccountBlocked => (
                StatusCode::FORBIDDEN,
                ErrorCode::AccountBlocked,
                "Account is blocked. Contact an administrator.".to_string(),
            ),
            AppError::Authentication(msg) => {
                (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::Authorization(msg) => {
                (StatusCode::FORBIDDEN, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::StorageUnavailable(msg) => {
                tracing::warn!("Storage unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorCode::StorageFailure,
                    "Storage temporarily unavailable, please retry".to_string(),
                )
            }
            AppError::Database(e) if is_connection_error(e) => {
                tracing::warn!("Database unavailable: {:?}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorCode::StorageFailure,
                    "Storage temporarily unavailable, please retry".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::StorageFailure,
                    "Database error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Failure,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
            current_loans: limits.map(|(current, _)| current),
            max_loans: limits.map(|(_, max)| max),
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

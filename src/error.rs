//! Error types for identity resolution.
//!
//! Errors are classified by recoverability:
//! - InvalidInput: the caller sent neither an email nor a phone number
//! - Retryable: lock contention, timeouts, storage I/O
//! - NonRetryable: invariant violations and other storage failures

use serde::Serialize;
use thiserror::Error;

use crate::db::DbError;

#[derive(Debug, Error)]
pub enum IdentifyError {
    #[error("email or phoneNumber is required")]
    InvalidInput,

    #[error("Transient store failure: {0}")]
    TransientStoreFailure(String),

    #[error("Contact invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Storage error: {0}")]
    Storage(#[source] DbError),
}

impl IdentifyError {
    /// Returns true if re-running the whole request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IdentifyError::TransientStoreFailure(_))
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            IdentifyError::InvalidInput => ErrorType::InvalidInput,
            IdentifyError::TransientStoreFailure(_) => ErrorType::Retryable,
            IdentifyError::InvariantViolation(_) | IdentifyError::Storage(_) => {
                ErrorType::NonRetryable
            }
        }
    }
}

impl From<DbError> for IdentifyError {
    fn from(err: DbError) -> Self {
        if err.is_transient() {
            IdentifyError::TransientStoreFailure(err.to_string())
        } else {
            IdentifyError::Storage(err)
        }
    }
}

/// Serializable error body for the HTTP boundary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub error_type: ErrorType,
    pub can_retry: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorType {
    InvalidInput,
    Retryable,
    NonRetryable,
}

impl From<&IdentifyError> for ErrorResponse {
    fn from(err: &IdentifyError) -> Self {
        ErrorResponse {
            error: err.to_string(),
            error_type: err.error_type(),
            can_retry: err.is_retryable(),
        }
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Error taxonomy for ledger and commission operations.
///
/// `ConcurrencyConflict` is the only retryable variant; callers inside the
/// engine retry it a bounded number of times before surfacing it.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),
    #[error("Insufficient quota: {0}")]
    InsufficientQuota(String),
    #[error("Concurrent update conflict: {0}")]
    ConcurrencyConflict(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
    #[error("External dependency error: {0}")]
    ExternalDependency(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Internal(err.to_string())
    }
}

impl From<crate::hierarchy::HierarchyError> for LedgerError {
    fn from(err: crate::hierarchy::HierarchyError) -> Self {
        LedgerError::ExternalDependency(err.to_string())
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            LedgerError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            LedgerError::InsufficientBalance(msg) | LedgerError::InsufficientQuota(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, msg)
            }
            LedgerError::ConcurrencyConflict(msg) | LedgerError::InvalidStateTransition(msg) => {
                (StatusCode::CONFLICT, msg)
            }
            LedgerError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            LedgerError::ExternalDependency(msg) => (StatusCode::BAD_GATEWAY, msg),
            LedgerError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LedgerError::InsufficientBalance("available 10 < amount 50".to_string());
        assert_eq!(
            err.to_string(),
            "Insufficient balance: available 10 < amount 50"
        );

        let err = LedgerError::InvalidStateTransition("settlement 3 is APPROVED".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid state transition: settlement 3 is APPROVED"
        );
    }

    #[test]
    fn test_sqlx_error_maps_to_internal() {
        let err: LedgerError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, LedgerError::Internal(_)));
    }
}

//! Error types for the HappyBeauty server.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::config_store::ConfigError;
use crate::orders::OrderError;
use crate::redeem::{RedeemError, RedeemRejection};
use crate::store::LedgerError;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Insufficient credit: balance {balance}, requested {requested}")]
    InsufficientCredit { balance: i32, requested: i32 },

    #[error("Redeem code rejected: {0}")]
    Redeem(RedeemRejection),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg).into_response(),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg).into_response(),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg).into_response(),
            AppError::InsufficientCredit { balance, requested } => (
                StatusCode::PAYMENT_REQUIRED,
                Json(json!({
                    "error": "INSUFFICIENT_CREDIT",
                    "credits": balance,
                    "requested": requested,
                })),
            )
                .into_response(),
            AppError::Redeem(reason) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": reason.as_str(),
                    "message": reason.to_string(),
                })),
            )
                .into_response(),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Database(e) => AppError::Database(e),
            LedgerError::UserNotFound(_) => {
                AppError::NotFound("Credit account not found".to_string())
            }
            LedgerError::ProfileExists(_) => {
                AppError::Conflict("Credit account already exists".to_string())
            }
            LedgerError::InsufficientCredit { balance, requested } => {
                AppError::InsufficientCredit { balance, requested }
            }
            LedgerError::InvalidAmount(amount) => {
                AppError::BadRequest(format!("Amount must be positive, got {}", amount))
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidAmount(msg) | OrderError::InvalidCredits(msg) => {
                AppError::BadRequest(msg)
            }
            OrderError::Gateway(e) => AppError::Internal(format!("Failed to create order: {}", e)),
            OrderError::Storage(e) => AppError::Internal(format!("Failed to create order: {}", e)),
        }
    }
}

impl From<RedeemError> for AppError {
    fn from(err: RedeemError) -> Self {
        match err {
            RedeemError::Rejected(reason) => AppError::Redeem(reason),
            RedeemError::Ledger(e) => e.into(),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::UnknownKey(e) => AppError::BadRequest(e.to_string()),
            ConfigError::Storage(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_ledger_error_status_codes() {
        let cases = [
            (LedgerError::UserNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (LedgerError::ProfileExists(Uuid::nil()), StatusCode::CONFLICT),
            (
                LedgerError::InsufficientCredit {
                    balance: 0,
                    requested: 1,
                },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (LedgerError::InvalidAmount(0), StatusCode::BAD_REQUEST),
            (
                LedgerError::DuplicateOrder("PAY_1".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_redeem_rejection_is_bad_request() {
        let response = AppError::from(RedeemError::Rejected(RedeemRejection::AlreadyUsed)).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_order_validation_is_bad_request() {
        let response =
            AppError::from(OrderError::InvalidCredits("credits must be positive".to_string()))
                .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

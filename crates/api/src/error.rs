//! API error types
//!
//! Every ledger failure maps to an HTTP status plus a stable machine code so
//! the dashboard can route the merchant (recharge page, plan page, support)
//! without parsing human-readable messages.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use souq_ledger::LedgerError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Authentication required")]
    MissingAuth,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("{0}")]
    BadRequest(String),

    #[error("Recharges must go through gateway checkout in this deployment")]
    GatewayRequired,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl ApiError {
    /// HTTP status and machine-readable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Ledger(e) => match e {
                LedgerError::InsufficientFunds { .. } => {
                    (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_FUNDS")
                }
                LedgerError::PaymentPending => (StatusCode::PAYMENT_REQUIRED, "PAYMENT_PENDING"),
                LedgerError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                LedgerError::LimitReached(_) => (StatusCode::FORBIDDEN, "LIMIT_REACHED"),
                LedgerError::FeatureLocked(_) => (StatusCode::FORBIDDEN, "FEATURE_LOCKED"),
                LedgerError::SubscriptionInactive => {
                    (StatusCode::FORBIDDEN, "SUBSCRIPTION_INACTIVE")
                }
                LedgerError::GracePeriodExpired => {
                    (StatusCode::FORBIDDEN, "GRACE_PERIOD_EXPIRED")
                }
                LedgerError::AlreadyActive => (StatusCode::CONFLICT, "ALREADY_ACTIVE"),
                LedgerError::InvalidAmount(_) => (StatusCode::BAD_REQUEST, "INVALID_AMOUNT"),
                LedgerError::TransactionAbort(_) | LedgerError::Database(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
                }
            },
            ApiError::MissingAuth => (StatusCode::UNAUTHORIZED, "MISSING_AUTH"),
            ApiError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::GatewayRequired => (StatusCode::SERVICE_UNAVAILABLE, "GATEWAY_REQUIRED"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Internal details stay in the logs, not the response body.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_insufficient_funds_maps_to_402() {
        let err = ApiError::Ledger(LedgerError::InsufficientFunds {
            required: dec!(0.50),
            available: dec!(0.10),
        });
        assert_eq!(
            err.status_and_code(),
            (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_FUNDS")
        );
    }

    #[test]
    fn test_guard_rejections_map_to_403() {
        for (err, code) in [
            (
                ApiError::Ledger(LedgerError::LimitReached("stores".into())),
                "LIMIT_REACHED",
            ),
            (
                ApiError::Ledger(LedgerError::FeatureLocked("dropshipping".into())),
                "FEATURE_LOCKED",
            ),
            (
                ApiError::Ledger(LedgerError::SubscriptionInactive),
                "SUBSCRIPTION_INACTIVE",
            ),
            (
                ApiError::Ledger(LedgerError::GracePeriodExpired),
                "GRACE_PERIOD_EXPIRED",
            ),
        ] {
            let (status, got) = err.status_and_code();
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert_eq!(got, code);
        }
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let (status, code) =
            ApiError::Ledger(LedgerError::Database("connection reset".into())).status_and_code();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code, "INTERNAL");
    }

    #[test]
    fn test_payment_pending_maps_to_402() {
        assert_eq!(
            ApiError::Ledger(LedgerError::PaymentPending).status_and_code(),
            (StatusCode::PAYMENT_REQUIRED, "PAYMENT_PENDING")
        );
    }
}

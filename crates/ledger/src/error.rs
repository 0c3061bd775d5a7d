//! Ledger error taxonomy
//!
//! Every settlement function translates low-level failures into these domain
//! errors before they cross into the HTTP layer, which maps each variant to a
//! stable machine-readable code.

use rust_decimal::Decimal;

/// Domain errors surfaced by the ledger engine.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A debit exceeded the available balance, or the free-plan prepaid
    /// safeguard triggered. Reports required vs available when known.
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("plan limit reached: {0}")]
    LimitReached(String),

    #[error("feature '{0}' is not included in the current plan")]
    FeatureLocked(String),

    #[error("subscription is not active")]
    SubscriptionInactive,

    #[error("grace period has expired")]
    GracePeriodExpired,

    #[error("subscription payment is pending; order creation is blocked")]
    PaymentPending,

    #[error("subscription is already active")]
    AlreadyActive,

    #[error("invalid amount: {0}")]
    InvalidAmount(Decimal),

    /// The atomic unit of work failed after writes were attempted. In atomic
    /// mode the transaction rolled back; in best-effort mode this is logged
    /// prominently because a partial write may be observable.
    #[error("ledger unit of work aborted: {0}")]
    TransactionAbort(String),

    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Database(err.to_string())
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Souq Shared
//!
//! Cross-crate primitives: database pool construction, the migration runner,
//! and the domain enums every crate agrees on (subscription status, plan type).

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Single deployment currency. No conversion logic exists anywhere.
pub const DEFAULT_CURRENCY: &str = "EGP";

/// Create the main database connection pool.
///
/// Sized for the request path; the worker builds its own smaller pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;

    tracing::info!("Database pool created");
    Ok(pool)
}

/// Create a pool for running migrations (longer timeouts, single connection).
pub async fn create_migration_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await
}

/// Run embedded migrations against the given pool.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Billing status of a merchant's subscription.
///
/// Transitions happen only through the lifecycle manager's named operations;
/// the strings match the `subscriptions.status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Inactive,
    Active,
    PastDue,
    Canceled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Inactive => "inactive",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    /// Whether the merchant is currently entitled to paid-plan service.
    pub fn is_active(&self) -> bool {
        matches!(self, SubscriptionStatus::Active)
    }

    /// Statuses in which the billing overview reports the subscription as lapsed.
    pub fn is_lapsed(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::PastDue | SubscriptionStatus::Expired
        )
    }
}

impl FromStr for SubscriptionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inactive" => Ok(SubscriptionStatus::Inactive),
            "active" => Ok(SubscriptionStatus::Active),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            "expired" => Ok(SubscriptionStatus::Expired),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a plan bills a monthly price or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    Free,
    Paid,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Free => "free",
            PlanType::Paid => "paid",
        }
    }
}

impl FromStr for PlanType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(PlanType::Free),
            "paid" => Ok(PlanType::Paid),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl std::fmt::Display for PlanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error for enum strings that don't match any known variant.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown variant: {0}")]
pub struct UnknownVariant(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_column_strings() {
        for status in [
            SubscriptionStatus::Inactive,
            SubscriptionStatus::Active,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::Expired,
        ] {
            let parsed: SubscriptionStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!("paused".parse::<SubscriptionStatus>().is_err());
    }

    #[test]
    fn lapsed_covers_past_due_and_expired_only() {
        assert!(SubscriptionStatus::PastDue.is_lapsed());
        assert!(SubscriptionStatus::Expired.is_lapsed());
        assert!(!SubscriptionStatus::Active.is_lapsed());
        assert!(!SubscriptionStatus::Inactive.is_lapsed());
        assert!(!SubscriptionStatus::Canceled.is_lapsed());
    }
}

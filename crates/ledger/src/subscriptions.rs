//! Subscription lifecycle management
//!
//! One subscription per merchant account (unique index enforced). Status
//! moves only through the named operations here: subscribe, pay-from-wallet,
//! webhook activation, and the expiry sweep. No other code path writes
//! subscription rows.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgConnection};
use time::OffsetDateTime;
use uuid::Uuid;

use souq_shared::SubscriptionStatus;

use crate::error::{LedgerError, LedgerResult};
use crate::plans::{self, PlanRef};
use crate::receipts::{self, ReceiptType};
use crate::uow::UnitOfWork;
use crate::wallet::{self, TransactionReason};

/// Paid subscription billing window.
pub const SUBSCRIPTION_PERIOD_DAYS: i64 = 30;

/// Grace window granted when a paid subscription lapses past its expiry.
pub const GRACE_PERIOD_DAYS: i64 = 7;

/// Expiry horizon for the lazy free-plan fallback record.
const DEFAULT_SUBSCRIPTION_YEARS: i64 = 10;

const SUBSCRIPTION_COLUMNS: &str = "id, account_id, plan_id, status, started_at, expires_at, \
     trial_expires_at, grace_period_end, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub account_id: Uuid,
    pub plan_id: Uuid,
    pub status: String,
    pub started_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub trial_expires_at: Option<OffsetDateTime>,
    pub grace_period_end: Option<OffsetDateTime>,
    pub updated_at: OffsetDateTime,
}

impl Subscription {
    /// Parsed status. An unrecognized column value (impossible under the
    /// CHECK constraint) reads as inactive, failing closed.
    pub fn status(&self) -> SubscriptionStatus {
        self.status.parse().unwrap_or(SubscriptionStatus::Inactive)
    }

    /// Unresolved reference to this subscription's plan.
    pub fn plan_ref(&self) -> PlanRef {
        PlanRef::Unresolved(self.plan_id)
    }

    /// Whether the grace period is still running at `now`.
    pub fn grace_period_live(&self, now: OffsetDateTime) -> bool {
        matches!(self.grace_period_end, Some(end) if end > now)
    }
}

/// Counts from one expiry sweep pass.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SweepSummary {
    pub marked_past_due: u64,
    pub marked_expired: u64,
}

#[derive(Clone)]
pub struct SubscriptionService {
    uow: UnitOfWork,
}

impl SubscriptionService {
    pub fn new(uow: UnitOfWork) -> Self {
        Self { uow }
    }

    /// The account's subscription, if one exists.
    pub async fn get(&self, account_id: Uuid) -> LedgerResult<Option<Subscription>> {
        let sub: Option<Subscription> = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE account_id = $1"
        ))
        .bind(account_id)
        .fetch_optional(self.uow.pool())
        .await?;
        Ok(sub)
    }

    /// Upsert-by-account plan selection. Free plans activate immediately;
    /// paid plans start inactive until paid from the wallet or confirmed by
    /// the gateway. Used at registration and on explicit plan selection.
    pub async fn auto_subscribe_record(
        &self,
        account_id: Uuid,
        plan_id: Uuid,
    ) -> LedgerResult<Subscription> {
        let mut conn = self.uow.pool().acquire().await?;
        let plan = plans::fetch_plan(&mut conn, plan_id).await?;
        if !plan.is_active {
            return Err(LedgerError::NotFound(format!("active plan {plan_id}")));
        }

        let status = if plan.is_free() {
            SubscriptionStatus::Active
        } else {
            SubscriptionStatus::Inactive
        };

        let sub: Subscription = sqlx::query_as(&format!(
            "INSERT INTO subscriptions (account_id, plan_id, status, started_at, expires_at)
             VALUES ($1, $2, $3, NOW(), NOW() + make_interval(days => $4))
             ON CONFLICT (account_id) DO UPDATE SET
                 plan_id = EXCLUDED.plan_id,
                 status = EXCLUDED.status,
                 started_at = NOW(),
                 expires_at = EXCLUDED.expires_at,
                 grace_period_end = NULL,
                 updated_at = NOW()
             RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(account_id)
        .bind(plan_id)
        .bind(status.as_str())
        .bind(SUBSCRIPTION_PERIOD_DAYS as i32)
        .fetch_one(&mut *conn)
        .await?;

        tracing::info!(
            account_id = %account_id,
            plan = %plan.display_name,
            status = %status,
            "Subscription recorded"
        );
        Ok(sub)
    }

    /// Materialize-default-on-miss, made explicit at the repository boundary.
    /// Returns the existing record untouched when present; otherwise creates
    /// a long-duration active free-plan record. Safe under concurrent first
    /// touch: the unique constraint absorbs the duplicate insert.
    pub async fn get_or_create_default(&self, account_id: Uuid) -> LedgerResult<Subscription> {
        if let Some(existing) = self.get(account_id).await? {
            return Ok(existing);
        }

        let mut conn = self.uow.pool().acquire().await?;
        let free_plan = plans::find_free_plan(&mut conn).await?;

        sqlx::query(
            "INSERT INTO subscriptions (account_id, plan_id, status, started_at, expires_at)
             VALUES ($1, $2, 'active', NOW(), NOW() + make_interval(years => $3))
             ON CONFLICT (account_id) DO NOTHING",
        )
        .bind(account_id)
        .bind(free_plan.id)
        .bind(DEFAULT_SUBSCRIPTION_YEARS as i32)
        .execute(&mut *conn)
        .await?;

        let sub: Subscription = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE account_id = $1"
        ))
        .bind(account_id)
        .fetch_one(&mut *conn)
        .await?;

        tracing::info!(account_id = %account_id, "Default free subscription materialized");
        Ok(sub)
    }

    /// Resolve the subscription governing a store. Canonical scope is the
    /// owner's account; a store carrying its own `subscription_id` is the
    /// one intentional exception, used by marketplaces reselling storefronts.
    pub async fn resolve_for_store(&self, store_id: Uuid) -> LedgerResult<Subscription> {
        let row: Option<(Uuid, Option<Uuid>)> =
            sqlx::query_as("SELECT account_id, subscription_id FROM stores WHERE id = $1")
                .bind(store_id)
                .fetch_optional(self.uow.pool())
                .await?;

        let (owner_account_id, override_id) =
            row.ok_or_else(|| LedgerError::NotFound(format!("store {store_id}")))?;

        if let Some(sub_id) = override_id {
            let sub: Option<Subscription> = sqlx::query_as(&format!(
                "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1"
            ))
            .bind(sub_id)
            .fetch_optional(self.uow.pool())
            .await?;

            if let Some(sub) = sub {
                return Ok(sub);
            }
            tracing::warn!(
                store_id = %store_id,
                subscription_id = %sub_id,
                "Store references a missing subscription; falling back to account scope"
            );
        }

        self.get_or_create_default(owner_account_id).await
    }

    /// Activate the account's pending subscription by paying the plan price
    /// from the wallet. Debit, ledger entry, receipt, and activation are one
    /// unit of work.
    pub async fn pay_from_wallet(&self, account_id: Uuid) -> LedgerResult<Subscription> {
        let mut uow = self.uow.begin().await?;
        let conn = uow.conn();

        let sub: Option<Subscription> = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE account_id = $1"
        ))
        .bind(account_id)
        .fetch_optional(&mut *conn)
        .await?;

        let sub = sub
            .ok_or_else(|| LedgerError::NotFound(format!("subscription for {account_id}")))?;

        if sub.status().is_active() {
            return Err(LedgerError::AlreadyActive);
        }

        let plan = sub.plan_ref().resolve(conn).await?;

        if !plan.is_free() {
            let wallet = wallet::ensure_wallet(conn, account_id).await?;
            if !sufficient_for_plan(wallet.balance, plan.monthly_price) {
                return Err(LedgerError::InsufficientFunds {
                    required: plan.monthly_price,
                    available: wallet.balance,
                });
            }

            wallet::apply_debit(
                conn,
                account_id,
                plan.monthly_price,
                TransactionReason::PlanPayment,
                Some(sub.id),
            )
            .await?;
            receipts::issue_receipt(
                conn,
                account_id,
                Some(sub.id),
                ReceiptType::PlanPayment,
                plan.monthly_price,
            )
            .await?;
        }

        let updated = activate_on(conn, account_id, SUBSCRIPTION_PERIOD_DAYS).await?;
        uow.commit().await?;

        tracing::info!(
            account_id = %account_id,
            plan = %plan.display_name,
            price = %plan.monthly_price,
            "Subscription activated from wallet"
        );
        Ok(updated)
    }

    /// Sweep lapsed subscriptions. Paid-plan records past their expiry move
    /// to past_due with a fresh grace window; past_due records whose grace
    /// window has elapsed move to expired. Run by the worker, never inline.
    pub async fn sweep_expired(&self) -> LedgerResult<SweepSummary> {
        let marked_past_due = sqlx::query(
            "UPDATE subscriptions SET
                 status = 'past_due',
                 grace_period_end = NOW() + make_interval(days => $1),
                 updated_at = NOW()
             WHERE status = 'active'
               AND expires_at < NOW()
               AND plan_id IN (SELECT id FROM plans WHERE plan_type = 'paid')",
        )
        .bind(GRACE_PERIOD_DAYS as i32)
        .execute(self.uow.pool())
        .await?
        .rows_affected();

        let marked_expired = sqlx::query(
            "UPDATE subscriptions SET status = 'expired', updated_at = NOW()
             WHERE status = 'past_due'
               AND grace_period_end IS NOT NULL
               AND grace_period_end < NOW()",
        )
        .execute(self.uow.pool())
        .await?
        .rows_affected();

        if marked_past_due > 0 || marked_expired > 0 {
            tracing::info!(
                marked_past_due = marked_past_due,
                marked_expired = marked_expired,
                "Subscription expiry sweep applied"
            );
        }

        Ok(SweepSummary {
            marked_past_due,
            marked_expired,
        })
    }
}

/// Activate the account's subscription with a refreshed billing window,
/// inside the caller's unit of work. Shared by wallet payment and webhook
/// confirmation.
pub(crate) async fn activate_on(
    conn: &mut PgConnection,
    account_id: Uuid,
    period_days: i64,
) -> LedgerResult<Subscription> {
    let sub: Option<Subscription> = sqlx::query_as(&format!(
        "UPDATE subscriptions SET
             status = 'active',
             started_at = NOW(),
             expires_at = NOW() + make_interval(days => $1),
             grace_period_end = NULL,
             updated_at = NOW()
         WHERE account_id = $2
         RETURNING {SUBSCRIPTION_COLUMNS}"
    ))
    .bind(period_days as i32)
    .bind(account_id)
    .fetch_optional(&mut *conn)
    .await?;

    sub.ok_or_else(|| LedgerError::NotFound(format!("subscription for {account_id}")))
}

/// Price comparison used by the wallet-payment path, kept pure for tests.
pub fn sufficient_for_plan(balance: Decimal, monthly_price: Decimal) -> bool {
    balance >= monthly_price
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sub_with(status: &str, grace_period_end: Option<OffsetDateTime>) -> Subscription {
        let now = OffsetDateTime::now_utc();
        Subscription {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            status: status.to_string(),
            started_at: now,
            expires_at: now,
            trial_expires_at: None,
            grace_period_end,
            updated_at: now,
        }
    }

    #[test]
    fn status_parses_from_column_string() {
        assert_eq!(sub_with("active", None).status(), SubscriptionStatus::Active);
        assert_eq!(
            sub_with("past_due", None).status(),
            SubscriptionStatus::PastDue
        );
    }

    #[test]
    fn grace_period_liveness() {
        let now = OffsetDateTime::now_utc();
        let live = sub_with("past_due", Some(now + time::Duration::days(3)));
        let elapsed = sub_with("past_due", Some(now - time::Duration::days(1)));
        let unset = sub_with("past_due", None);

        assert!(live.grace_period_live(now));
        assert!(!elapsed.grace_period_live(now));
        assert!(!unset.grace_period_live(now));
    }

    #[test]
    fn wallet_covers_plan_price_on_exact_balance() {
        assert!(sufficient_for_plan(dec!(499), dec!(499)));
        assert!(sufficient_for_plan(dec!(500), dec!(499)));
        assert!(!sufficient_for_plan(dec!(498.99), dec!(499)));
    }
}

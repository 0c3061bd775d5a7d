//! Billing overview read-model
//!
//! Composes wallet, subscription, plan, and usage counts into the single
//! dashboard payload. Pure read path apart from the idempotent lazy creation
//! of the wallet and default subscription. The blocking reason is advisory
//! for the UI and is recomputed on every call, never cached.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use uuid::Uuid;

use souq_shared::SubscriptionStatus;

use crate::error::LedgerResult;
use crate::plans::Plan;
use crate::subscriptions::{Subscription, SubscriptionService};
use crate::uow::UnitOfWork;
use crate::wallet::{self, Wallet};

/// Minimum prepaid balance a free-plan merchant needs before the UI stops
/// steering them toward a recharge.
pub const MIN_FREE_PLAN_BALANCE: Decimal = dec!(250);

/// Why the merchant is (or is about to be) blocked, for UI routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockingReason {
    LowWallet,
    SubscriptionExpired,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct UsageCounts {
    pub stores: i64,
    pub products: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BillingOverview {
    pub wallet: Wallet,
    pub subscription: Subscription,
    pub plan: Plan,
    pub usage: UsageCounts,
    pub blocking_reason: Option<BlockingReason>,
}

/// Pure derivation, separated out so it is trivially unit-testable.
pub fn derive_blocking_reason(
    plan_is_free: bool,
    balance: Decimal,
    status: SubscriptionStatus,
) -> Option<BlockingReason> {
    if plan_is_free && balance < MIN_FREE_PLAN_BALANCE {
        Some(BlockingReason::LowWallet)
    } else if status.is_lapsed() {
        Some(BlockingReason::SubscriptionExpired)
    } else {
        None
    }
}

#[derive(Clone)]
pub struct OverviewService {
    uow: UnitOfWork,
}

impl OverviewService {
    pub fn new(uow: UnitOfWork) -> Self {
        Self { uow }
    }

    pub async fn get_billing_overview(&self, account_id: Uuid) -> LedgerResult<BillingOverview> {
        let subscriptions = SubscriptionService::new(self.uow.clone());
        let subscription = subscriptions.get_or_create_default(account_id).await?;

        let mut conn = self.uow.pool().acquire().await?;
        let merchant_wallet = wallet::ensure_wallet(&mut conn, account_id).await?;
        let plan = subscription.plan_ref().resolve(&mut conn).await?;

        let stores: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stores WHERE account_id = $1")
            .bind(account_id)
            .fetch_one(self.uow.pool())
            .await?;

        let products: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM products p
             JOIN stores s ON s.id = p.store_id
             WHERE s.account_id = $1",
        )
        .bind(account_id)
        .fetch_one(self.uow.pool())
        .await?;

        let blocking_reason = derive_blocking_reason(
            plan.is_free(),
            merchant_wallet.balance,
            subscription.status(),
        );

        Ok(BillingOverview {
            wallet: merchant_wallet,
            subscription,
            plan,
            usage: UsageCounts { stores, products },
            blocking_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_plan_below_minimum_blocks_on_wallet() {
        assert_eq!(
            derive_blocking_reason(true, dec!(249.99), SubscriptionStatus::Active),
            Some(BlockingReason::LowWallet)
        );
    }

    #[test]
    fn free_plan_at_minimum_is_clear() {
        assert_eq!(
            derive_blocking_reason(true, dec!(250), SubscriptionStatus::Active),
            None
        );
    }

    #[test]
    fn lapsed_subscription_blocks_regardless_of_balance() {
        assert_eq!(
            derive_blocking_reason(false, dec!(10_000), SubscriptionStatus::PastDue),
            Some(BlockingReason::SubscriptionExpired)
        );
        assert_eq!(
            derive_blocking_reason(false, dec!(10_000), SubscriptionStatus::Expired),
            Some(BlockingReason::SubscriptionExpired)
        );
    }

    #[test]
    fn low_wallet_takes_precedence_over_lapsed_status_for_free_plans() {
        assert_eq!(
            derive_blocking_reason(true, dec!(0), SubscriptionStatus::Expired),
            Some(BlockingReason::LowWallet)
        );
    }

    #[test]
    fn paid_active_plan_is_clear() {
        assert_eq!(
            derive_blocking_reason(false, dec!(0), SubscriptionStatus::Active),
            None
        );
    }
}

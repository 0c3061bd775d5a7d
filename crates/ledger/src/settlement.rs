//! Order fee settlement
//!
//! Runs once per successfully-created order. Resolves the effective per-order
//! platform fee from the governing subscription's plan, then deducts it from
//! the merchant's wallet with a matching ledger entry and receipt in one unit
//! of work. Fee resolution failures never abort an order that already exists;
//! funds-availability failures always do.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::plans::Plan;
use crate::receipts::{self, ReceiptType};
use crate::subscriptions::SubscriptionService;
use crate::uow::UnitOfWork;
use crate::wallet::{self, TransactionReason};

/// Fee charged when the plan's configured fee cannot be read.
pub const DEFAULT_ORDER_FEE: Decimal = dec!(5.00);

/// Effective fee for one order, plus the plan facts the safeguard needs.
#[derive(Debug, Clone)]
pub struct ResolvedFee {
    pub fee: Decimal,
    pub plan_is_free: bool,
    pub plan_display_name: Option<String>,
}

impl ResolvedFee {
    /// Fallback used when the plan cannot be resolved. Deliberately not
    /// marked free: without plan facts the generic debit guard applies,
    /// not the stricter prepaid safeguard.
    pub fn fallback() -> Self {
        Self {
            fee: DEFAULT_ORDER_FEE,
            plan_is_free: false,
            plan_display_name: None,
        }
    }

    pub fn from_plan(plan: &Plan) -> Self {
        Self {
            fee: plan.order_fee,
            plan_is_free: plan.is_free(),
            plan_display_name: Some(plan.display_name.clone()),
        }
    }
}

#[derive(Clone)]
pub struct SettlementService {
    uow: UnitOfWork,
}

impl SettlementService {
    pub fn new(uow: UnitOfWork) -> Self {
        Self { uow }
    }

    /// Settle the platform fee for a durably-created order. Returns the
    /// merchant's balance after the deduction.
    ///
    /// Failure semantics: `InsufficientFunds` (including the free-plan
    /// prepaid safeguard) propagates so the caller can abort its own
    /// transaction or flag the uncollected fee for reconciliation. Plan-read
    /// hiccups are the one locally-recovered case: logged and defaulted,
    /// because the order itself already succeeded.
    pub async fn process_order_fee(
        &self,
        account_id: Uuid,
        order_id: Uuid,
        store_id: Uuid,
    ) -> LedgerResult<Decimal> {
        let resolved = match self.resolve_fee(store_id).await {
            Ok(resolved) => resolved,
            Err(err) => {
                tracing::warn!(
                    order_id = %order_id,
                    store_id = %store_id,
                    error = %err,
                    fallback_fee = %DEFAULT_ORDER_FEE,
                    "Fee resolution failed; charging the default order fee"
                );
                ResolvedFee::fallback()
            }
        };

        if resolved.fee <= Decimal::ZERO {
            // Zero-fee plans (negotiated enterprise deals) settle nothing.
            tracing::debug!(order_id = %order_id, "Plan carries no order fee, skipping settlement");
            return wallet::WalletService::new(self.uow.clone())
                .balance(account_id)
                .await;
        }

        let mut uow = self.uow.begin().await?;
        let conn = uow.conn();

        let merchant_wallet = wallet::ensure_wallet(conn, account_id).await?;

        // Free-tier usage is contractually prepaid: reject before touching the
        // balance so the failure reads as a policy breach, not a debit race.
        if resolved.plan_is_free && merchant_wallet.balance < resolved.fee {
            return Err(LedgerError::InsufficientFunds {
                required: resolved.fee,
                available: merchant_wallet.balance,
            });
        }

        let new_balance = wallet::apply_debit(
            conn,
            account_id,
            resolved.fee,
            TransactionReason::OrderFee,
            Some(order_id),
        )
        .await?;

        receipts::issue_receipt(conn, account_id, Some(order_id), ReceiptType::Order, resolved.fee)
            .await?;

        uow.commit().await?;

        tracing::info!(
            account_id = %account_id,
            order_id = %order_id,
            fee = %resolved.fee,
            plan = resolved.plan_display_name.as_deref().unwrap_or("(unresolved)"),
            new_balance = %new_balance,
            "Order fee settled"
        );

        Ok(new_balance)
    }

    /// Resolve the fee via the governing subscription: store-scoped override
    /// when present, else the owner's account-scoped record.
    async fn resolve_fee(&self, store_id: Uuid) -> LedgerResult<ResolvedFee> {
        let subscriptions = SubscriptionService::new(self.uow.clone());
        let subscription = subscriptions.resolve_for_store(store_id).await?;

        let mut conn = self.uow.pool().acquire().await?;
        let plan = subscription.plan_ref().resolve(&mut conn).await?;

        Ok(ResolvedFee::from_plan(&plan))
    }
}

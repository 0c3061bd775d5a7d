// Ledger crate clippy configuration
// These are intentional patterns in this crate:
#![allow(clippy::result_large_err)] // LedgerError::InsufficientFunds carries both amounts
#![allow(clippy::too_many_arguments)] // Settlement writes take the full ledger tuple
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Souq Ledger Engine
//!
//! The wallet/subscription ledger behind the storefront platform.
//!
//! ## Features
//!
//! - **Wallet Store**: prepaid balance per merchant with an append-only
//!   transaction log; debits are compare-and-swap, never read-then-write
//! - **Subscription Lifecycle**: inactive/active/past_due/expired state
//!   machine, lazy free-plan default, wallet-funded activation
//! - **Plan Feature Matrix**: pure tier/feature gating with an explicit
//!   legacy-alias table that fails closed
//! - **Order Fee Settlement**: per-order platform fee deduction with the
//!   free-plan prepaid safeguard and a logged fallback fee
//! - **Billing Overview**: the dashboard read-model with its advisory
//!   blocking reason
//! - **Webhook Reconciliation**: idempotent application of gateway payment
//!   confirmations
//! - **Invariants**: runnable read-only consistency checks

pub mod error;
pub mod invariants;
pub mod overview;
pub mod plans;
pub mod receipts;
pub mod settlement;
pub mod subscriptions;
pub mod uow;
pub mod wallet;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Error
pub use error::{LedgerError, LedgerResult};

// Unit of work
pub use uow::{ConsistencyMode, UnitOfWork, UowHandle};

// Wallet
pub use wallet::{
    TransactionDirection, TransactionReason, Wallet, WalletService, WalletTransaction,
};

// Receipts
pub use receipts::{Receipt, ReceiptType};

// Plans
pub use plans::{can_access_feature, limit_allows, Feature, Plan, PlanRef, PlanTier, UNLIMITED};

// Subscriptions
pub use subscriptions::{
    Subscription, SubscriptionService, SweepSummary, GRACE_PERIOD_DAYS, SUBSCRIPTION_PERIOD_DAYS,
};

// Settlement
pub use settlement::{ResolvedFee, SettlementService, DEFAULT_ORDER_FEE};

// Overview
pub use overview::{
    derive_blocking_reason, BillingOverview, BlockingReason, OverviewService, UsageCounts,
    MIN_FREE_PLAN_BALANCE,
};

// Webhooks
pub use webhooks::{
    amount_from_cents, ExtraConfig, GatewayWebhook, PaymentPurpose, WebhookOutcome,
    WebhookReconciler,
};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

use sqlx::PgPool;

/// Main ledger service that combines all ledger functionality.
pub struct LedgerService {
    pub wallet: WalletService,
    pub subscriptions: SubscriptionService,
    pub settlement: SettlementService,
    pub overview: OverviewService,
    pub webhooks: WebhookReconciler,
    pub invariants: InvariantChecker,
}

impl LedgerService {
    /// Build the service tree over one pool with the configured consistency
    /// mode.
    pub fn new(pool: PgPool, mode: ConsistencyMode) -> Self {
        let uow = UnitOfWork::new(pool.clone(), mode);

        Self {
            wallet: WalletService::new(uow.clone()),
            subscriptions: SubscriptionService::new(uow.clone()),
            settlement: SettlementService::new(uow.clone()),
            overview: OverviewService::new(uow.clone()),
            webhooks: WebhookReconciler::new(uow),
            invariants: InvariantChecker::new(pool),
        }
    }
}

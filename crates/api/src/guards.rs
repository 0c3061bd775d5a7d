//! Access-control guards
//!
//! A middleware resolves the merchant's [`BillingContext`] once per request
//! (lazily creating the wallet and free default subscription, so a brand-new
//! account passes through instead of 404ing). Handlers then call the guard
//! functions below before their write. The decision logic is pure and split
//! from the I/O so every branch is unit-testable.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use time::OffsetDateTime;

use souq_ledger::{can_access_feature, limit_allows, LedgerError, Plan, Subscription, Wallet};
use souq_ledger::MIN_FREE_PLAN_BALANCE;
use souq_shared::SubscriptionStatus;

use crate::auth::AuthAccount;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Everything the guards need to know about the requesting merchant.
#[derive(Debug, Clone)]
pub struct BillingContext {
    pub subscription: Subscription,
    pub plan: Plan,
    pub wallet: Wallet,
}

impl BillingContext {
    pub fn status(&self) -> SubscriptionStatus {
        self.subscription.status()
    }
}

/// Middleware that resolves the billing context for the authenticated account.
///
/// Runs after `require_auth`; recomputing on every request keeps the guards
/// consistent with webhook/worker writes that happened since the last call.
pub async fn resolve_billing_context(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(auth) = request.extensions().get::<AuthAccount>().copied() else {
        return ApiError::MissingAuth.into_response();
    };

    match load_context(&state, auth).await {
        Ok(ctx) => {
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

async fn load_context(state: &AppState, auth: AuthAccount) -> ApiResult<BillingContext> {
    let subscription = state
        .ledger
        .subscriptions
        .get_or_create_default(auth.account_id)
        .await?;

    let mut conn = state.pool.acquire().await?;
    let wallet = souq_ledger::wallet::ensure_wallet(&mut conn, auth.account_id).await?;
    let plan = subscription.plan_ref().resolve(&mut conn).await?;

    Ok(BillingContext {
        subscription,
        plan,
        wallet,
    })
}

/// Service availability during a lapsed subscription.
///
/// A live grace period degrades service: reads still work and only order
/// creation is refused, steering the merchant to pay before losing sales.
/// Once the grace period has elapsed everything mutating is blocked.
pub fn ensure_service_available(ctx: &BillingContext, is_order_creation: bool) -> ApiResult<()> {
    if !ctx.status().is_lapsed() {
        return Ok(());
    }

    let grace_live = ctx.subscription.grace_period_live(OffsetDateTime::now_utc());
    if grace_live {
        if is_order_creation {
            return Err(ApiError::Ledger(LedgerError::PaymentPending));
        }
        Ok(())
    } else {
        Err(ApiError::Ledger(LedgerError::GracePeriodExpired))
    }
}

/// Store creation: active subscription plus headroom under the plan's cap.
pub fn ensure_store_allowed(ctx: &BillingContext, current_stores: i64) -> ApiResult<()> {
    if !ctx.status().is_active() {
        return Err(ApiError::Ledger(LedgerError::SubscriptionInactive));
    }
    if !limit_allows(ctx.plan.max_stores, current_stores) {
        return Err(ApiError::Ledger(LedgerError::LimitReached(format!(
            "plan '{}' allows {} store(s)",
            ctx.plan.display_name, ctx.plan.max_stores
        ))));
    }
    Ok(())
}

/// Product creation: active subscription plus headroom in this store.
pub fn ensure_product_allowed(ctx: &BillingContext, current_products: i64) -> ApiResult<()> {
    if !ctx.status().is_active() {
        return Err(ApiError::Ledger(LedgerError::SubscriptionInactive));
    }
    if !limit_allows(ctx.plan.max_products_per_store, current_products) {
        return Err(ApiError::Ledger(LedgerError::LimitReached(format!(
            "plan '{}' allows {} product(s) per store",
            ctx.plan.display_name, ctx.plan.max_products_per_store
        ))));
    }
    Ok(())
}

/// Publishing a store: free plans must hold the minimum prepaid balance so
/// there is something to settle order fees against; paid plans just need to
/// be active.
pub fn ensure_publish_allowed(ctx: &BillingContext) -> ApiResult<()> {
    if ctx.plan.is_free() {
        if ctx.wallet.balance < MIN_FREE_PLAN_BALANCE {
            return Err(ApiError::Ledger(LedgerError::InsufficientFunds {
                required: MIN_FREE_PLAN_BALANCE,
                available: ctx.wallet.balance,
            }));
        }
        Ok(())
    } else if ctx.status().is_active() {
        Ok(())
    } else {
        Err(ApiError::Ledger(LedgerError::SubscriptionInactive))
    }
}

/// Feature gate: the plan's tier must unlock the feature key.
pub fn require_feature(ctx: &BillingContext, feature_key: &str) -> ApiResult<()> {
    if !ctx.status().is_active() {
        return Err(ApiError::Ledger(LedgerError::SubscriptionInactive));
    }
    if !can_access_feature(&ctx.plan.display_name, feature_key) {
        return Err(ApiError::Ledger(LedgerError::FeatureLocked(
            feature_key.to_string(),
        )));
    }
    Ok(())
}

//! Billing endpoints
//!
//! These stay reachable for lapsed subscriptions on purpose: a blocked
//! merchant has to be able to see their overview, recharge, and pay.

use axum::extract::{Extension, Query, State};
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use souq_ledger::{
    receipts, BillingOverview, GatewayWebhook, Receipt, Subscription, WalletTransaction,
};

use crate::auth::AuthAccount;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct Paging {
    pub limit: Option<i64>,
}

impl Paging {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }
}

/// GET /api/billing/overview
pub async fn get_overview(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthAccount>,
) -> ApiResult<Json<BillingOverview>> {
    let overview = state
        .ledger
        .overview
        .get_billing_overview(auth.account_id)
        .await?;
    Ok(Json(overview))
}

/// GET /api/billing/transactions
pub async fn list_transactions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthAccount>,
    Query(paging): Query<Paging>,
) -> ApiResult<Json<Vec<WalletTransaction>>> {
    let rows = state
        .ledger
        .wallet
        .list_transactions(auth.account_id, paging.limit())
        .await?;
    Ok(Json(rows))
}

/// GET /api/billing/receipts
pub async fn list_receipts(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthAccount>,
    Query(paging): Query<Paging>,
) -> ApiResult<Json<Vec<Receipt>>> {
    let rows = receipts::list_receipts(&state.pool, auth.account_id, paging.limit()).await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct RechargeRequest {
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct RechargeResponse {
    pub balance: Decimal,
    pub simulated: bool,
}

/// POST /api/billing/recharge
///
/// Development deployments credit the wallet immediately. Production with
/// gateway credentials refuses; real money arrives via the webhook.
pub async fn recharge(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthAccount>,
    Json(req): Json<RechargeRequest>,
) -> ApiResult<Json<RechargeResponse>> {
    if !state.config.allows_simulated_recharge() {
        return Err(ApiError::GatewayRequired);
    }

    let balance = state
        .ledger
        .webhooks
        .simulate_recharge(auth.account_id, req.amount)
        .await?;

    Ok(Json(RechargeResponse {
        balance,
        simulated: true,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub plan_id: Uuid,
}

/// POST /api/billing/subscribe
///
/// Records the plan choice. Free plans activate immediately; paid plans stay
/// inactive until paid from the wallet or confirmed by the gateway.
pub async fn subscribe(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthAccount>,
    Json(req): Json<SubscribeRequest>,
) -> ApiResult<Json<Subscription>> {
    let sub = state
        .ledger
        .subscriptions
        .auto_subscribe_record(auth.account_id, req.plan_id)
        .await?;
    Ok(Json(sub))
}

/// POST /api/billing/subscription/pay
pub async fn pay_subscription(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthAccount>,
) -> ApiResult<Json<Subscription>> {
    let sub = state
        .ledger
        .subscriptions
        .pay_from_wallet(auth.account_id)
        .await?;
    Ok(Json(sub))
}

/// POST /api/webhooks/gateway
///
/// Unauthenticated: the gateway signs nothing we verify beyond the payload
/// shape, and idempotency makes replays harmless. Non-2xx makes the gateway
/// retry, so only real processing failures return errors.
pub async fn gateway_webhook(
    State(state): State<AppState>,
    Json(payload): Json<GatewayWebhook>,
) -> ApiResult<Json<serde_json::Value>> {
    let outcome = state.ledger.webhooks.handle(payload).await?;
    Ok(Json(json!(outcome)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paging_defaults_and_clamps() {
        assert_eq!(Paging { limit: None }.limit(), DEFAULT_PAGE_SIZE);
        assert_eq!(Paging { limit: Some(10) }.limit(), 10);
        assert_eq!(Paging { limit: Some(0) }.limit(), 1);
        assert_eq!(Paging { limit: Some(10_000) }.limit(), MAX_PAGE_SIZE);
    }
}

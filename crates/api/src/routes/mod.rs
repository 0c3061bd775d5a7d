//! HTTP route definitions

pub mod billing;
pub mod stores;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::auth::require_auth;
use crate::guards::resolve_billing_context;
use crate::state::AppState;

/// Build the full application router.
///
/// The gateway webhook and health check are unauthenticated; everything else
/// runs behind the JWT middleware, and the store/order surface additionally
/// carries the billing-context middleware for its guards.
pub fn create_router(state: AppState) -> Router {
    let billing_routes = Router::new()
        .route("/overview", get(billing::get_overview))
        .route("/transactions", get(billing::list_transactions))
        .route("/receipts", get(billing::list_receipts))
        .route("/recharge", post(billing::recharge))
        .route("/subscribe", post(billing::subscribe))
        .route("/subscription/pay", post(billing::pay_subscription))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let store_routes = Router::new()
        .route("/", post(stores::create_store))
        .route("/{store_id}/publish", post(stores::publish_store))
        .route("/{store_id}/products", post(stores::create_product))
        .route("/{store_id}/orders", post(stores::create_order))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            resolve_billing_context,
        ))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .route("/api/webhooks/gateway", post(billing::gateway_webhook))
        .nest("/api/billing", billing_routes)
        .nest("/api/stores", store_routes)
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

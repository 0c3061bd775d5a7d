//! Store, product, and order endpoints
//!
//! Thin CRUD glue around the ledger guards: every handler checks the billing
//! context first, then writes. Ownership is always verified against the
//! authenticated account before touching a store.

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::AuthAccount;
use crate::error::{ApiError, ApiResult};
use crate::guards::{
    ensure_product_allowed, ensure_publish_allowed, ensure_service_available,
    ensure_store_allowed, BillingContext,
};
use crate::state::AppState;

#[derive(Debug, Serialize, FromRow)]
pub struct Store {
    pub id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    pub slug: String,
    pub published: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub store_id: Uuid,
    pub title: String,
    pub price: Decimal,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct CreateStoreRequest {
    pub name: String,
    pub slug: String,
}

/// POST /api/stores
pub async fn create_store(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthAccount>,
    Extension(ctx): Extension<BillingContext>,
    Json(req): Json<CreateStoreRequest>,
) -> ApiResult<(StatusCode, Json<Store>)> {
    ensure_service_available(&ctx, false)?;

    let current: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stores WHERE account_id = $1")
        .bind(auth.account_id)
        .fetch_one(&state.pool)
        .await?;
    ensure_store_allowed(&ctx, current)?;

    let store: Store = sqlx::query_as(
        "INSERT INTO stores (account_id, name, slug)
         VALUES ($1, $2, $3)
         RETURNING id, account_id, name, slug, published, created_at",
    )
    .bind(auth.account_id)
    .bind(&req.name)
    .bind(&req.slug)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(account_id = %auth.account_id, store_id = %store.id, "Store created");
    Ok((StatusCode::CREATED, Json(store)))
}

/// POST /api/stores/{store_id}/publish
pub async fn publish_store(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthAccount>,
    Extension(ctx): Extension<BillingContext>,
    Path(store_id): Path<Uuid>,
) -> ApiResult<Json<Store>> {
    ensure_service_available(&ctx, false)?;
    ensure_publish_allowed(&ctx)?;

    let store: Option<Store> = sqlx::query_as(
        "UPDATE stores SET published = TRUE
         WHERE id = $1 AND account_id = $2
         RETURNING id, account_id, name, slug, published, created_at",
    )
    .bind(store_id)
    .bind(auth.account_id)
    .fetch_optional(&state.pool)
    .await?;

    let store = store.ok_or_else(|| {
        ApiError::Ledger(souq_ledger::LedgerError::NotFound(format!(
            "store {store_id}"
        )))
    })?;

    tracing::info!(account_id = %auth.account_id, store_id = %store_id, "Store published");
    Ok(Json(store))
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub title: String,
    pub price: Decimal,
}

/// POST /api/stores/{store_id}/products
pub async fn create_product(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthAccount>,
    Extension(ctx): Extension<BillingContext>,
    Path(store_id): Path<Uuid>,
    Json(req): Json<CreateProductRequest>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    ensure_service_available(&ctx, false)?;
    verify_store_ownership(&state, store_id, auth.account_id).await?;

    let current: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE store_id = $1")
        .bind(store_id)
        .fetch_one(&state.pool)
        .await?;
    ensure_product_allowed(&ctx, current)?;

    let product: Product = sqlx::query_as(
        "INSERT INTO products (store_id, title, price)
         VALUES ($1, $2, $3)
         RETURNING id, store_id, title, price, created_at",
    )
    .bind(store_id)
    .bind(&req.title)
    .bind(req.price)
    .fetch_one(&state.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(product)))
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub total: Decimal,
    #[serde(default)]
    pub items: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order_id: Uuid,
    pub wallet_balance: Decimal,
}

/// POST /api/stores/{store_id}/orders
///
/// The order row commits first; the fee settles right after. A settlement
/// failure surfaces to the caller while the order stands, and the order's
/// missing fee debit shows up in the invariant sweep for reconciliation.
pub async fn create_order(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthAccount>,
    Extension(ctx): Extension<BillingContext>,
    Path(store_id): Path<Uuid>,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<(StatusCode, Json<OrderResponse>)> {
    ensure_service_available(&ctx, true)?;
    verify_store_ownership(&state, store_id, auth.account_id).await?;

    let order_id: Uuid = sqlx::query_scalar(
        "INSERT INTO orders (store_id, total, items)
         VALUES ($1, $2, $3)
         RETURNING id",
    )
    .bind(store_id)
    .bind(req.total)
    .bind(&req.items)
    .fetch_one(&state.pool)
    .await?;

    let balance = match state
        .ledger
        .settlement
        .process_order_fee(auth.account_id, order_id, store_id)
        .await
    {
        Ok(balance) => balance,
        Err(err) => {
            tracing::error!(
                account_id = %auth.account_id,
                order_id = %order_id,
                error = %err,
                "Order committed but fee settlement failed"
            );
            return Err(err.into());
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(OrderResponse {
            order_id,
            wallet_balance: balance,
        }),
    ))
}

async fn verify_store_ownership(
    state: &AppState,
    store_id: Uuid,
    account_id: Uuid,
) -> ApiResult<()> {
    let owned: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM stores WHERE id = $1 AND account_id = $2")
            .bind(store_id)
            .bind(account_id)
            .fetch_optional(&state.pool)
            .await?;

    if owned.is_none() {
        return Err(ApiError::Ledger(souq_ledger::LedgerError::NotFound(
            format!("store {store_id}"),
        )));
    }
    Ok(())
}

//! Receipt issuance
//!
//! Receipts are derived, user-facing records issued alongside order-fee,
//! recharge, and plan-payment transactions. They are display/audit artifacts;
//! the wallet transaction log remains the source of truth.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use souq_shared::DEFAULT_CURRENCY;

use crate::error::LedgerResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptType {
    Order,
    Recharge,
    PlanPayment,
}

impl ReceiptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptType::Order => "order",
            ReceiptType::Recharge => "recharge",
            ReceiptType::PlanPayment => "plan_payment",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Receipt {
    pub id: Uuid,
    pub account_id: Uuid,
    pub reference_id: Option<Uuid>,
    pub receipt_type: String,
    pub amount: Decimal,
    pub currency: String,
    pub issued_at: OffsetDateTime,
}

/// Write a receipt inside the caller's unit of work.
pub async fn issue_receipt(
    conn: &mut PgConnection,
    account_id: Uuid,
    reference_id: Option<Uuid>,
    receipt_type: ReceiptType,
    amount: Decimal,
) -> LedgerResult<Uuid> {
    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO receipts (account_id, reference_id, receipt_type, amount, currency)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id",
    )
    .bind(account_id)
    .bind(reference_id)
    .bind(receipt_type.as_str())
    .bind(amount)
    .bind(DEFAULT_CURRENCY)
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

/// Most recent receipts for an account, newest first.
pub async fn list_receipts(
    pool: &PgPool,
    account_id: Uuid,
    limit: i64,
) -> LedgerResult<Vec<Receipt>> {
    let rows: Vec<Receipt> = sqlx::query_as(
        "SELECT id, account_id, reference_id, receipt_type, amount, currency, issued_at
         FROM receipts
         WHERE account_id = $1
         ORDER BY issued_at DESC
         LIMIT $2",
    )
    .bind(account_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

//! Wallet store
//!
//! One prepaid balance per merchant account with an append-only transaction
//! log. The balance is the only hot, contended resource in the system: all
//! mutation goes through [`apply_credit`] and [`apply_debit`], which use
//! single-statement conditional updates so concurrent debits near a zero
//! balance can never produce a lost update or a negative balance.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection};
use time::OffsetDateTime;
use uuid::Uuid;

use souq_shared::DEFAULT_CURRENCY;

use crate::error::{LedgerError, LedgerResult};
use crate::uow::UnitOfWork;

/// A merchant's prepaid wallet. Created lazily on first touch, never deleted.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Wallet {
    pub id: Uuid,
    pub account_id: Uuid,
    pub balance: Decimal,
    pub currency: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionDirection {
    Credit,
    Debit,
}

impl TransactionDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionDirection::Credit => "credit",
            TransactionDirection::Debit => "debit",
        }
    }
}

/// Why a balance moved. Matches the `wallet_transactions.reason` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionReason {
    OrderFee,
    PlanPayment,
    Recharge,
}

impl TransactionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionReason::OrderFee => "order_fee",
            TransactionReason::PlanPayment => "plan_payment",
            TransactionReason::Recharge => "recharge",
        }
    }
}

/// Append-only ledger entry. Never rewritten, never deleted.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub direction: String,
    pub amount: Decimal,
    pub reason: String,
    pub reference_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
}

/// Idempotent get-or-create. Safe under concurrent first-touch: the unique
/// constraint on `account_id` makes the duplicate insert a no-op and the
/// follow-up select observes whichever insert won.
pub async fn ensure_wallet(conn: &mut PgConnection, account_id: Uuid) -> LedgerResult<Wallet> {
    sqlx::query(
        "INSERT INTO wallets (account_id, currency) VALUES ($1, $2)
         ON CONFLICT (account_id) DO NOTHING",
    )
    .bind(account_id)
    .bind(DEFAULT_CURRENCY)
    .execute(&mut *conn)
    .await?;

    let wallet: Wallet = sqlx::query_as(
        "SELECT id, account_id, balance, currency, created_at, updated_at
         FROM wallets WHERE account_id = $1",
    )
    .bind(account_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(wallet)
}

/// Increment the balance and append the matching credit entry.
///
/// Returns the balance after the credit. The wallet must already exist;
/// callers go through [`ensure_wallet`] first.
pub async fn apply_credit(
    conn: &mut PgConnection,
    account_id: Uuid,
    amount: Decimal,
    reason: TransactionReason,
    reference_id: Option<Uuid>,
) -> LedgerResult<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(amount));
    }

    let balance: Option<Decimal> = sqlx::query_scalar(
        "UPDATE wallets SET balance = balance + $1, updated_at = NOW()
         WHERE account_id = $2
         RETURNING balance",
    )
    .bind(amount)
    .bind(account_id)
    .fetch_optional(&mut *conn)
    .await?;

    let balance = balance
        .ok_or_else(|| LedgerError::NotFound(format!("wallet for account {account_id}")))?;

    append_entry(
        conn,
        account_id,
        TransactionDirection::Credit,
        amount,
        reason,
        reference_id,
    )
    .await?;

    Ok(balance)
}

/// Decrement the balance and append the matching debit entry.
///
/// The decrement is a compare-and-swap: the `balance >= amount` predicate
/// lives in the same statement as the write, so two settlements racing on the
/// same wallet cannot both pass a stale read. When the predicate fails the
/// balance is left unchanged and `InsufficientFunds` reports required vs
/// available.
pub async fn apply_debit(
    conn: &mut PgConnection,
    account_id: Uuid,
    amount: Decimal,
    reason: TransactionReason,
    reference_id: Option<Uuid>,
) -> LedgerResult<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(amount));
    }

    let balance: Option<Decimal> = sqlx::query_scalar(
        "UPDATE wallets SET balance = balance - $1, updated_at = NOW()
         WHERE account_id = $2 AND balance >= $1
         RETURNING balance",
    )
    .bind(amount)
    .bind(account_id)
    .fetch_optional(&mut *conn)
    .await?;

    match balance {
        Some(balance) => {
            append_entry(
                conn,
                account_id,
                TransactionDirection::Debit,
                amount,
                reason,
                reference_id,
            )
            .await?;
            Ok(balance)
        }
        None => {
            let available: Option<Decimal> =
                sqlx::query_scalar("SELECT balance FROM wallets WHERE account_id = $1")
                    .bind(account_id)
                    .fetch_optional(&mut *conn)
                    .await?;

            match available {
                Some(available) => Err(LedgerError::InsufficientFunds {
                    required: amount,
                    available,
                }),
                None => Err(LedgerError::NotFound(format!(
                    "wallet for account {account_id}"
                ))),
            }
        }
    }
}

async fn append_entry(
    conn: &mut PgConnection,
    account_id: Uuid,
    direction: TransactionDirection,
    amount: Decimal,
    reason: TransactionReason,
    reference_id: Option<Uuid>,
) -> LedgerResult<()> {
    sqlx::query(
        "INSERT INTO wallet_transactions (account_id, direction, amount, reason, reference_id)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(account_id)
    .bind(direction.as_str())
    .bind(amount)
    .bind(reason.as_str())
    .bind(reference_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Wallet operations over the shared unit of work.
#[derive(Clone)]
pub struct WalletService {
    uow: UnitOfWork,
}

impl WalletService {
    pub fn new(uow: UnitOfWork) -> Self {
        Self { uow }
    }

    /// Idempotent get-or-create, as a standalone operation.
    pub async fn ensure(&self, account_id: Uuid) -> LedgerResult<Wallet> {
        let mut conn = self.uow.pool().acquire().await?;
        ensure_wallet(&mut conn, account_id).await
    }

    /// Credit the wallet and append the ledger entry in one unit of work.
    pub async fn credit(
        &self,
        account_id: Uuid,
        amount: Decimal,
        reason: TransactionReason,
        reference_id: Option<Uuid>,
    ) -> LedgerResult<Decimal> {
        let mut uow = self.uow.begin().await?;
        let conn = uow.conn();
        ensure_wallet(conn, account_id).await?;
        let balance = apply_credit(conn, account_id, amount, reason, reference_id).await?;
        uow.commit().await?;

        tracing::info!(
            account_id = %account_id,
            amount = %amount,
            reason = reason.as_str(),
            balance = %balance,
            "Wallet credited"
        );
        Ok(balance)
    }

    /// Debit the wallet and append the ledger entry in one unit of work.
    pub async fn debit(
        &self,
        account_id: Uuid,
        amount: Decimal,
        reason: TransactionReason,
        reference_id: Option<Uuid>,
    ) -> LedgerResult<Decimal> {
        let mut uow = self.uow.begin().await?;
        let conn = uow.conn();
        ensure_wallet(conn, account_id).await?;
        let balance = apply_debit(conn, account_id, amount, reason, reference_id).await?;
        uow.commit().await?;

        tracing::info!(
            account_id = %account_id,
            amount = %amount,
            reason = reason.as_str(),
            balance = %balance,
            "Wallet debited"
        );
        Ok(balance)
    }

    /// Current balance, zero for accounts that never touched their wallet.
    pub async fn balance(&self, account_id: Uuid) -> LedgerResult<Decimal> {
        let balance: Option<Decimal> =
            sqlx::query_scalar("SELECT balance FROM wallets WHERE account_id = $1")
                .bind(account_id)
                .fetch_optional(self.uow.pool())
                .await?;
        Ok(balance.unwrap_or(Decimal::ZERO))
    }

    /// Most recent ledger entries, newest first.
    pub async fn list_transactions(
        &self,
        account_id: Uuid,
        limit: i64,
    ) -> LedgerResult<Vec<WalletTransaction>> {
        let rows: Vec<WalletTransaction> = sqlx::query_as(
            "SELECT id, account_id, direction, amount, reason, reference_id, created_at
             FROM wallet_transactions
             WHERE account_id = $1
             ORDER BY created_at DESC
             LIMIT $2",
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(self.uow.pool())
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_strings_match_ledger_column() {
        assert_eq!(TransactionReason::OrderFee.as_str(), "order_fee");
        assert_eq!(TransactionReason::PlanPayment.as_str(), "plan_payment");
        assert_eq!(TransactionReason::Recharge.as_str(), "recharge");
    }

    #[test]
    fn direction_strings_match_ledger_column() {
        assert_eq!(TransactionDirection::Credit.as_str(), "credit");
        assert_eq!(TransactionDirection::Debit.as_str(), "debit");
    }
}

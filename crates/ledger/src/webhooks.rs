//! Payment gateway reconciliation
//!
//! Applies external payment confirmations to the ledger: recharges credit the
//! wallet, subscription payments activate the pending subscription. Each
//! delivery is claimed atomically in `gateway_events` before any ledger
//! effect, so the gateway retrying a 2xx-lost response cannot double-apply.
//!
//! A development-mode simulated recharge exists for deployments without
//! gateway credentials. It is a convenience, not a security boundary.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::receipts::{self, ReceiptType};
use crate::subscriptions::{self, SUBSCRIPTION_PERIOD_DAYS};
use crate::uow::UnitOfWork;
use crate::wallet::{self, TransactionReason};

/// What the external payment was for, carried in the gateway's opaque
/// `extra_config` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPurpose {
    Recharge,
    Subscription,
}

impl PaymentPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentPurpose::Recharge => "recharge",
            PaymentPurpose::Subscription => "subscription",
        }
    }
}

/// Opaque routing payload the checkout flow planted on the gateway session.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtraConfig {
    pub account_id: Uuid,
    pub purpose: PaymentPurpose,
}

/// Gateway webhook body. Only `success && !pending` has ledger effect; the
/// gateway retries on non-2xx, so everything else is acknowledged as-is.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayWebhook {
    pub success: bool,
    pub pending: bool,
    /// Amount in minor currency units (piasters for EGP).
    pub amount_cents: i64,
    /// The gateway's transaction id; the idempotency key.
    pub transaction_id: String,
    pub extra_config: ExtraConfig,
}

/// Convert the gateway's minor-unit amount to a ledger decimal.
pub fn amount_from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// How long a claim may sit in 'processing' or 'error' before a retry of the
/// same gateway transaction is allowed to re-claim and re-apply it.
pub const PROCESSING_TIMEOUT_MINUTES: i32 = 30;

/// Why a delivery was treated as a duplicate, for the log line.
fn duplicate_reason(processing_result: Option<&str>) -> &'static str {
    match processing_result {
        Some("success") => "already applied successfully",
        Some("processing") => "currently being applied by another delivery",
        Some("error") => "recent failed claim, not yet re-claimable",
        Some(_) => "exists with another status",
        None => "claim row missing (lost race)",
    }
}

/// Outcome of one webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum WebhookOutcome {
    /// Ledger effects applied.
    Applied { purpose: PaymentPurpose },
    /// Same gateway transaction seen before; acknowledged without effect.
    Duplicate,
    /// Not a final successful payment; acknowledged without effect.
    Ignored,
}

#[derive(Clone)]
pub struct WebhookReconciler {
    uow: UnitOfWork,
}

impl WebhookReconciler {
    pub fn new(uow: UnitOfWork) -> Self {
        Self { uow }
    }

    /// Apply one gateway delivery idempotently.
    pub async fn handle(&self, payload: GatewayWebhook) -> LedgerResult<WebhookOutcome> {
        if !payload.success || payload.pending {
            tracing::info!(
                transaction_id = %payload.transaction_id,
                success = payload.success,
                pending = payload.pending,
                "Gateway event carries no ledger effect"
            );
            return Ok(WebhookOutcome::Ignored);
        }

        let amount = amount_from_cents(payload.amount_cents);
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(amount));
        }

        // Atomic claim: the unique constraint on the gateway transaction id
        // means exactly one delivery wins the insert; the rest are duplicates.
        //
        // Timeout recovery: a claim stuck in 'processing' (crash between
        // claim and apply) or parked in 'error' (transient apply failure) is
        // re-claimable once the timeout passes, so a gateway retry can still
        // land the payment. 'success' rows are never re-claimed.
        let claimed: Option<Uuid> = sqlx::query_scalar(
            "INSERT INTO gateway_events
                 (gateway_event_id, account_id, purpose, amount,
                  processing_result, processing_started_at)
             VALUES ($1, $2, $3, $4, 'processing', NOW())
             ON CONFLICT (gateway_event_id) DO UPDATE SET
                 processing_result = 'processing',
                 processing_started_at = NOW(),
                 error_message = NULL
             WHERE gateway_events.processing_result IN ('processing', 'error')
               AND gateway_events.processing_started_at
                   < NOW() - make_interval(mins => $5)
             RETURNING id",
        )
        .bind(&payload.transaction_id)
        .bind(payload.extra_config.account_id)
        .bind(payload.extra_config.purpose.as_str())
        .bind(amount)
        .bind(PROCESSING_TIMEOUT_MINUTES)
        .fetch_optional(self.uow.pool())
        .await?;

        let Some(event_id) = claimed else {
            let existing: Option<String> = sqlx::query_scalar(
                "SELECT processing_result FROM gateway_events WHERE gateway_event_id = $1",
            )
            .bind(&payload.transaction_id)
            .fetch_optional(self.uow.pool())
            .await?;

            tracing::info!(
                transaction_id = %payload.transaction_id,
                reason = duplicate_reason(existing.as_deref()),
                "Duplicate gateway delivery acknowledged without re-applying"
            );
            return Ok(WebhookOutcome::Duplicate);
        };

        let result = self
            .apply(
                payload.extra_config.account_id,
                amount,
                payload.extra_config.purpose,
                event_id,
            )
            .await;

        // Record the processing result on the claim row for audit; the claim
        // itself already prevents re-processing either way.
        let (processing_result, error_message) = match &result {
            Ok(()) => ("success", None),
            Err(e) => ("error", Some(e.to_string())),
        };
        if let Err(e) = sqlx::query(
            "UPDATE gateway_events SET processing_result = $1, error_message = $2 WHERE id = $3",
        )
        .bind(processing_result)
        .bind(&error_message)
        .bind(event_id)
        .execute(self.uow.pool())
        .await
        {
            tracing::error!(
                gateway_event_id = %payload.transaction_id,
                error = %e,
                "Failed to record webhook processing result"
            );
        }

        result.map(|()| WebhookOutcome::Applied {
            purpose: payload.extra_config.purpose,
        })
    }

    /// Ledger effects for a confirmed payment, one unit of work per branch.
    async fn apply(
        &self,
        account_id: Uuid,
        amount: Decimal,
        purpose: PaymentPurpose,
        event_id: Uuid,
    ) -> LedgerResult<()> {
        let mut uow = self.uow.begin().await?;
        let conn = uow.conn();

        match purpose {
            PaymentPurpose::Recharge => {
                wallet::ensure_wallet(conn, account_id).await?;
                let balance = wallet::apply_credit(
                    conn,
                    account_id,
                    amount,
                    TransactionReason::Recharge,
                    Some(event_id),
                )
                .await?;
                receipts::issue_receipt(
                    conn,
                    account_id,
                    Some(event_id),
                    ReceiptType::Recharge,
                    amount,
                )
                .await?;

                tracing::info!(
                    account_id = %account_id,
                    amount = %amount,
                    balance = %balance,
                    "Wallet recharge confirmed by gateway"
                );
            }
            PaymentPurpose::Subscription => {
                // Money moved at the gateway, not through the wallet, so the
                // only ledger artifacts are the activation and its receipt.
                subscriptions::activate_on(conn, account_id, SUBSCRIPTION_PERIOD_DAYS).await?;
                receipts::issue_receipt(
                    conn,
                    account_id,
                    Some(event_id),
                    ReceiptType::PlanPayment,
                    amount,
                )
                .await?;

                tracing::info!(
                    account_id = %account_id,
                    amount = %amount,
                    "Subscription payment confirmed by gateway"
                );
            }
        }

        uow.commit().await
    }

    /// Development-mode instant credit, used when gateway credentials are
    /// absent. Writes the same credit + ledger entry + receipt a confirmed
    /// recharge would, against a synthetic reference.
    pub async fn simulate_recharge(
        &self,
        account_id: Uuid,
        amount: Decimal,
    ) -> LedgerResult<Decimal> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let synthetic_ref = Uuid::new_v4();
        let mut uow = self.uow.begin().await?;
        let conn = uow.conn();

        wallet::ensure_wallet(conn, account_id).await?;
        let balance = wallet::apply_credit(
            conn,
            account_id,
            amount,
            TransactionReason::Recharge,
            Some(synthetic_ref),
        )
        .await?;
        receipts::issue_receipt(
            conn,
            account_id,
            Some(synthetic_ref),
            ReceiptType::Recharge,
            amount,
        )
        .await?;

        uow.commit().await?;

        tracing::warn!(
            account_id = %account_id,
            amount = %amount,
            "Simulated recharge applied (development mode, no gateway confirmation)"
        );
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn minor_units_convert_to_decimal() {
        assert_eq!(amount_from_cents(25_000), dec!(250.00));
        assert_eq!(amount_from_cents(1), dec!(0.01));
        assert_eq!(amount_from_cents(0), dec!(0));
    }

    #[test]
    fn payload_parses_with_snake_case_purpose() {
        let body = r#"{
            "success": true,
            "pending": false,
            "amount_cents": 49900,
            "transaction_id": "pmb_88421",
            "extra_config": {
                "account_id": "7f0c0ed4-4b2f-4cf8-a3cc-9df27ad34c2a",
                "purpose": "subscription"
            }
        }"#;
        let payload: GatewayWebhook = serde_json::from_str(body).unwrap();
        assert!(payload.success);
        assert!(!payload.pending);
        assert_eq!(payload.extra_config.purpose, PaymentPurpose::Subscription);
        assert_eq!(amount_from_cents(payload.amount_cents), dec!(499.00));
    }

    #[test]
    fn duplicate_reason_distinguishes_claim_states() {
        // Only a successful claim is a true duplicate; 'processing' and
        // 'error' rows age into re-claimability so a confirmed payment is
        // never permanently dropped by a crash or transient apply failure.
        assert_eq!(duplicate_reason(Some("success")), "already applied successfully");
        assert_eq!(
            duplicate_reason(Some("processing")),
            "currently being applied by another delivery"
        );
        assert_eq!(
            duplicate_reason(Some("error")),
            "recent failed claim, not yet re-claimable"
        );
        assert_eq!(duplicate_reason(None), "claim row missing (lost race)");
    }

    #[test]
    fn reclaim_timeout_is_bounded() {
        // The reclaim window must be long enough to outlast a normal apply
        // but finite, or stuck claims would block retries forever.
        assert!(PROCESSING_TIMEOUT_MINUTES >= 5);
        assert!(PROCESSING_TIMEOUT_MINUTES <= 120);
    }

    #[test]
    fn pending_payment_would_be_ignored() {
        // The handler gate is `success && !pending`; spell the table out.
        let cases = [
            (true, false, true),
            (true, true, false),
            (false, false, false),
            (false, true, false),
        ];
        for (success, pending, applies) in cases {
            assert_eq!(success && !pending, applies);
        }
    }
}

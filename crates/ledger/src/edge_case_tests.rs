// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Ledger Engine
//!
//! Tests critical boundary conditions in:
//! - Feature gating (LEDG-F01 to LEDG-F06)
//! - Plan limits (LEDG-L01 to LEDG-L04)
//! - Blocking reasons (LEDG-B01 to LEDG-B05)
//! - Webhook payloads (LEDG-W01 to LEDG-W05)
//! - Fee resolution (LEDG-S01 to LEDG-S03)

#[cfg(test)]
mod feature_gating_tests {
    use crate::plans::{can_access_feature, Feature, PlanTier};

    // =========================================================================
    // LEDG-F01: Every feature key round-trips through from_key
    // =========================================================================
    #[test]
    fn test_feature_keys_round_trip() {
        for feature in [
            Feature::Dropshipping,
            Feature::CustomDomain,
            Feature::AbandonedCart,
            Feature::Coupons,
            Feature::AdvancedAnalytics,
        ] {
            assert_eq!(Feature::from_key(feature.key()), Some(feature));
        }
    }

    // =========================================================================
    // LEDG-F02: Entitlements are monotonic in tier order
    // =========================================================================
    #[test]
    fn test_higher_tier_never_loses_a_feature() {
        let tiers = ["Free", "Growth", "Pro", "Enterprise"];
        let features = [
            "dropshipping",
            "custom_domain",
            "abandoned_cart",
            "coupons",
            "advanced_analytics",
        ];

        for feature in features {
            let mut previously_allowed = false;
            for tier in tiers {
                let allowed = can_access_feature(tier, feature);
                assert!(
                    allowed || !previously_allowed,
                    "{feature} unlocked at a lower tier but locked at {tier}"
                );
                previously_allowed = allowed;
            }
        }
    }

    // =========================================================================
    // LEDG-F03: Alias casing does not change the tier
    // =========================================================================
    #[test]
    fn test_alias_matching_is_case_insensitive() {
        assert_eq!(PlanTier::from_display_name("PRO"), PlanTier::Pro);
        assert_eq!(PlanTier::from_display_name("pro"), PlanTier::Pro);
        assert_eq!(PlanTier::from_display_name("  Pro  "), PlanTier::Pro);
    }

    // =========================================================================
    // LEDG-F04: Unknown plan name gets Starter entitlements only
    // =========================================================================
    #[test]
    fn test_unknown_plan_fails_closed() {
        for feature in [
            "dropshipping",
            "custom_domain",
            "abandoned_cart",
            "coupons",
            "advanced_analytics",
        ] {
            assert!(
                !can_access_feature("Plan-2019-Q3", feature),
                "unknown plan must not unlock {feature}"
            );
        }
    }

    // =========================================================================
    // LEDG-F05: Gate is deterministic across repeated calls
    // =========================================================================
    #[test]
    fn test_gate_is_deterministic() {
        for _ in 0..100 {
            assert!(can_access_feature("Pro", "abandoned_cart"));
            assert!(!can_access_feature("Free", "abandoned_cart"));
        }
    }

    // =========================================================================
    // LEDG-F06: Tier ordering matches commercial ordering
    // =========================================================================
    #[test]
    fn test_tier_ordering() {
        assert!(PlanTier::Starter < PlanTier::Growth);
        assert!(PlanTier::Growth < PlanTier::Pro);
        assert!(PlanTier::Pro < PlanTier::Enterprise);
    }
}

#[cfg(test)]
mod plan_limit_tests {
    use crate::plans::{limit_allows, UNLIMITED};

    // =========================================================================
    // LEDG-L01: Count exactly at the limit is rejected
    // =========================================================================
    #[test]
    fn test_at_limit_rejected() {
        assert!(!limit_allows(1, 1));
        assert!(!limit_allows(5, 5));
    }

    // =========================================================================
    // LEDG-L02: One below the limit is allowed
    // =========================================================================
    #[test]
    fn test_below_limit_allowed() {
        assert!(limit_allows(1, 0));
        assert!(limit_allows(5, 4));
    }

    // =========================================================================
    // LEDG-L03: -1 sentinel is unlimited at any count
    // =========================================================================
    #[test]
    fn test_unlimited_sentinel() {
        assert!(limit_allows(UNLIMITED, 0));
        assert!(limit_allows(UNLIMITED, i64::MAX));
    }

    // =========================================================================
    // LEDG-L04: Zero limit blocks the first creation
    // =========================================================================
    #[test]
    fn test_zero_limit_blocks_everything() {
        assert!(!limit_allows(0, 0));
    }
}

#[cfg(test)]
mod blocking_reason_tests {
    use crate::overview::{derive_blocking_reason, BlockingReason, MIN_FREE_PLAN_BALANCE};
    use rust_decimal_macros::dec;
    use souq_shared::SubscriptionStatus;

    // =========================================================================
    // LEDG-B01: Free plan one piaster under the minimum blocks
    // =========================================================================
    #[test]
    fn test_free_plan_just_under_minimum() {
        let reason = derive_blocking_reason(
            true,
            MIN_FREE_PLAN_BALANCE - dec!(0.01),
            SubscriptionStatus::Active,
        );
        assert_eq!(reason, Some(BlockingReason::LowWallet));
    }

    // =========================================================================
    // LEDG-B02: Free plan exactly at the minimum is clear
    // =========================================================================
    #[test]
    fn test_free_plan_exactly_at_minimum() {
        let reason = derive_blocking_reason(true, MIN_FREE_PLAN_BALANCE, SubscriptionStatus::Active);
        assert_eq!(reason, None);
    }

    // =========================================================================
    // LEDG-B03: Paid plan is never blocked on wallet balance
    // =========================================================================
    #[test]
    fn test_paid_plan_ignores_balance() {
        let reason = derive_blocking_reason(false, dec!(0), SubscriptionStatus::Active);
        assert_eq!(reason, None);
    }

    // =========================================================================
    // LEDG-B04: Canceled is not reported as expired
    // =========================================================================
    #[test]
    fn test_canceled_is_not_lapsed() {
        let reason = derive_blocking_reason(false, dec!(1000), SubscriptionStatus::Canceled);
        assert_eq!(reason, None);
    }

    // =========================================================================
    // LEDG-B05: Serialized reason codes are stable machine codes
    // =========================================================================
    #[test]
    fn test_reason_machine_codes() {
        assert_eq!(
            serde_json::to_string(&BlockingReason::LowWallet).unwrap(),
            "\"LOW_WALLET\""
        );
        assert_eq!(
            serde_json::to_string(&BlockingReason::SubscriptionExpired).unwrap(),
            "\"SUBSCRIPTION_EXPIRED\""
        );
    }
}

#[cfg(test)]
mod webhook_payload_tests {
    use crate::webhooks::{amount_from_cents, GatewayWebhook, PaymentPurpose};
    use rust_decimal_macros::dec;

    // =========================================================================
    // LEDG-W01: Recharge payload parses end to end
    // =========================================================================
    #[test]
    fn test_recharge_payload_parses() {
        let body = r#"{
            "success": true,
            "pending": false,
            "amount_cents": 25000,
            "transaction_id": "pmb_10021",
            "extra_config": {
                "account_id": "24b40796-0f01-4e3c-9587-8a3ce3a6fd3e",
                "purpose": "recharge"
            }
        }"#;
        let payload: GatewayWebhook = serde_json::from_str(body).unwrap();
        assert_eq!(payload.extra_config.purpose, PaymentPurpose::Recharge);
        assert_eq!(amount_from_cents(payload.amount_cents), dec!(250.00));
    }

    // =========================================================================
    // LEDG-W02: Unknown purpose is a parse error, not a silent default
    // =========================================================================
    #[test]
    fn test_unknown_purpose_rejected() {
        let body = r#"{
            "success": true,
            "pending": false,
            "amount_cents": 100,
            "transaction_id": "pmb_1",
            "extra_config": {
                "account_id": "24b40796-0f01-4e3c-9587-8a3ce3a6fd3e",
                "purpose": "donation"
            }
        }"#;
        assert!(serde_json::from_str::<GatewayWebhook>(body).is_err());
    }

    // =========================================================================
    // LEDG-W03: Missing extra_config is a parse error
    // =========================================================================
    #[test]
    fn test_missing_extra_config_rejected() {
        let body = r#"{"success": true, "pending": false, "amount_cents": 100, "transaction_id": "pmb_2"}"#;
        assert!(serde_json::from_str::<GatewayWebhook>(body).is_err());
    }

    // =========================================================================
    // LEDG-W04: Minor-unit conversion keeps two decimal places
    // =========================================================================
    #[test]
    fn test_minor_unit_precision() {
        assert_eq!(amount_from_cents(1), dec!(0.01));
        assert_eq!(amount_from_cents(99), dec!(0.99));
        assert_eq!(amount_from_cents(100), dec!(1.00));
        assert_eq!(amount_from_cents(123_456_789), dec!(1234567.89));
    }

    // =========================================================================
    // LEDG-W05: Negative minor-unit amounts convert to negative decimals
    //           (the handler rejects them before any ledger effect)
    // =========================================================================
    #[test]
    fn test_negative_cents() {
        assert!(amount_from_cents(-500) < dec!(0));
    }
}

#[cfg(test)]
mod fee_resolution_tests {
    use crate::plans::Plan;
    use crate::settlement::{ResolvedFee, DEFAULT_ORDER_FEE};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn free_plan_with_fee(fee: rust_decimal::Decimal) -> Plan {
        Plan {
            id: Uuid::new_v4(),
            display_name: "Free".to_string(),
            plan_type: "free".to_string(),
            monthly_price: dec!(0),
            max_stores: 1,
            max_products_per_store: 20,
            order_fee: fee,
            allows_dropshipping: false,
            allows_custom_domain: false,
            is_active: true,
        }
    }

    // =========================================================================
    // LEDG-S01: Resolved free plan keeps the prepaid safeguard armed
    // =========================================================================
    #[test]
    fn test_free_plan_arms_safeguard() {
        let resolved = ResolvedFee::from_plan(&free_plan_with_fee(dec!(0.5)));
        assert!(resolved.plan_is_free);
        assert_eq!(resolved.fee, dec!(0.5));
    }

    // =========================================================================
    // LEDG-S02: Fallback disarms the safeguard (generic debit guard remains)
    // =========================================================================
    #[test]
    fn test_fallback_disarms_safeguard() {
        let resolved = ResolvedFee::fallback();
        assert!(!resolved.plan_is_free);
        assert_eq!(resolved.fee, DEFAULT_ORDER_FEE);
    }

    // =========================================================================
    // LEDG-S03: Zero-fee plans resolve to a zero fee (settlement skips them)
    // =========================================================================
    #[test]
    fn test_zero_fee_plan() {
        let resolved = ResolvedFee::from_plan(&free_plan_with_fee(dec!(0)));
        assert_eq!(resolved.fee, dec!(0));
    }
}

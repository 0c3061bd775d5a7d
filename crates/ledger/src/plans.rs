//! Plan catalog and feature matrix
//!
//! Plans are read-only from the ledger's perspective. The feature matrix is a
//! pure mapping: a plan's display name normalizes through an explicit alias
//! table to one of four canonical tiers, and each feature names the minimum
//! tier that unlocks it. Unknown display names normalize to Starter, so
//! gating fails closed, never open.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use souq_shared::PlanType;

use crate::error::{LedgerError, LedgerResult};

/// Sentinel for "unlimited" in plan limit columns.
pub const UNLIMITED: i32 = -1;

/// Whether `current_count` leaves room under `limit` (`-1` = unlimited).
pub fn limit_allows(limit: i32, current_count: i64) -> bool {
    limit == UNLIMITED || current_count < i64::from(limit)
}

/// Canonical plan tiers, lowest to highest. Entitlements are monotonic in
/// tier order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Starter,
    Growth,
    Pro,
    Enterprise,
}

impl PlanTier {
    /// Alias table, v2. Earlier plan generations sold under different names;
    /// every historical display name must appear here explicitly. Names not
    /// in the table normalize to Starter.
    pub fn from_display_name(name: &str) -> PlanTier {
        let normalized = name.trim();
        for (alias, tier) in DISPLAY_NAME_ALIASES {
            if normalized.eq_ignore_ascii_case(alias) {
                return *tier;
            }
        }
        PlanTier::Starter
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Starter => "starter",
            PlanTier::Growth => "growth",
            PlanTier::Pro => "pro",
            PlanTier::Enterprise => "enterprise",
        }
    }
}

const DISPLAY_NAME_ALIASES: &[(&str, PlanTier)] = &[
    ("Free", PlanTier::Starter),
    ("Starter", PlanTier::Starter),
    ("Basic", PlanTier::Starter),
    ("Launch", PlanTier::Starter),
    ("Growth", PlanTier::Growth),
    ("Standard", PlanTier::Growth),
    ("Plus", PlanTier::Growth),
    ("Pro", PlanTier::Pro),
    ("Professional", PlanTier::Pro),
    ("Premium", PlanTier::Pro),
    ("Enterprise", PlanTier::Enterprise),
    ("Business", PlanTier::Enterprise),
    ("Scale", PlanTier::Enterprise),
];

/// Gated capabilities. Exhaustive: adding a feature without a tier mapping is
/// a compile error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Dropshipping,
    CustomDomain,
    AbandonedCart,
    Coupons,
    AdvancedAnalytics,
}

impl Feature {
    pub fn from_key(key: &str) -> Option<Feature> {
        match key {
            "dropshipping" => Some(Feature::Dropshipping),
            "custom_domain" => Some(Feature::CustomDomain),
            "abandoned_cart" => Some(Feature::AbandonedCart),
            "coupons" => Some(Feature::Coupons),
            "advanced_analytics" => Some(Feature::AdvancedAnalytics),
            _ => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Feature::Dropshipping => "dropshipping",
            Feature::CustomDomain => "custom_domain",
            Feature::AbandonedCart => "abandoned_cart",
            Feature::Coupons => "coupons",
            Feature::AdvancedAnalytics => "advanced_analytics",
        }
    }

    /// Lowest tier that unlocks this feature.
    pub fn minimum_tier(&self) -> PlanTier {
        match self {
            Feature::Coupons => PlanTier::Growth,
            Feature::CustomDomain => PlanTier::Growth,
            Feature::Dropshipping => PlanTier::Pro,
            Feature::AbandonedCart => PlanTier::Pro,
            Feature::AdvancedAnalytics => PlanTier::Enterprise,
        }
    }
}

/// Pure feature gate: deterministic, side-effect free. Unknown plan names
/// resolve to Starter; unknown feature keys are denied outright.
pub fn can_access_feature(plan_display_name: &str, feature_key: &str) -> bool {
    let tier = PlanTier::from_display_name(plan_display_name);
    match Feature::from_key(feature_key) {
        Some(feature) => tier >= feature.minimum_tier(),
        None => false,
    }
}

/// Catalog entity. Limits use the `-1` sentinel for unlimited.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub display_name: String,
    pub plan_type: String,
    pub monthly_price: Decimal,
    pub max_stores: i32,
    pub max_products_per_store: i32,
    pub order_fee: Decimal,
    pub allows_dropshipping: bool,
    pub allows_custom_domain: bool,
    pub is_active: bool,
}

impl Plan {
    pub fn is_free(&self) -> bool {
        self.plan_type == PlanType::Free.as_str()
    }
}

/// A subscription's plan reference: either the raw id from the subscription
/// row or the fully loaded catalog entry. Callers must resolve before reading
/// plan fields, so no populated-or-not runtime guard exists anywhere.
#[derive(Debug, Clone)]
pub enum PlanRef {
    Unresolved(Uuid),
    Resolved(Plan),
}

impl PlanRef {
    pub async fn resolve(self, conn: &mut PgConnection) -> LedgerResult<Plan> {
        match self {
            PlanRef::Resolved(plan) => Ok(plan),
            PlanRef::Unresolved(id) => fetch_plan(conn, id).await,
        }
    }
}

pub async fn fetch_plan(conn: &mut PgConnection, plan_id: Uuid) -> LedgerResult<Plan> {
    let plan: Option<Plan> = sqlx::query_as(
        "SELECT id, display_name, plan_type, monthly_price, max_stores,
                max_products_per_store, order_fee, allows_dropshipping,
                allows_custom_domain, is_active
         FROM plans WHERE id = $1",
    )
    .bind(plan_id)
    .fetch_optional(&mut *conn)
    .await?;

    plan.ok_or_else(|| LedgerError::NotFound(format!("plan {plan_id}")))
}

/// The active free plan used for lazy default subscriptions.
pub async fn find_free_plan(conn: &mut PgConnection) -> LedgerResult<Plan> {
    let plan: Option<Plan> = sqlx::query_as(
        "SELECT id, display_name, plan_type, monthly_price, max_stores,
                max_products_per_store, order_fee, allows_dropshipping,
                allows_custom_domain, is_active
         FROM plans
         WHERE plan_type = 'free' AND is_active
         ORDER BY monthly_price ASC
         LIMIT 1",
    )
    .fetch_optional(&mut *conn)
    .await?;

    plan.ok_or_else(|| LedgerError::NotFound("active free plan".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_normalize_to_canonical_tiers() {
        assert_eq!(PlanTier::from_display_name("Free"), PlanTier::Starter);
        assert_eq!(PlanTier::from_display_name("basic"), PlanTier::Starter);
        assert_eq!(PlanTier::from_display_name("Standard"), PlanTier::Growth);
        assert_eq!(PlanTier::from_display_name("Professional"), PlanTier::Pro);
        assert_eq!(
            PlanTier::from_display_name("Business"),
            PlanTier::Enterprise
        );
    }

    #[test]
    fn unknown_display_name_fails_closed_to_starter() {
        assert_eq!(
            PlanTier::from_display_name("UnknownLegacyName"),
            PlanTier::Starter
        );
        assert_eq!(PlanTier::from_display_name(""), PlanTier::Starter);
    }

    #[test]
    fn feature_gate_truth_table() {
        assert!(can_access_feature("Pro", "abandoned_cart"));
        assert!(!can_access_feature("Free", "abandoned_cart"));
        assert!(!can_access_feature("UnknownLegacyName", "coupons"));
        assert!(can_access_feature("Growth", "coupons"));
        assert!(can_access_feature("Enterprise", "advanced_analytics"));
        assert!(!can_access_feature("Pro", "advanced_analytics"));
    }

    #[test]
    fn unknown_feature_key_is_denied() {
        assert!(!can_access_feature("Enterprise", "teleportation"));
    }

    #[test]
    fn unlimited_sentinel_allows_any_count() {
        assert!(limit_allows(UNLIMITED, 0));
        assert!(limit_allows(UNLIMITED, 1_000_000));
        assert!(limit_allows(1, 0));
        assert!(!limit_allows(1, 1));
        assert!(!limit_allows(0, 0));
    }
}

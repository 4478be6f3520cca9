// Discount rule definitions
//
// A rule has common scheduling and scope attributes plus a mechanism-specific
// configuration. Rules are read-only to the engine: they are created by the
// administration layer and loaded through a `RuleStore`.

use crate::pricing::{
    error::{PRResult, PricingError},
    types::{
        BogoRewardType, BundleType, CustomerTier, DiscountType, Mechanism, RuleStatus, RuleTarget,
        ThcComparator,
    },
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A discount type with its value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
}

impl Discount {
    pub fn percentage(value: Decimal) -> Self {
        Self { discount_type: DiscountType::Percentage, discount_value: value }
    }

    pub fn fixed_amount(value: Decimal) -> Self {
        Self { discount_type: DiscountType::FixedAmount, discount_value: value }
    }

    pub fn price_override(value: Decimal) -> Self {
        Self { discount_type: DiscountType::PriceOverride, discount_value: value }
    }

    /// Validate the value against the discount type
    pub fn validate(&self) -> PRResult<()> {
        if self.discount_value < Decimal::ZERO {
            return Err(PricingError::InvalidRule(
                "Discount value must be non-negative".to_string(),
            ));
        }

        match self.discount_type {
            DiscountType::Percentage => {
                if self.discount_value > Decimal::ONE_HUNDRED {
                    return Err(PricingError::InvalidRule(
                        "Percentage discount cannot exceed 100%".to_string(),
                    ));
                }
            }
            DiscountType::FixedAmount | DiscountType::PriceOverride => {}
        }

        Ok(())
    }
}

impl std::fmt::Display for Discount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.discount_type {
            DiscountType::Percentage => write!(f, "{}% off", self.discount_value.normalize()),
            DiscountType::FixedAmount => write!(f, "${:.2} off", self.discount_value),
            DiscountType::PriceOverride => write!(f, "price ${:.2}", self.discount_value),
        }
    }
}

/// One row of a quantity tier table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityTier {
    pub min_quantity: u32,
    /// `None` means unbounded
    pub max_quantity: Option<u32>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
}

impl QuantityTier {
    pub fn contains(&self, quantity: u32) -> bool {
        quantity >= self.min_quantity && self.max_quantity.map_or(true, |max| quantity <= max)
    }

    pub fn discount(&self) -> Discount {
        Discount { discount_type: self.discount_type, discount_value: self.discount_value }
    }

    fn validate(&self) -> PRResult<()> {
        if let Some(max) = self.max_quantity {
            if max < self.min_quantity {
                return Err(PricingError::InvalidRule(format!(
                    "Tier max_quantity {} is below min_quantity {}",
                    max, self.min_quantity
                )));
            }
        }
        self.discount().validate()
    }
}

/// One row of a customer-tier pricing table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPricing {
    pub tier: CustomerTier,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    #[serde(default = "default_min_quantity")]
    pub min_quantity: u32,
    #[serde(default)]
    pub max_quantity: Option<u32>,
}

fn default_min_quantity() -> u32 {
    1
}

impl TierPricing {
    pub fn contains(&self, quantity: u32) -> bool {
        quantity >= self.min_quantity && self.max_quantity.map_or(true, |max| quantity <= max)
    }

    pub fn discount(&self) -> Discount {
        Discount { discount_type: self.discount_type, discount_value: self.discount_value }
    }
}

/// Customer-tier discount details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerTierConfig {
    #[serde(flatten)]
    pub discount: Discount,
}

/// Volume pricing details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub tiers: Vec<QuantityTier>,
}

/// Tiered (customer tier × scope) pricing details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TieredConfig {
    pub tiers: Vec<TierPricing>,
}

/// Expiration-driven inventory discount details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationConfig {
    /// Discount applies when the product expires within this many days
    pub trigger_days: i64,
    #[serde(flatten)]
    pub discount: Discount,
}

/// THC-driven inventory discount details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThcConfig {
    /// THC percentage threshold
    pub threshold: Decimal,
    #[serde(default)]
    pub comparator: ThcComparator,
    #[serde(flatten)]
    pub discount: Discount,
}

/// BOGO promotion details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BogoConfig {
    pub buy_quantity: u32,
    pub get_quantity: u32,
    pub reward_type: BogoRewardType,
    #[serde(default)]
    pub reward_value: Decimal,
}

/// Bundle deal details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleConfig {
    pub bundle_type: BundleType,
    /// Member products (fixed, mix-and-match and tiered bundles)
    #[serde(default)]
    pub products: Vec<String>,
    /// Member categories (category bundles)
    #[serde(default)]
    pub categories: Vec<String>,
    pub min_quantity: u32,
    #[serde(flatten)]
    pub discount: Discount,
    /// Quantity tiers for tiered bundles; the flat discount applies when empty
    #[serde(default)]
    pub tiers: Vec<QuantityTier>,
}

/// Promo code details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCodeConfig {
    pub code: String,
    #[serde(flatten)]
    pub discount: Discount,
    #[serde(default)]
    pub min_purchase_amount: Decimal,
    #[serde(default)]
    pub max_discount_amount: Option<Decimal>,
    /// Global redemption limit, `None` = unlimited
    #[serde(default)]
    pub usage_limit: Option<u32>,
    #[serde(default)]
    pub times_used: u32,
    /// Redemptions allowed per customer, `None` = unlimited
    #[serde(default)]
    pub per_customer_limit: Option<u32>,
    /// Redemptions so far, keyed by customer id
    #[serde(default)]
    pub customer_redemptions: BTreeMap<String, u32>,
}

impl PromoCodeConfig {
    pub fn redemptions_by(&self, customer_id: &str) -> u32 {
        self.customer_redemptions.get(customer_id).copied().unwrap_or(0)
    }
}

/// Mechanism-specific part of a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mechanism", rename_all = "snake_case")]
pub enum RuleKind {
    CustomerTier(CustomerTierConfig),
    Volume(VolumeConfig),
    Tiered(TieredConfig),
    InventoryExpiration(ExpirationConfig),
    InventoryThc(ThcConfig),
    Bogo(BogoConfig),
    Bundle(BundleConfig),
    PromoCode(PromoCodeConfig),
}

impl RuleKind {
    pub fn mechanism(&self) -> Mechanism {
        match self {
            RuleKind::CustomerTier(_) => Mechanism::CustomerTier,
            RuleKind::Volume(_) => Mechanism::Volume,
            RuleKind::Tiered(_) => Mechanism::Tiered,
            RuleKind::InventoryExpiration(_) => Mechanism::InventoryExpiration,
            RuleKind::InventoryThc(_) => Mechanism::InventoryThc,
            RuleKind::Bogo(_) => Mechanism::Bogo,
            RuleKind::Bundle(_) => Mechanism::Bundle,
            RuleKind::PromoCode(_) => Mechanism::PromoCode,
        }
    }
}

/// A discount rule as stored in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountRule {
    pub id: String,
    pub name: String,
    /// Lower number wins conflicts
    pub priority: i32,
    pub status: RuleStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    /// Markets the rule is offered in; empty = every market
    #[serde(default)]
    pub markets: Vec<String>,
    /// Customer tiers the rule is offered to; empty = every tier
    #[serde(default)]
    pub customer_tiers: Vec<CustomerTier>,
    #[serde(default)]
    pub target: RuleTarget,
    pub kind: RuleKind,
}

impl DiscountRule {
    pub fn mechanism(&self) -> Mechanism {
        self.kind.mechanism()
    }

    /// A rule is active at `at` iff it is enabled and `at` lies in its window
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.inactive_reason(at).is_none()
    }

    /// Explain why a rule is not active at `at`
    pub fn inactive_reason(&self, at: DateTime<Utc>) -> Option<String> {
        if self.status != RuleStatus::Active {
            return Some(format!("Rule status is {}", self.status));
        }
        if at < self.start_date {
            return Some(format!("Rule starts {}", self.start_date.to_rfc3339()));
        }
        if let Some(end) = self.end_date {
            if at > end {
                return Some(format!("Rule ended {}", end.to_rfc3339()));
            }
        }
        None
    }

    /// Whether the rule is offered in the given market
    pub fn offered_in(&self, market: &str) -> bool {
        self.markets.is_empty() || self.markets.iter().any(|m| m.eq_ignore_ascii_case(market))
    }

    /// Whether the rule is offered to the given tier
    pub fn offered_to(&self, tier: Option<CustomerTier>) -> bool {
        if self.customer_tiers.is_empty() {
            return true;
        }
        tier.map_or(false, |t| self.customer_tiers.contains(&t))
    }

    /// Validate the rule configuration
    ///
    /// Ensures values are within range for the rule's mechanism.
    pub fn validate(&self) -> PRResult<()> {
        if self.id.trim().is_empty() {
            return Err(PricingError::InvalidRule("Rule id must not be empty".to_string()));
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(PricingError::InvalidRule(format!(
                    "Rule {} ends before it starts",
                    self.id
                )));
            }
        }

        let context = |e: PricingError| match e {
            PricingError::InvalidRule(msg) => {
                PricingError::InvalidRule(format!("{} ({}): {}", self.id, self.mechanism(), msg))
            }
            other => other,
        };

        match &self.kind {
            RuleKind::CustomerTier(config) => {
                if self.customer_tiers.is_empty() {
                    return Err(context(PricingError::InvalidRule(
                        "customer tier discounts must list at least one tier".to_string(),
                    )));
                }
                config.discount.validate().map_err(context)?;
            }
            RuleKind::Volume(config) => {
                if config.tiers.is_empty() {
                    return Err(context(PricingError::InvalidRule(
                        "volume pricing needs at least one quantity tier".to_string(),
                    )));
                }
                for tier in &config.tiers {
                    if tier.min_quantity == 0 {
                        return Err(context(PricingError::InvalidRule(
                            "min_quantity must be greater than 0".to_string(),
                        )));
                    }
                    tier.validate().map_err(context)?;
                }
            }
            RuleKind::Tiered(config) => {
                if config.tiers.is_empty() {
                    return Err(context(PricingError::InvalidRule(
                        "tiered pricing needs at least one tier row".to_string(),
                    )));
                }
                for row in &config.tiers {
                    row.discount().validate().map_err(context)?;
                }
            }
            RuleKind::InventoryExpiration(config) => {
                if config.trigger_days < 0 {
                    return Err(context(PricingError::InvalidRule(
                        "trigger_days must be non-negative".to_string(),
                    )));
                }
                config.discount.validate().map_err(context)?;
            }
            RuleKind::InventoryThc(config) => {
                if config.threshold < Decimal::ZERO || config.threshold > Decimal::ONE_HUNDRED {
                    return Err(context(PricingError::InvalidRule(
                        "THC threshold must be between 0 and 100".to_string(),
                    )));
                }
                config.discount.validate().map_err(context)?;
            }
            RuleKind::Bogo(config) => {
                if config.buy_quantity == 0 || config.get_quantity == 0 {
                    return Err(context(PricingError::InvalidRule(
                        "buy_quantity and get_quantity must be at least 1".to_string(),
                    )));
                }
                if config.reward_value < Decimal::ZERO {
                    return Err(context(PricingError::InvalidRule(
                        "Reward value cannot be negative".to_string(),
                    )));
                }
                if config.reward_type == BogoRewardType::Percentage
                    && config.reward_value > Decimal::ONE_HUNDRED
                {
                    return Err(context(PricingError::InvalidRule(
                        "Percentage reward cannot exceed 100%".to_string(),
                    )));
                }
            }
            RuleKind::Bundle(config) => {
                if config.min_quantity == 0 {
                    return Err(context(PricingError::InvalidRule(
                        "Minimum quantity must be a positive integer".to_string(),
                    )));
                }
                match config.bundle_type {
                    BundleType::Fixed if config.products.len() < 2 => {
                        return Err(context(PricingError::InvalidRule(
                            "Bundle must contain at least 2 products".to_string(),
                        )));
                    }
                    BundleType::Category if config.categories.is_empty() => {
                        return Err(context(PricingError::InvalidRule(
                            "Category bundle must list at least one category".to_string(),
                        )));
                    }
                    BundleType::MixMatch | BundleType::Tiered if config.products.is_empty() => {
                        return Err(context(PricingError::InvalidRule(
                            "Bundle must list its member products".to_string(),
                        )));
                    }
                    _ => {}
                }
                config.discount.validate().map_err(context)?;
                for tier in &config.tiers {
                    tier.validate().map_err(context)?;
                }
            }
            RuleKind::PromoCode(config) => {
                crate::validation::validate_promo_code(&config.code)
                    .map_err(|e| context(PricingError::InvalidRule(e)))?;
                config.discount.validate().map_err(context)?;
                if config.min_purchase_amount < Decimal::ZERO {
                    return Err(context(PricingError::InvalidRule(
                        "min_purchase_amount must be non-negative".to_string(),
                    )));
                }
                if matches!(config.max_discount_amount, Some(cap) if cap < Decimal::ZERO) {
                    return Err(context(PricingError::InvalidRule(
                        "max_discount_amount must be non-negative".to_string(),
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Rule builders shared by the evaluator and orchestrator tests

    use super::*;
    use chrono::TimeZone;

    pub fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    pub fn rule(id: &str, priority: i32, kind: RuleKind) -> DiscountRule {
        DiscountRule {
            id: id.to_string(),
            name: format!("Rule {}", id),
            priority,
            status: RuleStatus::Active,
            start_date: epoch(),
            end_date: None,
            markets: vec![],
            customer_tiers: vec![],
            target: RuleTarget::All,
            kind,
        }
    }

    pub fn customer_tier(id: &str, priority: i32, tiers: Vec<CustomerTier>, discount: Discount) -> DiscountRule {
        let mut r = rule(id, priority, RuleKind::CustomerTier(CustomerTierConfig { discount }));
        r.customer_tiers = tiers;
        r
    }

    pub fn volume(id: &str, priority: i32, tiers: Vec<QuantityTier>) -> DiscountRule {
        rule(id, priority, RuleKind::Volume(VolumeConfig { tiers }))
    }

    pub fn qty_tier(min: u32, max: Option<u32>, discount: Discount) -> QuantityTier {
        QuantityTier {
            min_quantity: min,
            max_quantity: max,
            discount_type: discount.discount_type,
            discount_value: discount.discount_value,
        }
    }

    pub fn bogo(id: &str, priority: i32, buy: u32, get: u32, reward_type: BogoRewardType, value: Decimal) -> DiscountRule {
        rule(
            id,
            priority,
            RuleKind::Bogo(BogoConfig {
                buy_quantity: buy,
                get_quantity: get,
                reward_type,
                reward_value: value,
            }),
        )
    }

    pub fn promo(id: &str, priority: i32, code: &str, discount: Discount) -> DiscountRule {
        rule(
            id,
            priority,
            RuleKind::PromoCode(PromoCodeConfig {
                code: code.to_string(),
                discount,
                min_purchase_amount: Decimal::ZERO,
                max_discount_amount: None,
                usage_limit: None,
                times_used: 0,
                per_customer_limit: None,
                customer_redemptions: BTreeMap::new(),
            }),
        )
    }
}

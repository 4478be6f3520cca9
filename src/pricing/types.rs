// Domain type definitions for the pricing engine
// Provides the enums shared by rules, evaluators, results and the audit trail

use serde::{Deserialize, Serialize};
use std::fmt;

/// Customer segmentation tier
///
/// Tiers are ordinal: A is the most valuable account segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CustomerTier {
    A,
    B,
    C,
}

impl fmt::Display for CustomerTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustomerTier::A => write!(f, "A"),
            CustomerTier::B => write!(f, "B"),
            CustomerTier::C => write!(f, "C"),
        }
    }
}

impl std::str::FromStr for CustomerTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(CustomerTier::A),
            "B" => Ok(CustomerTier::B),
            "C" => Ok(CustomerTier::C),
            _ => Err(format!("Invalid customer tier: {}", s)),
        }
    }
}

/// Type of discount carried by a rule
///
/// Determines how the discount value is interpreted by the price calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// Percentage of the line price (e.g., 10 = 10% off)
    Percentage,

    /// Fixed amount subtracted from the line price (e.g., 5.00 = $5 off)
    FixedAmount,

    /// Replacement price for the line
    PriceOverride,
}

impl fmt::Display for DiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscountType::Percentage => write!(f, "percentage"),
            DiscountType::FixedAmount => write!(f, "fixed_amount"),
            DiscountType::PriceOverride => write!(f, "price_override"),
        }
    }
}

/// Administrative status of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Active,
    Inactive,
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleStatus::Active => write!(f, "active"),
            RuleStatus::Inactive => write!(f, "inactive"),
        }
    }
}

impl std::str::FromStr for RuleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(RuleStatus::Active),
            "inactive" => Ok(RuleStatus::Inactive),
            _ => Err(format!("Invalid rule status: {}", s)),
        }
    }
}

/// Discount mechanism
///
/// Each mechanism is backed by its own rule table and its own evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mechanism {
    CustomerTier,
    Volume,
    Tiered,
    InventoryExpiration,
    InventoryThc,
    Bogo,
    Bundle,
    PromoCode,
}

impl Mechanism {
    /// Every mechanism, in catalog load order
    pub const ALL: [Mechanism; 8] = [
        Mechanism::CustomerTier,
        Mechanism::Volume,
        Mechanism::Tiered,
        Mechanism::InventoryExpiration,
        Mechanism::InventoryThc,
        Mechanism::Bogo,
        Mechanism::Bundle,
        Mechanism::PromoCode,
    ];
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mechanism::CustomerTier => write!(f, "customer_tier"),
            Mechanism::Volume => write!(f, "volume"),
            Mechanism::Tiered => write!(f, "tiered"),
            Mechanism::InventoryExpiration => write!(f, "inventory_expiration"),
            Mechanism::InventoryThc => write!(f, "inventory_thc"),
            Mechanism::Bogo => write!(f, "bogo"),
            Mechanism::Bundle => write!(f, "bundle"),
            Mechanism::PromoCode => write!(f, "promo_code"),
        }
    }
}

impl std::str::FromStr for Mechanism {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mechanism::ALL
            .iter()
            .copied()
            .find(|m| m.to_string() == s)
            .ok_or_else(|| format!("Invalid mechanism: {}", s))
    }
}

/// What a rule targets in the product hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", content = "value", rename_all = "snake_case")]
pub enum RuleTarget {
    All,
    Category(String),
    Brand(String),
    Product(String),
}

impl RuleTarget {
    /// Whether a product with the given attributes falls under this target
    pub fn matches(&self, product_id: &str, category: &str, brand: &str) -> bool {
        match self {
            RuleTarget::All => true,
            RuleTarget::Category(c) => c.eq_ignore_ascii_case(category),
            RuleTarget::Brand(b) => b.eq_ignore_ascii_case(brand),
            RuleTarget::Product(p) => p == product_id,
        }
    }
}

impl Default for RuleTarget {
    fn default() -> Self {
        RuleTarget::All
    }
}

impl fmt::Display for RuleTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleTarget::All => write!(f, "all products"),
            RuleTarget::Category(c) => write!(f, "category '{}'", c),
            RuleTarget::Brand(b) => write!(f, "brand '{}'", b),
            RuleTarget::Product(p) => write!(f, "product '{}'", p),
        }
    }
}

/// How a THC rule compares the product's THC percentage to its threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThcComparator {
    /// High-THC discount: THC% >= threshold
    AtLeast,
    /// Low-THC clearance: THC% <= threshold
    AtMost,
}

impl Default for ThcComparator {
    fn default() -> Self {
        ThcComparator::AtLeast
    }
}

impl fmt::Display for ThcComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThcComparator::AtLeast => write!(f, ">="),
            ThcComparator::AtMost => write!(f, "<="),
        }
    }
}

/// Reward granted on the "get" units of a BOGO promotion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BogoRewardType {
    Free,
    Percentage,
    Fixed,
}

impl fmt::Display for BogoRewardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BogoRewardType::Free => write!(f, "free"),
            BogoRewardType::Percentage => write!(f, "percentage"),
            BogoRewardType::Fixed => write!(f, "fixed"),
        }
    }
}

/// Bundle matching strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleType {
    /// Every listed product must be present
    Fixed,
    /// Any product in the listed categories counts
    Category,
    /// Any combination of the listed products counts
    MixMatch,
    /// Like mix-and-match, with quantity tiers choosing the discount
    Tiered,
}

impl fmt::Display for BundleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleType::Fixed => write!(f, "fixed"),
            BundleType::Category => write!(f, "category"),
            BundleType::MixMatch => write!(f, "mix_match"),
            BundleType::Tiered => write!(f, "tiered"),
        }
    }
}

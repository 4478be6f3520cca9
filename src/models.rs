use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::pricing::types::{CustomerTier, DiscountType, Mechanism};

/// A request to price one product line
///
/// Immutable input to `PricingOrchestrator::compute_price`. The inventory
/// attributes and the rest of the cart are optional and only consulted by
/// the mechanisms that need them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "crate::validation::validate_request_totals"))]
pub struct PricingRequest {
    #[validate(length(min = 1, message = "product_id must not be empty"))]
    pub product_id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub customer_tier: Option<CustomerTier>,
    #[validate(length(min = 1, message = "market must not be empty"))]
    pub market: String,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: u32,
    #[validate(custom = "crate::validation::validate_non_negative_amount")]
    pub base_price: Decimal,
    #[serde(default)]
    pub product_category: String,
    #[serde(default)]
    pub product_brand: String,
    /// Defaults to the time the request enters the engine
    #[serde(default)]
    pub evaluation_time: Option<DateTime<Utc>>,
    #[serde(default)]
    #[validate(custom = "crate::validation::validate_percentage")]
    pub thc_percentage: Option<Decimal>,
    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub promo_code: Option<String>,
    /// Other lines of the same order
    #[serde(default)]
    #[validate]
    pub order_lines: Vec<OrderLine>,
}

impl PricingRequest {
    /// Minimal request for a product line; the remaining fields default to empty
    pub fn new(
        product_id: impl Into<String>,
        market: impl Into<String>,
        quantity: u32,
        base_price: Decimal,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            customer_id: None,
            customer_tier: None,
            market: market.into(),
            quantity,
            base_price,
            product_category: String::new(),
            product_brand: String::new(),
            evaluation_time: None,
            thc_percentage: None,
            expiration_date: None,
            promo_code: None,
            order_lines: Vec::new(),
        }
    }

    /// Unrounded price of the line before any discount
    ///
    /// Saturates at `Decimal::MAX`; validated requests stay below it.
    pub fn line_total(&self) -> Decimal {
        self.checked_line_total().unwrap_or(Decimal::MAX)
    }

    /// `base_price * quantity`, or `None` when it overflows
    pub fn checked_line_total(&self) -> Option<Decimal> {
        self.base_price.checked_mul(Decimal::from(self.quantity))
    }

    /// Evaluation time, which the orchestrator fills in at entry
    pub fn evaluated_at(&self) -> DateTime<Utc> {
        self.evaluation_time.unwrap_or_else(Utc::now)
    }

    /// Order subtotal for promo-code minimums
    ///
    /// The priced line is counted once even if the cart also lists it.
    pub fn order_subtotal(&self) -> Decimal {
        self.checked_order_subtotal().unwrap_or(Decimal::MAX)
    }

    pub fn checked_order_subtotal(&self) -> Option<Decimal> {
        self.order_lines
            .iter()
            .filter(|line| line.product_id != self.product_id)
            .try_fold(self.checked_line_total()?, |acc, line| {
                acc.checked_add(line.checked_line_total()?)
            })
    }
}

/// Another line in the same order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct OrderLine {
    #[validate(length(min = 1, message = "order line product_id must not be empty"))]
    pub product_id: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub brand: String,
    #[validate(range(min = 1, message = "Order line quantity must be at least 1"))]
    pub quantity: u32,
    #[validate(custom = "crate::validation::validate_non_negative_amount")]
    pub unit_price: Decimal,
}

impl OrderLine {
    pub fn line_total(&self) -> Decimal {
        self.checked_line_total().unwrap_or(Decimal::MAX)
    }

    pub fn checked_line_total(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }
}

/// Outcome of evaluating one rule against one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityVerdict {
    pub rule_id: String,
    pub rule_name: String,
    pub mechanism: Mechanism,
    pub priority: i32,
    pub eligible: bool,
    pub reason: String,
    /// Always within `[0, base_price * quantity]`
    pub computed_discount_amount: Decimal,
    /// Effective discount the calculator applies if this verdict wins
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
}

/// The rule whose discount was applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedRule {
    pub rule_id: String,
    pub rule_name: String,
    pub mechanism: Mechanism,
    pub priority: i32,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
}

impl From<&EligibilityVerdict> for AppliedRule {
    fn from(verdict: &EligibilityVerdict) -> Self {
        Self {
            rule_id: verdict.rule_id.clone(),
            rule_name: verdict.rule_name.clone(),
            mechanism: verdict.mechanism,
            priority: verdict.priority,
            discount_type: verdict.discount_type,
            discount_value: verdict.discount_value,
        }
    }
}

/// Final pricing decision for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingResult {
    pub original_price: Decimal,
    pub final_price: Decimal,
    pub total_discount: Decimal,
    pub applied_rule: Option<AppliedRule>,
    /// Every verdict, ordered by (priority, rule id)
    pub considered_rules: Vec<EligibilityVerdict>,
    pub explanation: String,
    /// Equal to the evaluation time
    pub calculated_at: DateTime<Utc>,
    #[serde(default)]
    pub forced_correction: bool,
    #[serde(default)]
    pub unavailable_sources: Vec<Mechanism>,
}

/// A product as known to the product directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub category: String,
    pub brand: String,
    pub base_price: Decimal,
    pub thc_percentage: Option<Decimal>,
    pub expiration_date: Option<DateTime<Utc>>,
}

/// A customer as known to the product directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub tier: Option<CustomerTier>,
    pub market: String,
}

/// A pricing request expressed by reference
///
/// Product attributes, customer tier and market are resolved through the
/// `ProductDirectory` before pricing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct QuoteRequest {
    #[validate(length(min = 1, message = "product_id must not be empty"))]
    pub product_id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    /// Overrides the customer's home market
    #[serde(default)]
    pub market: Option<String>,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: u32,
    #[serde(default)]
    pub promo_code: Option<String>,
    #[serde(default)]
    pub evaluation_time: Option<DateTime<Utc>>,
    #[serde(default)]
    #[validate]
    pub order_lines: Vec<OrderLine>,
}

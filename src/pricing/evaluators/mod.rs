// Eligibility evaluators
//
// One pure function per mechanism. Every evaluator sees only the rule and the
// request, never another rule's verdict, and always returns a verdict with a
// reason. An `Err` is reserved for rules the evaluator cannot reason about;
// the orchestrator turns it into an `evaluation_error` verdict for that rule.

mod bogo;
mod bundle;
mod customer_tier;
mod inventory;
mod promo_code;
mod tiered;
mod volume;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::models::{EligibilityVerdict, PricingRequest};
use crate::pricing::{
    calculator::PriceCalculator,
    error::PRResult,
    rules::{Discount, DiscountRule, RuleKind},
    types::DiscountType,
};

/// Evaluate one rule against a request at evaluation time `at`
pub fn evaluate(
    rule: &DiscountRule,
    request: &PricingRequest,
    at: DateTime<Utc>,
) -> PRResult<EligibilityVerdict> {
    if let Some(reason) = scope_mismatch(rule, request, at) {
        return Ok(ineligible(rule, reason));
    }

    match &rule.kind {
        RuleKind::CustomerTier(config) => customer_tier::evaluate(rule, config, request),
        RuleKind::Volume(config) => volume::evaluate(rule, config, request),
        RuleKind::Tiered(config) => tiered::evaluate(rule, config, request),
        RuleKind::InventoryExpiration(config) => inventory::evaluate_expiration(rule, config, request, at),
        RuleKind::InventoryThc(config) => inventory::evaluate_thc(rule, config, request),
        RuleKind::Bogo(config) => bogo::evaluate(rule, config, request),
        RuleKind::Bundle(config) => bundle::evaluate(rule, config, request),
        RuleKind::PromoCode(config) => promo_code::evaluate(rule, config, request),
    }
}

/// Checks shared by every mechanism: active window, market, target, tier
fn scope_mismatch(rule: &DiscountRule, request: &PricingRequest, at: DateTime<Utc>) -> Option<String> {
    if let Some(reason) = rule.inactive_reason(at) {
        return Some(reason);
    }
    if !rule.offered_in(&request.market) {
        return Some(format!("Rule not offered in market {}", request.market));
    }
    if !rule
        .target
        .matches(&request.product_id, &request.product_category, &request.product_brand)
    {
        return Some(format!("Product is outside rule target ({})", rule.target));
    }
    if !rule.offered_to(request.customer_tier) {
        return Some(match request.customer_tier {
            Some(tier) => format!("Customer tier {} not eligible", tier),
            None => "Customer tier unknown".to_string(),
        });
    }
    None
}

/// Discount shown on verdicts that did not compute one
fn nominal_discount(kind: &RuleKind) -> Discount {
    match kind {
        RuleKind::CustomerTier(c) => c.discount,
        RuleKind::Volume(c) => c.tiers.first().map(|t| t.discount()).unwrap_or(Discount::percentage(Decimal::ZERO)),
        RuleKind::Tiered(c) => c.tiers.first().map(|t| t.discount()).unwrap_or(Discount::percentage(Decimal::ZERO)),
        RuleKind::InventoryExpiration(c) => c.discount,
        RuleKind::InventoryThc(c) => c.discount,
        RuleKind::Bogo(_) => Discount::fixed_amount(Decimal::ZERO),
        RuleKind::Bundle(c) => c.discount,
        RuleKind::PromoCode(c) => c.discount,
    }
}

fn verdict(
    rule: &DiscountRule,
    eligible: bool,
    reason: String,
    amount: Decimal,
    discount: Discount,
) -> EligibilityVerdict {
    EligibilityVerdict {
        rule_id: rule.id.clone(),
        rule_name: rule.name.clone(),
        mechanism: rule.mechanism(),
        priority: rule.priority,
        eligible,
        reason,
        computed_discount_amount: amount,
        discount_type: discount.discount_type,
        discount_value: discount.discount_value,
    }
}

/// Ineligible verdict with a zero amount
pub(crate) fn ineligible(rule: &DiscountRule, reason: impl Into<String>) -> EligibilityVerdict {
    verdict(rule, false, reason.into(), Decimal::ZERO, nominal_discount(&rule.kind))
}

/// Ineligible verdict for a rule whose evaluation failed
pub(crate) fn evaluation_error(rule: &DiscountRule, reason: impl std::fmt::Display) -> EligibilityVerdict {
    ineligible(rule, format!("evaluation_error: {}", reason))
}

/// Eligible verdict applying a line-level discount
///
/// Price overrides are configured per unit and scaled to the line here, so
/// the calculator can treat the verdict's value as a line price.
pub(crate) fn line_discount(
    rule: &DiscountRule,
    request: &PricingRequest,
    discount: Discount,
    reason: String,
) -> EligibilityVerdict {
    let effective = match discount.discount_type {
        DiscountType::PriceOverride => Discount::price_override(
            discount.discount_value.saturating_mul(Decimal::from(request.quantity)),
        ),
        _ => discount,
    };
    let original = PriceCalculator::original_price(request.base_price, request.quantity);
    let amount = PriceCalculator::discount_amount(original, effective.discount_type, effective.discount_value)
        .map_or(original, |amount| PriceCalculator::clamp_discount(amount, original));
    verdict(rule, true, reason, amount, effective)
}

/// Eligible verdict for a mechanism that computes its own amount
///
/// The amount is rounded, clamped to the line price, and carried as a fixed
/// amount so the calculator reproduces it exactly.
pub(crate) fn computed_discount(
    rule: &DiscountRule,
    request: &PricingRequest,
    amount: Decimal,
    reason: String,
) -> EligibilityVerdict {
    let original = PriceCalculator::original_price(request.base_price, request.quantity);
    let amount =
        PriceCalculator::clamp_discount(PriceCalculator::round_money(amount), original);
    verdict(rule, true, reason, amount, Discount::fixed_amount(amount))
}

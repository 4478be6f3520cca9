use crate::models::{EligibilityVerdict, PricingRequest};
use crate::pricing::{
    calculator::PriceCalculator,
    error::PRResult,
    rules::{DiscountRule, PromoCodeConfig},
    types::DiscountType,
};
use crate::validation::normalize_promo_code;
use rust_decimal::Decimal;

use super::{computed_discount, ineligible};

pub(super) fn evaluate(
    rule: &DiscountRule,
    config: &PromoCodeConfig,
    request: &PricingRequest,
) -> PRResult<EligibilityVerdict> {
    let Some(supplied) = request.promo_code.as_deref() else {
        return Ok(ineligible(rule, "No promo code supplied"));
    };
    if normalize_promo_code(supplied) != normalize_promo_code(&config.code) {
        return Ok(ineligible(rule, "Promo code does not match"));
    }

    if let Some(limit) = config.usage_limit {
        if config.times_used >= limit {
            return Ok(ineligible(rule, "Promo code usage limit reached"));
        }
    }

    if let Some(limit) = config.per_customer_limit {
        let Some(customer_id) = request.customer_id.as_deref() else {
            return Ok(ineligible(rule, "Promo code requires an identified customer"));
        };
        if config.redemptions_by(customer_id) >= limit {
            return Ok(ineligible(rule, "Customer already redeemed this promo code"));
        }
    }

    let subtotal = request.order_subtotal();
    if subtotal < config.min_purchase_amount {
        return Ok(ineligible(
            rule,
            format!(
                "Order subtotal ${:.2} below minimum ${:.2}",
                subtotal, config.min_purchase_amount
            ),
        ));
    }

    let original = PriceCalculator::original_price(request.base_price, request.quantity);
    let value = match config.discount.discount_type {
        DiscountType::PriceOverride => {
            config.discount.discount_value.saturating_mul(Decimal::from(request.quantity))
        }
        _ => config.discount.discount_value,
    };
    let mut amount = PriceCalculator::discount_amount(original, config.discount.discount_type, value)
        .unwrap_or(original);
    let mut reason = format!("Promo code {}: {}", normalize_promo_code(&config.code), config.discount);
    if let Some(cap) = config.max_discount_amount {
        if amount > cap {
            amount = cap;
            reason.push_str(&format!(", capped at ${:.2}", cap));
        }
    }

    Ok(computed_discount(rule, request, amount, reason))
}

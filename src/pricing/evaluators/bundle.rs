// Bundle deals
//
// The priced line and the rest of the order form the bundle context. The
// bundle discount is computed on every matching line and the priced line
// receives its proportional share.

use rust_decimal::Decimal;

use crate::models::{EligibilityVerdict, OrderLine, PricingRequest};
use crate::pricing::{
    error::{PRResult, PricingError},
    rules::{BundleConfig, Discount, DiscountRule},
    types::{BundleType, DiscountType},
};

use super::{computed_discount, ineligible, volume::best_tier};

/// The order context: other lines plus the priced line, one entry per product
fn order_context(request: &PricingRequest) -> Vec<OrderLine> {
    let mut lines: Vec<OrderLine> = request
        .order_lines
        .iter()
        .filter(|line| line.product_id != request.product_id)
        .cloned()
        .collect();
    lines.push(OrderLine {
        product_id: request.product_id.clone(),
        category: request.product_category.clone(),
        brand: request.product_brand.clone(),
        quantity: request.quantity,
        unit_price: request.base_price,
    });
    lines
}

fn is_member(config: &BundleConfig, line: &OrderLine) -> bool {
    match config.bundle_type {
        BundleType::Category => config
            .categories
            .iter()
            .any(|c| c.eq_ignore_ascii_case(&line.category)),
        BundleType::Fixed | BundleType::MixMatch | BundleType::Tiered => {
            config.products.iter().any(|p| *p == line.product_id)
        }
    }
}

fn overflow(rule: &DiscountRule) -> PricingError {
    PricingError::EvaluationError {
        rule_id: rule.id.clone(),
        reason: "bundle amount overflow".to_string(),
    }
}

pub(super) fn evaluate(
    rule: &DiscountRule,
    config: &BundleConfig,
    request: &PricingRequest,
) -> PRResult<EligibilityVerdict> {
    if config.min_quantity == 0 {
        return Err(PricingError::EvaluationError {
            rule_id: rule.id.clone(),
            reason: "bundle min_quantity is 0".to_string(),
        });
    }

    let context = order_context(request);
    let Some(priced_line) = context.last().filter(|line| is_member(config, line)) else {
        return Ok(ineligible(rule, "Product is not part of the bundle"));
    };

    if config.bundle_type == BundleType::Fixed {
        let mut missing: Vec<&str> = config
            .products
            .iter()
            .filter(|p| !context.iter().any(|line| line.product_id == **p))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            missing.sort_unstable();
            return Ok(ineligible(
                rule,
                format!("Missing bundle products: {}", missing.join(", ")),
            ));
        }
    }

    let members: Vec<&OrderLine> = context.iter().filter(|line| is_member(config, line)).collect();
    let combined_quantity: u32 = members.iter().map(|line| line.quantity).sum();
    if combined_quantity < config.min_quantity {
        return Ok(ineligible(
            rule,
            format!(
                "Bundle needs {} units, order has {}",
                config.min_quantity, combined_quantity
            ),
        ));
    }

    let discount: Discount = if config.bundle_type == BundleType::Tiered && !config.tiers.is_empty() {
        match best_tier(&config.tiers, combined_quantity) {
            Some(tier) => tier.discount(),
            None => {
                return Ok(ineligible(
                    rule,
                    format!("No bundle tier for {} units", combined_quantity),
                ))
            }
        }
    } else {
        config.discount
    };

    let mut matched_base = Decimal::ZERO;
    for line in &members {
        let total = line
            .unit_price
            .checked_mul(Decimal::from(line.quantity))
            .ok_or_else(|| overflow(rule))?;
        matched_base = matched_base.checked_add(total).ok_or_else(|| overflow(rule))?;
    }

    let multiples = Decimal::from(combined_quantity / config.min_quantity);
    let bundle_discount = match discount.discount_type {
        DiscountType::Percentage => {
            matched_base
                .checked_mul(discount.discount_value)
                .ok_or_else(|| overflow(rule))?
                / Decimal::ONE_HUNDRED
        }
        DiscountType::FixedAmount => discount
            .discount_value
            .checked_mul(multiples)
            .ok_or_else(|| overflow(rule))?,
        DiscountType::PriceOverride => {
            let bundle_price = discount
                .discount_value
                .checked_mul(multiples)
                .ok_or_else(|| overflow(rule))?;
            (matched_base - bundle_price).max(Decimal::ZERO)
        }
    }
    .min(matched_base);

    let line_share = if matched_base.is_zero() {
        Decimal::ZERO
    } else {
        bundle_discount
            .checked_mul(priced_line.line_total())
            .ok_or_else(|| overflow(rule))?
            / matched_base
    };

    Ok(computed_discount(
        rule,
        request,
        line_share,
        format!(
            "{} bundle, {} units: {} on bundle, line share",
            config.bundle_type, combined_quantity, discount
        ),
    ))
}

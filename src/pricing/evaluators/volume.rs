use crate::models::{EligibilityVerdict, PricingRequest};
use crate::pricing::{
    error::{PRResult, PricingError},
    rules::{DiscountRule, QuantityTier, VolumeConfig},
};

use super::{ineligible, line_discount};

/// Tier with the highest `min_quantity` that contains `quantity`
pub(crate) fn best_tier(tiers: &[QuantityTier], quantity: u32) -> Option<&QuantityTier> {
    tiers
        .iter()
        .filter(|tier| tier.contains(quantity))
        .max_by_key(|tier| tier.min_quantity)
}

pub(super) fn evaluate(
    rule: &DiscountRule,
    config: &VolumeConfig,
    request: &PricingRequest,
) -> PRResult<EligibilityVerdict> {
    if config.tiers.is_empty() {
        return Err(PricingError::EvaluationError {
            rule_id: rule.id.clone(),
            reason: "volume rule has no quantity tiers".to_string(),
        });
    }

    let Some(tier) = best_tier(&config.tiers, request.quantity) else {
        return Ok(ineligible(
            rule,
            format!("Quantity {} outside every volume tier", request.quantity),
        ));
    };

    let range = match tier.max_quantity {
        Some(max) => format!("{}-{}", tier.min_quantity, max),
        None => format!("{}+", tier.min_quantity),
    };
    Ok(line_discount(
        rule,
        request,
        tier.discount(),
        format!("Volume tier {} units: {}", range, tier.discount()),
    ))
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::pricing::evaluators::evaluate as evaluate_rule;
    use crate::pricing::rules::{fixtures::*, Discount};
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    /// With tier discounts non-decreasing in min_quantity, buying more never
    /// raises the per-unit price
    #[test]
    fn prop_volume_tiers_are_monotonic() {
        proptest!(|(
            q1 in 1u32..=200,
            extra in 0u32..=200,
            price_cents in 1u32..=10_000u32
        )| {
            let rule = volume("v1", 1, vec![
                qty_tier(5, None, Discount::percentage(dec!(2))),
                qty_tier(10, None, Discount::percentage(dec!(5))),
                qty_tier(50, None, Discount::percentage(dec!(10))),
                qty_tier(100, None, Discount::percentage(dec!(15))),
            ]);
            let base = Decimal::from(price_cents) / Decimal::from(100);
            let q2 = q1 + extra;

            let pct = |q: u32| {
                let request = PricingRequest::new("p1", "CO", q, base);
                let v = evaluate_rule(&rule, &request, epoch()).unwrap();
                if v.eligible { v.discount_value } else { Decimal::ZERO }
            };

            prop_assert!(pct(q2) >= pct(q1));
        });
    }
}

use crate::models::{EligibilityVerdict, PricingRequest};
use crate::pricing::{
    error::{PRResult, PricingError},
    rules::{DiscountRule, TieredConfig},
};

use super::{ineligible, line_discount};

pub(super) fn evaluate(
    rule: &DiscountRule,
    config: &TieredConfig,
    request: &PricingRequest,
) -> PRResult<EligibilityVerdict> {
    if config.tiers.is_empty() {
        return Err(PricingError::EvaluationError {
            rule_id: rule.id.clone(),
            reason: "tiered rule has no tier rows".to_string(),
        });
    }

    let Some(tier) = request.customer_tier else {
        return Ok(ineligible(rule, "Customer tier unknown"));
    };

    let row = config
        .tiers
        .iter()
        .filter(|row| row.tier == tier && row.contains(request.quantity))
        .max_by_key(|row| row.min_quantity);

    match row {
        Some(row) => Ok(line_discount(
            rule,
            request,
            row.discount(),
            format!("Tier {} pricing: {}", tier, row.discount()),
        )),
        None => Ok(ineligible(
            rule,
            format!("No tier {} pricing for quantity {}", tier, request.quantity),
        )),
    }
}

#[cfg(test)]
mod tests {
    use crate::models::PricingRequest;
    use crate::pricing::evaluators::evaluate;
    use crate::pricing::rules::{fixtures::*, RuleKind, TierPricing, TieredConfig};
    use crate::pricing::types::{CustomerTier, DiscountType};
    use rust_decimal_macros::dec;

    fn tiered_rule() -> crate::pricing::rules::DiscountRule {
        let row = |tier, value, min, max| TierPricing {
            tier,
            discount_type: DiscountType::Percentage,
            discount_value: value,
            min_quantity: min,
            max_quantity: max,
        };
        rule(
            "t1",
            2,
            RuleKind::Tiered(TieredConfig {
                tiers: vec![
                    row(CustomerTier::A, dec!(15), 1, None),
                    row(CustomerTier::A, dec!(20), 10, None),
                    row(CustomerTier::B, dec!(10), 1, Some(9)),
                ],
            }),
        )
    }

    fn request(tier: Option<CustomerTier>, quantity: u32) -> PricingRequest {
        let mut r = PricingRequest::new("p1", "CO", quantity, dec!(10.00));
        r.customer_tier = tier;
        r
    }

    #[test]
    fn test_row_for_customer_tier() {
        let v = evaluate(&tiered_rule(), &request(Some(CustomerTier::A), 2), epoch()).unwrap();
        assert!(v.eligible);
        assert_eq!(v.computed_discount_amount, dec!(3.00));

        let v = evaluate(&tiered_rule(), &request(Some(CustomerTier::A), 12), epoch()).unwrap();
        assert_eq!(v.discount_value, dec!(20));
    }

    #[test]
    fn test_quantity_outside_tier_rows() {
        let v = evaluate(&tiered_rule(), &request(Some(CustomerTier::B), 12), epoch()).unwrap();
        assert!(!v.eligible);
        assert_eq!(v.reason, "No tier B pricing for quantity 12");

        let v = evaluate(&tiered_rule(), &request(Some(CustomerTier::C), 1), epoch()).unwrap();
        assert!(!v.eligible);
    }

    #[test]
    fn test_missing_tier_is_ineligible() {
        let v = evaluate(&tiered_rule(), &request(None, 2), epoch()).unwrap();
        assert!(!v.eligible);
        assert_eq!(v.reason, "Customer tier unknown");
    }
}

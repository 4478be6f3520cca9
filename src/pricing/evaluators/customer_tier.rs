use crate::models::{EligibilityVerdict, PricingRequest};
use crate::pricing::{
    error::PRResult,
    rules::{CustomerTierConfig, DiscountRule},
};

use super::line_discount;

/// Tier membership is checked by the shared scope filter; this applies the
/// rule's discount to the whole line.
pub(super) fn evaluate(
    rule: &DiscountRule,
    config: &CustomerTierConfig,
    request: &PricingRequest,
) -> PRResult<EligibilityVerdict> {
    let tier = request
        .customer_tier
        .map(|t| t.to_string())
        .unwrap_or_default();

    Ok(line_discount(
        rule,
        request,
        config.discount,
        format!("Tier {} customer discount: {}", tier, config.discount),
    ))
}

#[cfg(test)]
mod tests {
    use crate::models::PricingRequest;
    use crate::pricing::evaluators::evaluate;
    use crate::pricing::rules::{fixtures::*, Discount};
    use crate::pricing::types::CustomerTier;
    use rust_decimal_macros::dec;

    #[test]
    fn test_matching_tier_gets_discount() {
        let rule = customer_tier("c1", 1, vec![CustomerTier::A, CustomerTier::B], Discount::percentage(dec!(10)));
        let mut request = PricingRequest::new("p1", "CO", 1, dec!(100.00));
        request.customer_tier = Some(CustomerTier::A);

        let v = evaluate(&rule, &request, epoch()).unwrap();
        assert!(v.eligible);
        assert_eq!(v.computed_discount_amount, dec!(10.00));
        assert_eq!(v.reason, "Tier A customer discount: 10% off");
    }

    #[test]
    fn test_other_tier_is_ineligible() {
        let rule = customer_tier("c1", 1, vec![CustomerTier::A], Discount::percentage(dec!(10)));
        let mut request = PricingRequest::new("p1", "CO", 1, dec!(100.00));
        request.customer_tier = Some(CustomerTier::C);

        let v = evaluate(&rule, &request, epoch()).unwrap();
        assert!(!v.eligible);
        assert_eq!(v.reason, "Customer tier C not eligible");
    }

    #[test]
    fn test_anonymous_customer_is_ineligible() {
        let rule = customer_tier("c1", 1, vec![CustomerTier::A], Discount::percentage(dec!(10)));
        let request = PricingRequest::new("p1", "CO", 1, dec!(100.00));

        let v = evaluate(&rule, &request, epoch()).unwrap();
        assert!(!v.eligible);
        assert_eq!(v.reason, "Customer tier unknown");
    }

    #[test]
    fn test_fixed_amount_applies_to_line() {
        let rule = customer_tier("c1", 1, vec![CustomerTier::B], Discount::fixed_amount(dec!(5)));
        let mut request = PricingRequest::new("p1", "CO", 3, dec!(4.00));
        request.customer_tier = Some(CustomerTier::B);

        let v = evaluate(&rule, &request, epoch()).unwrap();
        assert_eq!(v.computed_discount_amount, dec!(5));
    }
}

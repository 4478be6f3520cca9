// Conflict resolution under a no-stacking policy
// At most one eligible verdict is applied to a line

use std::cmp::Ordering;

use crate::models::EligibilityVerdict;

/// Winner ordering: priority ascending, then larger discount, then rule id
fn winner_order(a: &EligibilityVerdict, b: &EligibilityVerdict) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| b.computed_discount_amount.cmp(&a.computed_discount_amount))
        .then_with(|| a.rule_id.cmp(&b.rule_id))
}

/// Pick the single winning verdict, if any rule is eligible
pub fn resolve(verdicts: &[EligibilityVerdict]) -> Option<&EligibilityVerdict> {
    verdicts
        .iter()
        .filter(|v| v.eligible)
        .min_by(|a, b| winner_order(a, b))
}

/// Order verdicts for reporting: priority, then rule id
pub fn sort_for_report(verdicts: &mut [EligibilityVerdict]) {
    verdicts.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.rule_id.cmp(&b.rule_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::types::{DiscountType, Mechanism};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn v(id: &str, priority: i32, eligible: bool, amount: Decimal) -> EligibilityVerdict {
        EligibilityVerdict {
            rule_id: id.into(),
            rule_name: id.into(),
            mechanism: Mechanism::CustomerTier,
            priority,
            eligible,
            reason: String::new(),
            computed_discount_amount: amount,
            discount_type: DiscountType::FixedAmount,
            discount_value: amount,
        }
    }

    #[test]
    fn test_lower_priority_number_wins_over_bigger_discount() {
        let verdicts = vec![v("promo", 2, true, dec!(15)), v("tier", 1, true, dec!(10))];
        assert_eq!(resolve(&verdicts).unwrap().rule_id, "tier");
    }

    #[test]
    fn test_tie_on_priority_prefers_bigger_discount_then_id() {
        let verdicts = vec![
            v("b", 1, true, dec!(5)),
            v("c", 1, true, dec!(8)),
            v("a", 1, true, dec!(8)),
        ];
        assert_eq!(resolve(&verdicts).unwrap().rule_id, "a");
    }

    #[test]
    fn test_ineligible_verdicts_never_win() {
        let verdicts = vec![v("a", 0, false, dec!(0)), v("b", 5, true, dec!(1))];
        assert_eq!(resolve(&verdicts).unwrap().rule_id, "b");

        let verdicts = vec![v("a", 0, false, dec!(0))];
        assert!(resolve(&verdicts).is_none());
        assert!(resolve(&[]).is_none());
    }

    #[test]
    fn test_sort_for_report() {
        let mut verdicts = vec![v("z", 2, true, dec!(1)), v("b", 1, false, dec!(0)), v("a", 2, false, dec!(0))];
        sort_for_report(&mut verdicts);
        let ids: Vec<&str> = verdicts.iter().map(|v| v.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "z"]);
    }
}

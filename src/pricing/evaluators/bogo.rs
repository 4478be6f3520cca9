use rust_decimal::Decimal;

use crate::models::{EligibilityVerdict, PricingRequest};
use crate::pricing::{
    error::{PRResult, PricingError},
    rules::{BogoConfig, DiscountRule},
    types::BogoRewardType,
};

use super::{computed_discount, ineligible};

/// Reward granted on one "get" unit
fn reward_per_unit(config: &BogoConfig, unit_price: Decimal) -> Decimal {
    match config.reward_type {
        BogoRewardType::Free => unit_price,
        BogoRewardType::Percentage => unit_price * config.reward_value / Decimal::ONE_HUNDRED,
        BogoRewardType::Fixed => config.reward_value.min(unit_price),
    }
}

pub(super) fn evaluate(
    rule: &DiscountRule,
    config: &BogoConfig,
    request: &PricingRequest,
) -> PRResult<EligibilityVerdict> {
    let set_size = config
        .buy_quantity
        .checked_add(config.get_quantity)
        .filter(|size| *size > 0)
        .ok_or_else(|| PricingError::EvaluationError {
            rule_id: rule.id.clone(),
            reason: format!(
                "invalid BOGO set size (buy {}, get {})",
                config.buy_quantity, config.get_quantity
            ),
        })?;

    if request.quantity < set_size {
        return Ok(ineligible(
            rule,
            format!(
                "Buy {} get {} needs {} units, have {}",
                config.buy_quantity, config.get_quantity, set_size, request.quantity
            ),
        ));
    }

    let applicable_sets = request.quantity / set_size;
    let reward_units = applicable_sets * config.get_quantity;
    let amount = reward_per_unit(config, request.base_price)
        .checked_mul(Decimal::from(reward_units))
        .ok_or_else(|| PricingError::EvaluationError {
            rule_id: rule.id.clone(),
            reason: "BOGO reward overflow".to_string(),
        })?;

    Ok(computed_discount(
        rule,
        request,
        amount,
        format!(
            "Buy {} get {} ({}): {} set(s), {} unit(s) rewarded",
            config.buy_quantity, config.get_quantity, config.reward_type, applicable_sets, reward_units
        ),
    ))
}

// Inventory-driven discounts: short-dated stock and THC potency

use chrono::{DateTime, Utc};

use crate::models::{EligibilityVerdict, PricingRequest};
use crate::pricing::{
    error::PRResult,
    rules::{DiscountRule, ExpirationConfig, ThcConfig},
    types::ThcComparator,
};

use super::{ineligible, line_discount};

const SECONDS_PER_DAY: i64 = 86_400;

/// Whole days until `expires_at`, rounded up
///
/// A product expiring later today counts as 1 day out; an expired product
/// yields zero or a negative count.
pub(crate) fn days_until_expiration(expires_at: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
    let seconds = (expires_at - at).num_seconds();
    let days = seconds.div_euclid(SECONDS_PER_DAY);
    if seconds.rem_euclid(SECONDS_PER_DAY) > 0 {
        days + 1
    } else {
        days
    }
}

pub(super) fn evaluate_expiration(
    rule: &DiscountRule,
    config: &ExpirationConfig,
    request: &PricingRequest,
    at: DateTime<Utc>,
) -> PRResult<EligibilityVerdict> {
    let Some(expires_at) = request.expiration_date else {
        return Ok(ineligible(rule, "Product has no expiration date"));
    };

    let days = days_until_expiration(expires_at, at);
    if days > config.trigger_days {
        return Ok(ineligible(
            rule,
            format!(
                "Expires in {} days, outside {}-day window",
                days, config.trigger_days
            ),
        ));
    }

    Ok(line_discount(
        rule,
        request,
        config.discount,
        format!("Expires in {} days: {}", days, config.discount),
    ))
}

pub(super) fn evaluate_thc(
    rule: &DiscountRule,
    config: &ThcConfig,
    request: &PricingRequest,
) -> PRResult<EligibilityVerdict> {
    let Some(thc) = request.thc_percentage else {
        return Ok(ineligible(rule, "Product has no THC percentage"));
    };

    let applies = match config.comparator {
        ThcComparator::AtLeast => thc >= config.threshold,
        ThcComparator::AtMost => thc <= config.threshold,
    };
    if !applies {
        return Ok(ineligible(
            rule,
            format!(
                "THC {}% does not satisfy {} {}%",
                thc, config.comparator, config.threshold
            ),
        ));
    }

    Ok(line_discount(
        rule,
        request,
        config.discount,
        format!(
            "THC {}% {} {}%: {}",
            thc, config.comparator, config.threshold, config.discount
        ),
    ))
}

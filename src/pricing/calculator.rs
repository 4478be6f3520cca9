use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::EligibilityVerdict;
use crate::pricing::types::DiscountType;

/// Outcome of applying (at most) one discount to a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceComputation {
    pub original_price: Decimal,
    pub final_price: Decimal,
    pub total_discount: Decimal,
    /// The discount produced a price outside `[0, original]` and was dropped
    pub forced_correction: bool,
}

/// Service for calculating line prices and discounts
pub struct PriceCalculator;

impl PriceCalculator {
    /// Round a monetary amount to cents, half away from zero
    pub fn round_money(amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Calculate the undiscounted line price
    ///
    /// # Arguments
    /// * `base_price` - Unit price
    /// * `quantity` - Number of units
    ///
    /// # Returns
    /// `base_price * quantity` rounded to cents, saturating at `Decimal::MAX`
    pub fn original_price(base_price: Decimal, quantity: u32) -> Decimal {
        Self::round_money(base_price.saturating_mul(Decimal::from(quantity)))
    }

    /// Discount amount a discount type/value yields on an original line price
    ///
    /// Percentages are rounded once; fixed amounts are capped at the line
    /// price; price overrides replace the line price when lower. The result is
    /// not clamped, so out-of-range inputs surface in `compute_final_price`.
    /// `None` when the amount is not representable.
    pub fn discount_amount(
        original_price: Decimal,
        discount_type: DiscountType,
        discount_value: Decimal,
    ) -> Option<Decimal> {
        let amount = match discount_type {
            DiscountType::Percentage => original_price
                .checked_mul(discount_value)
                .map(|amount| amount / Decimal::ONE_HUNDRED)
                .or_else(|| original_price.checked_mul(discount_value / Decimal::ONE_HUNDRED))?,
            DiscountType::FixedAmount => discount_value.min(original_price),
            DiscountType::PriceOverride => {
                original_price - Self::round_money(discount_value.min(original_price))
            }
        };
        Some(Self::round_money(amount))
    }

    /// Clamp an amount into `[0, original_price]`
    pub fn clamp_discount(amount: Decimal, original_price: Decimal) -> Decimal {
        amount.max(Decimal::ZERO).min(original_price)
    }

    /// Apply the winning verdict (if any) to a line
    ///
    /// The invariant `0 <= final <= original` always holds on the returned
    /// value. A discount that would break it is discarded and the line is
    /// priced at the original price with `forced_correction` set.
    pub fn compute_final_price(
        base_price: Decimal,
        quantity: u32,
        winner: Option<&EligibilityVerdict>,
    ) -> PriceComputation {
        let original_price = Self::original_price(base_price, quantity);

        let Some(verdict) = winner else {
            return PriceComputation {
                original_price,
                final_price: original_price,
                total_discount: Decimal::ZERO,
                forced_correction: false,
            };
        };

        let discount =
            Self::discount_amount(original_price, verdict.discount_type, verdict.discount_value);
        let final_price = discount.and_then(|d| original_price.checked_sub(d));

        let Some((discount, final_price)) = discount
            .zip(final_price)
            .filter(|(_, price)| *price >= Decimal::ZERO && *price <= original_price)
        else {
            tracing::warn!(
                rule_id = %verdict.rule_id,
                %original_price,
                discount_value = %verdict.discount_value,
                "Discount produced an out-of-range price, forcing original price"
            );
            return PriceComputation {
                original_price,
                final_price: original_price,
                total_discount: Decimal::ZERO,
                forced_correction: true,
            };
        };

        PriceComputation {
            original_price,
            final_price,
            total_discount: discount,
            forced_correction: false,
        }
    }
}

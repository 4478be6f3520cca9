// Validation utilities module
// Provides custom validation functions for domain-specific rules

use regex::Regex;
use rust_decimal::Decimal;
use std::sync::LazyLock;
use validator::ValidationError;

use crate::models::PricingRequest;

static RE_PROMO_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9][A-Z0-9_-]{2,31}$").unwrap());

/// Canonical form of a promo code: trimmed and uppercased
pub fn normalize_promo_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Validates a promo code's format
/// 3-32 characters of letters, digits, '-' or '_' (case-insensitive)
pub fn validate_promo_code(code: &str) -> Result<(), String> {
    let normalized = normalize_promo_code(code);
    if RE_PROMO_CODE.is_match(&normalized) {
        Ok(())
    } else {
        Err(format!(
            "Promo code '{}' must be 3-32 letters, digits, '-' or '_'",
            code
        ))
    }
}

/// Validates that a monetary amount is not negative
pub fn validate_non_negative_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount < Decimal::ZERO {
        Err(ValidationError::new("amount_must_be_non_negative"))
    } else {
        Ok(())
    }
}

/// Validates that a percentage lies in 0..=100
pub fn validate_percentage(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO || *value > Decimal::ONE_HUNDRED {
        Err(ValidationError::new("percentage_out_of_range"))
    } else {
        Ok(())
    }
}

/// Validates that the line total and the order subtotal are representable
pub fn validate_request_totals(request: &PricingRequest) -> Result<(), ValidationError> {
    if request.checked_line_total().is_none() {
        let mut err = ValidationError::new("line_total_out_of_range");
        err.message = Some("base_price * quantity is out of range".into());
        return Err(err);
    }
    if request.checked_order_subtotal().is_none() {
        let mut err = ValidationError::new("order_subtotal_out_of_range");
        err.message = Some("Order subtotal is out of range".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_promo_code_format() {
        assert!(validate_promo_code("SPRING20").is_ok());
        assert!(validate_promo_code("spring-20").is_ok());
        assert!(validate_promo_code("  420_deal ").is_ok());
        assert!(validate_promo_code("AB").is_err());
        assert!(validate_promo_code("-LEADING").is_err());
        assert!(validate_promo_code("HAS SPACE").is_err());
        assert!(validate_promo_code("").is_err());
    }

    #[test]
    fn test_normalize_promo_code() {
        assert_eq!(normalize_promo_code(" spring20 "), "SPRING20");
    }

    #[test]
    fn test_non_negative_amount() {
        assert!(validate_non_negative_amount(&dec!(0)).is_ok());
        assert!(validate_non_negative_amount(&dec!(12.50)).is_ok());
        assert!(validate_non_negative_amount(&dec!(-0.01)).is_err());
    }

    #[test]
    fn test_percentage_range() {
        assert!(validate_percentage(&dec!(0)).is_ok());
        assert!(validate_percentage(&dec!(100)).is_ok());
        assert!(validate_percentage(&dec!(100.01)).is_err());
        assert!(validate_percentage(&dec!(-1)).is_err());
    }
}

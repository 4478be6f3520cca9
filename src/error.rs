// Error handling for the pricing CLI
// Provides the top-level error type and the JSON error line written for failed requests

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::pricing::{PricingError, StoreError};

/// Errors that stop the CLI
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Catalog file could not be loaded
    #[error("Catalog error: {0}")]
    Store(#[from] StoreError),

    #[error("Pricing error: {0}")]
    Pricing(#[from] PricingError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Consistent error line structure
///
/// Written in place of a result when one input line cannot be priced.
/// Provides both a machine-readable `error_code` and a human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "INVALID_REQUEST", "PRODUCT_NOT_FOUND")
    pub error_code: String,

    pub message: String,

    /// 1-based input line the error refers to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,

    /// ISO 8601 timestamp of when the error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_code: &str, message: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            error_code: error_code.to_string(),
            message: message.into(),
            line,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Map a pricing failure to its error line
    pub fn from_pricing(err: &PricingError, line: Option<usize>) -> Self {
        let code = match err {
            PricingError::InvalidRequest(_) => "INVALID_REQUEST",
            PricingError::DataUnavailable(_) => "DATA_UNAVAILABLE",
            PricingError::EvaluationError { .. } => "EVALUATION_ERROR",
            PricingError::InvalidRule(_) => "INVALID_RULE",
            PricingError::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            PricingError::CustomerNotFound(_) => "CUSTOMER_NOT_FOUND",
            PricingError::JsonError(_) => "MALFORMED_INPUT",
        };

        match err {
            PricingError::InvalidRequest(_) | PricingError::ProductNotFound(_) | PricingError::CustomerNotFound(_) => {
                tracing::warn!(error_code = code, error = %err, "Request rejected")
            }
            _ => tracing::error!(error_code = code, error = %err, "Request failed"),
        }

        Self::new(code, err.to_string(), line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = PricingError::InvalidRequest("Quantity must be at least 1".into());
        let response = ErrorResponse::from_pricing(&err, Some(3));
        assert_eq!(response.error_code, "INVALID_REQUEST");
        assert_eq!(response.line, Some(3));
        assert!(response.message.contains("Quantity"));

        let err = PricingError::ProductNotFound("sku-9".into());
        assert_eq!(ErrorResponse::from_pricing(&err, None).error_code, "PRODUCT_NOT_FOUND");
    }

    #[test]
    fn test_error_response_json_shape() {
        let response = ErrorResponse::new("MALFORMED_INPUT", "expected value", None);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error_code"], "MALFORMED_INPUT");
        assert!(json.get("line").is_none());
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_app_error_from_config() {
        let err: AppError = ConfigError::InvalidValue("PRICING_CACHE_TTL_SECS".into()).into();
        assert_eq!(err.to_string(), "Invalid value for PRICING_CACHE_TTL_SECS");
    }
}

// Error types for the pricing engine
// Separates caller-facing failures from the degraded paths that still produce a price

use crate::pricing::types::Mechanism;
use thiserror::Error;

/// Main error type for the pricing engine
///
/// Only `InvalidRequest` is ever returned to a `compute_price` caller.
/// The other variants are produced internally and converted into degraded
/// results, or surface from the lookup-driven `quote` path.
#[derive(Debug, Error)]
pub enum PricingError {
    /// Malformed request (quantity < 1, negative price, missing fields)
    /// Rejected before any rule is evaluated
    #[error("Invalid pricing request: {0}")]
    InvalidRequest(String),

    /// Rule catalog or lookup collaborator unreachable
    #[error("Pricing data unavailable: {0}")]
    DataUnavailable(String),

    /// A single evaluator failed for one rule
    #[error("Evaluation of rule {rule_id} failed: {reason}")]
    EvaluationError {
        rule_id: String,
        reason: String,
    },

    /// Invalid rule configuration
    /// Occurs when a stored rule has invalid JSON structure or values
    #[error("Invalid discount rule configuration: {0}")]
    InvalidRule(String),

    /// Referenced product does not exist in the lookup collaborator
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Referenced customer does not exist in the lookup collaborator
    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for pricing operations
pub type PRResult<T> = Result<T, PricingError>;

impl From<validator::ValidationErrors> for PricingError {
    fn from(err: validator::ValidationErrors) -> Self {
        PricingError::InvalidRequest(err.to_string())
    }
}

impl From<StoreError> for PricingError {
    fn from(err: StoreError) -> Self {
        PricingError::DataUnavailable(err.to_string())
    }
}

/// Failure reported by a rule store or lookup collaborator
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backing store could not be reached or the query failed
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// Store reachable but the data for one mechanism is unusable
    #[error("Rule source {mechanism} unavailable: {reason}")]
    SourceUnavailable {
        mechanism: Mechanism,
        reason: String,
    },

    /// Catalog file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored configuration could not be parsed
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Failure reported by an audit sink
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audit serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Audit sink rejected entry: {0}")]
    Rejected(String),
}

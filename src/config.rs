//! Configuration for the pricing engine and the CLI.
//!
//! Values come from environment variables (a `.env` file is honored by the
//! binary) with fallback to defaults.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::pricing::{
    audit::AuditPolicy,
    catalog::{CACHE_TTL, FETCH_TIMEOUT},
    metrics::SLOW_OPERATION_THRESHOLD_MS,
};

/// Tuning for a `PricingOrchestrator`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on one rule catalog fetch
    pub catalog_timeout: Duration,

    /// Lifetime of cached rule loads
    pub cache_ttl: Duration,

    /// Retry and alerting for audit persistence
    pub audit: AuditPolicy,

    /// Pricing calculations slower than this are logged
    pub slow_threshold: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            catalog_timeout: FETCH_TIMEOUT,
            cache_ttl: CACHE_TTL,
            audit: AuditPolicy::default(),
            slow_threshold: Duration::from_millis(SLOW_OPERATION_THRESHOLD_MS),
        }
    }
}

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// PostgreSQL connection string; the JSON catalog is used when absent
    pub database_url: Option<String>,

    /// JSON catalog with rules, products and customers
    pub catalog_path: Option<PathBuf>,

    /// NDJSON file receiving audit entries when no database is configured
    pub audit_log_path: Option<PathBuf>,

    pub engine: EngineConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let millis = |key: &str, default: u64| -> Result<Duration, ConfigError> {
            parse_or(non_empty(key), key, default).map(Duration::from_millis)
        };

        let engine = EngineConfig {
            catalog_timeout: millis("PRICING_CATALOG_TIMEOUT_MS", FETCH_TIMEOUT.as_millis() as u64)?,
            cache_ttl: Duration::from_secs(parse_or(
                non_empty("PRICING_CACHE_TTL_SECS"),
                "PRICING_CACHE_TTL_SECS",
                CACHE_TTL.as_secs(),
            )?),
            audit: AuditPolicy {
                retry_attempts: parse_or(
                    non_empty("PRICING_AUDIT_RETRY_ATTEMPTS"),
                    "PRICING_AUDIT_RETRY_ATTEMPTS",
                    3,
                )?,
                retry_backoff: millis("PRICING_AUDIT_RETRY_BACKOFF_MS", 100)?,
                alert_threshold: parse_or(
                    non_empty("PRICING_AUDIT_ALERT_THRESHOLD"),
                    "PRICING_AUDIT_ALERT_THRESHOLD",
                    3,
                )?,
            },
            slow_threshold: millis("PRICING_SLOW_THRESHOLD_MS", SLOW_OPERATION_THRESHOLD_MS)?,
        };

        if engine.catalog_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("PRICING_CATALOG_TIMEOUT_MS".to_string()));
        }
        if engine.audit.retry_attempts == 0 {
            return Err(ConfigError::InvalidValue("PRICING_AUDIT_RETRY_ATTEMPTS".to_string()));
        }
        if engine.audit.alert_threshold == 0 {
            return Err(ConfigError::InvalidValue("PRICING_AUDIT_ALERT_THRESHOLD".to_string()));
        }

        Ok(AppConfig {
            database_url: non_empty("DATABASE_URL"),
            catalog_path: non_empty("PRICING_CATALOG_PATH").map(PathBuf::from),
            audit_log_path: non_empty("PRICING_AUDIT_LOG").map(PathBuf::from),
            engine,
        })
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}

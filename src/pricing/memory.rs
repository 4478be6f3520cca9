// In-memory collaborators
//
// Rule store, product directory and audit sink backed by process memory.
// The rule store and directory can be loaded from a JSON catalog file.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::RwLock;

use crate::models::{Customer, Product};
use crate::pricing::{
    audit::{AuditEntry, AuditSink},
    catalog::RuleStore,
    error::{AuditError, StoreError},
    lookup::ProductDirectory,
    rules::DiscountRule,
    types::Mechanism,
};

/// Contents of a JSON catalog file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub rules: Vec<DiscountRule>,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub customers: Vec<Customer>,
}

impl CatalogSnapshot {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Rule store over a fixed rule list
pub struct MemoryRuleStore {
    rules: RwLock<Vec<DiscountRule>>,
    failing: RwLock<HashSet<Mechanism>>,
}

impl MemoryRuleStore {
    pub fn new(rules: Vec<DiscountRule>) -> Self {
        Self {
            rules: RwLock::new(rules),
            failing: RwLock::new(HashSet::new()),
        }
    }

    /// Replace the stored rules
    pub async fn replace(&self, rules: Vec<DiscountRule>) {
        *self.rules.write().await = rules;
    }

    /// Make loads for `mechanism` fail as if its source were unreachable
    pub async fn set_unavailable(&self, mechanism: Mechanism, unavailable: bool) {
        let mut failing = self.failing.write().await;
        if unavailable {
            failing.insert(mechanism);
        } else {
            failing.remove(&mechanism);
        }
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn load_rules(
        &self,
        mechanism: Mechanism,
        market: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<DiscountRule>, StoreError> {
        if self.failing.read().await.contains(&mechanism) {
            return Err(StoreError::SourceUnavailable {
                mechanism,
                reason: "source marked unavailable".to_string(),
            });
        }

        let day_end = as_of + Duration::days(1);
        let rules = self.rules.read().await;
        Ok(rules
            .iter()
            .filter(|rule| {
                rule.mechanism() == mechanism
                    && rule.offered_in(market)
                    && rule.start_date < day_end
                    && rule.end_date.map_or(true, |end| end >= as_of)
            })
            .cloned()
            .collect())
    }
}

/// Product directory over fixed product and customer lists
pub struct MemoryDirectory {
    products: HashMap<String, Product>,
    customers: HashMap<String, Customer>,
    unavailable: AtomicBool,
}

impl MemoryDirectory {
    pub fn new(products: Vec<Product>, customers: Vec<Customer>) -> Self {
        Self {
            products: products.into_iter().map(|p| (p.id.clone(), p)).collect(),
            customers: customers.into_iter().map(|c| (c.id.clone(), c)).collect(),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "product directory unavailable",
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ProductDirectory for MemoryDirectory {
    async fn product(&self, id: &str) -> Result<Option<Product>, StoreError> {
        self.check_available()?;
        Ok(self.products.get(id).cloned())
    }

    async fn customer(&self, id: &str) -> Result<Option<Customer>, StoreError> {
        self.check_available()?;
        Ok(self.customers.get(id).cloned())
    }
}

/// Audit sink that keeps entries in memory
#[derive(Default)]
pub struct MemoryAuditSink {
    entries: RwLock<Vec<AuditEntry>>,
    failing: AtomicBool,
    attempts: AtomicU32,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every append while set
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Appends attempted so far, failed ones included
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuditError::Rejected("audit sink offline".to_string()));
        }
        self.entries.write().await.push(entry.clone());
        Ok(())
    }
}

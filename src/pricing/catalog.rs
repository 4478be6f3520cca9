// Rule Catalog
//
// Reads discount rules from the rule store once per request, one load per
// mechanism, with a TTL cache keyed by (mechanism, market, day) so a batch of
// requests hits the store once. Loads are bounded by a timeout.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::models::PricingRequest;
use crate::pricing::{
    error::{PRResult, PricingError, StoreError},
    metrics::PricingMetrics,
    rules::DiscountRule,
    types::Mechanism,
};

/// Default time-to-live for cached rules (60 seconds)
pub const CACHE_TTL: Duration = Duration::from_secs(60);

/// Default bound on a full catalog fetch
pub const FETCH_TIMEOUT: Duration = Duration::from_millis(2000);

/// Source of discount rule definitions
///
/// `as_of` is the start of the UTC day being priced. A store may leave out
/// rules whose window does not overlap that day, but must not filter on the
/// time of day.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn load_rules(
        &self,
        mechanism: Mechanism,
        market: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<DiscountRule>, StoreError>;
}

/// Rules applicable to one request, grouped by mechanism
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub rules: BTreeMap<Mechanism, Arc<Vec<DiscountRule>>>,
    /// Mechanisms whose rules could not be loaded
    pub unavailable: Vec<Mechanism>,
}

impl RuleSet {
    /// Number of rules across all mechanisms
    pub fn len(&self) -> usize {
        self.rules.values().map(|rules| rules.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    mechanism: Mechanism,
    market: String,
    day: NaiveDate,
}

#[derive(Debug, Clone)]
struct CachedRules {
    rules: Arc<Vec<DiscountRule>>,
    loaded_at: Instant,
}

/// In-memory cache for loaded rules
#[derive(Debug, Default)]
struct CatalogCache {
    entries: HashMap<CacheKey, CachedRules>,
}

impl CatalogCache {
    fn fresh(&self, key: &CacheKey, ttl: Duration) -> Option<Arc<Vec<DiscountRule>>> {
        self.entries
            .get(key)
            .filter(|entry| entry.loaded_at.elapsed() <= ttl)
            .map(|entry| Arc::clone(&entry.rules))
    }

    fn store(&mut self, key: CacheKey, rules: Arc<Vec<DiscountRule>>) {
        self.entries.insert(
            key,
            CachedRules {
                rules,
                loaded_at: Instant::now(),
            },
        );
    }
}

/// Rule catalog accessor
///
/// Shared by every request of an orchestrator. Failed loads are never cached.
pub struct RuleCatalog {
    store: Arc<dyn RuleStore>,
    cache: Arc<RwLock<CatalogCache>>,
    cache_ttl: Duration,
    fetch_timeout: Duration,
    metrics: PricingMetrics,
}

impl RuleCatalog {
    pub fn new(store: Arc<dyn RuleStore>, metrics: PricingMetrics) -> Self {
        Self {
            store,
            cache: Arc::new(RwLock::new(CatalogCache::default())),
            cache_ttl: CACHE_TTL,
            fetch_timeout: FETCH_TIMEOUT,
            metrics,
        }
    }

    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Load the rules that could apply to `request` at time `at`
    ///
    /// Keeps rules whose market list and product target match the request;
    /// time windows, tiers and quantities are left to the evaluators. A
    /// mechanism that fails to load is reported in `RuleSet::unavailable`.
    /// Fails with `DataUnavailable` only when every mechanism fails or the
    /// fetch exceeds the timeout.
    pub async fn fetch_applicable_rules(
        &self,
        request: &PricingRequest,
        at: DateTime<Utc>,
    ) -> PRResult<RuleSet> {
        let _timer = self.metrics.start_catalog_fetch();
        let day = at.date_naive();
        let market = request.market.to_ascii_lowercase();

        let mut handles: Vec<(Mechanism, JoinHandle<Result<Arc<Vec<DiscountRule>>, StoreError>>)> =
            Mechanism::ALL
                .iter()
                .map(|&mechanism| {
                    let key = CacheKey {
                        mechanism,
                        market: market.clone(),
                        day,
                    };
                    let handle = tokio::spawn(load_mechanism(
                        Arc::clone(&self.store),
                        Arc::clone(&self.cache),
                        self.cache_ttl,
                        self.metrics.clone(),
                        key,
                        request.market.clone(),
                    ));
                    (mechanism, handle)
                })
                .collect();

        let gathered = tokio::time::timeout(self.fetch_timeout, async {
            let mut loaded = Vec::with_capacity(handles.len());
            for (mechanism, handle) in handles.iter_mut() {
                let outcome = match handle.await {
                    Ok(result) => result,
                    Err(join_error) => Err(StoreError::SourceUnavailable {
                        mechanism: *mechanism,
                        reason: join_error.to_string(),
                    }),
                };
                loaded.push((*mechanism, outcome));
            }
            loaded
        })
        .await;

        let loaded = match gathered {
            Ok(loaded) => loaded,
            Err(_) => {
                for (_, handle) in &handles {
                    handle.abort();
                }
                self.metrics.record_catalog_outage();
                tracing::warn!(
                    timeout_ms = self.fetch_timeout.as_millis() as u64,
                    "Rule catalog fetch timed out"
                );
                return Err(PricingError::DataUnavailable(format!(
                    "rule catalog did not respond within {}ms",
                    self.fetch_timeout.as_millis()
                )));
            }
        };

        let mut rule_set = RuleSet::default();
        let mut failures = Vec::new();
        for (mechanism, outcome) in loaded {
            match outcome {
                Ok(rules) => {
                    let applicable: Vec<DiscountRule> = rules
                        .iter()
                        .filter(|rule| {
                            rule.offered_in(&request.market)
                                && rule.target.matches(
                                    &request.product_id,
                                    &request.product_category,
                                    &request.product_brand,
                                )
                        })
                        .cloned()
                        .collect();
                    if !applicable.is_empty() {
                        rule_set.rules.insert(mechanism, Arc::new(applicable));
                    }
                }
                Err(e) => {
                    tracing::warn!(%mechanism, error = %e, "Rule source unavailable");
                    self.metrics.record_unavailable_source();
                    rule_set.unavailable.push(mechanism);
                    failures.push(e.to_string());
                }
            }
        }

        if rule_set.unavailable.len() == Mechanism::ALL.len() {
            self.metrics.record_catalog_outage();
            return Err(PricingError::DataUnavailable(format!(
                "rule store unreachable: {}",
                failures.first().map(String::as_str).unwrap_or("no rule source responded")
            )));
        }

        tracing::debug!(
            product_id = %request.product_id,
            rules = rule_set.len(),
            unavailable = rule_set.unavailable.len(),
            "Fetched applicable rules"
        );
        Ok(rule_set)
    }

    /// Invalidate every cached entry
    ///
    /// Forces the next fetch to reload from the store.
    pub async fn invalidate_cache(&self) {
        let mut cache = self.cache.write().await;
        cache.entries.clear();
    }
}

/// Load one mechanism's rules through the cache
async fn load_mechanism(
    store: Arc<dyn RuleStore>,
    cache: Arc<RwLock<CatalogCache>>,
    ttl: Duration,
    metrics: PricingMetrics,
    key: CacheKey,
    market: String,
) -> Result<Arc<Vec<DiscountRule>>, StoreError> {
    // Fast path with the read lock
    {
        let cache = cache.read().await;
        if let Some(rules) = cache.fresh(&key, ttl) {
            metrics.record_cache_hit();
            return Ok(rules);
        }
    }

    metrics.record_cache_miss();

    let as_of = key
        .day
        .and_hms_opt(0, 0, 0)
        .map(|start| start.and_utc())
        .unwrap_or_else(Utc::now);
    let loaded = store.load_rules(key.mechanism, &market, as_of).await?;

    let mut valid = Vec::with_capacity(loaded.len());
    for rule in loaded {
        if rule.mechanism() != key.mechanism {
            tracing::warn!(
                rule_id = %rule.id,
                expected = %key.mechanism,
                actual = %rule.mechanism(),
                "Skipping rule returned for the wrong mechanism"
            );
            metrics.record_invalid_rule();
            continue;
        }
        match rule.validate() {
            Ok(()) => valid.push(rule),
            Err(e) => {
                tracing::warn!(rule_id = %rule.id, error = %e, "Skipping invalid discount rule");
                metrics.record_invalid_rule();
            }
        }
    }

    let rules = Arc::new(valid);
    cache.write().await.store(key, Arc::clone(&rules));
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::rules::{fixtures::*, Discount};
    use crate::pricing::types::RuleTarget;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store that counts loads and can fail or stall per mechanism
    struct ScriptedStore {
        rules: Vec<DiscountRule>,
        failing: Vec<Mechanism>,
        delay: Option<Duration>,
        loads: AtomicUsize,
    }

    impl ScriptedStore {
        fn new(rules: Vec<DiscountRule>) -> Self {
            Self {
                rules,
                failing: vec![],
                delay: None,
                loads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RuleStore for ScriptedStore {
        async fn load_rules(
            &self,
            mechanism: Mechanism,
            _market: &str,
            _as_of: DateTime<Utc>,
        ) -> Result<Vec<DiscountRule>, StoreError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.contains(&mechanism) {
                return Err(StoreError::SourceUnavailable {
                    mechanism,
                    reason: "connection refused".into(),
                });
            }
            Ok(self
                .rules
                .iter()
                .filter(|r| r.mechanism() == mechanism)
                .cloned()
                .collect())
        }
    }

    fn request() -> PricingRequest {
        let mut r = PricingRequest::new("p1", "CO", 10, dec!(45));
        r.product_category = "flower".into();
        r
    }

    #[tokio::test]
    async fn test_fetch_groups_rules_by_mechanism() {
        let store = Arc::new(ScriptedStore::new(vec![
            volume("v1", 1, vec![qty_tier(10, None, Discount::percentage(dec!(5)))]),
            bogo("b1", 2, 1, 1, crate::pricing::types::BogoRewardType::Free, dec!(0)),
        ]));
        let catalog = RuleCatalog::new(store, PricingMetrics::new());

        let set = catalog.fetch_applicable_rules(&request(), epoch()).await.unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.unavailable.is_empty());
        assert_eq!(set.rules[&Mechanism::Volume][0].id, "v1");
    }

    #[tokio::test]
    async fn test_fetch_filters_market_and_target() {
        let mut other_market = volume("v1", 1, vec![qty_tier(10, None, Discount::percentage(dec!(5)))]);
        other_market.markets = vec!["MI".into()];
        let mut other_category = volume("v2", 1, vec![qty_tier(10, None, Discount::percentage(dec!(5)))]);
        other_category.target = RuleTarget::Category("edible".into());
        let kept = volume("v3", 1, vec![qty_tier(10, None, Discount::percentage(dec!(5)))]);

        let store = Arc::new(ScriptedStore::new(vec![other_market, other_category, kept]));
        let catalog = RuleCatalog::new(store, PricingMetrics::new());

        let set = catalog.fetch_applicable_rules(&request(), epoch()).await.unwrap();
        let ids: Vec<&str> = set.rules[&Mechanism::Volume].iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["v3"]);
    }

    #[tokio::test]
    async fn test_invalid_rules_are_skipped() {
        let store = Arc::new(ScriptedStore::new(vec![
            volume("bad", 1, vec![qty_tier(10, Some(5), Discount::percentage(dec!(5)))]),
            volume("good", 1, vec![qty_tier(10, None, Discount::percentage(dec!(5)))]),
        ]));
        let metrics = PricingMetrics::new();
        let catalog = RuleCatalog::new(store, metrics.clone());

        let set = catalog.fetch_applicable_rules(&request(), epoch()).await.unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(metrics.summary().invalid_rules, 1);
    }

    #[tokio::test]
    async fn test_cache_serves_repeat_fetches() {
        let store = Arc::new(ScriptedStore::new(vec![]));
        let metrics = PricingMetrics::new();
        let catalog = RuleCatalog::new(store.clone(), metrics.clone());

        catalog.fetch_applicable_rules(&request(), epoch()).await.unwrap();
        catalog.fetch_applicable_rules(&request(), epoch()).await.unwrap();
        assert_eq!(store.loads.load(Ordering::SeqCst), Mechanism::ALL.len());
        assert_eq!(metrics.summary().cache_hits, Mechanism::ALL.len() as u64);

        catalog.invalidate_cache().await;
        catalog.fetch_applicable_rules(&request(), epoch()).await.unwrap();
        assert_eq!(store.loads.load(Ordering::SeqCst), 2 * Mechanism::ALL.len());
    }

    #[tokio::test]
    async fn test_partial_outage_marks_unavailable_sources() {
        let mut store = ScriptedStore::new(vec![volume(
            "v1",
            1,
            vec![qty_tier(10, None, Discount::percentage(dec!(5)))],
        )]);
        store.failing = vec![Mechanism::PromoCode, Mechanism::Bogo];
        let catalog = RuleCatalog::new(Arc::new(store), PricingMetrics::new());

        let set = catalog.fetch_applicable_rules(&request(), epoch()).await.unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.unavailable, vec![Mechanism::Bogo, Mechanism::PromoCode]);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let mut store = ScriptedStore::new(vec![]);
        store.failing = vec![Mechanism::Bogo];
        let store = Arc::new(store);
        let catalog = RuleCatalog::new(store.clone(), PricingMetrics::new());

        catalog.fetch_applicable_rules(&request(), epoch()).await.unwrap();
        catalog.fetch_applicable_rules(&request(), epoch()).await.unwrap();
        // every mechanism once, plus the failed one again
        assert_eq!(store.loads.load(Ordering::SeqCst), Mechanism::ALL.len() + 1);
    }

    #[tokio::test]
    async fn test_total_outage_is_data_unavailable() {
        let mut store = ScriptedStore::new(vec![]);
        store.failing = Mechanism::ALL.to_vec();
        let metrics = PricingMetrics::new();
        let catalog = RuleCatalog::new(Arc::new(store), metrics.clone());

        let err = catalog.fetch_applicable_rules(&request(), epoch()).await.unwrap_err();
        assert!(matches!(err, PricingError::DataUnavailable(_)));
        assert_eq!(metrics.summary().catalog_outages, 1);
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let mut store = ScriptedStore::new(vec![]);
        store.delay = Some(Duration::from_secs(5));
        let catalog = RuleCatalog::new(Arc::new(store), PricingMetrics::new())
            .with_fetch_timeout(Duration::from_millis(50));

        let started = Instant::now();
        let err = catalog.fetch_applicable_rules(&request(), epoch()).await.unwrap_err();
        assert!(matches!(err, PricingError::DataUnavailable(_)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_cache_entry_staleness() {
        let mut cache = CatalogCache::default();
        let key = CacheKey {
            mechanism: Mechanism::Volume,
            market: "co".into(),
            day: epoch().date_naive(),
        };

        assert!(cache.fresh(&key, Duration::from_secs(60)).is_none());
        cache.store(key.clone(), Arc::new(vec![]));
        assert!(cache.fresh(&key, Duration::from_secs(60)).is_some());

        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.fresh(&key, Duration::from_millis(1)).is_none());
    }
}

// Pricing Engine Module
//
// Resolves which discount applies to a product line in a cannabis retail
// order. Eight independent mechanisms may each offer a discount; at most one
// is applied (no stacking), chosen by priority and then by size. Every
// decision is explained and appended to an audit trail.
//
// Collaborators (rule store, product directory, audit sink, alert channel)
// are injected as trait objects so the engine runs against PostgreSQL, a
// JSON catalog or test doubles alike.

pub mod audit;
pub mod calculator;
pub mod catalog;
pub mod error;
pub mod evaluators;
pub mod lookup;
pub mod memory;
pub mod metrics;
pub mod repository;
pub mod resolver;
pub mod rules;
pub mod types;

// Re-export commonly used types for convenience
pub use audit::{
    AuditAlert, AuditEntry, AuditOutcome, AuditPolicy, AuditRecorder, AuditSink,
    NdjsonAuditSink, OperationalAlerts, TracingAlerts,
};
pub use calculator::{PriceCalculator, PriceComputation};
pub use catalog::{RuleCatalog, RuleSet, RuleStore};
pub use error::{AuditError, PRResult, PricingError, StoreError};
pub use lookup::ProductDirectory;
pub use memory::{CatalogSnapshot, MemoryAuditSink, MemoryDirectory, MemoryRuleStore};
pub use metrics::{MetricsSummary, PricingMetrics};
pub use repository::{PgAuditSink, PgDirectory, PgRuleStore};
pub use rules::{Discount, DiscountRule, RuleKind};
pub use types::{CustomerTier, DiscountType, Mechanism, RuleStatus, RuleTarget};

// Pricing Orchestrator
//
// Fetching -> Evaluating -> Resolving -> Pricing -> Recording

use chrono::{DateTime, Utc};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use validator::Validate;

use crate::config::EngineConfig;
use crate::models::{AppliedRule, EligibilityVerdict, PricingRequest, PricingResult, QuoteRequest};

type Evaluator = fn(&DiscountRule, &PricingRequest, DateTime<Utc>) -> PRResult<EligibilityVerdict>;

/// Pricing Orchestrator
///
/// Single entry point for pricing decisions. Requests are independent and
/// may be priced concurrently from clones of an `Arc<PricingOrchestrator>`.
/// Must be created inside a tokio runtime (the audit worker is spawned at
/// construction).
pub struct PricingOrchestrator {
    catalog: RuleCatalog,
    directory: Option<Arc<dyn ProductDirectory>>,
    recorder: AuditRecorder,
    metrics: PricingMetrics,
}

impl PricingOrchestrator {
    pub fn new(
        store: Arc<dyn RuleStore>,
        audit_sink: Arc<dyn AuditSink>,
        alerts: Arc<dyn OperationalAlerts>,
        config: &EngineConfig,
    ) -> Self {
        let metrics = PricingMetrics::with_slow_threshold(config.slow_threshold);
        let catalog = RuleCatalog::new(store, metrics.clone())
            .with_cache_ttl(config.cache_ttl)
            .with_fetch_timeout(config.catalog_timeout);
        let recorder = AuditRecorder::spawn(audit_sink, alerts, config.audit, metrics.clone());

        Self {
            catalog,
            directory: None,
            recorder,
            metrics,
        }
    }

    /// Attach the product directory used by `quote`
    pub fn with_directory(mut self, directory: Arc<dyn ProductDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Get performance metrics
    pub fn metrics(&self) -> &PricingMetrics {
        &self.metrics
    }

    /// Drop cached rules so the next request reloads them
    pub async fn invalidate_cache(&self) {
        self.catalog.invalidate_cache().await;
    }

    /// Wait until every audit entry submitted so far has been handled
    pub async fn flush_audit(&self) {
        self.recorder.flush().await;
    }

    /// Price one product line
    ///
    /// Returns `Err(InvalidRequest)` for malformed requests and nothing else:
    /// an unreachable catalog, failing evaluators and out-of-range discounts
    /// all degrade to a valid result whose explanation says what happened.
    pub async fn compute_price(&self, request: PricingRequest) -> PRResult<PricingResult> {
        let _timer = self.metrics.start_pricing_calculation();

        if let Err(e) = request.validate() {
            tracing::debug!(product_id = %request.product_id, error = %e, "Rejected pricing request");
            return Err(e.into());
        }

        let mut request = request;
        let at = request.evaluated_at();
        request.evaluation_time = Some(at);
        let request = Arc::new(request);

        // Fetching
        let (mut verdicts, unavailable, outage) =
            match self.catalog.fetch_applicable_rules(&request, at).await {
                Ok(rule_set) => {
                    // Evaluating
                    let verdicts =
                        evaluate_rule_set(&rule_set, &request, at, evaluators::evaluate, &self.metrics)
                            .await;
                    (verdicts, rule_set.unavailable, None)
                }
                Err(e) => {
                    tracing::warn!(
                        product_id = %request.product_id,
                        error = %e,
                        "Pricing without discounts, rule catalog unavailable"
                    );
                    (Vec::new(), Mechanism::ALL.to_vec(), Some(e))
                }
            };

        // Resolving
        resolver::sort_for_report(&mut verdicts);
        let winner = resolver::resolve(&verdicts);

        // Pricing
        let computation =
            PriceCalculator::compute_final_price(request.base_price, request.quantity, winner);
        if computation.forced_correction {
            self.metrics.record_forced_correction();
        }
        let applied = winner.filter(|_| !computation.forced_correction);

        let explanation = explain(winner, &computation, &verdicts, &unavailable, outage.as_ref());
        let result = PricingResult {
            original_price: computation.original_price,
            final_price: computation.final_price,
            total_discount: computation.total_discount,
            applied_rule: applied.map(AppliedRule::from),
            considered_rules: verdicts.clone(),
            explanation,
            calculated_at: at,
            forced_correction: computation.forced_correction,
            unavailable_sources: unavailable,
        };

        tracing::info!(
            product_id = %request.product_id,
            quantity = request.quantity,
            original_price = %result.original_price,
            final_price = %result.final_price,
            applied_rule = result.applied_rule.as_ref().map(|r| r.rule_id.as_str()).unwrap_or("none"),
            "Priced line"
        );

        // Recording
        match AuditEntry::record(&request, &verdicts, &result) {
            Ok(entry) => self.recorder.submit(entry),
            Err(e) => {
                self.metrics.record_audit_failure();
                tracing::error!(product_id = %request.product_id, error = %e, "Failed to build audit entry");
            }
        }

        Ok(result)
    }

    /// Price every line of a bulk order, one result per request
    ///
    /// Lines are priced in order so the rule cache is filled by the first.
    pub async fn price_batch(&self, requests: Vec<PricingRequest>) -> Vec<PRResult<PricingResult>> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.compute_price(request).await);
        }
        results
    }

    /// Price a line given only product and customer references
    ///
    /// Product attributes, tier and market come from the product directory.
    /// Unknown references surface as `ProductNotFound`/`CustomerNotFound`.
    pub async fn quote(&self, quote: QuoteRequest) -> PRResult<PricingResult> {
        quote.validate()?;
        let directory = self.directory.as_ref().ok_or_else(|| {
            PricingError::DataUnavailable("no product directory configured".to_string())
        })?;
        let request = lookup::resolve_quote(directory.as_ref(), &quote).await?;
        self.compute_price(request).await
    }
}

/// Run every mechanism's evaluator on its own task and merge the verdicts
///
/// A failing or panicking rule yields an `evaluation_error` verdict for that
/// rule only; a lost task yields one for each rule of its mechanism.
async fn evaluate_rule_set(
    rule_set: &RuleSet,
    request: &Arc<PricingRequest>,
    at: DateTime<Utc>,
    evaluator: Evaluator,
    metrics: &PricingMetrics,
) -> Vec<EligibilityVerdict> {
    let handles: Vec<_> = rule_set
        .rules
        .iter()
        .map(|(mechanism, rules)| {
            let group = Arc::clone(rules);
            let request = Arc::clone(request);
            let metrics = metrics.clone();
            let handle = tokio::spawn(async move {
                evaluate_group(&group, &request, at, evaluator, &metrics)
            });
            (*mechanism, Arc::clone(rules), handle)
        })
        .collect();

    let mut verdicts = Vec::with_capacity(rule_set.len());
    for (mechanism, rules, handle) in handles {
        match handle.await {
            Ok(group) => verdicts.extend(group),
            Err(join_error) => {
                tracing::error!(%mechanism, error = %join_error, "Evaluator task failed");
                for rule in rules.iter() {
                    metrics.record_evaluation_error();
                    verdicts.push(evaluators::evaluation_error(rule, &join_error));
                }
            }
        }
    }
    verdicts
}

fn evaluate_group(
    rules: &[DiscountRule],
    request: &PricingRequest,
    at: DateTime<Utc>,
    evaluator: Evaluator,
    metrics: &PricingMetrics,
) -> Vec<EligibilityVerdict> {
    rules
        .iter()
        .map(|rule| match panic::catch_unwind(AssertUnwindSafe(|| evaluator(rule, request, at))) {
            Ok(Ok(verdict)) => {
                tracing::debug!(
                    rule_id = %rule.id,
                    eligible = verdict.eligible,
                    amount = %verdict.computed_discount_amount,
                    reason = %verdict.reason,
                    "Evaluated rule"
                );
                verdict
            }
            Ok(Err(e)) => {
                metrics.record_evaluation_error();
                tracing::warn!(rule_id = %rule.id, error = %e, "Rule evaluation failed");
                let reason = match e {
                    PricingError::EvaluationError { reason, .. } => reason,
                    other => other.to_string(),
                };
                evaluators::evaluation_error(rule, reason)
            }
            Err(payload) => {
                metrics.record_evaluation_error();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(rule_id = %rule.id, panic = %message, "Rule evaluator panicked");
                evaluators::evaluation_error(rule, format!("evaluator panicked: {}", message))
            }
        })
        .collect()
}

fn explain(
    winner: Option<&EligibilityVerdict>,
    computation: &PriceComputation,
    verdicts: &[EligibilityVerdict],
    unavailable: &[Mechanism],
    outage: Option<&PricingError>,
) -> String {
    if let Some(e) = outage {
        return format!("No discount applied: discount rules unavailable ({})", e);
    }

    let mut explanation = match winner {
        Some(w) if computation.forced_correction => format!(
            "Discount from {} ({}) discarded: it would price the line outside $0.00-${:.2}; charged original price",
            w.rule_name, w.rule_id, computation.original_price
        ),
        Some(w) => {
            let eligible = verdicts.iter().filter(|v| v.eligible).count();
            let mut text = format!(
                "Applied {} ({}, priority {}): {}. Discount ${:.2}",
                w.rule_name, w.mechanism, w.priority, w.reason, computation.total_discount
            );
            if eligible > 1 {
                text.push_str(&format!(", chosen over {} other eligible rule(s)", eligible - 1));
            }
            text
        }
        None if verdicts.is_empty() => "No discount rules apply to this product".to_string(),
        None => format!("No discount applied: none of {} rule(s) eligible", verdicts.len()),
    };

    if !unavailable.is_empty() {
        let names: Vec<String> = unavailable.iter().map(Mechanism::to_string).collect();
        explanation.push_str(&format!("; rule sources unavailable: {}", names.join(", ")));
    }
    explanation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::rules::fixtures::*;
    use crate::pricing::types::BogoRewardType;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn failing_evaluator(
        rule: &DiscountRule,
        request: &PricingRequest,
        at: DateTime<Utc>,
    ) -> PRResult<EligibilityVerdict> {
        match rule.id.as_str() {
            "boom" => panic!("tier table corrupted"),
            "bad" => Err(PricingError::EvaluationError {
                rule_id: rule.id.clone(),
                reason: "config unreadable".to_string(),
            }),
            _ => evaluators::evaluate(rule, request, at),
        }
    }

    fn rule_set(rules: Vec<DiscountRule>) -> RuleSet {
        let mut grouped: BTreeMap<Mechanism, Vec<DiscountRule>> = BTreeMap::new();
        for rule in rules {
            grouped.entry(rule.mechanism()).or_default().push(rule);
        }
        RuleSet {
            rules: grouped.into_iter().map(|(m, r)| (m, Arc::new(r))).collect(),
            unavailable: vec![],
        }
    }

    fn request() -> Arc<PricingRequest> {
        let mut r = PricingRequest::new("p1", "CO", 10, dec!(45.00));
        r.evaluation_time = Some(epoch());
        Arc::new(r)
    }

    #[tokio::test]
    async fn test_failures_are_isolated_per_rule() {
        let tiers = vec![qty_tier(10, Some(50), Discount::percentage(dec!(5)))];
        let set = rule_set(vec![
            volume("boom", 1, tiers.clone()),
            volume("bad", 2, tiers.clone()),
            volume("good", 3, tiers),
        ]);
        let metrics = PricingMetrics::new();

        let verdicts = evaluate_rule_set(&set, &request(), epoch(), failing_evaluator, &metrics).await;

        assert_eq!(verdicts.len(), 3);
        let by_id = |id: &str| verdicts.iter().find(|v| v.rule_id == id).unwrap();
        assert!(!by_id("boom").eligible);
        assert!(by_id("boom").reason.starts_with("evaluation_error: evaluator panicked"));
        assert_eq!(by_id("bad").reason, "evaluation_error: config unreadable");
        assert!(by_id("good").eligible);
        assert_eq!(by_id("good").computed_discount_amount, dec!(22.50));
        assert_eq!(metrics.summary().evaluation_errors, 2);
    }

    #[tokio::test]
    async fn test_every_mechanism_group_is_evaluated() {
        let set = rule_set(vec![
            volume("v1", 1, vec![qty_tier(1, None, Discount::percentage(dec!(5)))]),
            bogo("b1", 2, 1, 1, BogoRewardType::Free, Decimal::ZERO),
            promo("p1", 3, "SAVE10", Discount::percentage(dec!(10))),
        ]);
        let verdicts =
            evaluate_rule_set(&set, &request(), epoch(), evaluators::evaluate, &PricingMetrics::new()).await;

        let mut ids: Vec<&str> = verdicts.iter().map(|v| v.rule_id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["b1", "p1", "v1"]);
    }

    #[test]
    fn test_explanations() {
        let computation = PriceCalculator::compute_final_price(dec!(10), 1, None);
        assert_eq!(
            explain(None, &computation, &[], &[], None),
            "No discount rules apply to this product"
        );

        let outage = PricingError::DataUnavailable("rule store unreachable".into());
        let text = explain(None, &computation, &[], &Mechanism::ALL, Some(&outage));
        assert!(text.contains("unavailable"));

        let text = explain(None, &computation, &[], &[Mechanism::PromoCode], None);
        assert!(text.ends_with("rule sources unavailable: promo_code"));
    }
}

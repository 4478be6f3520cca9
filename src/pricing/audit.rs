// Audit Recorder
//
// Builds an immutable audit entry for every pricing decision and hands it to
// an append-only sink on a background worker. Persistence failures are
// retried, counted and alerted on, and never reach the pricing caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use uuid::Uuid;

use crate::models::{EligibilityVerdict, PricingRequest, PricingResult};
use crate::pricing::{error::AuditError, metrics::PricingMetrics, types::Mechanism};

/// How a pricing decision ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// A rule won and was applied
    Applied,
    /// No rule was eligible
    NoDiscount,
    /// The rule catalog could not be read
    CatalogUnavailable,
    /// The winning discount broke the price bounds and was dropped
    ForcedCorrection,
}

impl std::fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditOutcome::Applied => write!(f, "applied"),
            AuditOutcome::NoDiscount => write!(f, "no_discount"),
            AuditOutcome::CatalogUnavailable => write!(f, "catalog_unavailable"),
            AuditOutcome::ForcedCorrection => write!(f, "forced_correction"),
        }
    }
}

/// Immutable record of one pricing decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    entry_id: Uuid,
    request: PricingRequest,
    verdicts: Vec<EligibilityVerdict>,
    result: PricingResult,
    outcome: AuditOutcome,
    unavailable_sources: Vec<Mechanism>,
    decision_digest: String,
    recorded_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct DecisionView<'a> {
    request: &'a PricingRequest,
    verdicts: &'a [EligibilityVerdict],
    result: &'a PricingResult,
}

impl AuditEntry {
    /// Build the entry for a finished decision
    pub fn record(
        request: &PricingRequest,
        verdicts: &[EligibilityVerdict],
        result: &PricingResult,
    ) -> Result<Self, AuditError> {
        let outcome = if result.forced_correction {
            AuditOutcome::ForcedCorrection
        } else if result.applied_rule.is_some() {
            AuditOutcome::Applied
        } else if result.unavailable_sources.len() == Mechanism::ALL.len() {
            AuditOutcome::CatalogUnavailable
        } else {
            AuditOutcome::NoDiscount
        };

        Ok(Self {
            entry_id: Uuid::new_v4(),
            request: request.clone(),
            verdicts: verdicts.to_vec(),
            result: result.clone(),
            outcome,
            unavailable_sources: result.unavailable_sources.clone(),
            decision_digest: Self::digest(request, verdicts, result)?,
            recorded_at: Utc::now(),
        })
    }

    /// SHA-256 over the canonical JSON of request, verdicts and result
    ///
    /// Two evaluations of the same request against the same rules produce
    /// the same digest.
    pub fn digest(
        request: &PricingRequest,
        verdicts: &[EligibilityVerdict],
        result: &PricingResult,
    ) -> Result<String, AuditError> {
        let canonical = serde_json::to_vec(&DecisionView {
            request,
            verdicts,
            result,
        })?;
        Ok(format!("{:x}", Sha256::digest(&canonical)))
    }

    pub fn entry_id(&self) -> Uuid {
        self.entry_id
    }

    pub fn request(&self) -> &PricingRequest {
        &self.request
    }

    pub fn verdicts(&self) -> &[EligibilityVerdict] {
        &self.verdicts
    }

    pub fn result(&self) -> &PricingResult {
        &self.result
    }

    pub fn outcome(&self) -> AuditOutcome {
        self.outcome
    }

    pub fn unavailable_sources(&self) -> &[Mechanism] {
        &self.unavailable_sources
    }

    pub fn decision_digest(&self) -> &str {
        &self.decision_digest
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

/// Append-only store for audit entries
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// Raised when audit persistence keeps failing
#[derive(Debug, Clone)]
pub struct AuditAlert {
    pub consecutive_failures: u32,
    pub entry_id: Uuid,
    pub last_error: String,
}

/// Operational alert channel
pub trait OperationalAlerts: Send + Sync {
    fn raise(&self, alert: &AuditAlert);
}

/// Alerts through the tracing error level
#[derive(Debug, Default)]
pub struct TracingAlerts;

impl OperationalAlerts for TracingAlerts {
    fn raise(&self, alert: &AuditAlert) {
        tracing::error!(
            consecutive_failures = alert.consecutive_failures,
            entry_id = %alert.entry_id,
            error = %alert.last_error,
            "ALERT: pricing audit trail is not being persisted"
        );
    }
}

/// Retry and alerting policy for the recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditPolicy {
    /// Attempts per entry, at least 1
    pub retry_attempts: u32,
    /// Delay before the second attempt; grows linearly
    pub retry_backoff: Duration,
    /// Consecutive failed entries that raise an alert
    pub alert_threshold: u32,
}

impl Default for AuditPolicy {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(100),
            alert_threshold: 3,
        }
    }
}

enum Command {
    Record(AuditEntry),
    Flush(oneshot::Sender<()>),
}

/// Hands audit entries to a sink off the response path
///
/// Must be created inside a tokio runtime. Entries are persisted in
/// submission order by a single worker.
#[derive(Clone)]
pub struct AuditRecorder {
    sender: mpsc::UnboundedSender<Command>,
    metrics: PricingMetrics,
}

impl AuditRecorder {
    pub fn spawn(
        sink: Arc<dyn AuditSink>,
        alerts: Arc<dyn OperationalAlerts>,
        policy: AuditPolicy,
        metrics: PricingMetrics,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(receiver, sink, alerts, policy, metrics.clone()));
        Self { sender, metrics }
    }

    /// Queue an entry; returns immediately
    pub fn submit(&self, entry: AuditEntry) {
        let entry_id = entry.entry_id();
        if self.sender.send(Command::Record(entry)).is_err() {
            self.metrics.record_audit_failure();
            tracing::error!(%entry_id, "Audit worker stopped, entry dropped");
        }
    }

    /// Wait until every entry submitted so far has been handled
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(Command::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<Command>,
    sink: Arc<dyn AuditSink>,
    alerts: Arc<dyn OperationalAlerts>,
    policy: AuditPolicy,
    metrics: PricingMetrics,
) {
    let mut consecutive_failures: u32 = 0;

    while let Some(command) = receiver.recv().await {
        match command {
            Command::Record(entry) => match persist(sink.as_ref(), &entry, &policy).await {
                Ok(()) => {
                    consecutive_failures = 0;
                }
                Err(e) => {
                    consecutive_failures += 1;
                    metrics.record_audit_failure();
                    tracing::error!(
                        entry_id = %entry.entry_id(),
                        error = %e,
                        consecutive_failures,
                        "Failed to persist pricing audit entry"
                    );
                    let threshold = policy.alert_threshold.max(1);
                    if consecutive_failures % threshold == 0 {
                        alerts.raise(&AuditAlert {
                            consecutive_failures,
                            entry_id: entry.entry_id(),
                            last_error: e.to_string(),
                        });
                    }
                }
            },
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

async fn persist(
    sink: &dyn AuditSink,
    entry: &AuditEntry,
    policy: &AuditPolicy,
) -> Result<(), AuditError> {
    let attempts = policy.retry_attempts.max(1);
    let mut attempt = 1;
    loop {
        match sink.append(entry).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                tracing::debug!(attempt, error = %e, "Audit append failed, retrying");
                tokio::time::sleep(policy.retry_backoff * attempt).await;
                attempt += 1;
            }
        }
    }
}

/// Appends audit entries as JSON lines to a local file
pub struct NdjsonAuditSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl NdjsonAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl AuditSink for NdjsonAuditSink {
    async fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        use tokio::io::AsyncWriteExt;

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppliedRule;
    use crate::pricing::memory::MemoryAuditSink;
    use crate::pricing::types::DiscountType;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn sample() -> (PricingRequest, Vec<EligibilityVerdict>, PricingResult) {
        let mut request = PricingRequest::new("p1", "CO", 10, dec!(45.00));
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        request.evaluation_time = Some(at);
        let verdict = EligibilityVerdict {
            rule_id: "v1".into(),
            rule_name: "Bulk".into(),
            mechanism: Mechanism::Volume,
            priority: 1,
            eligible: true,
            reason: "Volume tier 10-50 units: 5% off".into(),
            computed_discount_amount: dec!(22.50),
            discount_type: DiscountType::Percentage,
            discount_value: dec!(5),
        };
        let result = PricingResult {
            original_price: dec!(450.00),
            final_price: dec!(427.50),
            total_discount: dec!(22.50),
            applied_rule: Some(AppliedRule::from(&verdict)),
            considered_rules: vec![verdict.clone()],
            explanation: "Applied Bulk".into(),
            calculated_at: at,
            forced_correction: false,
            unavailable_sources: vec![],
        };
        (request, vec![verdict], result)
    }

    #[derive(Default)]
    struct CountingAlerts {
        raised: AtomicU32,
    }

    impl OperationalAlerts for CountingAlerts {
        fn raise(&self, _alert: &AuditAlert) {
            self.raised.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fast_policy() -> AuditPolicy {
        AuditPolicy {
            retry_attempts: 2,
            retry_backoff: Duration::from_millis(1),
            alert_threshold: 3,
        }
    }

    #[test]
    fn test_entry_outcome_and_digest() {
        let (request, verdicts, result) = sample();
        let entry = AuditEntry::record(&request, &verdicts, &result).unwrap();

        assert_eq!(entry.outcome(), AuditOutcome::Applied);
        assert_eq!(entry.decision_digest().len(), 64);
        assert_eq!(
            entry.decision_digest(),
            AuditEntry::digest(&request, &verdicts, &result).unwrap()
        );

        let again = AuditEntry::record(&request, &verdicts, &result).unwrap();
        assert_ne!(entry.entry_id(), again.entry_id());
        assert_eq!(entry.decision_digest(), again.decision_digest());
    }

    #[test]
    fn test_digest_changes_with_result() {
        let (request, verdicts, mut result) = sample();
        let before = AuditEntry::digest(&request, &verdicts, &result).unwrap();
        result.final_price = dec!(427.49);
        let after = AuditEntry::digest(&request, &verdicts, &result).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_outcome_classification() {
        let (request, verdicts, mut result) = sample();
        result.applied_rule = None;
        let entry = AuditEntry::record(&request, &verdicts, &result).unwrap();
        assert_eq!(entry.outcome(), AuditOutcome::NoDiscount);

        result.unavailable_sources = Mechanism::ALL.to_vec();
        let entry = AuditEntry::record(&request, &verdicts, &result).unwrap();
        assert_eq!(entry.outcome(), AuditOutcome::CatalogUnavailable);
        assert_eq!(entry.unavailable_sources().len(), Mechanism::ALL.len());

        result.forced_correction = true;
        let entry = AuditEntry::record(&request, &verdicts, &result).unwrap();
        assert_eq!(entry.outcome(), AuditOutcome::ForcedCorrection);
    }

    #[tokio::test]
    async fn test_recorder_persists_in_order() {
        let sink = Arc::new(MemoryAuditSink::new());
        let recorder = AuditRecorder::spawn(
            sink.clone(),
            Arc::new(TracingAlerts),
            fast_policy(),
            PricingMetrics::new(),
        );

        let (request, verdicts, result) = sample();
        let first = AuditEntry::record(&request, &verdicts, &result).unwrap();
        let second = AuditEntry::record(&request, &verdicts, &result).unwrap();
        let ids = vec![first.entry_id(), second.entry_id()];
        recorder.submit(first);
        recorder.submit(second);
        recorder.flush().await;

        let stored: Vec<Uuid> = sink.entries().await.iter().map(|e| e.entry_id()).collect();
        assert_eq!(stored, ids);
    }

    #[tokio::test]
    async fn test_persistent_failure_raises_alert() {
        let sink = Arc::new(MemoryAuditSink::new());
        sink.set_failing(true);
        let alerts = Arc::new(CountingAlerts::default());
        let metrics = PricingMetrics::new();
        let recorder = AuditRecorder::spawn(sink.clone(), alerts.clone(), fast_policy(), metrics.clone());

        let (request, verdicts, result) = sample();
        for _ in 0..3 {
            recorder.submit(AuditEntry::record(&request, &verdicts, &result).unwrap());
        }
        recorder.flush().await;

        assert_eq!(alerts.raised.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.summary().audit_failures, 3);
        // two attempts per entry
        assert_eq!(sink.attempts(), 6);
        assert!(sink.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_success_resets_failure_streak() {
        let sink = Arc::new(MemoryAuditSink::new());
        let alerts = Arc::new(CountingAlerts::default());
        let recorder = AuditRecorder::spawn(sink.clone(), alerts.clone(), fast_policy(), PricingMetrics::new());
        let (request, verdicts, result) = sample();

        sink.set_failing(true);
        for _ in 0..2 {
            recorder.submit(AuditEntry::record(&request, &verdicts, &result).unwrap());
        }
        recorder.flush().await;
        sink.set_failing(false);
        recorder.submit(AuditEntry::record(&request, &verdicts, &result).unwrap());
        recorder.flush().await;
        sink.set_failing(true);
        for _ in 0..2 {
            recorder.submit(AuditEntry::record(&request, &verdicts, &result).unwrap());
        }
        recorder.flush().await;

        assert_eq!(alerts.raised.load(Ordering::SeqCst), 0);
        assert_eq!(sink.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_ndjson_sink_appends_lines() {
        let dir = std::env::temp_dir().join(format!("pricing-audit-{}", Uuid::new_v4()));
        let path = dir.join("audit.ndjson");
        let sink = NdjsonAuditSink::new(&path);

        let (request, verdicts, result) = sample();
        let entry = AuditEntry::record(&request, &verdicts, &result).unwrap();
        sink.append(&entry).await.unwrap();
        sink.append(&entry).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: AuditEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed, entry);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}

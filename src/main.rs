use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use dispensary_pricing::{
    config::AppConfig,
    db,
    error::{AppError, ErrorResponse},
    models::{PricingRequest, PricingResult, QuoteRequest},
    pricing::{
        AuditSink, CatalogSnapshot, MemoryAuditSink, MemoryDirectory, MemoryRuleStore,
        NdjsonAuditSink, PRResult, PgAuditSink, PgDirectory, PgRuleStore, PricingOrchestrator,
        ProductDirectory, RuleStore, TracingAlerts,
    },
};

/// One line of input
///
/// A full pricing request, a lookup-driven quote, or a JSON array of
/// pricing requests priced as one batch.
#[derive(Debug)]
enum InputLine {
    Price(PricingRequest),
    Quote(QuoteRequest),
    Batch(Vec<PricingRequest>),
}

impl InputLine {
    /// Parse one line; objects carrying `base_price` are pricing requests,
    /// other objects are quotes
    fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        if value.is_array() {
            return Ok(Self::Batch(serde_json::from_value(value)?));
        }
        if value.get("base_price").is_some() {
            Ok(Self::Price(serde_json::from_value(value)?))
        } else {
            Ok(Self::Quote(serde_json::from_value(value)?))
        }
    }
}

type Collaborators = (Arc<dyn RuleStore>, Arc<dyn ProductDirectory>, Arc<dyn AuditSink>);

/// Build the rule store, directory and audit sink from configuration
///
/// PostgreSQL when `DATABASE_URL` is set, otherwise the JSON catalog file.
async fn collaborators(config: &AppConfig) -> Result<Collaborators, AppError> {
    if let Some(database_url) = &config.database_url {
        tracing::info!("Connecting to database...");
        let pool = db::create_pool(database_url).await?;
        db::run_migrations(&pool).await?;
        let store: Arc<dyn RuleStore> = Arc::new(PgRuleStore::new(pool.clone()));
        let directory: Arc<dyn ProductDirectory> = Arc::new(PgDirectory::new(pool.clone()));
        let sink: Arc<dyn AuditSink> = Arc::new(PgAuditSink::new(pool));
        return Ok((store, directory, sink));
    }

    let snapshot = match &config.catalog_path {
        Some(path) => {
            let snapshot = CatalogSnapshot::load(path).await?;
            tracing::info!(
                path = %path.display(),
                rules = snapshot.rules.len(),
                products = snapshot.products.len(),
                "Loaded pricing catalog"
            );
            snapshot
        }
        None => {
            tracing::warn!("No DATABASE_URL or PRICING_CATALOG_PATH set, pricing without discount rules");
            CatalogSnapshot::default()
        }
    };

    let sink: Arc<dyn AuditSink> = match &config.audit_log_path {
        Some(path) => Arc::new(NdjsonAuditSink::new(path)),
        None => {
            tracing::warn!("No PRICING_AUDIT_LOG set, audit entries are kept in memory only");
            Arc::new(MemoryAuditSink::new())
        }
    };

    let store: Arc<dyn RuleStore> = Arc::new(MemoryRuleStore::new(snapshot.rules));
    let directory: Arc<dyn ProductDirectory> =
        Arc::new(MemoryDirectory::new(snapshot.products, snapshot.customers));
    Ok((store, directory, sink))
}

fn render(outcome: PRResult<PricingResult>, line: usize) -> serde_json::Value {
    let rendered = match outcome {
        Ok(result) => serde_json::to_value(result),
        Err(e) => serde_json::to_value(ErrorResponse::from_pricing(&e, Some(line))),
    };
    rendered.unwrap_or_else(|e| serde_json::json!({ "error_code": "SERIALIZATION_ERROR", "message": e.to_string() }))
}

async fn handle_line(orchestrator: &PricingOrchestrator, raw: &str, line: usize) -> serde_json::Value {
    let input = match InputLine::parse(raw) {
        Ok(input) => input,
        Err(e) => {
            tracing::warn!(line, error = %e, "Skipping malformed input line");
            return serde_json::to_value(ErrorResponse::new("MALFORMED_INPUT", e.to_string(), Some(line)))
                .unwrap_or(serde_json::Value::Null);
        }
    };

    match input {
        InputLine::Price(request) => render(orchestrator.compute_price(request).await, line),
        InputLine::Quote(quote) => render(orchestrator.quote(quote).await, line),
        InputLine::Batch(requests) => {
            let results = orchestrator.price_batch(requests).await;
            serde_json::Value::Array(results.into_iter().map(|r| render(r, line)).collect())
        }
    }
}

async fn run() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let (store, directory, sink) = collaborators(&config).await?;
    let orchestrator = PricingOrchestrator::new(store, sink, Arc::new(TracingAlerts), &config.engine)
        .with_directory(directory);

    tracing::info!("Reading pricing requests from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut line_no = 0usize;

    while let Some(raw) = lines.next_line().await? {
        line_no += 1;
        if raw.trim().is_empty() {
            continue;
        }
        let output = handle_line(&orchestrator, &raw, line_no).await;
        stdout.write_all(output.to_string().as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    orchestrator.flush_audit().await;
    orchestrator.metrics().log_summary();
    tracing::info!(lines = line_no, "Input exhausted, shutting down");
    Ok(())
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Logs go to stderr so stdout carries only results
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Dispensary pricing engine - Starting...");

    if let Err(e) = run().await {
        tracing::error!(error = %e, "Pricing engine stopped");
        std::process::exit(1);
    }
}

// PostgreSQL collaborators
//
// Rule store, product directory and audit sink over the tables created by
// the migrations in `migrations/`. Rule rows keep their mechanism-specific
// configuration in a JSONB column.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::str::FromStr;

use crate::models::{Customer, Product};
use crate::pricing::{
    audit::{AuditEntry, AuditSink},
    catalog::RuleStore,
    error::{AuditError, PRResult, PricingError, StoreError},
    lookup::ProductDirectory,
    rules::{DiscountRule, RuleKind},
    types::{CustomerTier, Mechanism, RuleStatus, RuleTarget},
};

/// Discount rule row from the database
#[derive(Debug, Clone, FromRow)]
struct DiscountRuleRow {
    rule_id: String,
    name: String,
    mechanism: String,
    priority: i32,
    status: String,
    start_date: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
    markets: Vec<String>,
    customer_tiers: Vec<String>,
    target: serde_json::Value,
    rule_config: serde_json::Value,
}

impl DiscountRuleRow {
    /// Parse the row into a rule
    ///
    /// The JSONB configuration is tagged with the row's mechanism and must
    /// match that mechanism's configuration shape.
    fn into_rule(self) -> PRResult<DiscountRule> {
        let mechanism = Mechanism::from_str(&self.mechanism).map_err(PricingError::InvalidRule)?;
        let status = RuleStatus::from_str(&self.status).map_err(PricingError::InvalidRule)?;
        let customer_tiers = self
            .customer_tiers
            .iter()
            .map(|t| CustomerTier::from_str(t))
            .collect::<Result<Vec<_>, _>>()
            .map_err(PricingError::InvalidRule)?;
        let target: RuleTarget = serde_json::from_value(self.target).map_err(|e| {
            PricingError::InvalidRule(format!("Invalid target for rule {}: {}", self.rule_id, e))
        })?;

        let mut config = match self.rule_config {
            serde_json::Value::Object(map) => map,
            _ => {
                return Err(PricingError::InvalidRule(format!(
                    "rule_config for rule {} must be a JSON object",
                    self.rule_id
                )))
            }
        };
        config.insert(
            "mechanism".to_string(),
            serde_json::Value::String(mechanism.to_string()),
        );
        let kind: RuleKind = serde_json::from_value(serde_json::Value::Object(config)).map_err(|e| {
            PricingError::InvalidRule(format!(
                "Invalid {} rule config for rule {}: {}",
                mechanism, self.rule_id, e
            ))
        })?;

        Ok(DiscountRule {
            id: self.rule_id,
            name: self.name,
            priority: self.priority,
            status,
            start_date: self.start_date,
            end_date: self.end_date,
            markets: self.markets,
            customer_tiers,
            target,
            kind,
        })
    }
}

#[derive(Debug, FromRow)]
struct RedemptionCount {
    rule_id: String,
    customer_id: Option<String>,
    uses: i64,
}

/// Rule store backed by the `discount_rules` table
pub struct PgRuleStore {
    pool: PgPool,
}

impl PgRuleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fill promo-code usage from the redemption ledger
    async fn attach_redemptions(&self, rules: &mut [DiscountRule]) -> Result<(), StoreError> {
        let ids: Vec<String> = rules.iter().map(|r| r.id.clone()).collect();
        if ids.is_empty() {
            return Ok(());
        }

        let counts = sqlx::query_as::<_, RedemptionCount>(
            r#"
            SELECT rule_id, customer_id, COUNT(*) AS uses
            FROM promo_code_redemptions
            WHERE rule_id = ANY($1)
            GROUP BY rule_id, customer_id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_rule: HashMap<&str, Vec<&RedemptionCount>> = HashMap::new();
        for count in &counts {
            by_rule.entry(count.rule_id.as_str()).or_default().push(count);
        }

        for rule in rules.iter_mut() {
            let RuleKind::PromoCode(config) = &mut rule.kind else {
                continue;
            };
            let Some(counts) = by_rule.get(rule.id.as_str()) else {
                continue;
            };
            let to_u32 = |n: i64| u32::try_from(n).unwrap_or(u32::MAX);
            config.times_used = counts.iter().map(|c| to_u32(c.uses)).fold(0u32, u32::saturating_add);
            config.customer_redemptions = counts
                .iter()
                .filter_map(|c| c.customer_id.clone().map(|id| (id, to_u32(c.uses))))
                .collect();
        }

        Ok(())
    }
}

#[async_trait]
impl RuleStore for PgRuleStore {
    async fn load_rules(
        &self,
        mechanism: Mechanism,
        market: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<DiscountRule>, StoreError> {
        let rows = sqlx::query_as::<_, DiscountRuleRow>(
            r#"
            SELECT
                rule_id,
                name,
                mechanism,
                priority,
                status,
                start_date,
                end_date,
                markets,
                customer_tiers,
                target,
                rule_config
            FROM discount_rules
            WHERE mechanism = $1
              AND (cardinality(markets) = 0
                   OR EXISTS (SELECT 1 FROM unnest(markets) AS m WHERE lower(m) = lower($2)))
              AND start_date < $3 + INTERVAL '1 day'
              AND (end_date IS NULL OR end_date >= $3)
            ORDER BY priority ASC, rule_id ASC
            "#,
        )
        .bind(mechanism.to_string())
        .bind(market)
        .bind(as_of)
        .fetch_all(&self.pool)
        .await?;

        let mut rules = Vec::with_capacity(rows.len());
        for row in rows {
            let rule_id = row.rule_id.clone();
            match row.into_rule() {
                Ok(rule) => rules.push(rule),
                Err(e) => {
                    tracing::warn!(%rule_id, error = %e, "Skipping unparseable discount rule");
                }
            }
        }

        if mechanism == Mechanism::PromoCode {
            self.attach_redemptions(&mut rules).await?;
        }

        tracing::debug!(%mechanism, market, count = rules.len(), "Loaded discount rules");
        Ok(rules)
    }
}

#[derive(Debug, FromRow)]
struct CustomerRow {
    customer_id: String,
    tier: Option<String>,
    market: String,
}

/// Product directory backed by the `products` and `customers` tables
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductDirectory for PgDirectory {
    async fn product(&self, id: &str) -> Result<Option<Product>, StoreError> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT
                product_id AS id,
                name,
                category,
                brand,
                base_price,
                thc_percentage,
                expiration_date
            FROM products
            WHERE product_id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    async fn customer(&self, id: &str) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query_as::<_, CustomerRow>(
            "SELECT customer_id, tier, market FROM customers WHERE customer_id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let tier = row.tier.as_deref().and_then(|t| match CustomerTier::from_str(t) {
                Ok(tier) => Some(tier),
                Err(e) => {
                    tracing::warn!(customer_id = %row.customer_id, error = %e, "Ignoring unknown customer tier");
                    None
                }
            });
            Customer {
                id: row.customer_id,
                tier,
                market: row.market,
            }
        }))
    }
}

/// Audit sink appending to the `pricing_audit_log` table
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let result = entry.result();
        sqlx::query(
            r#"
            INSERT INTO pricing_audit_log (
                entry_id, product_id, customer_id, outcome, applied_rule_id,
                original_price, final_price, decision_digest, entry, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.entry_id())
        .bind(&entry.request().product_id)
        .bind(entry.request().customer_id.as_deref())
        .bind(entry.outcome().to_string())
        .bind(result.applied_rule.as_ref().map(|r| r.rule_id.as_str()))
        .bind(result.original_price)
        .bind(result.final_price)
        .bind(entry.decision_digest())
        .bind(sqlx::types::Json(entry))
        .bind(entry.recorded_at())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Persistence Sink — best-effort writes to Postgres
// =============================================================================
//
// Transactions and alerts are persisted for the analytics and case-management
// services; the pipeline never depends on these writes. Every failure is
// logged and dropped. Without DATABASE_URL (or when the initial connect
// fails) the sink runs disabled and all calls are no-ops.
//
// Schema (customers / transactions / fraud_alerts / cases) is owned by the
// migration tooling of the downstream services.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{error, info, warn};

use crate::types::{FraudAlert, RiskLevel, Transaction};

/// Caps for the recent-rows read endpoints.
const ALERTS_LIMIT_MAX: i64 = 200;
const TRANSACTIONS_LIMIT_MAX: i64 = 500;

/// Default limits when the query parameter is absent.
pub const ALERTS_LIMIT_DEFAULT: i64 = 50;
pub const TRANSACTIONS_LIMIT_DEFAULT: i64 = 100;

// =============================================================================
// Read-side rows
// =============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AlertRow {
    pub id: i64,
    pub transaction_id: String,
    pub card_id: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    pub location: String,
    pub merchant_category: String,
    pub fraud_score: f64,
    pub fraud_reason: String,
    pub risk_level: String,
    pub velocity_triggered: bool,
    pub velocity_count: i32,
    pub detected_at: DateTime<Utc>,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TransactionRow {
    pub transaction_id: String,
    pub card_id: String,
    pub amount: f64,
    pub merchant_category: String,
    pub location: String,
    pub timestamp: DateTime<Utc>,
    pub fraud_score: f64,
    pub is_fraud: bool,
    pub processing_time_ms: f64,
    pub status: String,
}

// =============================================================================
// PersistenceSink
// =============================================================================

#[derive(Clone)]
pub struct PersistenceSink {
    pool: Option<PgPool>,
}

impl PersistenceSink {
    /// Connect to Postgres, or run disabled when no URL is configured or the
    /// database is unreachable.
    pub async fn connect(database_url: Option<&str>) -> Self {
        let Some(url) = database_url else {
            info!("DATABASE_URL not set, persistence sink disabled");
            return Self { pool: None };
        };

        match PgPoolOptions::new()
            .min_connections(2)
            .max_connections(10)
            .connect(url)
            .await
        {
            Ok(pool) => {
                info!("database connection pool created");
                Self { pool: Some(pool) }
            }
            Err(e) => {
                warn!(error = %e, "database not available, persistence sink disabled");
                Self { pool: None }
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.pool.is_some()
    }

    // ── Writes ──────────────────────────────────────────────────────────

    /// Upsert the customer row and insert the transaction. Called for every
    /// processed message, alert or not.
    pub async fn record_transaction(
        &self,
        txn: &Transaction,
        fraud_score: f64,
        is_fraud: bool,
        processing_time_ms: f64,
    ) {
        let Some(pool) = &self.pool else { return };

        let upsert = sqlx::query(
            "INSERT INTO customers (card_id, customer_name, risk_level, first_transaction_at)
             VALUES ($1, $2, 'LOW', NOW())
             ON CONFLICT (card_id) DO NOTHING",
        )
        .bind(&txn.card_id)
        .bind(customer_display_name(&txn.card_id))
        .execute(pool)
        .await;

        if let Err(e) = upsert {
            error!(error = %e, card_id = %txn.card_id, "failed to upsert customer");
            return;
        }

        let status = if is_fraud { "flagged" } else { "completed" };
        let insert = sqlx::query(
            "INSERT INTO transactions
             (transaction_id, card_id, amount, merchant_category, location, timestamp,
              fraud_score, is_fraud, processing_time_ms, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (transaction_id) DO NOTHING",
        )
        .bind(&txn.transaction_id)
        .bind(&txn.card_id)
        .bind(txn.amount)
        .bind(&txn.merchant_category)
        .bind(&txn.location)
        .bind(txn.timestamp)
        .bind(fraud_score)
        .bind(is_fraud)
        .bind(processing_time_ms)
        .bind(status)
        .execute(pool)
        .await;

        if let Err(e) = insert {
            error!(error = %e, transaction_id = %txn.transaction_id, "failed to insert transaction");
        }
    }

    /// Insert the alert row; HIGH/CRITICAL alerts also open a linked case.
    pub async fn record_alert(&self, alert: &FraudAlert) {
        let Some(pool) = &self.pool else { return };

        let inserted = sqlx::query(
            "INSERT INTO fraud_alerts
             (transaction_id, card_id, amount, timestamp, location, merchant_category,
              fraud_score, fraud_reason, risk_level, velocity_triggered, velocity_count,
              detected_at, latency_ms)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             RETURNING id",
        )
        .bind(&alert.transaction_id)
        .bind(&alert.card_id)
        .bind(alert.amount)
        .bind(alert.timestamp)
        .bind(&alert.location)
        .bind(&alert.merchant_category)
        .bind(alert.fraud_score)
        .bind(&alert.fraud_reason)
        .bind(alert.risk_level.as_str())
        .bind(alert.velocity_triggered)
        .bind(alert.velocity_count as i32)
        .bind(alert.detected_at)
        .bind(alert.latency_ms)
        .fetch_one(pool)
        .await;

        let alert_id: i64 = match inserted {
            Ok(row) => row.get("id"),
            Err(e) => {
                error!(error = %e, transaction_id = %alert.transaction_id, "failed to insert fraud alert");
                return;
            }
        };

        if !alert.risk_level.opens_case() {
            return;
        }

        let case = sqlx::query(
            "INSERT INTO cases
             (title, description, alert_id, card_id, priority, category,
              total_amount, potential_loss)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(format!(
            "Fraud Alert: {} - ${:.2}",
            alert.risk_level, alert.amount
        ))
        .bind(format!("Auto-created for {}", alert.fraud_reason))
        .bind(alert_id)
        .bind(&alert.card_id)
        .bind(case_priority(alert.risk_level))
        .bind(if alert.velocity_triggered {
            "velocity_fraud"
        } else {
            "suspicious_activity"
        })
        .bind(alert.amount)
        .bind(alert.amount)
        .execute(pool)
        .await;

        if let Err(e) = case {
            error!(error = %e, alert_id, "failed to open case");
        }
    }

    // ── Reads ───────────────────────────────────────────────────────────

    pub async fn recent_alerts(&self, limit: Option<i64>) -> Vec<AlertRow> {
        let Some(pool) = &self.pool else {
            return Vec::new();
        };
        let limit = limit.unwrap_or(ALERTS_LIMIT_DEFAULT).clamp(1, ALERTS_LIMIT_MAX);

        let rows = sqlx::query_as::<_, AlertRow>(
            "SELECT id, transaction_id, card_id, amount, timestamp, location,
                    merchant_category, fraud_score, fraud_reason, risk_level,
                    velocity_triggered, velocity_count, detected_at, latency_ms
             FROM fraud_alerts ORDER BY detected_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(pool)
        .await;

        rows.unwrap_or_else(|e| {
            error!(error = %e, "failed to read recent alerts");
            Vec::new()
        })
    }

    pub async fn recent_transactions(&self, limit: Option<i64>) -> Vec<TransactionRow> {
        let Some(pool) = &self.pool else {
            return Vec::new();
        };
        let limit = limit
            .unwrap_or(TRANSACTIONS_LIMIT_DEFAULT)
            .clamp(1, TRANSACTIONS_LIMIT_MAX);

        let rows = sqlx::query_as::<_, TransactionRow>(
            "SELECT transaction_id, card_id, amount, merchant_category, location,
                    timestamp, fraud_score, is_fraud, processing_time_ms, status
             FROM transactions ORDER BY timestamp DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(pool)
        .await;

        rows.unwrap_or_else(|e| {
            error!(error = %e, "failed to read recent transactions");
            Vec::new()
        })
    }
}

/// Synthesized display name for auto-created customer rows.
fn customer_display_name(card_id: &str) -> String {
    let chars: Vec<char> = card_id.chars().collect();
    let suffix: String = chars[chars.len().saturating_sub(6)..].iter().collect();
    format!("Customer-{suffix}")
}

fn case_priority(risk_level: RiskLevel) -> &'static str {
    match risk_level {
        RiskLevel::Critical => "critical",
        _ => "high",
    }
}

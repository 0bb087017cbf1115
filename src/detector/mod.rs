// =============================================================================
// Fraud Detector — velocity -> features -> score -> alert orchestration
// =============================================================================
//
// One `process` call per consumed transaction. The velocity store is mutated
// under a single mutex shared with the janitor; the scorer and thresholds are
// immutable after startup. A window mutation that happens before a downstream
// failure is retained — replays re-observe the window.
// =============================================================================

pub mod features;
pub mod model;
pub mod scorer;
pub mod velocity;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::Config;
use crate::metrics::MetricsAggregator;
use crate::types::{FraudAlert, RiskLevel, Transaction, TransactionFeatures};

use features::build_features;
use scorer::Scorer;
use velocity::VelocityStore;

/// Floor applied to the emitted score when the velocity check triggered.
const VELOCITY_SCORE_FLOOR: f64 = 0.85;

pub struct FraudDetector {
    store: Mutex<VelocityStore>,
    scorer: Scorer,
    velocity_threshold: usize,
    velocity_window_seconds: i64,
    score_threshold: f64,
    metrics: Arc<MetricsAggregator>,
}

impl FraudDetector {
    pub fn new(config: &Config, scorer: Scorer, metrics: Arc<MetricsAggregator>) -> Self {
        Self {
            store: Mutex::new(VelocityStore::new(config.velocity_window_seconds)),
            scorer,
            velocity_threshold: config.velocity_threshold,
            velocity_window_seconds: config.velocity_window_seconds,
            score_threshold: config.fraud_score_threshold,
            metrics,
        }
    }

    /// Run one transaction through the pipeline. Returns an alert when the
    /// score threshold is crossed or the velocity check triggers.
    pub fn process(&self, txn: &Transaction) -> Result<Option<FraudAlert>> {
        let start = Instant::now();

        let (velocity_count, features, fraud_score) = {
            let mut store = self.store.lock();

            let prior_mean = store.lookup_mean(&txn.card_id).map(|(_, mean)| mean);
            let (velocity_count, _) = store.observe(&txn.card_id, txn.timestamp, txn.amount);

            let features = build_features(txn, velocity_count, prior_mean);
            let fraud_score = self.scorer.score(&features);

            (velocity_count, features, fraud_score)
        };

        self.metrics.record_transaction();

        let velocity_triggered = velocity_count > self.velocity_threshold;

        if fraud_score < self.score_threshold && !velocity_triggered {
            return Ok(None);
        }

        if velocity_triggered {
            self.metrics.record_velocity_violation();
            warn!(
                card_suffix = card_suffix(&txn.card_id),
                count = velocity_count,
                window_seconds = self.velocity_window_seconds,
                "velocity violation"
            );
        }

        let fraud_reason =
            self.determine_fraud_reason(fraud_score, velocity_triggered, velocity_count, &features);

        let final_score = if velocity_triggered {
            fraud_score.max(VELOCITY_SCORE_FLOOR)
        } else {
            fraud_score
        };

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let alert = FraudAlert {
            transaction_id: txn.transaction_id.clone(),
            card_id: txn.card_id.clone(),
            amount: txn.amount,
            timestamp: txn.timestamp,
            location: txn.location.clone(),
            merchant_category: txn.merchant_category.clone(),
            fraud_score: final_score,
            fraud_reason,
            risk_level: RiskLevel::from_score(final_score),
            velocity_triggered,
            velocity_count,
            detected_at: Utc::now(),
            latency_ms,
        };

        self.metrics.record_alert();
        info!(
            transaction_id = %alert.transaction_id,
            score = format!("{:.2}", alert.fraud_score),
            risk_level = %alert.risk_level,
            reason = %alert.fraud_reason,
            "fraud detected"
        );

        Ok(Some(alert))
    }

    /// Concatenate the applicable reason clauses, velocity first.
    fn determine_fraud_reason(
        &self,
        fraud_score: f64,
        velocity_triggered: bool,
        velocity_count: usize,
        features: &TransactionFeatures,
    ) -> String {
        let mut reasons = Vec::new();

        if velocity_triggered {
            reasons.push(format!(
                "Velocity violation: {velocity_count} txns in {}s",
                self.velocity_window_seconds
            ));
        }

        if features.amount_deviation > 2.0 {
            reasons.push(format!(
                "Unusual amount (deviation: {:.1}x)",
                features.amount_deviation
            ));
        }

        if features.location_risk > 0.5 {
            reasons.push("High-risk location detected".to_string());
        }

        if (2..=5).contains(&features.hour_of_day) {
            reasons.push("Suspicious transaction time".to_string());
        }

        if reasons.is_empty() && fraud_score >= 0.8 {
            reasons.push("ML model high confidence fraud prediction".to_string());
        }

        if reasons.is_empty() {
            "Multiple risk factors detected".to_string()
        } else {
            reasons.join("; ")
        }
    }

    /// Janitor entry point: drop windows whose newest entry is stale.
    pub fn evict_stale(&self, now: DateTime<Utc>) -> usize {
        self.store.lock().evict_stale(now)
    }

    /// Number of cards currently holding a window.
    pub fn tracked_cards(&self) -> usize {
        self.store.lock().tracked_cards()
    }

    pub fn scorer_kind(&self) -> &'static str {
        self.scorer.kind()
    }
}

fn card_suffix(card_id: &str) -> String {
    let chars: Vec<char> = card_id.chars().collect();
    chars[chars.len().saturating_sub(4)..].iter().collect()
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::model::{FraudModel, ModelShape, FEATURE_DIM};
    use chrono::Duration;

    fn detector() -> FraudDetector {
        FraudDetector::new(
            &Config::default(),
            Scorer::Rules,
            Arc::new(MetricsAggregator::new()),
        )
    }

    fn txn(card_id: &str, amount: f64, timestamp: &str) -> Transaction {
        Transaction {
            transaction_id: uuid::Uuid::new_v4().to_string(),
            card_id: card_id.to_string(),
            amount,
            timestamp: timestamp.parse().unwrap(),
            location: "Austin, TX".to_string(),
            merchant_category: "grocery".to_string(),
        }
    }

    fn txn_at(card_id: &str, amount: f64, base: &str, offset_secs: i64) -> Transaction {
        let mut t = txn(card_id, amount, base);
        t.timestamp = t.timestamp + Duration::seconds(offset_secs);
        t
    }

    #[test]
    fn clean_transaction_produces_no_alert() {
        let d = detector();
        let alert = d
            .process(&txn("card-1", 25.0, "2025-01-03T14:30:00Z"))
            .unwrap();
        assert!(alert.is_none());
        assert_eq!(d.metrics.transactions_processed(), 1);
        assert_eq!(d.metrics.alerts_generated(), 0);
    }

    #[test]
    fn velocity_burst_alerts_on_sixth_transaction() {
        let d = detector();
        let base = "2025-01-03T14:30:00Z";

        for i in 0..5 {
            let alert = d
                .process(&txn_at("card-1", 10.0 * (i + 1) as f64, base, i))
                .unwrap();
            assert!(alert.is_none(), "txn {} should not alert", i + 1);
        }

        let alert = d
            .process(&txn_at("card-1", 60.0, base, 5))
            .unwrap()
            .expect("sixth transaction must alert");

        assert!(alert.velocity_triggered);
        assert_eq!(alert.velocity_count, 6);
        assert!(alert.fraud_score >= 0.85);
        assert!(matches!(
            alert.risk_level,
            RiskLevel::High | RiskLevel::Critical
        ));
        assert!(alert
            .fraud_reason
            .starts_with("Velocity violation: 6 txns in 60s"));
        assert_eq!(d.metrics.velocity_violations(), 1);
    }

    #[test]
    fn velocity_trigger_is_strictly_greater_than_threshold() {
        let d = detector();
        let base = "2025-01-03T14:30:00Z";
        // Exactly threshold (5) transactions: no trigger.
        for i in 0..5 {
            let alert = d.process(&txn_at("card-1", 10.0, base, i)).unwrap();
            assert!(alert.is_none());
        }
    }

    #[test]
    fn night_transaction_alone_stays_quiet() {
        let d = detector();
        let alert = d
            .process(&txn("card-1", 30.0, "2025-01-03T03:15:00Z"))
            .unwrap();
        assert!(alert.is_none());
    }

    #[test]
    fn high_risk_location_alone_stays_quiet() {
        let d = detector();
        let mut t = txn("card-1", 30.0, "2025-01-03T14:00:00Z");
        t.location = "TOR Exit Node".to_string();
        assert!(d.process(&t).unwrap().is_none());
    }

    #[test]
    fn velocity_floor_applies_to_emitted_score() {
        // Model scores everything at 0.1; the burst still emits >= 0.85.
        let model = FraudModel::from_parts(
            ModelShape::Binary {
                weights: vec![0.0; FEATURE_DIM],
                bias: 0.0,
                threshold: 1.0,
            },
            None,
        )
        .unwrap();
        let d = FraudDetector::new(
            &Config::default(),
            Scorer::Model(model),
            Arc::new(MetricsAggregator::new()),
        );

        let base = "2025-01-03T14:30:00Z";
        let mut last = None;
        for i in 0..6 {
            last = d.process(&txn_at("card-1", 10.0, base, i)).unwrap();
        }
        let alert = last.expect("burst must alert");
        assert!((alert.fraud_score - 0.85).abs() < f64::EPSILON);
        assert!(alert.velocity_triggered);
    }

    #[test]
    fn model_score_above_floor_passes_through_unchanged() {
        // Model scores everything at 0.9; velocity still lists its clause
        // first but max(0.9, 0.85) leaves the score alone.
        let model = FraudModel::from_parts(
            ModelShape::Binary {
                weights: vec![0.0; FEATURE_DIM],
                bias: 1.0,
                threshold: 0.5,
            },
            None,
        )
        .unwrap();
        let d = FraudDetector::new(
            &Config::default(),
            Scorer::Model(model),
            Arc::new(MetricsAggregator::new()),
        );

        let base = "2025-01-03T14:30:00Z";
        let mut last = None;
        for i in 0..6 {
            last = d.process(&txn_at("card-1", 10.0, base, i)).unwrap();
        }
        let alert = last.expect("burst must alert");
        assert!((alert.fraud_score - 0.9).abs() < f64::EPSILON);
        assert!(alert.fraud_reason.starts_with("Velocity violation:"));
    }

    #[test]
    fn reason_clauses_follow_fixed_order() {
        let d = detector();
        let features = TransactionFeatures {
            amount_normalized: 0.1,
            hour_of_day: 3,
            day_of_week: 0,
            is_weekend: false,
            merchant_category_encoded: 0,
            velocity_count: 7,
            amount_deviation: 3.2,
            location_risk: 0.8,
        };
        let reason = d.determine_fraud_reason(0.95, true, 7, &features);
        assert_eq!(
            reason,
            "Velocity violation: 7 txns in 60s; \
             Unusual amount (deviation: 3.2x); \
             High-risk location detected; \
             Suspicious transaction time"
        );
    }

    #[test]
    fn ml_confidence_reason_only_when_nothing_else_applies() {
        let d = detector();
        let features = TransactionFeatures {
            amount_normalized: 0.1,
            hour_of_day: 14,
            day_of_week: 0,
            is_weekend: false,
            merchant_category_encoded: 0,
            velocity_count: 1,
            amount_deviation: 0.0,
            location_risk: 0.2,
        };
        let reason = d.determine_fraud_reason(0.85, false, 1, &features);
        assert_eq!(reason, "ML model high confidence fraud prediction");

        let reason = d.determine_fraud_reason(0.75, false, 1, &features);
        assert_eq!(reason, "Multiple risk factors detected");
    }

    #[test]
    fn stale_card_restarts_at_count_one() {
        let d = detector();
        let base = "2025-01-03T14:30:00Z";
        for i in 0..5 {
            d.process(&txn_at("card-1", 10.0, base, i)).unwrap();
        }
        assert_eq!(d.tracked_cards(), 1);

        // Six minutes later the janitor pass removes the window.
        let now: DateTime<Utc> = base.parse::<DateTime<Utc>>().unwrap() + Duration::seconds(360);
        assert_eq!(d.evict_stale(now), 1);
        assert_eq!(d.tracked_cards(), 0);

        // The next observation starts a fresh window.
        let alert = d.process(&txn_at("card-1", 10.0, base, 361)).unwrap();
        assert!(alert.is_none());
        assert_eq!(d.tracked_cards(), 1);
    }

    #[test]
    fn unusual_amount_reason_uses_prior_mean() {
        let d = detector();
        let base = "2025-01-03T14:30:00Z";
        // Build up a stable mean of 10.0 over five transactions, then spike.
        for i in 0..5 {
            d.process(&txn_at("card-1", 10.0, base, i)).unwrap();
        }
        let alert = d
            .process(&txn_at("card-1", 500.0, base, 5))
            .unwrap()
            .expect("burst must alert");
        // deviation = |500 - 10| / 10 = 49 -> capped at 5.0.
        assert!(alert
            .fraud_reason
            .contains("Unusual amount (deviation: 5.0x)"));
    }
}

// =============================================================================
// Scorer — model-backed or rule-based fraud scoring
// =============================================================================
//
// The variant is chosen once at startup: a loadable artifact installs the
// model path, anything else (missing file, parse error, bad dimensions)
// installs the rule-based fallback. A load failure is never fatal.
// =============================================================================

use tracing::{info, warn};

use crate::detector::model::{FraudModel, FEATURE_DIM};
use crate::types::TransactionFeatures;

/// The active scoring strategy.
pub enum Scorer {
    Model(FraudModel),
    Rules,
}

impl Scorer {
    /// Cold-start load: try the artifact, fall back to rules on any failure.
    pub fn load(model_path: &str) -> Self {
        match FraudModel::load(model_path) {
            Ok(model) => Self::Model(model),
            Err(e) => {
                warn!(path = %model_path, error = %e, "model unavailable, using rule-based scoring");
                info!("rule-based fallback scorer installed");
                Self::Rules
            }
        }
    }

    /// "model" / "rules", for /stats and startup logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Model(_) => "model",
            Self::Rules => "rules",
        }
    }

    /// Fraud score in [0, 1] for the engineered features.
    pub fn score(&self, features: &TransactionFeatures) -> f64 {
        match self {
            Self::Model(model) => model.score(&feature_vector(features)),
            Self::Rules => rule_based_score(features),
        }
    }
}

/// Assemble the fixed-order vector fed to the model.
pub fn feature_vector(features: &TransactionFeatures) -> [f64; FEATURE_DIM] {
    [
        features.amount_normalized,
        features.hour_of_day as f64 / 23.0,
        features.day_of_week as f64 / 6.0,
        if features.is_weekend { 1.0 } else { 0.0 },
        features.merchant_category_encoded as f64 / 10.0,
        (features.velocity_count as f64 / 10.0).min(1.0),
        features.amount_deviation.min(1.0),
        features.location_risk,
    ]
}

/// Rule ladder used when no model is loaded.
///
/// Starts at 0.1 and accumulates; the two velocity bonuses stack.
fn rule_based_score(features: &TransactionFeatures) -> f64 {
    let mut score = 0.1;

    if features.velocity_count > 3 {
        score += 0.3;
    }
    if features.velocity_count > 5 {
        score += 0.5;
    }

    if (2..=5).contains(&features.hour_of_day) {
        score += 0.15;
    }

    if features.amount_deviation > 2.0 {
        score += 0.2;
    }

    score += features.location_risk * 0.2;

    if features.amount_normalized > 0.5 {
        score += 0.1;
    }

    score.min(1.0)
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::model::ModelShape;

    fn features() -> TransactionFeatures {
        TransactionFeatures {
            amount_normalized: 0.003,
            hour_of_day: 14,
            day_of_week: 4,
            is_weekend: false,
            merchant_category_encoded: 0,
            velocity_count: 1,
            amount_deviation: 0.0,
            location_risk: 0.2,
        }
    }

    #[test]
    fn baseline_transaction_scores_low() {
        // 0.1 base + 0.2 * 0.2 location = 0.14.
        let score = Scorer::Rules.score(&features());
        assert!((score - 0.14).abs() < 1e-12);
    }

    #[test]
    fn small_hours_add_fifteen_points() {
        // 3 AM grocery run: 0.1 + 0.15 + 0.04 = 0.29, well under threshold.
        let mut f = features();
        f.hour_of_day = 3;
        let score = Scorer::Rules.score(&f);
        assert!((score - 0.29).abs() < 1e-12);
    }

    #[test]
    fn high_risk_location_alone_stays_under_threshold() {
        // 0.1 + 0.2 * 0.8 = 0.26.
        let mut f = features();
        f.location_risk = 0.8;
        let score = Scorer::Rules.score(&f);
        assert!((score - 0.26).abs() < 1e-12);

        // Adding moderate velocity (count 4) lands at 0.56, still no alert
        // at the 0.7 default.
        f.velocity_count = 4;
        let score = Scorer::Rules.score(&f);
        assert!((score - 0.56).abs() < 1e-12);
    }

    #[test]
    fn velocity_bonuses_stack_above_five() {
        let mut f = features();
        f.location_risk = 0.0;
        f.velocity_count = 4;
        assert!((Scorer::Rules.score(&f) - 0.4).abs() < 1e-12);

        f.velocity_count = 6;
        assert!((Scorer::Rules.score(&f) - 0.9).abs() < 1e-12);
    }

    #[test]
    fn deviation_and_amount_bonuses() {
        let mut f = features();
        f.location_risk = 0.0;
        f.amount_deviation = 2.5;
        f.amount_normalized = 0.6;
        // 0.1 + 0.2 + 0.1 = 0.4.
        assert!((Scorer::Rules.score(&f) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn rule_score_caps_at_one() {
        let f = TransactionFeatures {
            amount_normalized: 1.0,
            hour_of_day: 3,
            day_of_week: 5,
            is_weekend: true,
            merchant_category_encoded: 10,
            velocity_count: 50,
            amount_deviation: 5.0,
            location_risk: 0.8,
        };
        let score = Scorer::Rules.score(&f);
        assert!((score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rule_scores_stay_in_unit_interval() {
        for velocity_count in [0, 3, 4, 5, 6, 100] {
            for hour_of_day in [0, 2, 5, 6, 23] {
                for location_risk in [0.2, 0.8] {
                    let f = TransactionFeatures {
                        amount_normalized: 1.0,
                        hour_of_day,
                        day_of_week: 0,
                        is_weekend: false,
                        merchant_category_encoded: 10,
                        velocity_count,
                        amount_deviation: 5.0,
                        location_risk,
                    };
                    let score = Scorer::Rules.score(&f);
                    assert!((0.0..=1.0).contains(&score));
                }
            }
        }
    }

    #[test]
    fn feature_vector_order_and_scaling() {
        let f = TransactionFeatures {
            amount_normalized: 0.5,
            hour_of_day: 23,
            day_of_week: 6,
            is_weekend: true,
            merchant_category_encoded: 5,
            velocity_count: 25,
            amount_deviation: 3.0,
            location_risk: 0.8,
        };
        let vector = feature_vector(&f);
        assert!((vector[0] - 0.5).abs() < f64::EPSILON);
        assert!((vector[1] - 1.0).abs() < f64::EPSILON);
        assert!((vector[2] - 1.0).abs() < f64::EPSILON);
        assert!((vector[3] - 1.0).abs() < f64::EPSILON);
        assert!((vector[4] - 0.5).abs() < f64::EPSILON);
        // Velocity saturates at 1.0, deviation is clipped to 1.0.
        assert!((vector[5] - 1.0).abs() < f64::EPSILON);
        assert!((vector[6] - 1.0).abs() < f64::EPSILON);
        assert!((vector[7] - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn model_scorer_dispatches_to_artifact() {
        let model = FraudModel::from_parts(
            ModelShape::Binary {
                weights: vec![0.0; FEATURE_DIM],
                bias: 1.0,
                threshold: 0.5,
            },
            None,
        )
        .unwrap();
        let scorer = Scorer::Model(model);
        assert_eq!(scorer.kind(), "model");
        assert!((scorer.score(&features()) - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_artifact_installs_rules() {
        let scorer = Scorer::load("/nonexistent/path/fraud_model.json");
        assert_eq!(scorer.kind(), "rules");
    }
}

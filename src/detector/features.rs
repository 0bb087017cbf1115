// =============================================================================
// Feature Builder — deterministic feature engineering per transaction
// =============================================================================
//
// Pure function from (transaction, post-insert velocity count, prior window
// mean) to the fixed feature set consumed by the scorer. The prior mean is
// the window mean *before* the current event was inserted; without one the
// deviation feature is zero.
// =============================================================================

use chrono::{Datelike, Timelike, Weekday};

use crate::types::{Transaction, TransactionFeatures};

/// Encoded id for categories outside the fixed table.
const MERCHANT_OTHER: u32 = 10;

/// Deviation is capped so a single wild amount cannot dominate the vector.
const DEVIATION_CAP: f64 = 5.0;

/// Substrings marking a location as high risk.
const HIGH_RISK_LOCATIONS: [&str; 4] = ["unknown", "vpn", "tor", "proxy"];

/// Fixed merchant category table. Unknown categories encode as 10.
pub fn encode_merchant_category(category: &str) -> u32 {
    match category.to_lowercase().as_str() {
        "grocery" => 0,
        "gas_station" => 1,
        "restaurant" => 2,
        "online" => 3,
        "retail" => 4,
        "travel" => 5,
        "entertainment" => 6,
        "healthcare" => 7,
        "education" => 8,
        "utilities" => 9,
        _ => MERCHANT_OTHER,
    }
}

/// 0.8 when the lower-cased location mentions an anonymizing network or is
/// unknown, 0.2 otherwise.
pub fn location_risk(location: &str) -> f64 {
    let lower = location.to_lowercase();
    if HIGH_RISK_LOCATIONS.iter().any(|risk| lower.contains(risk)) {
        0.8
    } else {
        0.2
    }
}

/// Engineer the feature vector for one transaction.
pub fn build_features(
    txn: &Transaction,
    velocity_count: usize,
    prior_mean: Option<f64>,
) -> TransactionFeatures {
    let hour_of_day = txn.timestamp.hour();
    let day_of_week = txn.timestamp.weekday().num_days_from_monday();
    let is_weekend = matches!(txn.timestamp.weekday(), Weekday::Sat | Weekday::Sun);

    let amount_normalized = (txn.amount / 10_000.0).min(1.0);

    let amount_deviation = match prior_mean {
        Some(mean) if mean > 0.0 => ((txn.amount - mean).abs() / mean).min(DEVIATION_CAP),
        _ => 0.0,
    };

    TransactionFeatures {
        amount_normalized,
        hour_of_day,
        day_of_week,
        is_weekend,
        merchant_category_encoded: encode_merchant_category(&txn.merchant_category),
        velocity_count,
        amount_deviation,
        location_risk: location_risk(&txn.location),
    }
}

// =============================================================================
// Shared types used across the Vigil fraud-detection engine
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Longest `card_id` accepted by schema validation.
pub const MAX_CARD_ID_LEN: usize = 50;

/// Largest transaction amount accepted by schema validation.
pub const MAX_AMOUNT: f64 = 1_000_000.0;

/// Maximum bytes of the original payload preserved in a dead-letter record.
pub const DLQ_MESSAGE_CAP: usize = 1000;

// =============================================================================
// Transaction
// =============================================================================

/// Incoming transaction from the `transactions` topic.
///
/// Deserialized straight off the wire, then checked with [`Transaction::validate`]
/// before it is allowed into the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub card_id: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    pub location: String,
    pub merchant_category: String,
}

/// Schema violations that route a message to the DLQ as a `ValidationError`.
#[derive(Debug, Error)]
pub enum TransactionInvalid {
    #[error("transaction_id is not a valid UUID: {0}")]
    InvalidTransactionId(String),
    #[error("card_id cannot be empty")]
    EmptyCardId,
    #[error("card_id exceeds {MAX_CARD_ID_LEN} characters")]
    CardIdTooLong,
    #[error("amount cannot be negative")]
    NegativeAmount,
    #[error("amount exceeds maximum limit")]
    AmountTooLarge,
}

impl Transaction {
    /// Validate the schema rules and normalise the record.
    ///
    /// `card_id` is trimmed; `amount` is rounded to 2 decimals.
    pub fn validate(mut self) -> Result<Self, TransactionInvalid> {
        if Uuid::parse_str(&self.transaction_id).is_err() {
            return Err(TransactionInvalid::InvalidTransactionId(
                self.transaction_id,
            ));
        }

        let trimmed = self.card_id.trim();
        if trimmed.is_empty() {
            return Err(TransactionInvalid::EmptyCardId);
        }
        if trimmed.len() > MAX_CARD_ID_LEN {
            return Err(TransactionInvalid::CardIdTooLong);
        }
        self.card_id = trimmed.to_string();

        if self.amount < 0.0 {
            return Err(TransactionInvalid::NegativeAmount);
        }
        if self.amount > MAX_AMOUNT {
            return Err(TransactionInvalid::AmountTooLarge);
        }
        self.amount = (self.amount * 100.0).round() / 100.0;

        Ok(self)
    }
}

// =============================================================================
// TransactionFeatures
// =============================================================================

/// Engineered features handed to the scorer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionFeatures {
    /// min(amount / 10000, 1).
    pub amount_normalized: f64,
    /// 0..=23.
    pub hour_of_day: u32,
    /// 0..=6, Monday = 0.
    pub day_of_week: u32,
    pub is_weekend: bool,
    /// 0..=10 per the fixed merchant table, unknown => 10.
    pub merchant_category_encoded: u32,
    /// Window size after the current event was inserted.
    pub velocity_count: usize,
    /// |amount - prior window mean| / mean, capped at 5.
    pub amount_deviation: f64,
    /// 0.8 for high-risk locations, 0.2 otherwise.
    pub location_risk: f64,
}

// =============================================================================
// FraudAlert
// =============================================================================

/// Risk classification derived from the final fraud score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "CRITICAL")]
    Critical,
}

impl RiskLevel {
    /// Ladder: >= 0.9 CRITICAL, >= 0.75 HIGH, >= 0.5 MEDIUM, else LOW.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            Self::Critical
        } else if score >= 0.75 {
            Self::High
        } else if score >= 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    /// Case rows are auto-opened for HIGH and CRITICAL alerts only.
    pub fn opens_case(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fraud alert published to the alerts topic and pushed to live subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudAlert {
    pub transaction_id: String,
    pub card_id: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    pub location: String,
    pub merchant_category: String,

    pub fraud_score: f64,
    pub fraud_reason: String,
    pub risk_level: RiskLevel,
    pub velocity_triggered: bool,
    pub velocity_count: usize,

    pub detected_at: DateTime<Utc>,
    pub latency_ms: f64,
}

// =============================================================================
// Dead letter records
// =============================================================================

/// Failure class carried on every dead-letter record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    DecodeError,
    ValidationError,
    ProcessingError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DecodeError => write!(f, "DecodeError"),
            Self::ValidationError => write!(f, "ValidationError"),
            Self::ProcessingError => write!(f, "ProcessingError"),
        }
    }
}

/// Record published to the dead-letter topic for messages the engine could
/// not process. Preserves the original bytes (truncated) and the failure cause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub original_message: String,
    pub error_kind: ErrorKind,
    pub error_detail: String,
    pub topic: String,
    pub partition: Option<i32>,
    pub offset: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    /// Build a record from the raw payload bytes, truncating to
    /// [`DLQ_MESSAGE_CAP`] bytes before lossy UTF-8 conversion.
    pub fn new(
        raw: &[u8],
        error_kind: ErrorKind,
        error_detail: impl Into<String>,
        topic: impl Into<String>,
        partition: Option<i32>,
        offset: Option<i64>,
    ) -> Self {
        let truncated = &raw[..raw.len().min(DLQ_MESSAGE_CAP)];
        Self {
            original_message: String::from_utf8_lossy(truncated).into_owned(),
            error_kind,
            error_detail: error_detail.into(),
            topic: topic.into(),
            partition,
            offset,
            occurred_at: Utc::now(),
        }
    }
}

// =============================================================================
// Engine Configuration — env-overridable settings with per-field defaults
// =============================================================================
//
// Every tunable lives here. Values come from the environment (optionally via a
// `.env` file loaded in main) and fall back to the defaults below. The config
// is read once at startup and immutable afterwards; tasks read it through
// `Arc<AppState>` without synchronization.
//
// An unparseable numeric value logs a warning and keeps the default rather
// than aborting startup.
// =============================================================================

use serde::Serialize;
use std::str::FromStr;
use tracing::{info, warn};

// =============================================================================
// Default-value helpers
// =============================================================================

fn default_bootstrap_servers() -> String {
    "localhost:9092".to_string()
}

fn default_group_id() -> String {
    "vigil-fraud-detection".to_string()
}

fn default_model_path() -> String {
    "models/fraud_model.json".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

// =============================================================================
// Config
// =============================================================================

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    // --- Kafka ---------------------------------------------------------------
    /// Broker bootstrap addresses (comma separated).
    pub kafka_bootstrap_servers: String,
    /// Stable consumer group identifier.
    pub kafka_group_id: String,
    /// Topic carrying incoming transactions.
    pub kafka_transactions_topic: String,
    /// Topic fraud alerts are published to.
    pub kafka_alerts_topic: String,
    /// Dead-letter topic for malformed messages.
    pub kafka_dlq_topic: String,
    /// Offset reset policy for a fresh group ("latest" / "earliest").
    pub kafka_auto_offset_reset: String,

    // --- Model ---------------------------------------------------------------
    /// Path to the serialized fraud model artifact.
    pub model_path: String,

    // --- Velocity checks -----------------------------------------------------
    /// Sliding window width in seconds.
    pub velocity_window_seconds: i64,
    /// Window size above which the velocity check triggers.
    pub velocity_threshold: usize,

    // --- Detection thresholds ------------------------------------------------
    /// Minimum fraud score that emits an alert on its own.
    pub fraud_score_threshold: f64,

    // --- Persistence ---------------------------------------------------------
    /// Postgres connection string. Unset disables the persistence sink.
    #[serde(skip_serializing)]
    pub database_url: Option<String>,

    // --- Serving -------------------------------------------------------------
    /// HTTP/WebSocket listen address.
    pub bind_addr: String,
    /// Default log level when RUST_LOG is unset.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kafka_bootstrap_servers: default_bootstrap_servers(),
            kafka_group_id: default_group_id(),
            kafka_transactions_topic: "transactions".to_string(),
            kafka_alerts_topic: "fraud_alerts".to_string(),
            kafka_dlq_topic: "dead_letter_queue".to_string(),
            kafka_auto_offset_reset: "latest".to_string(),
            model_path: default_model_path(),
            velocity_window_seconds: 60,
            velocity_threshold: 5,
            fraud_score_threshold: 0.7,
            database_url: None,
            bind_addr: default_bind_addr(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Build the configuration from the environment, falling back to defaults
    /// field by field.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            kafka_bootstrap_servers: env_string(
                "KAFKA_BOOTSTRAP_SERVERS",
                defaults.kafka_bootstrap_servers,
            ),
            kafka_group_id: env_string("KAFKA_GROUP_ID", defaults.kafka_group_id),
            kafka_transactions_topic: env_string(
                "KAFKA_TRANSACTIONS_TOPIC",
                defaults.kafka_transactions_topic,
            ),
            kafka_alerts_topic: env_string("KAFKA_ALERTS_TOPIC", defaults.kafka_alerts_topic),
            kafka_dlq_topic: env_string("KAFKA_DLQ_TOPIC", defaults.kafka_dlq_topic),
            kafka_auto_offset_reset: env_string(
                "KAFKA_AUTO_OFFSET_RESET",
                defaults.kafka_auto_offset_reset,
            ),
            model_path: env_string("MODEL_PATH", defaults.model_path),
            velocity_window_seconds: env_parsed(
                "VELOCITY_WINDOW_SECONDS",
                defaults.velocity_window_seconds,
            ),
            velocity_threshold: env_parsed("VELOCITY_THRESHOLD", defaults.velocity_threshold),
            fraud_score_threshold: env_parsed(
                "FRAUD_SCORE_THRESHOLD",
                defaults.fraud_score_threshold,
            ),
            database_url: std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            bind_addr: env_string("BIND_ADDR", defaults.bind_addr),
            log_level: env_string("LOG_LEVEL", defaults.log_level),
        };

        info!(
            brokers = %config.kafka_bootstrap_servers,
            group_id = %config.kafka_group_id,
            transactions_topic = %config.kafka_transactions_topic,
            velocity_window_seconds = config.velocity_window_seconds,
            velocity_threshold = config.velocity_threshold,
            fraud_score_threshold = config.fraud_score_threshold,
            database_configured = config.database_url.is_some(),
            "configuration loaded"
        );

        config
    }
}

/// Read a string env var, keeping `default` when unset or empty.
fn env_string(key: &str, default: String) -> String {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default,
    }
}

/// Read and parse a numeric env var, keeping `default` (with a warning) when
/// the value does not parse.
fn env_parsed<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => match value.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(key, value = %value, default = %default, "unparseable env value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_baseline() {
        let cfg = Config::default();
        assert_eq!(cfg.kafka_bootstrap_servers, "localhost:9092");
        assert_eq!(cfg.kafka_transactions_topic, "transactions");
        assert_eq!(cfg.kafka_alerts_topic, "fraud_alerts");
        assert_eq!(cfg.kafka_dlq_topic, "dead_letter_queue");
        assert_eq!(cfg.kafka_auto_offset_reset, "latest");
        assert_eq!(cfg.velocity_window_seconds, 60);
        assert_eq!(cfg.velocity_threshold, 5);
        assert!((cfg.fraud_score_threshold - 0.7).abs() < f64::EPSILON);
        assert!(cfg.database_url.is_none());
    }

    #[test]
    fn env_parsed_falls_back_on_garbage() {
        // Key chosen to not collide with real environment configuration.
        std::env::set_var("VIGIL_TEST_BAD_NUMERIC", "not-a-number");
        let value: usize = env_parsed("VIGIL_TEST_BAD_NUMERIC", 7);
        assert_eq!(value, 7);
        std::env::remove_var("VIGIL_TEST_BAD_NUMERIC");
    }

    #[test]
    fn env_string_ignores_empty_values() {
        std::env::set_var("VIGIL_TEST_EMPTY_STRING", "   ");
        let value = env_string("VIGIL_TEST_EMPTY_STRING", "fallback".to_string());
        assert_eq!(value, "fallback");
        std::env::remove_var("VIGIL_TEST_EMPTY_STRING");
    }
}

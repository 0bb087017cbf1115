// =============================================================================
// Bus Publisher — fraud alerts and dead letters out to Kafka
// =============================================================================
//
// Message format: UTF-8 JSON, no schema registry dependency.
// Alert key: card_id (per-card ordering within a partition). Dead letters are
// unkeyed.
//
// The producer is built once at startup with acks=all and idempotence on. A
// failed build or a failed publish is logged and the payload dropped — the
// pipeline never blocks on the outbound path.
// =============================================================================

use std::time::Duration;

use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::types::{DeadLetterRecord, FraudAlert};

/// How long a publish may sit in the producer queue before it is dropped.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct BusPublisher {
    producer: Option<FutureProducer>,
    alerts_topic: String,
    dlq_topic: String,
}

impl BusPublisher {
    /// Build the producer. Failure is non-fatal: publishes degrade to
    /// log-and-drop and the engine keeps running.
    pub fn new(config: &Config) -> Self {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", &config.kafka_bootstrap_servers)
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("message.timeout.ms", "5000")
            .create::<FutureProducer>();

        let producer = match producer {
            Ok(p) => Some(p),
            Err(e) => {
                error!(error = %e, "failed to build Kafka producer, publishes will be dropped");
                None
            }
        };

        Self {
            producer,
            alerts_topic: config.kafka_alerts_topic.clone(),
            dlq_topic: config.kafka_dlq_topic.clone(),
        }
    }

    /// Publish an alert to the alerts topic, keyed by card for per-card
    /// partition ordering.
    pub async fn publish_alert(&self, alert: &FraudAlert, payload: &str) {
        let Some(producer) = &self.producer else {
            warn!(transaction_id = %alert.transaction_id, "no producer, alert dropped");
            return;
        };

        let record = FutureRecord::to(&self.alerts_topic)
            .key(&alert.card_id)
            .payload(payload);

        match producer.send(record, SEND_TIMEOUT).await {
            Ok(_) => {
                debug!(transaction_id = %alert.transaction_id, "alert published");
            }
            Err((e, _)) => {
                error!(
                    error = %e,
                    transaction_id = %alert.transaction_id,
                    "failed to publish alert, dropped"
                );
            }
        }
    }

    /// Publish a dead-letter record for a message the engine could not
    /// process.
    pub async fn publish_dead_letter(&self, record: &DeadLetterRecord) {
        let Some(producer) = &self.producer else {
            warn!(error_kind = %record.error_kind, "no producer, dead letter dropped");
            return;
        };

        let payload = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "failed to serialise dead letter record");
                return;
            }
        };

        let dlq_record = FutureRecord::<(), _>::to(&self.dlq_topic).payload(&payload);

        match producer.send(dlq_record, SEND_TIMEOUT).await {
            Ok(_) => {
                warn!(
                    error_kind = %record.error_kind,
                    detail = %record.error_detail,
                    "message routed to dead letter queue"
                );
            }
            Err((e, _)) => {
                error!(error = %e, "failed to publish dead letter record, dropped");
            }
        }
    }
}

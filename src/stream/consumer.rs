// =============================================================================
// Consumer Loop — transactions in, alerts and dead letters out
// =============================================================================
//
// One task owns the consumer. Per record: decode -> validate -> detect; any
// failure routes the raw bytes to the DLQ and the loop moves on. Individual
// records are never retried — the bus is the retry boundary.
//
// Connection lifecycle: on any consumer error the client is dropped (which
// closes it), the loop sleeps 5 seconds and rebuilds. This runs until the
// task is cancelled at shutdown.
// =============================================================================

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaResult;
use rdkafka::message::Message;
use rdkafka::ClientConfig;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

use crate::app_state::AppState;
use crate::stream::publisher::BusPublisher;
use crate::types::{DeadLetterRecord, ErrorKind, Transaction};

/// Wait between consumer rebuilds after an error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Run the consumer loop forever. Spawned once at startup; cancelled on
/// shutdown.
pub async fn run_consumer_loop(state: Arc<AppState>, publisher: Arc<BusPublisher>) {
    let topic = state.config.kafka_transactions_topic.clone();
    info!(topic = %topic, group_id = %state.config.kafka_group_id, "starting Kafka consumer");

    loop {
        let consumer = match build_consumer(&state) {
            Ok(consumer) => consumer,
            Err(e) => {
                error!(error = %e, "failed to build Kafka consumer, retrying in 5s");
                sleep(RECONNECT_DELAY).await;
                continue;
            }
        };

        if let Err(e) = consumer.subscribe(&[topic.as_str()]) {
            error!(error = %e, topic = %topic, "failed to subscribe, retrying in 5s");
            sleep(RECONNECT_DELAY).await;
            continue;
        }

        state.kafka_connected.store(true, Ordering::Relaxed);
        info!(topic = %topic, "Kafka consumer started");

        loop {
            match consumer.recv().await {
                Ok(message) => {
                    process_record(
                        &state,
                        &publisher,
                        message.payload().unwrap_or_default(),
                        Some(message.partition()),
                        Some(message.offset()),
                    )
                    .await;
                }
                Err(e) => {
                    error!(error = %e, "Kafka consumer error, reconnecting in 5s");
                    break;
                }
            }
        }

        state.kafka_connected.store(false, Ordering::Relaxed);
        // Dropping the consumer closes it; no descriptors survive the rebuild.
        drop(consumer);
        sleep(RECONNECT_DELAY).await;
    }
}

fn build_consumer(state: &AppState) -> KafkaResult<StreamConsumer> {
    ClientConfig::new()
        .set("bootstrap.servers", &state.config.kafka_bootstrap_servers)
        .set("group.id", &state.config.kafka_group_id)
        .set("auto.offset.reset", &state.config.kafka_auto_offset_reset)
        .set("enable.auto.commit", "true")
        .set("auto.commit.interval.ms", "1000")
        .create()
}

/// Process one record end to end.
async fn process_record(
    state: &Arc<AppState>,
    publisher: &Arc<BusPublisher>,
    raw: &[u8],
    partition: Option<i32>,
    offset: Option<i64>,
) {
    let started = Instant::now();

    let txn = match decode_and_validate(raw) {
        Ok(txn) => txn,
        Err((kind, detail)) => {
            dead_letter(state, publisher, raw, kind, detail, partition, offset).await;
            return;
        }
    };

    let alert = match state.detector.process(&txn) {
        Ok(alert) => alert,
        Err(e) => {
            error!(
                transaction_id = %txn.transaction_id,
                error = %e,
                "error processing transaction"
            );
            dead_letter(
                state,
                publisher,
                raw,
                ErrorKind::ProcessingError,
                e.to_string(),
                partition,
                offset,
            )
            .await;
            return;
        }
    };

    let processing_ms = started.elapsed().as_secs_f64() * 1000.0;

    // Persistence stays off the hot path: spawned, best-effort.
    {
        let sink = state.sink.clone();
        let txn = txn.clone();
        let fraud_score = alert.as_ref().map(|a| a.fraud_score).unwrap_or(0.0);
        let is_fraud = alert.is_some();
        tokio::spawn(async move {
            sink.record_transaction(&txn, fraud_score, is_fraud, processing_ms)
                .await;
        });
    }

    if let Some(alert) = alert {
        state.metrics.record_latency(alert.latency_ms);

        match serde_json::to_string(&alert) {
            Ok(payload) => {
                publisher.publish_alert(&alert, &payload).await;
                state.hub.broadcast_alert(&payload);
            }
            Err(e) => {
                error!(error = %e, transaction_id = %alert.transaction_id, "failed to serialise alert");
            }
        }

        let sink = state.sink.clone();
        tokio::spawn(async move {
            sink.record_alert(&alert).await;
        });
    }
}

/// Classify raw bytes into a validated transaction or a DLQ error kind.
///
/// Bytes that are not UTF-8 JSON are a `DecodeError`; JSON that does not
/// satisfy the transaction schema is a `ValidationError`.
fn decode_and_validate(raw: &[u8]) -> Result<Transaction, (ErrorKind, String)> {
    let text = std::str::from_utf8(raw).map_err(|e| (ErrorKind::DecodeError, e.to_string()))?;

    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| (ErrorKind::DecodeError, e.to_string()))?;

    let txn: Transaction = serde_json::from_value(value)
        .map_err(|e| (ErrorKind::ValidationError, e.to_string()))?;

    txn.validate()
        .map_err(|e| (ErrorKind::ValidationError, e.to_string()))
}

async fn dead_letter(
    state: &Arc<AppState>,
    publisher: &Arc<BusPublisher>,
    raw: &[u8],
    kind: ErrorKind,
    detail: String,
    partition: Option<i32>,
    offset: Option<i64>,
) {
    let record = DeadLetterRecord::new(
        raw,
        kind,
        detail,
        state.config.kafka_transactions_topic.clone(),
        partition,
        offset,
    );
    state.metrics.record_dead_letter();
    publisher.publish_dead_letter(&record).await;
}

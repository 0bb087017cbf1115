// =============================================================================
// Vigil Stream — Real-Time Fraud Detection Engine
// =============================================================================
//
// Consumes payment transactions from Kafka, scores each one through the
// fraud detector, and fans alerts out to a durable topic, live WebSocket
// subscribers, and a best-effort Postgres sink. Malformed input goes to the
// dead-letter topic; the consumer rebuilds itself on broker failures.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod config;
mod detector;
mod hub;
mod janitor;
mod metrics;
mod persistence;
mod stream;
mod types;

use std::sync::Arc;

use tokio::time::{interval, Duration};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::config::Config;
use crate::detector::scorer::Scorer;
use crate::janitor::run_janitor;
use crate::persistence::PersistenceSink;
use crate::stream::consumer::run_consumer_loop;
use crate::stream::publisher::BusPublisher;

/// Cadence of metrics snapshots pushed to metric subscribers.
const METRICS_TICK_SECS: u64 = 1;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & logging ─────────────────────────────────────────
    let _ = dotenv::dotenv();

    let default_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Vigil Stream — Fraud Detection Engine            ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config = Config::from_env();

    // ── 2. Cold start: model artifact, persistence, shared state ─────────
    let scorer = Scorer::load(&config.model_path);
    info!(scorer = scorer.kind(), "scorer installed");

    let sink = PersistenceSink::connect(config.database_url.as_deref()).await;

    let state = Arc::new(AppState::new(config, scorer, sink));
    let publisher = Arc::new(BusPublisher::new(&state.config));

    // ── 3. Background tasks ──────────────────────────────────────────────
    let consumer_task = tokio::spawn(run_consumer_loop(state.clone(), publisher));
    let janitor_task = tokio::spawn(run_janitor(state.clone()));

    let metrics_state = state.clone();
    let metrics_task = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(METRICS_TICK_SECS));
        loop {
            ticker.tick().await;
            let frame = metrics_state
                .metrics
                .stream_frame(metrics_state.hub.subscriber_count());
            match serde_json::to_string(&frame) {
                Ok(json) => metrics_state.hub.broadcast_metrics(&json),
                Err(e) => error!(error = %e, "failed to serialise metrics frame"),
            }
        }
    });

    // ── 4. HTTP/WebSocket server ─────────────────────────────────────────
    let api_state = state.clone();
    let bind_addr = state.config.bind_addr.clone();
    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .expect("failed to bind API server");
        info!(addr = %bind_addr, "API server listening");
        axum::serve(listener, app).await.expect("API server failed");
    });

    info!("all subsystems running, press Ctrl+C to stop");

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received, stopping");

    consumer_task.abort();
    janitor_task.abort();
    metrics_task.abort();
    let _ = consumer_task.await;
    let _ = janitor_task.await;
    let _ = metrics_task.await;

    info!("shutdown complete");
    Ok(())
}

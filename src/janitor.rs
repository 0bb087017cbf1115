// =============================================================================
// Janitor — periodic eviction of stale velocity windows
// =============================================================================
//
// Runs as a background Tokio task, waking every 60 seconds to drop windows
// whose newest entry is older than the staleness horizon. Shares the
// detector's lock, so a janitor pass never races a `process` call.
//
// Spawned once at engine startup:
//
//   tokio::spawn(run_janitor(Arc::clone(&state)));
//
// =============================================================================

use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval, Duration};
use tracing::{debug, info};

use crate::app_state::AppState;

/// Interval between janitor passes.
const JANITOR_INTERVAL_SECS: u64 = 60;

/// Run the janitor loop. Runs forever; cancelled on shutdown.
pub async fn run_janitor(state: Arc<AppState>) {
    info!(interval_secs = JANITOR_INTERVAL_SECS, "janitor started");

    let mut ticker = interval(Duration::from_secs(JANITOR_INTERVAL_SECS));

    loop {
        ticker.tick().await;

        let removed = state.detector.evict_stale(Utc::now());
        if removed > 0 {
            info!(
                removed,
                remaining = state.detector.tracked_cards(),
                "evicted stale velocity windows"
            );
        } else {
            debug!("janitor pass found no stale windows");
        }
    }
}

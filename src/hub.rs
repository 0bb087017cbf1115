// =============================================================================
// Subscriber Hub — fan-out to live alert and metrics subscribers
// =============================================================================
//
// Two independent rosters. Each subscriber owns a bounded mailbox; the
// broadcast path only ever calls `try_send`, so one slow or dead subscriber
// can never stall the consumer loop. Slow-subscriber policy is
// disconnect-on-full: a full or closed mailbox marks the subscriber for
// removal once the broadcast completes.
//
// Roster locks are short-held — broadcast does a try_send sweep and releases.
// The per-connection WebSocket task drains the mailbox and owns the socket.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Frames buffered per subscriber before it is considered too slow.
const MAILBOX_CAPACITY: usize = 64;

struct Subscriber {
    id: u64,
    mailbox: mpsc::Sender<String>,
}

/// Rosters of live alert and metrics subscribers.
pub struct SubscriberHub {
    alert_roster: Mutex<Vec<Subscriber>>,
    metrics_roster: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl SubscriberHub {
    pub fn new() -> Self {
        Self {
            alert_roster: Mutex::new(Vec::new()),
            metrics_roster: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    // ── Joining / leaving ───────────────────────────────────────────────

    /// Register an alert subscriber. The welcome frame is already waiting in
    /// the returned mailbox.
    pub fn join_alerts(&self) -> (u64, mpsc::Receiver<String>) {
        let (id, rx) = self.join(&self.alert_roster, |tx| {
            let welcome = serde_json::json!({
                "type": "welcome",
                "message": "connected to fraud alert stream",
            });
            // A fresh mailbox always has room for the welcome frame.
            let _ = tx.try_send(welcome.to_string());
        });
        info!(
            subscriber_id = id,
            total = self.alert_subscriber_count(),
            "alert subscriber connected"
        );
        (id, rx)
    }

    /// Register a metrics subscriber; it receives one snapshot per second
    /// from the broadcaster task.
    pub fn join_metrics(&self) -> (u64, mpsc::Receiver<String>) {
        let (id, rx) = self.join(&self.metrics_roster, |_| {});
        info!(
            subscriber_id = id,
            total = self.metrics_subscriber_count(),
            "metrics subscriber connected"
        );
        (id, rx)
    }

    fn join(
        &self,
        roster: &Mutex<Vec<Subscriber>>,
        seed: impl FnOnce(&mpsc::Sender<String>),
    ) -> (u64, mpsc::Receiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        seed(&tx);
        roster.lock().push(Subscriber { id, mailbox: tx });
        (id, rx)
    }

    pub fn leave_alerts(&self, id: u64) {
        self.alert_roster.lock().retain(|s| s.id != id);
        info!(
            subscriber_id = id,
            total = self.alert_subscriber_count(),
            "alert subscriber disconnected"
        );
    }

    pub fn leave_metrics(&self, id: u64) {
        self.metrics_roster.lock().retain(|s| s.id != id);
        info!(
            subscriber_id = id,
            total = self.metrics_subscriber_count(),
            "metrics subscriber disconnected"
        );
    }

    // ── Broadcasting ────────────────────────────────────────────────────

    /// Push an alert frame to every alert subscriber.
    pub fn broadcast_alert(&self, frame: &str) {
        Self::broadcast(&self.alert_roster, frame);
    }

    /// Push a metrics snapshot frame to every metrics subscriber.
    pub fn broadcast_metrics(&self, frame: &str) {
        Self::broadcast(&self.metrics_roster, frame);
    }

    fn broadcast(roster: &Mutex<Vec<Subscriber>>, frame: &str) {
        let mut roster = roster.lock();
        if roster.is_empty() {
            return;
        }

        let mut dropped = Vec::new();
        for subscriber in roster.iter() {
            if subscriber.mailbox.try_send(frame.to_string()).is_err() {
                dropped.push(subscriber.id);
            }
        }

        if !dropped.is_empty() {
            roster.retain(|s| !dropped.contains(&s.id));
            debug!(
                removed = dropped.len(),
                remaining = roster.len(),
                "removed unresponsive subscribers"
            );
        }
    }

    // ── Counts ──────────────────────────────────────────────────────────

    pub fn alert_subscriber_count(&self) -> usize {
        self.alert_roster.lock().len()
    }

    pub fn metrics_subscriber_count(&self) -> usize {
        self.metrics_roster.lock().len()
    }

    /// Total live connections across both rosters.
    pub fn subscriber_count(&self) -> usize {
        self.alert_subscriber_count() + self.metrics_subscriber_count()
    }
}

impl Default for SubscriberHub {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn alert_join_receives_welcome_frame() {
        let hub = SubscriberHub::new();
        let (_id, mut rx) = hub.join_alerts();
        let frame = rx.recv().await.unwrap();
        assert!(frame.contains("welcome"));
        assert_eq!(hub.alert_subscriber_count(), 1);
    }

    #[tokio::test]
    async fn broadcast_reaches_all_alert_subscribers() {
        let hub = SubscriberHub::new();
        let (_a, mut rx_a) = hub.join_alerts();
        let (_b, mut rx_b) = hub.join_alerts();
        // Drain welcome frames.
        rx_a.recv().await.unwrap();
        rx_b.recv().await.unwrap();

        hub.broadcast_alert("{\"alert\":1}");
        assert_eq!(rx_a.recv().await.unwrap(), "{\"alert\":1}");
        assert_eq!(rx_b.recv().await.unwrap(), "{\"alert\":1}");
    }

    #[tokio::test]
    async fn full_mailbox_removes_subscriber_but_not_others() {
        let hub = SubscriberHub::new();
        let (_slow, slow_rx) = hub.join_alerts();
        let (_ok, mut ok_rx) = hub.join_alerts();
        ok_rx.recv().await.unwrap();

        // Never drain the slow subscriber: its welcome frame occupies one
        // slot, so the final broadcast overflows it and only it.
        for _ in 0..MAILBOX_CAPACITY {
            hub.broadcast_alert("frame");
        }
        assert_eq!(hub.alert_subscriber_count(), 1);

        // The healthy subscriber keeps receiving once it drains.
        while ok_rx.try_recv().is_ok() {}
        hub.broadcast_alert("after");
        assert_eq!(ok_rx.recv().await.unwrap(), "after");
        drop(slow_rx);
    }

    #[tokio::test]
    async fn closed_mailbox_removed_on_next_broadcast() {
        let hub = SubscriberHub::new();
        let (_id, rx) = hub.join_metrics();
        assert_eq!(hub.metrics_subscriber_count(), 1);

        drop(rx);
        hub.broadcast_metrics("{}");
        assert_eq!(hub.metrics_subscriber_count(), 0);
    }

    #[tokio::test]
    async fn leave_removes_from_roster() {
        let hub = SubscriberHub::new();
        let (id, _rx) = hub.join_alerts();
        let (mid, _mrx) = hub.join_metrics();
        assert_eq!(hub.subscriber_count(), 2);

        hub.leave_alerts(id);
        hub.leave_metrics(mid);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn rosters_are_independent() {
        let hub = SubscriberHub::new();
        let (_a, mut alert_rx) = hub.join_alerts();
        let (_m, mut metrics_rx) = hub.join_metrics();
        alert_rx.recv().await.unwrap();

        hub.broadcast_metrics("{\"tps\":1.0}");
        assert_eq!(metrics_rx.recv().await.unwrap(), "{\"tps\":1.0}");
        assert!(alert_rx.try_recv().is_err());
    }
}

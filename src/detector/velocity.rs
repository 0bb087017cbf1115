// =============================================================================
// Velocity Store — per-card sliding windows of recent transactions
// =============================================================================
//
// Keyed mapping card_id -> window of (timestamp, amount) entries. Windows are
// created on first sight of a card, mutated only under the detector's lock,
// and destroyed by the janitor once their newest entry goes stale.
//
// Eviction is driven by the incoming event's timestamp, not the wall clock:
// entries strictly older than `event_ts - window` are dropped before the
// event is appended. Entries landing exactly on the boundary are kept.
// =============================================================================

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};

/// Cards whose newest entry is older than this are removed wholesale by
/// `evict_stale`.
const STALE_AFTER_SECS: i64 = 300;

// =============================================================================
// VelocityWindow
// =============================================================================

/// Ordered (timestamp, amount) entries for one card.
#[derive(Debug, Default)]
pub struct VelocityWindow {
    entries: VecDeque<(DateTime<Utc>, f64)>,
}

impl VelocityWindow {
    /// Evict entries outside `ts - window`, then append the current event.
    ///
    /// Entries are kept in arrival order; a late event (timestamp older than
    /// the newest retained entry) is appended without re-sorting, and eviction
    /// is computed against the incoming event's timestamp only.
    fn observe(&mut self, ts: DateTime<Utc>, amount: f64, window: Duration) -> (usize, f64) {
        let cutoff = ts - window;
        while let Some(&(front_ts, _)) = self.entries.front() {
            if front_ts < cutoff {
                self.entries.pop_front();
            } else {
                break;
            }
        }
        self.entries.push_back((ts, amount));
        (self.len(), self.mean())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn mean(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        let total: f64 = self.entries.iter().map(|(_, amount)| amount).sum();
        total / self.entries.len() as f64
    }

    /// Newest timestamp held by the window. Entries may arrive out of order,
    /// so this scans rather than trusting the back of the deque.
    fn newest(&self) -> Option<DateTime<Utc>> {
        self.entries.iter().map(|(ts, _)| *ts).max()
    }
}

// =============================================================================
// VelocityStore
// =============================================================================

/// All per-card windows plus the configured window width.
pub struct VelocityStore {
    windows: HashMap<String, VelocityWindow>,
    window: Duration,
}

impl VelocityStore {
    pub fn new(window_seconds: i64) -> Self {
        Self {
            windows: HashMap::new(),
            window: Duration::seconds(window_seconds),
        }
    }

    /// Evict old entries for the card, append the event, and return the new
    /// window size and mean.
    pub fn observe(&mut self, card_id: &str, ts: DateTime<Utc>, amount: f64) -> (usize, f64) {
        self.windows
            .entry(card_id.to_string())
            .or_default()
            .observe(ts, amount, self.window)
    }

    /// Read-only (count, mean) snapshot, for feature engineering ahead of the
    /// matching `observe` call. `None` for cards never seen (or evicted).
    pub fn lookup_mean(&self, card_id: &str) -> Option<(usize, f64)> {
        self.windows
            .get(card_id)
            .filter(|w| !w.entries.is_empty())
            .map(|w| (w.len(), w.mean()))
    }

    /// Remove every window whose newest entry is older than `now - 5min`.
    /// Returns the number of cards removed.
    pub fn evict_stale(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::seconds(STALE_AFTER_SECS);
        let before = self.windows.len();
        self.windows
            .retain(|_, window| matches!(window.newest(), Some(newest) if newest >= cutoff));
        before - self.windows.len()
    }

    /// Number of cards currently tracked.
    pub fn tracked_cards(&self) -> usize {
        self.windows.len()
    }
}

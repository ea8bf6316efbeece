//! Per-key quota tracking
//!
//! Each key carries two independent limits: a daily request quota anchored to
//! the calendar date, and a rolling 60-second request window. The tracker is
//! plain mutable state with the clock passed in explicitly; locking and the
//! check-then-record ordering are the pool's responsibility.

use std::collections::VecDeque;

use chrono::{DateTime, NaiveDate, Utc};

/// Length of the rolling per-minute rate window.
const RATE_WINDOW_SECS: i64 = 60;

/// Daily counter plus rolling 60-second window for one API key.
///
/// The window is pruned lazily: stale timestamps linger until the next
/// `is_available` call, but are always dropped before an availability
/// decision is returned.
#[derive(Debug)]
pub struct QuotaTracker {
    daily_limit: u32,
    rpm_limit: u32,
    calls_today: u32,
    day_anchor: NaiveDate,
    recent: VecDeque<DateTime<Utc>>,
}

impl QuotaTracker {
    /// Create a tracker with no recorded use, anchored to `now`'s date.
    pub fn new(daily_limit: u32, rpm_limit: u32, now: DateTime<Utc>) -> Self {
        Self {
            daily_limit,
            rpm_limit,
            calls_today: 0,
            day_anchor: now.date_naive(),
            recent: VecDeque::new(),
        }
    }

    /// Whether this key can be used right now.
    ///
    /// Rolls the daily counter over on a date change and prunes the rate
    /// window before deciding, so the answer reflects `now` exactly.
    pub fn is_available(&mut self, now: DateTime<Utc>) -> bool {
        self.roll_over(now);
        self.prune(now);
        self.calls_today < self.daily_limit && (self.recent.len() as u32) < self.rpm_limit
    }

    /// Record one use at `now`.
    ///
    /// Must be called only immediately after `is_available` returned true;
    /// the pool enforces that ordering under its lock.
    pub fn record_use(&mut self, now: DateTime<Utc>) {
        self.calls_today += 1;
        self.recent.push_back(now);
    }

    /// Reset daily state when the observed date differs from the anchor.
    fn roll_over(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today != self.day_anchor {
            self.calls_today = 0;
            self.recent.clear();
            self.day_anchor = today;
        }
    }

    /// Drop timestamps older than the rate window.
    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - chrono::Duration::seconds(RATE_WINDOW_SECS);
        while self.recent.front().is_some_and(|t| *t < cutoff) {
            self.recent.pop_front();
        }
    }
}

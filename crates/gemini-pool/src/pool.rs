//! Round-robin key selection with bounded cooldown escalation
//!
//! The pool owns one `QuotaTracker` per key and a rotation cursor. Selection
//! is a single full scan from the cursor; if nothing is available the pool
//! waits one cooldown (the rate windows reset on a known 60-second cadence)
//! and scans exactly once more before failing with `Exhausted`. Unbounded
//! retry belongs to the pipeline driver, which also has to absorb failure
//! classes the pool never sees.
//!
//! The lock covers only the scan-and-record critical section. The cooldown
//! sleep and the caller's network call both happen outside it, so concurrent
//! callers arriving during a cooldown each run their own scan/sleep/scan
//! sequence.

use std::time::Duration;

use chrono::{DateTime, Utc};
use common::Secret;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::keys::ApiKey;
use crate::quota::QuotaTracker;

/// A key selected for one request, with its use already recorded.
#[derive(Debug)]
pub struct SelectedKey {
    pub id: String,
    pub key: Secret<String>,
}

struct Slot {
    key: ApiKey,
    tracker: QuotaTracker,
}

struct PoolState {
    slots: Vec<Slot>,
    cursor: usize,
}

/// Quota-aware pool over a fixed, ordered set of API keys.
pub struct KeyPool {
    state: Mutex<PoolState>,
    cooldown: Duration,
    shutdown: watch::Receiver<bool>,
}

impl KeyPool {
    /// Build a pool over `keys`, all sharing the same per-key limits.
    ///
    /// Pool size is fixed for the life of the process. `shutdown` interrupts
    /// an in-flight cooldown wait with `Cancelled`.
    pub fn new(
        keys: Vec<ApiKey>,
        daily_limit: u32,
        rpm_limit: u32,
        cooldown: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let now = Utc::now();
        let slots = keys
            .into_iter()
            .map(|key| Slot {
                key,
                tracker: QuotaTracker::new(daily_limit, rpm_limit, now),
            })
            .collect();
        Self {
            state: Mutex::new(PoolState { slots, cursor: 0 }),
            cooldown,
            shutdown,
        }
    }

    /// Number of keys in the pool.
    pub async fn len(&self) -> usize {
        self.state.lock().await.slots.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Select the next usable key, recording the use against its quota.
    ///
    /// One full round-robin scan; on global exhaustion, one cooldown wait and
    /// one rescan; then `Exhausted`. The returned key has already been charged
    /// one use, so the caller must actually issue the request.
    pub async fn acquire(&self) -> Result<SelectedKey> {
        if let Some(selected) = self.scan(Utc::now()).await {
            return Ok(selected);
        }

        let total = self.len().await;
        warn!(
            keys = total,
            cooldown_secs = self.cooldown.as_secs(),
            "all keys at their limits, waiting before rescan"
        );
        metrics::counter!("pool_cooldown_waits_total").increment(1);
        self.sleep_or_cancel().await?;

        match self.scan(Utc::now()).await {
            Some(selected) => Ok(selected),
            None => {
                error!(keys = total, "no key available even after cooldown");
                metrics::counter!("pool_exhausted_total").increment(1);
                Err(Error::Exhausted { total })
            }
        }
    }

    /// One full pass over the slots starting at the rotation cursor.
    ///
    /// The cursor advances on every attempt, successful or not, so no key is
    /// examined twice before the others have been tried.
    async fn scan(&self, now: DateTime<Utc>) -> Option<SelectedKey> {
        let mut state = self.state.lock().await;
        let n = state.slots.len();
        if n == 0 {
            return None;
        }
        for _ in 0..n {
            let idx = state.cursor;
            state.cursor = (idx + 1) % n;
            let slot = &mut state.slots[idx];
            if slot.tracker.is_available(now) {
                slot.tracker.record_use(now);
                debug!(key_id = %slot.key.id, "selected key");
                return Some(SelectedKey {
                    id: slot.key.id.clone(),
                    key: slot.key.key.clone(),
                });
            }
        }
        None
    }

    /// Sleep one cooldown, or return `Cancelled` if shutdown fires first.
    async fn sleep_or_cancel(&self) -> Result<()> {
        let mut shutdown = self.shutdown.clone();
        if *shutdown.borrow() {
            return Err(Error::Cancelled);
        }
        tokio::select! {
            _ = tokio::time::sleep(self.cooldown) => Ok(()),
            _ = wait_for_shutdown(&mut shutdown) => Err(Error::Cancelled),
        }
    }
}

/// Resolve once the shutdown flag becomes true; never resolves otherwise.
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            // Sender gone without signalling: shutdown can no longer arrive.
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_keys(n: usize) -> Vec<ApiKey> {
        (0..n)
            .map(|i| ApiKey {
                id: format!("key-{i}"),
                key: Secret::new(format!("secret-{i}")),
            })
            .collect()
    }

    fn no_shutdown() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    #[tokio::test]
    async fn round_robin_visits_each_key_once() {
        let (_tx, rx) = no_shutdown();
        let pool = KeyPool::new(test_keys(3), 100, 100, Duration::from_secs(60), rx);

        let ids: Vec<String> = [
            pool.acquire().await.unwrap(),
            pool.acquire().await.unwrap(),
            pool.acquire().await.unwrap(),
        ]
        .into_iter()
        .map(|s| s.id)
        .collect();

        assert_eq!(ids, vec!["key-0", "key-1", "key-2"]);

        // Cursor wraps back to the first key
        assert_eq!(pool.acquire().await.unwrap().id, "key-0");
    }

    #[tokio::test]
    async fn skips_keys_at_their_daily_limit() {
        let (_tx, rx) = no_shutdown();
        let pool = KeyPool::new(test_keys(3), 1, 100, Duration::from_secs(60), rx);

        assert_eq!(pool.acquire().await.unwrap().id, "key-0");
        assert_eq!(pool.acquire().await.unwrap().id, "key-1");
        // key-0 and key-1 are spent, key-2 still has its one daily use
        assert_eq!(pool.acquire().await.unwrap().id, "key-2");
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_waits_one_cooldown_then_fails() {
        let (_tx, rx) = no_shutdown();
        let cooldown = Duration::from_secs(60);
        let pool = KeyPool::new(test_keys(2), 1, 100, cooldown, rx);

        pool.acquire().await.unwrap();
        pool.acquire().await.unwrap();

        // Both daily quotas spent; the cooldown cannot help, so the pool waits
        // exactly once and then reports exhaustion.
        let before = tokio::time::Instant::now();
        let err = pool.acquire().await.unwrap_err();
        let waited = before.elapsed();

        assert!(matches!(err, Error::Exhausted { total: 2 }));
        assert_eq!(waited, cooldown);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_error_reports_pool_size() {
        let (_tx, rx) = no_shutdown();
        let pool = KeyPool::new(test_keys(3), 0, 100, Duration::from_secs(5), rx);

        let err = pool.acquire().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "all 3 keys exhausted (daily or per-minute limit), even after cooldown"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn empty_pool_exhausts_without_panicking() {
        let (_tx, rx) = no_shutdown();
        let pool = KeyPool::new(vec![], 100, 100, Duration::from_secs(1), rx);

        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, Error::Exhausted { total: 0 }));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_before_cooldown_returns_cancelled() {
        let (tx, rx) = no_shutdown();
        let pool = KeyPool::new(test_keys(1), 1, 100, Duration::from_secs(60), rx);

        pool.acquire().await.unwrap();
        tx.send(true).unwrap();

        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_cooldown_interrupts_wait() {
        let (tx, rx) = no_shutdown();
        let pool = KeyPool::new(test_keys(1), 1, 100, Duration::from_secs(600), rx);
        pool.acquire().await.unwrap();

        let handle = tokio::spawn(async move { pool.acquire().await });
        // Let the acquire reach its cooldown sleep, then signal shutdown
        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(true).unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn rpm_limit_rotates_to_other_keys() {
        let (_tx, rx) = no_shutdown();
        let pool = KeyPool::new(test_keys(2), 100, 1, Duration::from_secs(60), rx);

        assert_eq!(pool.acquire().await.unwrap().id, "key-0");
        // key-0's window holds one timestamp; the rpm limit pushes the second
        // request onto key-1
        assert_eq!(pool.acquire().await.unwrap().id, "key-1");
    }

    #[tokio::test]
    async fn selected_key_carries_the_secret() {
        let (_tx, rx) = no_shutdown();
        let pool = KeyPool::new(test_keys(1), 100, 100, Duration::from_secs(60), rx);

        let selected = pool.acquire().await.unwrap();
        assert_eq!(selected.key.expose(), "secret-0");
    }
}

//! Passage-granular pipeline with unbounded fixed-cooldown retry
//!
//! The driver walks the pending passages in order, fully segmenting and
//! persisting one before touching the next. All resilience lives here: any
//! failure below (pool exhaustion, service errors, degenerate segments,
//! persistence) sends the same passage back through a cooldown and a fresh
//! attempt from word 0. A permanently failing passage blocks the pipeline,
//! visibly, rather than being dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::engine::SegmentationEngine;
use crate::error::{Error, Result};
use crate::store::{Passage, SegmentStore};

/// Totals for a completed run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub passages: usize,
    pub segments: usize,
}

/// Drives segmentation across all pending passages.
pub struct PipelineDriver {
    engine: SegmentationEngine,
    store: Arc<dyn SegmentStore>,
    cooldown: Duration,
    shutdown: watch::Receiver<bool>,
}

impl PipelineDriver {
    pub fn new(
        engine: SegmentationEngine,
        store: Arc<dyn SegmentStore>,
        cooldown: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            engine,
            store,
            cooldown,
            shutdown,
        }
    }

    /// Process every passage not yet in the store, in input order.
    ///
    /// Returns early only on shutdown; per-passage failures never skip a
    /// passage.
    pub async fn run(&self, passages: &[Passage]) -> Result<RunSummary> {
        let done = self.store.segmented_ids().await?;
        let pending: Vec<&Passage> = passages.iter().filter(|p| !done.contains(&p.id)).collect();
        info!(
            total = passages.len(),
            already_segmented = done.len(),
            pending = pending.len(),
            "starting segmentation run"
        );

        let mut summary = RunSummary::default();
        for passage in pending {
            let segments = self.process_passage(passage).await?;
            summary.passages += 1;
            summary.segments += segments;
        }
        Ok(summary)
    }

    /// Segment and persist one passage, retrying until it succeeds.
    ///
    /// Each attempt restarts from word 0 and partial segments from a failed
    /// attempt are never persisted, so persistence stays once-per-passage.
    async fn process_passage(&self, passage: &Passage) -> Result<usize> {
        let mut attempt = 1u32;
        loop {
            if *self.shutdown.borrow() {
                return Err(Error::Cancelled);
            }
            match self.attempt(passage).await {
                Ok(segments) => {
                    info!(passage_id = %passage.id, segments, attempt, "passage persisted");
                    metrics::counter!("passages_persisted_total").increment(1);
                    metrics::counter!("segments_persisted_total").increment(segments as u64);
                    return Ok(segments);
                }
                Err(e) if e.is_cancelled() => return Err(Error::Cancelled),
                Err(e) => {
                    warn!(
                        passage_id = %passage.id,
                        attempt,
                        error = %e,
                        cooldown_secs = self.cooldown.as_secs(),
                        "passage attempt failed, cooling down before retry"
                    );
                    metrics::counter!("passage_retries_total").increment(1);
                    self.sleep_or_cancel().await?;
                    attempt += 1;
                }
            }
        }
    }

    /// One full pass: split, then persist the whole batch.
    async fn attempt(&self, passage: &Passage) -> Result<usize> {
        let segments = self.engine.split(&passage.id, &passage.text).await?;
        self.store.insert_batch(&segments).await?;
        Ok(segments.len())
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
            std::future::pending::<()>().await;
        }
    }
}

//! Segment persistence and passage input
//!
//! Segments live in a JSON file mapping passage ids to their segment lists.
//! All writes are atomic temp-file + rename, and a batch either lands
//! completely or not at all; the driver relies on that to keep full-passage
//! retry idempotent. A tokio Mutex serializes writers.
//!
//! Passage input is a JSONL file of `{"id": ..., "text": ...}` records,
//! pre-cleaned upstream.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::engine::Segment;

/// Errors from segment or passage storage.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// One input passage awaiting segmentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    pub text: String,
}

/// Persisted segment store as the driver sees it.
///
/// `insert_batch` is all-or-nothing per call; a batch holds one passage's
/// complete segment list. Uses `Pin<Box<dyn Future>>` for dyn-compatibility.
pub trait SegmentStore: Send + Sync {
    /// Ids of passages that already have persisted segments.
    fn segmented_ids(&self) -> Pin<Box<dyn Future<Output = Result<HashSet<String>>> + Send + '_>>;

    /// Persist one passage's segments atomically, replacing any previous
    /// batch for the same passage.
    fn insert_batch<'a>(
        &'a self,
        segments: &'a [Segment],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// JSON-file-backed segment store.
#[derive(Debug)]
pub struct JsonSegmentStore {
    path: PathBuf,
    state: Mutex<HashMap<String, Vec<Segment>>>,
}

impl JsonSegmentStore {
    /// Load the store from `path`, creating an empty file if absent.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| StoreError::Io(format!("reading segment file: {e}")))?;
            let segments: HashMap<String, Vec<Segment>> = serde_json::from_str(&contents)
                .map_err(|e| StoreError::Parse(format!("parsing segment file: {e}")))?;
            info!(path = %path.display(), passages = segments.len(), "loaded segment store");
            segments
        } else {
            info!(path = %path.display(), "segment file not found, starting empty");
            let empty = HashMap::new();
            write_atomic(&path, &empty).await?;
            empty
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Number of passages with persisted segments.
    pub async fn len(&self) -> usize {
        self.state.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl SegmentStore for JsonSegmentStore {
    fn segmented_ids(&self) -> Pin<Box<dyn Future<Output = Result<HashSet<String>>> + Send + '_>> {
        Box::pin(async {
            let state = self.state.lock().await;
            Ok(state.keys().cloned().collect())
        })
    }

    fn insert_batch<'a>(
        &'a self,
        segments: &'a [Segment],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if segments.is_empty() {
                return Ok(());
            }
            let mut state = self.state.lock().await;

            // Group by passage id; a batch normally holds exactly one.
            let mut grouped: HashMap<String, Vec<Segment>> = HashMap::new();
            for segment in segments {
                grouped
                    .entry(segment.passage_id.clone())
                    .or_default()
                    .push(segment.clone());
            }

            // Snapshot the affected entries so a failed write leaves the
            // in-memory map matching the file (all-or-nothing).
            let previous: HashMap<String, Option<Vec<Segment>>> = grouped
                .keys()
                .map(|id| (id.clone(), state.get(id).cloned()))
                .collect();

            for (id, batch) in grouped {
                debug!(passage_id = %id, segments = batch.len(), "inserting segment batch");
                state.insert(id, batch);
            }

            if let Err(e) = write_atomic(&self.path, &state).await {
                for (id, prev) in previous {
                    match prev {
                        Some(batch) => state.insert(id, batch),
                        None => state.remove(&id),
                    };
                }
                return Err(e);
            }
            Ok(())
        })
    }
}

/// Write the segment map to a file atomically (temp file + rename).
async fn write_atomic(path: &Path, data: &HashMap<String, Vec<Segment>>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| StoreError::Parse(format!("serializing segments: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| StoreError::Io("segment path has no parent directory".into()))?;
    let tmp_path = dir.join(format!(".segments.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| StoreError::Io(format!("writing temp segment file: {e}")))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| StoreError::Io(format!("renaming segment file: {e}")))?;
    Ok(())
}

/// Load passages from a JSONL file, one `{"id", "text"}` record per line.
pub async fn load_passages(path: &Path) -> Result<Vec<Passage>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| StoreError::Io(format!("reading {}: {e}", path.display())))?;

    let mut passages = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let passage: Passage = serde_json::from_str(line)
            .map_err(|e| StoreError::Parse(format!("line {}: {e}", lineno + 1)))?;
        // A passage with no words produces no segments, so it would never be
        // recorded as segmented and every run would pick it up again.
        if passage.text.split_whitespace().next().is_none() {
            warn!(passage_id = %passage.id, "skipping passage with no words");
            continue;
        }
        passages.push(passage);
    }

    info!(path = %path.display(), passages = passages.len(), "loaded passages");
    Ok(passages)
}

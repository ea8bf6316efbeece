//! Pipeline error taxonomy
//!
//! Everything except `Cancelled` is recoverable by the driver's
//! full-passage retry. Components below the driver never retry on their
//! own (the pool's single cooldown-rescan is a dispatch-latency bound,
//! not a resilience mechanism).

use crate::store::StoreError;

/// Errors from segmentation and persistence.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The copy operation returned an empty or whitespace-only string, so the
    /// cursor could not advance. Failing the attempt beats looping forever.
    #[error("copy produced no forward progress for passage {passage_id} at word {at_word}")]
    DegenerateSegment { passage_id: String, at_word: usize },

    #[error(transparent)]
    Copy(#[from] copier::Error),

    #[error("segment store error: {0}")]
    Store(#[from] StoreError),

    #[error("shutdown requested")]
    Cancelled,
}

impl Error {
    /// Whether this error is a shutdown rather than a retryable failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Error::Cancelled | Error::Copy(copier::Error::Pool(gemini_pool::Error::Cancelled))
        )
    }
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_pool_error_counts_as_cancelled() {
        let err = Error::Copy(copier::Error::Pool(gemini_pool::Error::Cancelled));
        assert!(err.is_cancelled());
    }

    #[test]
    fn exhausted_pool_error_is_retryable() {
        let err = Error::Copy(copier::Error::Pool(gemini_pool::Error::Exhausted {
            total: 4,
        }));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn degenerate_segment_names_the_passage() {
        let err = Error::DegenerateSegment {
            passage_id: "p-17".into(),
            at_word: 420,
        };
        assert!(err.to_string().contains("p-17"));
        assert!(err.to_string().contains("420"));
    }
}

//! Natural-boundary copy operation
//!
//! The segmentation engine needs exactly one upstream capability: hand the
//! generation service a candidate chunk and get back a prefix of it that ends
//! at a natural break (paragraph, sentence, topic). The `Copier` trait keeps
//! the key pool and HTTP plumbing behind that single operation, so the engine
//! never sees a raw client and tests can substitute a mock.
//!
//! Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
//! (`Arc<dyn Copier>`).

pub mod gemini;

pub use gemini::GeminiCopier;

use std::future::Future;
use std::pin::Pin;

/// Errors from the copy operation.
///
/// `Pool` carries exhaustion/cancellation from key selection; everything else
/// is a per-attempt service failure the pipeline driver retries at passage
/// granularity.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Pool(#[from] gemini_pool::Error),

    #[error("request to generation service failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generation service returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("invalid generation response: {0}")]
    InvalidResponse(String),
}

/// Result alias for copy operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The one operation the segmentation engine is allowed to reach upstream
/// with: copy `text` from its beginning up to a natural breaking point.
///
/// Implementations return a prefix of the input, possibly the whole of it,
/// never a rewrite. An empty return is the caller's problem to reject; the
/// trait makes no forward-progress promise.
pub trait Copier: Send + Sync {
    fn copy_to_boundary<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}

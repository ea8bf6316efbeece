//! Error types for pool operations

/// Errors from pool operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("all {total} keys exhausted (daily or per-minute limit), even after cooldown")]
    Exhausted { total: usize },

    #[error("shutdown requested")]
    Cancelled,

    #[error("key file error: {0}")]
    KeyFile(String),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;

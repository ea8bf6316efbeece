//! Shared types for the segmentation pipeline

mod secret;
mod error;

pub use secret::Secret;
pub use error::{Error, Result};

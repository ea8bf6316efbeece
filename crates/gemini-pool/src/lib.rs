//! Key pool for Gemini API keys
//!
//! Turns a fixed set of independently rate-limited API keys into one logical
//! client that is eventually available. Each key carries a daily request quota
//! and a rolling 60-second request window; the pool selects keys round-robin
//! and, when every key is at a limit, waits one cooldown and rescans once
//! before reporting exhaustion.
//!
//! Key lifecycle:
//! 1. Keys are loaded once at startup from a newline-delimited key file
//! 2. The pool selects a key round-robin and records the use against its quota
//! 3. All keys at a limit → one cooldown wait (rate windows reset on a 60 s
//!    cadence), then exactly one rescan
//! 4. Still nothing → `Exhausted`; long-horizon retry belongs to the caller
//! 5. A shutdown signal interrupts the cooldown wait with `Cancelled`

pub mod error;
pub mod keys;
pub mod pool;
pub mod quota;

pub use error::{Error, Result};
pub use keys::{ApiKey, load_keys};
pub use pool::{KeyPool, SelectedKey};
pub use quota::QuotaTracker;

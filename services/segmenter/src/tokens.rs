//! Embedding-budget token counting
//!
//! The engine bounds its candidate windows by the embedding model's token
//! count, not the generation model's. Counting is deterministic per
//! vocabulary version, so results are cached per blake3 content hash; the
//! grow loop re-counts overlapping candidates constantly and the cache makes
//! that cheap.

use std::sync::Arc;

use moka::sync::Cache;
use tiktoken_rs::CoreBPE;

/// Token counting as the engine sees it. Mockable for tests.
pub trait TokenCount: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Accurate token counter wrapping tiktoken's cl100k_base tokenizer.
pub struct TokenCounter {
    bpe: Arc<CoreBPE>,
    cache: Cache<String, usize>,
}

impl TokenCounter {
    /// Create a counter with the given cache capacity.
    pub fn new(cache_capacity: u64) -> anyhow::Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()?;
        Ok(Self {
            bpe: Arc::new(bpe),
            cache: Cache::new(cache_capacity),
        })
    }

    fn count_uncached(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

impl TokenCount for TokenCounter {
    fn count(&self, text: &str) -> usize {
        let hash = blake3::hash(text.as_bytes()).to_hex().to_string();
        self.cache.get_with(hash, || self.count_uncached(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counting_is_deterministic() {
        let counter = TokenCounter::new(100).unwrap();
        let text = "The quick brown fox jumps over the lazy dog.";
        assert_eq!(counter.count(text), counter.count(text));
    }

    #[test]
    fn empty_text_has_zero_tokens() {
        let counter = TokenCounter::new(100).unwrap();
        assert_eq!(counter.count(""), 0);
    }

    #[test]
    fn longer_text_has_more_tokens() {
        let counter = TokenCounter::new(100).unwrap();
        let short = "one two three";
        let long = "one two three four five six seven eight nine ten";
        assert!(counter.count(long) > counter.count(short));
    }

    #[test]
    fn cached_and_uncached_agree() {
        let counter = TokenCounter::new(100).unwrap();
        let text = "token counting with a content-hash cache";
        let cached = counter.count(text);
        assert_eq!(cached, counter.count_uncached(text));
    }
}

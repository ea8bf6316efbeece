//! Adaptive token-bounded segmentation
//!
//! Per passage, the engine carves a token-bounded candidate window, asks the
//! copier for a prefix ending at a natural boundary, and advances its cursor
//! by the length of what actually came back. The token budget bounds the
//! search window; the natural-boundary choice decides the real segment
//! length, so the two are deliberately decoupled.

use std::sync::Arc;

use copier::Copier;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::tokens::TokenCount;

/// One contiguous, natural-boundary-terminated slice of a passage.
///
/// `start` and `end` are zero-based word indices into the original passage,
/// both inclusive. Segments for a passage are contiguous, non-overlapping,
/// and cover the whole word sequence in order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Segment {
    pub passage_id: String,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Splits one passage into segments, consuming the copier call-by-call.
pub struct SegmentationEngine {
    copier: Arc<dyn Copier>,
    tokens: Arc<dyn TokenCount>,
    max_tokens: usize,
    step_words: usize,
}

impl SegmentationEngine {
    pub fn new(
        copier: Arc<dyn Copier>,
        tokens: Arc<dyn TokenCount>,
        max_tokens: usize,
        step_words: usize,
    ) -> Self {
        Self {
            copier,
            tokens,
            max_tokens,
            step_words,
        }
    }

    /// Split `passage` into natural-boundary segments.
    ///
    /// Strictly sequential: each segment's start depends on how much of the
    /// previous candidate the copier actually returned. Errors propagate
    /// without retry; the driver owns resilience.
    pub async fn split(&self, passage_id: &str, passage: &str) -> Result<Vec<Segment>> {
        let words: Vec<&str> = passage.split_whitespace().collect();
        let total = words.len();
        let mut segments = Vec::new();
        let mut start = 0;

        while start < total {
            let end = self.grow_window(&words, start);
            let candidate = words[start..end].join(" ");
            let copied = self.copier.copy_to_boundary(&candidate).await?;

            let advance = copied.split_whitespace().count();
            if advance == 0 {
                return Err(Error::DegenerateSegment {
                    passage_id: passage_id.to_owned(),
                    at_word: start,
                });
            }
            // The copier contract is "a prefix of the candidate"; clamping
            // keeps the coverage invariant even if the service over-returns.
            let next = start + advance.min(total - start);

            debug!(
                passage_id,
                start,
                end = next - 1,
                window_words = end - start,
                "segment emitted"
            );
            segments.push(Segment {
                passage_id: passage_id.to_owned(),
                text: copied,
                start,
                end: next - 1,
            });
            start = next;
        }

        Ok(segments)
    }

    /// Find the candidate window end for a segment starting at `start`.
    ///
    /// Grows by `step_words` while the candidate stays within the token
    /// budget, backs off one step if the final growth overshot, and always
    /// takes at least one word so the search makes progress even when a
    /// single word blows the budget.
    fn grow_window(&self, words: &[&str], start: usize) -> usize {
        let total = words.len();
        let mut end = start;
        while end < total && self.count(&words[start..(end + 1).min(total)]) <= self.max_tokens {
            end += self.step_words;
        }
        if end > start && self.count(&words[start..end.min(total)]) > self.max_tokens {
            end -= self.step_words;
        }
        if end == start {
            end = start + 1;
        }
        end.min(total)
    }

    fn count(&self, words: &[&str]) -> usize {
        self.tokens.count(&words.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;

    /// Tokenizer giving ~1.3 tokens per word.
    struct PerWordTokens;

    impl TokenCount for PerWordTokens {
        fn count(&self, text: &str) -> usize {
            text.split_whitespace().count() * 13 / 10
        }
    }

    /// Tokenizer where any non-empty text blows the budget.
    struct HugeTokens;

    impl TokenCount for HugeTokens {
        fn count(&self, _text: &str) -> usize {
            100_000
        }
    }

    /// Copier returning the first `prefix_words` words of its input, or the
    /// whole input when `prefix_words` is None.
    struct PrefixCopier {
        prefix_words: Option<usize>,
    }

    impl Copier for PrefixCopier {
        fn copy_to_boundary<'a>(
            &'a self,
            text: &'a str,
        ) -> Pin<Box<dyn Future<Output = copier::Result<String>> + Send + 'a>> {
            let result = match self.prefix_words {
                Some(n) => text
                    .split_whitespace()
                    .take(n)
                    .collect::<Vec<_>>()
                    .join(" "),
                None => text.to_owned(),
            };
            Box::pin(async move { Ok(result) })
        }
    }

    /// Copier that always returns whitespace.
    struct BlankCopier;

    impl Copier for BlankCopier {
        fn copy_to_boundary<'a>(
            &'a self,
            _text: &'a str,
        ) -> Pin<Box<dyn Future<Output = copier::Result<String>> + Send + 'a>> {
            Box::pin(async { Ok("   ".to_owned()) })
        }
    }

    fn passage_of(words: usize) -> String {
        (0..words)
            .map(|i| format!("w{i}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn engine(
        copier: impl Copier + 'static,
        tokens: impl TokenCount + 'static,
        max_tokens: usize,
        step_words: usize,
    ) -> SegmentationEngine {
        SegmentationEngine::new(Arc::new(copier), Arc::new(tokens), max_tokens, step_words)
    }

    fn assert_partition(segments: &[Segment], total_words: usize) {
        let mut expected_start = 0;
        for seg in segments {
            assert_eq!(seg.start, expected_start, "gap or overlap at {seg:?}");
            assert!(seg.end >= seg.start, "empty range in {seg:?}");
            expected_start = seg.end + 1;
        }
        assert_eq!(expected_start, total_words, "segments must cover the passage");
    }

    #[tokio::test]
    async fn thousand_words_full_copy_gives_three_segments() {
        let eng = engine(PrefixCopier { prefix_words: None }, PerWordTokens, 450, 10);
        let segments = eng.split("p1", &passage_of(1000)).await.unwrap();

        // ~1.3 tokens/word against a 450-token budget grows the window to
        // 340 words per segment
        assert_eq!(segments.len(), 3);
        assert_eq!((segments[0].start, segments[0].end), (0, 339));
        assert_eq!((segments[1].start, segments[1].end), (340, 679));
        assert_eq!((segments[2].start, segments[2].end), (680, 999));
        assert_partition(&segments, 1000);
    }

    #[tokio::test]
    async fn cursor_advances_by_returned_length_not_window_size() {
        let eng = engine(PrefixCopier { prefix_words: Some(5) }, PerWordTokens, 450, 10);
        let segments = eng.split("p1", &passage_of(100)).await.unwrap();

        // The copier keeps 5 words regardless of the candidate window
        assert_eq!(segments.len(), 20);
        for (i, seg) in segments.iter().enumerate() {
            assert_eq!(seg.start, i * 5);
            assert_eq!(seg.end, i * 5 + 4);
            assert_eq!(seg.text.split_whitespace().count(), 5);
        }
        assert_partition(&segments, 100);
    }

    #[tokio::test]
    async fn oversized_single_word_still_progresses() {
        let eng = engine(PrefixCopier { prefix_words: None }, HugeTokens, 450, 10);
        let segments = eng.split("p1", &passage_of(3)).await.unwrap();

        // Every word alone exceeds the budget; the forced one-word window
        // keeps the engine terminating
        assert_eq!(segments.len(), 3);
        assert_partition(&segments, 3);
    }

    #[tokio::test]
    async fn short_passage_is_a_single_segment() {
        let eng = engine(PrefixCopier { prefix_words: None }, PerWordTokens, 450, 10);
        let segments = eng.split("p1", &passage_of(12)).await.unwrap();

        assert_eq!(segments.len(), 1);
        assert_eq!((segments[0].start, segments[0].end), (0, 11));
    }

    #[tokio::test]
    async fn ragged_prefixes_still_partition_the_passage() {
        let eng = engine(PrefixCopier { prefix_words: Some(7) }, PerWordTokens, 450, 10);
        let segments = eng.split("p1", &passage_of(50)).await.unwrap();

        // 50 words in steps of 7: the last segment is the 1-word remainder
        assert_eq!(segments.last().unwrap().start, 49);
        assert_partition(&segments, 50);
    }

    #[tokio::test]
    async fn blank_copy_fails_instead_of_stalling() {
        let eng = engine(BlankCopier, PerWordTokens, 450, 10);
        let err = eng.split("p9", &passage_of(100)).await.unwrap_err();

        assert!(matches!(
            err,
            Error::DegenerateSegment { ref passage_id, at_word: 0 } if passage_id == "p9"
        ));
    }

    #[tokio::test]
    async fn empty_passage_yields_no_segments() {
        let eng = engine(PrefixCopier { prefix_words: None }, PerWordTokens, 450, 10);
        let segments = eng.split("p1", "   ").await.unwrap();
        assert!(segments.is_empty());
    }

    #[tokio::test]
    async fn copier_errors_propagate_without_retry() {
        struct FailingCopier;
        impl Copier for FailingCopier {
            fn copy_to_boundary<'a>(
                &'a self,
                _text: &'a str,
            ) -> Pin<Box<dyn Future<Output = copier::Result<String>> + Send + 'a>> {
                Box::pin(async {
                    Err(copier::Error::Upstream {
                        status: 503,
                        body: "overloaded".into(),
                    })
                })
            }
        }

        let eng = engine(FailingCopier, PerWordTokens, 450, 10);
        let err = eng.split("p1", &passage_of(20)).await.unwrap_err();
        assert!(matches!(err, Error::Copy(copier::Error::Upstream { status: 503, .. })));
    }
}

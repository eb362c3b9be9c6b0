//! Splitting tokenized inputs into overlapping windows.
//!
//! Each input is cut into windows of at most `max_len` tokens, where
//! `max_len` is the batch capacity minus the prefix tokens and terminator
//! every window is wrapped in. Consecutive windows share `overlap` tokens.
//! An input of `L > max_len` tokens yields
//! `ceil((L - overlap) / (max_len - overlap))` windows.

use std::ops::Range;

use tracing::warn;

use crate::encoder::{SequenceEncoder, TokenId};
use crate::errors::{EmbeddingError, Result};

/// Text embedded in place of an input that tokenizes to nothing
/// (MD5 of "nomic empty").
pub const EMPTY_PLACEHOLDER: &str = "24df574ea1c998de59d5be15e769658e";

/// One window of one input, with the prefix tokens already in front.
/// The terminator is appended when the chunk is packed into a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// Index of the input this window was cut from.
    pub source_index: usize,
    /// Prefix tokens followed by the window.
    pub tokens: Vec<TokenId>,
}

/// Token ranges of every window over an input of `len` tokens.
///
/// `max_len` must exceed `overlap`; [`ChunkSplitter::new`] guarantees it.
pub(crate) fn windows(len: usize, max_len: usize, overlap: usize) -> Vec<Range<usize>> {
    debug_assert!(overlap < max_len);
    let mut out = Vec::new();
    let mut start = 0;
    while start < len {
        let end = (start + max_len).min(len);
        out.push(start..end);
        if end == len {
            break;
        }
        start = end - overlap;
    }
    out
}

/// Number of windows an input of `len` tokens is cut into, or `None` when
/// `overlap` leaves no room to advance.
pub fn chunk_count(len: usize, max_len: usize, overlap: usize) -> Option<usize> {
    let stride = max_len.checked_sub(overlap).filter(|&s| s > 0)?;
    if len <= max_len {
        return Some(1);
    }
    Some((len - overlap).div_ceil(stride))
}

/// Cuts tokenized inputs into [`Chunk`]s for one embed call.
#[derive(Debug)]
pub struct ChunkSplitter<'a> {
    prefix_tokens: &'a [TokenId],
    max_len: usize,
    overlap: usize,
    allow_multiple: bool,
}

impl<'a> ChunkSplitter<'a> {
    /// Validate the window geometry.
    ///
    /// Fails with [`EmbeddingError::ChunkConfiguration`] when `overlap` does
    /// not fit in the space left after the prefix and terminator.
    pub fn new(
        prefix_tokens: &'a [TokenId],
        has_trailing_terminator: bool,
        batch_capacity: usize,
        overlap: usize,
        allow_multiple: bool,
    ) -> Result<Self> {
        let reserved = prefix_tokens.len() + usize::from(has_trailing_terminator);
        let max_len = batch_capacity.saturating_sub(reserved);
        if overlap >= max_len {
            return Err(EmbeddingError::ChunkConfiguration { max_len, overlap });
        }
        Ok(Self {
            prefix_tokens,
            max_len,
            overlap,
            allow_multiple,
        })
    }

    /// Tokens available to each window.
    pub fn max_chunk_len(&self) -> usize {
        self.max_len
    }

    /// Windows of `tokens`, in order. Only the first is returned when
    /// multiple chunks are not allowed.
    pub fn split(&self, source_index: usize, tokens: &[TokenId]) -> Vec<Chunk> {
        let mut ranges = windows(tokens.len(), self.max_len, self.overlap);
        if !self.allow_multiple {
            ranges.truncate(1);
        }
        ranges
            .into_iter()
            .map(|range| {
                let mut chunk_tokens = Vec::with_capacity(self.prefix_tokens.len() + range.len());
                chunk_tokens.extend_from_slice(self.prefix_tokens);
                chunk_tokens.extend_from_slice(&tokens[range]);
                Chunk {
                    source_index,
                    tokens: chunk_tokens,
                }
            })
            .collect()
    }
}

/// How raw inputs are limited before splitting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputLimits {
    /// Token ceiling when long-document mode is on.
    pub long_document_max: Option<usize>,
    /// Whether chunks will be averaged.
    pub mean_across_chunks: bool,
}

/// Tokenize input `index` and apply long-document and empty-input rules.
///
/// - Over the long-document ceiling: [`EmbeddingError::InputTooLong`] when
///   averaging, otherwise truncated to the ceiling.
/// - Zero tokens: replaced by the tokens of [`EMPTY_PLACEHOLDER`]. A warning
///   is logged unless the text is literally empty in long-document mode.
pub fn prepare_tokens<E>(
    encoder: &E,
    index: usize,
    text: &str,
    limits: InputLimits,
) -> Result<Vec<TokenId>>
where
    E: SequenceEncoder + ?Sized,
{
    let mut tokens = encoder.tokenize(text, false)?;

    if let Some(limit) = limits.long_document_max {
        if tokens.len() > limit {
            if limits.mean_across_chunks {
                return Err(EmbeddingError::InputTooLong {
                    index,
                    tokens: tokens.len(),
                    limit,
                });
            }
            tokens.truncate(limit);
            return Ok(tokens);
        }
    }

    if tokens.is_empty() {
        if limits.long_document_max.is_none() || !text.is_empty() {
            warn!(index, "text tokenized into zero tokens, embedding placeholder");
        }
        tokens = encoder.tokenize(EMPTY_PLACEHOLDER, false)?;
        if tokens.is_empty() {
            return Err(EmbeddingError::Tokenize(
                "placeholder text produced no tokens".into(),
            ));
        }
    }
    Ok(tokens)
}

#[cfg(test)]
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_sign_loss)]
mod tests {
    use super::*;
    use crate::mock::MockEncoder;
    use assert_matches::assert_matches;
    use embedline_core::logging::capture_logs;

    fn seq(len: usize) -> Vec<TokenId> {
        (0..len).map(|i| 1000 + i as TokenId).collect()
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    const LONG_DOC: InputLimits = InputLimits {
        long_document_max: Some(16),
        mean_across_chunks: true,
    };

    const PLAIN: InputLimits = InputLimits {
        long_document_max: None,
        mean_across_chunks: true,
    };

    #[test]
    fn short_input_is_one_window() {
        assert_eq!(windows(5, 10, 2), vec![0..5]);
        assert_eq!(windows(10, 10, 2), vec![0..10]);
        assert_eq!(chunk_count(10, 10, 2), Some(1));
    }

    #[test]
    fn windows_step_back_by_overlap() {
        assert_eq!(windows(25, 10, 2), vec![0..10, 8..18, 16..25]);
        assert_eq!(chunk_count(25, 10, 2), Some(3));
    }

    #[test]
    fn last_window_clipped_to_end() {
        assert_eq!(windows(19, 10, 2), vec![0..10, 8..18, 16..19]);
    }

    #[test]
    fn count_undefined_when_overlap_fills_window() {
        assert_eq!(chunk_count(25, 10, 10), None);
        assert_eq!(chunk_count(25, 10, 11), None);
        assert_eq!(chunk_count(5, 0, 0), None);
        assert_eq!(chunk_count(11, 10, 9), Some(2));
    }

    #[test]
    fn empty_input_has_no_windows() {
        assert!(windows(0, 10, 2).is_empty());
    }

    #[test]
    fn max_len_accounts_for_prefix_and_terminator() {
        let prefix = [1, 2, 3];
        let splitter = ChunkSplitter::new(&prefix, true, 32, 8, true).unwrap();
        assert_eq!(splitter.max_chunk_len(), 28);
        let splitter = ChunkSplitter::new(&prefix, false, 32, 8, true).unwrap();
        assert_eq!(splitter.max_chunk_len(), 29);
    }

    #[test]
    fn overlap_must_be_below_max_len() {
        let prefix = [1];
        // capacity 10 - 1 prefix - 1 terminator = 8
        let err = ChunkSplitter::new(&prefix, true, 10, 8, true).unwrap_err();
        assert_matches!(
            err,
            EmbeddingError::ChunkConfiguration {
                max_len: 8,
                overlap: 8
            }
        );
        assert!(ChunkSplitter::new(&prefix, true, 10, 7, true).is_ok());
    }

    #[test]
    fn capacity_smaller_than_prefix_is_configuration_error() {
        let prefix = [1, 2, 3, 4];
        let err = ChunkSplitter::new(&prefix, true, 3, 0, true).unwrap_err();
        assert_matches!(err, EmbeddingError::ChunkConfiguration { max_len: 0, .. });
    }

    #[test]
    fn split_prepends_prefix_and_tags_source() {
        let prefix = [1, 5];
        let splitter = ChunkSplitter::new(&prefix, true, 8, 1, true).unwrap();
        let chunks = splitter.split(3, &seq(7));
        // max_len 5: windows 0..5, 4..7
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.source_index == 3));
        assert_eq!(chunks[0].tokens, vec![1, 5, 1000, 1001, 1002, 1003, 1004]);
        assert_eq!(chunks[1].tokens, vec![1, 5, 1004, 1005, 1006]);
    }

    #[test]
    fn truncation_mode_keeps_first_window() {
        let prefix = [1];
        let splitter = ChunkSplitter::new(&prefix, true, 10, 2, false).unwrap();
        let chunks = splitter.split(0, &seq(40));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].tokens.len(), 1 + 8);
        assert_eq!(&chunks[0].tokens[1..], &seq(8)[..]);
    }

    #[test]
    fn long_document_over_limit_fails_when_averaging() {
        let enc = MockEncoder::new(8, 64);
        let err = prepare_tokens(&enc, 4, &words(17), LONG_DOC).unwrap_err();
        assert_matches!(
            err,
            EmbeddingError::InputTooLong {
                index: 4,
                tokens: 17,
                limit: 16
            }
        );
    }

    #[test]
    fn long_document_over_limit_truncates_without_averaging() {
        let enc = MockEncoder::new(8, 64);
        let limits = InputLimits {
            mean_across_chunks: false,
            ..LONG_DOC
        };
        let tokens = prepare_tokens(&enc, 0, &words(40), limits).unwrap();
        assert_eq!(tokens.len(), 16);
        assert_eq!(tokens, enc.tokenize(&words(16), false).unwrap());
    }

    #[test]
    fn length_is_unbounded_outside_long_document_mode() {
        let enc = MockEncoder::new(8, 64);
        let tokens = prepare_tokens(&enc, 0, &words(100), PLAIN).unwrap();
        assert_eq!(tokens.len(), 100);
    }

    #[test]
    fn empty_text_uses_placeholder_with_warning() {
        let (logs, _guard) = capture_logs();
        let enc = MockEncoder::new(8, 64);
        let tokens = prepare_tokens(&enc, 1, "", PLAIN).unwrap();
        assert_eq!(tokens, enc.tokenize(EMPTY_PLACEHOLDER, false).unwrap());

        let warnings = logs.warnings("zero tokens");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field("index"), Some("1"));
    }

    #[test]
    fn whitespace_text_warns_even_in_long_document_mode() {
        let (logs, _guard) = capture_logs();
        let enc = MockEncoder::new(8, 64);
        let tokens = prepare_tokens(&enc, 0, "   ", LONG_DOC).unwrap();
        assert!(!tokens.is_empty());
        assert_eq!(logs.warnings("zero tokens").len(), 1);
    }

    #[test]
    fn empty_text_is_silent_in_long_document_mode() {
        let (logs, _guard) = capture_logs();
        let enc = MockEncoder::new(8, 64);
        let tokens = prepare_tokens(&enc, 0, "", LONG_DOC).unwrap();
        assert!(!tokens.is_empty());
        assert!(logs.warnings("zero tokens").is_empty());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn count_matches_closed_form(
                len in 1usize..2000,
                max_len in 2usize..300,
                overlap_frac in 0.0f64..1.0,
            ) {
                let overlap = ((max_len - 1) as f64 * overlap_frac) as usize;
                let ranges = windows(len, max_len, overlap);
                prop_assert_eq!(Some(ranges.len()), chunk_count(len, max_len, overlap));
            }

            #[test]
            fn consecutive_windows_share_overlap(
                len in 1usize..2000,
                max_len in 2usize..300,
                overlap_frac in 0.0f64..1.0,
            ) {
                let overlap = ((max_len - 1) as f64 * overlap_frac) as usize;
                let tokens = seq(len);
                let splitter = ChunkSplitter::new(&[], false, max_len, overlap, true).unwrap();
                let chunks = splitter.split(0, &tokens);

                prop_assert_eq!(chunks.first().map(|c| c.tokens[0]), Some(tokens[0]));
                prop_assert_eq!(chunks.last().and_then(|c| c.tokens.last().copied()), tokens.last().copied());
                for pair in chunks.windows(2) {
                    let (a, b) = (&pair[0].tokens, &pair[1].tokens);
                    prop_assert!(a.len() <= max_len && b.len() <= max_len);
                    prop_assert_eq!(&a[a.len() - overlap..], &b[..overlap]);
                }
            }
        }
    }
}

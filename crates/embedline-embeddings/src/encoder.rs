//! The boundary to the model runtime.
//!
//! The pipeline never sees model weights. It tokenizes through the encoder,
//! packs token sequences into a [`Batch`], submits the batch, and reads back
//! one vector per output-marked sequence.

use crate::batch::Batch;
use crate::errors::Result;

/// Vocabulary index produced by the tokenizer.
pub type TokenId = i32;

/// A transformer that encodes packed token sequences into vectors.
///
/// Implementations hold per-submission state (the vectors of the last
/// batch), so a single instance must not serve two embed calls at once.
pub trait SequenceEncoder {
    /// Tokenize `text` without a trailing terminator. `want_bos` asks for a
    /// leading beginning-of-sequence marker when the vocabulary uses one.
    fn tokenize(&self, text: &str, want_bos: bool) -> Result<Vec<TokenId>>;

    /// Width of every vector the encoder produces.
    fn native_width(&self) -> usize;

    /// Maximum number of tokens in one submission.
    fn max_batch_tokens(&self) -> usize;

    /// Beginning-of-sequence (CLS) token.
    fn bos_token(&self) -> TokenId;

    /// End-of-sequence (SEP) token.
    fn eos_token(&self) -> TokenId;

    /// Whether sequences end with [`Self::eos_token`] (`WordPiece` vocabularies).
    fn has_trailing_terminator(&self) -> bool;

    /// Run the model over every sequence in `batch`.
    ///
    /// Failures must be reported as [`crate::EmbeddingError::EncodeFailure`].
    fn submit_batch(&mut self, batch: &Batch) -> Result<()>;

    /// Pooled vector of sequence `slot` from the last submission, if the
    /// model pools per sequence.
    fn sequence_vector(&self, slot: usize) -> Option<&[f32]>;

    /// Vector at token position `index` of the last submission.
    fn token_vector(&self, index: usize) -> Option<&[f32]>;

    /// Sequence vector for `slot`, falling back to the vector at `index`.
    fn fetch_vector(&self, slot: usize, index: usize) -> Option<&[f32]> {
        self.sequence_vector(slot)
            .or_else(|| self.token_vector(index))
    }
}

impl<E: SequenceEncoder + ?Sized> SequenceEncoder for Box<E> {
    fn tokenize(&self, text: &str, want_bos: bool) -> Result<Vec<TokenId>> {
        (**self).tokenize(text, want_bos)
    }

    fn native_width(&self) -> usize {
        (**self).native_width()
    }

    fn max_batch_tokens(&self) -> usize {
        (**self).max_batch_tokens()
    }

    fn bos_token(&self) -> TokenId {
        (**self).bos_token()
    }

    fn eos_token(&self) -> TokenId {
        (**self).eos_token()
    }

    fn has_trailing_terminator(&self) -> bool {
        (**self).has_trailing_terminator()
    }

    fn submit_batch(&mut self, batch: &Batch) -> Result<()> {
        (**self).submit_batch(batch)
    }

    fn sequence_vector(&self, slot: usize) -> Option<&[f32]> {
        (**self).sequence_vector(slot)
    }

    fn token_vector(&self, index: usize) -> Option<&[f32]> {
        (**self).token_vector(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEncoder;

    #[test]
    fn boxed_encoder_delegates() {
        let boxed: Box<dyn SequenceEncoder + Send> = Box::new(MockEncoder::new(16, 64));
        assert_eq!(boxed.native_width(), 16);
        assert_eq!(boxed.max_batch_tokens(), 64);
        assert!(boxed.has_trailing_terminator());
        assert_eq!(boxed.tokenize("a b c", false).unwrap().len(), 3);
    }

    #[test]
    fn fetch_prefers_sequence_vector() {
        let mut enc = MockEncoder::new(8, 64);
        let mut batch = Batch::new(64);
        let _slot = batch.push_sequence(&[1, 50, 51], Some(2), 0).unwrap();
        enc.submit_batch(&batch).unwrap();

        let seq = enc.sequence_vector(0).unwrap().to_vec();
        assert_eq!(enc.fetch_vector(0, 3), Some(seq.as_slice()));
    }

    #[test]
    fn fetch_falls_back_to_token_vector() {
        let mut enc = MockEncoder::new(8, 64).with_sequence_pooling(false);
        let mut batch = Batch::new(64);
        let _slot = batch.push_sequence(&[1, 50, 51], Some(2), 0).unwrap();
        enc.submit_batch(&batch).unwrap();

        assert!(enc.sequence_vector(0).is_none());
        assert!(enc.fetch_vector(0, 3).is_some());
        // Context-only positions are never materialized
        assert!(enc.fetch_vector(0, 1).is_none());
    }
}

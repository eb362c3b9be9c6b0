//! Deterministic in-process encoder for tests and wiring.
//!
//! Tokens are whitespace-separated words hashed with SHA-256 into ids.
//! Each sequence's vector is derived from a SHA-256 of its token ids, so
//! identical sequences always produce identical vectors regardless of which
//! batch or slot they land in.

use sha2::{Digest, Sha256};

use crate::batch::Batch;
use crate::encoder::{SequenceEncoder, TokenId};
use crate::errors::{EmbeddingError, Result};

/// Beginning-of-sequence token id.
pub const MOCK_BOS: TokenId = 1;

/// End-of-sequence token id.
pub const MOCK_EOS: TokenId = 2;

/// Batches kept by [`MockEncoder::history`] unless configured otherwise.
pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

const FIRST_WORD_ID: u32 = 100;
const WORD_ID_SPACE: u32 = 1_000_000;

/// Hash-based [`SequenceEncoder`].
#[derive(Debug)]
pub struct MockEncoder {
    native: usize,
    capacity: usize,
    sequence_pooling: bool,
    trailing_terminator: bool,
    fail_on: Option<usize>,
    submissions: usize,
    history_limit: usize,
    history: Vec<Batch>,
    vectors: Vec<Vec<f32>>,
    token_rows: Vec<Option<usize>>,
}

impl MockEncoder {
    /// Encoder producing `native`-wide vectors from batches of up to
    /// `capacity` tokens.
    pub fn new(native: usize, capacity: usize) -> Self {
        Self {
            native,
            capacity,
            sequence_pooling: true,
            trailing_terminator: true,
            fail_on: None,
            submissions: 0,
            history_limit: DEFAULT_HISTORY_LIMIT,
            history: Vec::new(),
            vectors: Vec::new(),
            token_rows: Vec::new(),
        }
    }

    /// Whether per-sequence vectors are exposed. Without them only the
    /// output-marked token positions carry a vector.
    #[must_use]
    pub fn with_sequence_pooling(mut self, enabled: bool) -> Self {
        self.sequence_pooling = enabled;
        self
    }

    /// Whether sequences end with [`MOCK_EOS`].
    #[must_use]
    pub fn with_trailing_terminator(mut self, enabled: bool) -> Self {
        self.trailing_terminator = enabled;
        self
    }

    /// Fail the `n`th submission (zero-based).
    #[must_use]
    pub fn failing_on_batch(mut self, n: usize) -> Self {
        self.fail_on = Some(n);
        self
    }

    /// Keep at most `limit` recent batches; `0` turns recording off.
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// The most recent submitted batches, oldest first, including a failed
    /// one.
    pub fn history(&self) -> &[Batch] {
        &self.history
    }

    /// Submissions made so far, recorded or not.
    pub fn submissions(&self) -> usize {
        self.submissions
    }

    fn record(&mut self, batch: &Batch) {
        if self.history_limit == 0 {
            return;
        }
        if self.history.len() >= self.history_limit {
            let excess = self.history.len() + 1 - self.history_limit;
            let _ = self.history.drain(..excess);
        }
        self.history.push(batch.clone());
    }

    fn word_id(word: &str) -> TokenId {
        let hash = Sha256::digest(word.as_bytes());
        let raw = u32::from_le_bytes([hash[0], hash[1], hash[2], hash[3]]);
        // Bounded well below i32::MAX
        TokenId::try_from(FIRST_WORD_ID + raw % WORD_ID_SPACE).unwrap_or(TokenId::MAX)
    }

    fn hash_to_vector(&self, tokens: &[TokenId]) -> Vec<f32> {
        let mut seed = Sha256::new();
        for token in tokens {
            seed.update(token.to_le_bytes());
        }
        let seed = seed.finalize();

        let mut out = Vec::with_capacity(self.native);
        let mut block = 0u32;
        while out.len() < self.native {
            let mut hasher = Sha256::new();
            hasher.update(seed);
            hasher.update(block.to_le_bytes());
            let hash = hasher.finalize();
            // Map byte to [-1, 1], biased so vectors are not zero-mean
            out.extend(
                hash.iter()
                    .take(self.native - out.len())
                    .map(|&b| f32::from(b) / 127.5 - 0.75),
            );
            block += 1;
        }
        out
    }
}

impl SequenceEncoder for MockEncoder {
    fn tokenize(&self, text: &str, want_bos: bool) -> Result<Vec<TokenId>> {
        let bos = want_bos.then_some(MOCK_BOS);
        Ok(bos
            .into_iter()
            .chain(text.split_whitespace().map(Self::word_id))
            .collect())
    }

    fn native_width(&self) -> usize {
        self.native
    }

    fn max_batch_tokens(&self) -> usize {
        self.capacity
    }

    fn bos_token(&self) -> TokenId {
        MOCK_BOS
    }

    fn eos_token(&self) -> TokenId {
        MOCK_EOS
    }

    fn has_trailing_terminator(&self) -> bool {
        self.trailing_terminator
    }

    fn submit_batch(&mut self, batch: &Batch) -> Result<()> {
        let attempt = self.submissions;
        self.submissions += 1;
        self.record(batch);
        self.vectors.clear();
        self.token_rows.clear();

        if batch.len() > self.capacity {
            return Err(EmbeddingError::EncodeFailure(format!(
                "batch of {} tokens exceeds capacity {}",
                batch.len(),
                self.capacity
            )));
        }
        if self.fail_on == Some(attempt) {
            return Err(EmbeddingError::EncodeFailure(format!("injected failure on batch {attempt}")));
        }

        for slot in 0..batch.sequence_count() {
            let tokens = batch.sequence_tokens(slot).unwrap_or_default();
            self.vectors.push(self.hash_to_vector(tokens));
        }
        self.token_rows = vec![None; batch.len()];
        for (index, slot) in batch.output_rows() {
            self.token_rows[index] = Some(slot);
        }
        Ok(())
    }

    fn sequence_vector(&self, slot: usize) -> Option<&[f32]> {
        if !self.sequence_pooling {
            return None;
        }
        self.vectors.get(slot).map(Vec::as_slice)
    }

    fn token_vector(&self, index: usize) -> Option<&[f32]> {
        let slot = self.token_rows.get(index).copied().flatten()?;
        self.vectors.get(slot).map(Vec::as_slice)
    }
}

//! Packing chunks into fixed-capacity encoder submissions.
//!
//! A [`Batch`] is a flat token buffer with per-token position, sequence slot
//! and output flag, the layout a transformer runtime decodes in one call.
//! [`BatchScheduler`] keeps one batch open and submits it whenever the next
//! chunk would overflow it.

use std::ops::Range;

use tracing::debug;

use crate::chunk::Chunk;
use crate::encoder::TokenId;
use crate::errors::{EmbeddingError, Result};

/// Packed token sequences for one encoder submission.
#[derive(Clone, Debug)]
pub struct Batch {
    capacity: usize,
    tokens: Vec<TokenId>,
    positions: Vec<usize>,
    seq_ids: Vec<usize>,
    outputs: Vec<bool>,
    seq_starts: Vec<usize>,
    sources: Vec<usize>,
}

impl Batch {
    /// Empty batch holding at most `capacity` tokens.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            tokens: Vec::with_capacity(capacity),
            positions: Vec::with_capacity(capacity),
            seq_ids: Vec::with_capacity(capacity),
            outputs: Vec::with_capacity(capacity),
            seq_starts: Vec::new(),
            sources: Vec::new(),
        }
    }

    /// Token capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of tokens queued.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no sequence is queued.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Number of sequences (slots) queued.
    pub fn sequence_count(&self) -> usize {
        self.seq_starts.len()
    }

    /// Whether `n` more tokens fit.
    pub fn fits(&self, n: usize) -> bool {
        self.tokens.len() + n <= self.capacity
    }

    /// All queued tokens.
    pub fn tokens(&self) -> &[TokenId] {
        &self.tokens
    }

    /// Position of each token within its own sequence.
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    /// Sequence slot of each token.
    pub fn seq_ids(&self) -> &[usize] {
        &self.seq_ids
    }

    /// Whether token `index` requests an output vector.
    pub fn wants_output(&self, index: usize) -> bool {
        self.outputs.get(index).copied().unwrap_or(false)
    }

    /// Token range of sequence `slot`.
    pub fn sequence_range(&self, slot: usize) -> Option<Range<usize>> {
        let start = *self.seq_starts.get(slot)?;
        let end = self
            .seq_starts
            .get(slot + 1)
            .copied()
            .unwrap_or(self.tokens.len());
        Some(start..end)
    }

    /// Tokens of sequence `slot`.
    pub fn sequence_tokens(&self, slot: usize) -> Option<&[TokenId]> {
        self.sequence_range(slot).map(|r| &self.tokens[r])
    }

    /// Input index the sequence in `slot` was cut from.
    pub fn source(&self, slot: usize) -> Option<usize> {
        self.sources.get(slot).copied()
    }

    /// `(token index, slot)` of every output-marked token, in order.
    pub fn output_rows(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.outputs
            .iter()
            .enumerate()
            .filter(|(_, wanted)| **wanted)
            .map(|(i, _)| (i, self.seq_ids[i]))
    }

    /// Append one sequence, optionally followed by `terminator`, and return
    /// its slot. Only the sequence's last token is marked for output.
    ///
    /// The caller checks [`Self::fits`] first; overflowing the capacity is an
    /// internal error.
    pub fn push_sequence(
        &mut self,
        tokens: &[TokenId],
        terminator: Option<TokenId>,
        source: usize,
    ) -> Result<usize> {
        let len = tokens.len() + usize::from(terminator.is_some());
        if len == 0 {
            return Err(EmbeddingError::Internal("empty sequence".into()));
        }
        if !self.fits(len) {
            return Err(EmbeddingError::Internal(format!(
                "sequence of {len} tokens overflows batch ({} of {} used)",
                self.tokens.len(),
                self.capacity
            )));
        }

        let slot = self.seq_starts.len();
        self.seq_starts.push(self.tokens.len());
        self.sources.push(source);

        let seq = tokens.iter().copied().chain(terminator);
        for (pos, token) in seq.enumerate() {
            self.tokens.push(token);
            self.positions.push(pos);
            self.seq_ids.push(slot);
            self.outputs.push(pos + 1 == len);
        }
        Ok(slot)
    }

    /// Drop every queued sequence, keeping the allocation.
    pub fn clear(&mut self) {
        self.tokens.clear();
        self.positions.clear();
        self.seq_ids.clear();
        self.outputs.clear();
        self.seq_starts.clear();
        self.sources.clear();
    }
}

/// Fills one open [`Batch`] and hands it to a submit callback when full.
pub struct BatchScheduler {
    open: Batch,
    terminator: Option<TokenId>,
    submitted: usize,
}

impl BatchScheduler {
    /// Scheduler for batches of `capacity` tokens. `terminator` is appended
    /// to every chunk.
    pub fn new(capacity: usize, terminator: Option<TokenId>) -> Self {
        Self {
            open: Batch::new(capacity),
            terminator,
            submitted: 0,
        }
    }

    /// Queue `chunk`, first submitting the open batch if the chunk would
    /// overflow it.
    pub fn offer<F>(&mut self, chunk: &Chunk, submit: &mut F) -> Result<()>
    where
        F: FnMut(&Batch) -> Result<()>,
    {
        let needed = chunk.tokens.len() + usize::from(self.terminator.is_some());
        if needed > self.open.capacity() {
            return Err(EmbeddingError::Internal(format!(
                "chunk of {needed} tokens exceeds batch capacity {}",
                self.open.capacity()
            )));
        }
        if !self.open.fits(needed) {
            self.flush(submit)?;
        }
        let _ = self
            .open
            .push_sequence(&chunk.tokens, self.terminator, chunk.source_index)?;
        Ok(())
    }

    /// Submit whatever is still queued and return the number of
    /// submissions made.
    pub fn finish<F>(mut self, submit: &mut F) -> Result<usize>
    where
        F: FnMut(&Batch) -> Result<()>,
    {
        self.flush(submit)?;
        Ok(self.submitted)
    }

    fn flush<F>(&mut self, submit: &mut F) -> Result<()>
    where
        F: FnMut(&Batch) -> Result<()>,
    {
        if self.open.is_empty() {
            return Ok(());
        }
        debug!(
            batch = self.submitted,
            tokens = self.open.len(),
            sequences = self.open.sequence_count(),
            "submitting batch"
        );
        submit(&self.open)?;
        self.submitted += 1;
        self.open.clear();
        Ok(())
    }
}

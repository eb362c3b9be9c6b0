//! Mean pooling of chunk vectors into one unit vector per input.

use crate::batch::Batch;
use crate::encoder::SequenceEncoder;
use crate::errors::{EmbeddingError, Result};
use crate::normalize::{nested_renormalize, scale_to_unit};

/// Running sum for one input.
#[derive(Clone, Debug)]
struct AccumulationSlot {
    sum: Vec<f64>,
    contributions: usize,
}

/// Owns one accumulation slot per input for the length of an embed call.
#[derive(Debug)]
pub struct PoolingEngine {
    slots: Vec<AccumulationSlot>,
    native: usize,
    dims: usize,
    nested: bool,
}

impl PoolingEngine {
    /// Engine for `inputs` inputs reading `native`-wide vectors and
    /// producing `dims`-wide rows. `nested` enables Matryoshka
    /// renormalization before truncation.
    pub fn new(inputs: usize, native: usize, dims: usize, nested: bool) -> Self {
        let slot = AccumulationSlot {
            sum: vec![0.0; dims],
            contributions: 0,
        };
        Self {
            slots: vec![slot; inputs],
            native,
            dims,
            nested,
        }
    }

    /// Fold one raw chunk vector into input `source`.
    pub fn add_chunk(&mut self, source: usize, raw: &[f32]) -> Result<()> {
        if raw.len() != self.native {
            return Err(EmbeddingError::EncodeFailure(format!(
                "encoder returned {} values, expected {}",
                raw.len(),
                self.native
            )));
        }
        let dims = self.dims;
        let slot = self
            .slots
            .get_mut(source)
            .ok_or_else(|| EmbeddingError::Internal(format!("no accumulation slot for input {source}")))?;

        let mut v = if self.nested {
            nested_renormalize(raw, dims)
        } else {
            raw[..dims].iter().map(|&x| f64::from(x)).collect()
        };
        scale_to_unit(&mut v);

        for (acc, x) in slot.sum.iter_mut().zip(&v) {
            *acc += x;
        }
        slot.contributions += 1;
        Ok(())
    }

    /// Fold every output-marked sequence of a submitted batch.
    pub fn absorb<E>(&mut self, encoder: &E, batch: &Batch) -> Result<()>
    where
        E: SequenceEncoder + ?Sized,
    {
        for (index, slot) in batch.output_rows() {
            let source = batch
                .source(slot)
                .ok_or_else(|| EmbeddingError::Internal(format!("batch slot {slot} has no source")))?;
            let raw = encoder.fetch_vector(slot, index).ok_or_else(|| {
                EmbeddingError::EncodeFailure(format!("no embedding for sequence {slot} (token {index})"))
            })?;
            self.add_chunk(source, raw)?;
        }
        Ok(())
    }

    /// Chunks folded into input `source` so far.
    pub fn contributions(&self, source: usize) -> Option<usize> {
        self.slots.get(source).map(|s| s.contributions)
    }

    /// Output row width.
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Average, renormalize and write every row into `out` in input order.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn finish(self, out: &mut [f32]) -> Result<Vec<usize>> {
        let expected = self.slots.len() * self.dims;
        if out.len() < expected {
            return Err(EmbeddingError::OutputBuffer {
                expected,
                actual: out.len(),
            });
        }

        let mut counts = Vec::with_capacity(self.slots.len());
        for (index, (slot, row)) in self
            .slots
            .into_iter()
            .zip(out.chunks_exact_mut(self.dims))
            .enumerate()
        {
            if slot.contributions == 0 {
                return Err(EmbeddingError::Internal(format!("input {index} produced no chunks")));
            }
            let n = slot.contributions as f64;
            let mut mean: Vec<f64> = slot.sum.into_iter().map(|x| x / n).collect();
            scale_to_unit(&mut mean);
            for (dst, x) in row.iter_mut().zip(mean) {
                *dst = x as f32;
            }
            counts.push(slot.contributions);
        }
        Ok(counts)
    }
}

//! Vector normalization functions.
//!
//! Pooling math runs in `f64`; the encoder hands over `f32` and callers get
//! `f32` back.

/// Lower bound on the norm used as an L2 divisor.
pub const L2_EPSILON: f64 = 1e-12;

/// Added to the variance before the Matryoshka rescale.
pub const VARIANCE_EPSILON: f64 = 1e-5;

/// Compute the L2 (Euclidean) norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// L2-normalize a vector in-place. Zero vectors remain zero.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Factor that scales `v` to unit length: `1 / max(‖v‖₂, 1e-12)`.
pub fn l2_scale(v: &[f64]) -> f64 {
    let magnitude = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    1.0 / magnitude.max(L2_EPSILON)
}

/// Scale `v` in place by [`l2_scale`].
pub fn scale_to_unit(v: &mut [f64]) {
    let scale = l2_scale(v);
    for x in v.iter_mut() {
        *x *= scale;
    }
}

/// Layer-normalize a full-width vector, then keep its first `dims` components.
///
/// Mean and unbiased variance (Bessel's correction) are taken over the whole
/// native vector; only then is it truncated and rescaled by
/// `1 / sqrt(variance + 1e-5)`. The result is not unit length.
#[allow(clippy::cast_precision_loss)] // embedding widths never approach 2^52
pub fn nested_renormalize(raw: &[f32], dims: usize) -> Vec<f64> {
    let n = raw.len();
    let dims = dims.min(n);
    if n < 2 {
        return raw[..dims].iter().map(|&x| f64::from(x)).collect();
    }

    let mean = raw.iter().map(|&x| f64::from(x)).sum::<f64>() / n as f64;
    let centered: Vec<f64> = raw.iter().map(|&x| f64::from(x) - mean).collect();
    let variance = centered.iter().map(|x| x * x).sum::<f64>() / (n - 1) as f64;

    let scale = 1.0 / (variance + VARIANCE_EPSILON).sqrt();
    centered[..dims].iter().map(|x| x * scale).collect()
}

//! Zero-mean / unit-variance normalization against fixed reference statistics
//!
//! Both directions add [`EPSILON`] to the standard deviation, so a zero std
//! never produces non-finite values and the two functions stay exact inverses.

use burn::prelude::*;

/// Added to every standard deviation before dividing or multiplying
pub const EPSILON: f32 = 1e-8;

/// `(x - mean) / (std + eps)`, broadcasting `[dim]` statistics over a `[batch, dim]` tensor
pub fn normalize<B: Backend>(x: Tensor<B, 2>, mean: Tensor<B, 1>, std: Tensor<B, 1>) -> Tensor<B, 2> {
    let [_, dim] = x.dims();
    let mean = mean.reshape([1, dim]);
    let std = std.reshape([1, dim]).add_scalar(EPSILON);

    (x - mean) / std
}

/// `y * (std + eps) + mean`, the inverse of [`normalize`]
pub fn unnormalize<B: Backend>(y: Tensor<B, 2>, mean: Tensor<B, 1>, std: Tensor<B, 1>) -> Tensor<B, 2> {
    let [_, dim] = y.dims();
    let mean = mean.reshape([1, dim]);
    let std = std.reshape([1, dim]).add_scalar(EPSILON);

    y * std + mean
}

/// Host-side [`normalize`] over a flattened batch `[row0, row1, ...]`.
/// Zero-width statistics produce an empty result.
pub fn normalize_slice(x: &[f32], mean: &[f32], std: &[f32]) -> Vec<f32> {
    if mean.is_empty() {
        return Vec::new();
    }
    x.chunks_exact(mean.len())
        .flat_map(|row| {
            row.iter()
                .zip(mean.iter().zip(std))
                .map(|(&v, (&m, &s))| (v - m) / (s + EPSILON))
        })
        .collect()
}

/// Host-side [`unnormalize`] over a flattened batch
pub fn unnormalize_slice(y: &[f32], mean: &[f32], std: &[f32]) -> Vec<f32> {
    if mean.is_empty() {
        return Vec::new();
    }
    y.chunks_exact(mean.len())
        .flat_map(|row| {
            row.iter()
                .zip(mean.iter().zip(std))
                .map(|(&v, (&m, &s))| v * (s + EPSILON) + m)
        })
        .collect()
}

//! Integer-factor decimation.
//!
//! The scoring metrics shrink their inputs before DTW; a box filter over each
//! block doubles as a crude anti-alias stage, which is enough for envelope
//! and contour comparison.

/// Downsamples by averaging consecutive `factor`-sized blocks.
///
/// A factor of 0 or 1 returns the input unchanged. A short tail block is
/// averaged over the samples it actually contains.
pub fn downsample(samples: &[f32], factor: usize) -> Vec<f32> {
    if factor <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(factor)
        .map(|block| block.iter().sum::<f32>() / block.len() as f32)
        .collect()
}

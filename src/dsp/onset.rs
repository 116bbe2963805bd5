//! Onset-strength envelope and onset detection.
//!
//! Half-wave-rectified spectral flux, averaged across bins per frame. Onsets
//! are flux peaks above an adaptive mean + stddev threshold.

use crate::dsp::fft::StftPlan;

/// Per-frame onset strength: positive spectral flux over the previous frame.
///
/// The first frame has no predecessor and contributes 0. Input shorter than
/// one FFT frame yields an empty envelope.
pub fn onset_strength(samples: &[f32], plan: &StftPlan) -> Vec<f32> {
    let mags = plan.magnitudes(&plan.stft(samples));
    if mags.is_empty() {
        return Vec::new();
    }
    let mut envelope = Vec::with_capacity(mags.len());
    envelope.push(0.0);
    for pair in mags.windows(2) {
        let flux: f32 = pair[0]
            .iter()
            .zip(&pair[1])
            .map(|(prev, cur)| (cur - prev).max(0.0))
            .sum();
        envelope.push(flux / pair[0].len() as f32);
    }
    envelope
}

/// Detects onset positions as sample indices.
///
/// A frame is an onset when its flux is a local maximum and exceeds
/// mean + stddev of the envelope. Returns an empty vec when nothing
/// crosses the threshold.
pub fn detect_onsets(samples: &[f32], plan: &StftPlan) -> Vec<usize> {
    let envelope = onset_strength(samples, plan);
    if envelope.len() < 3 {
        return Vec::new();
    }

    let mean = envelope.iter().sum::<f32>() / envelope.len() as f32;
    let variance =
        envelope.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / envelope.len() as f32;
    let threshold = mean + variance.sqrt();

    let mut onsets = Vec::new();
    for i in 1..envelope.len() - 1 {
        let is_peak = envelope[i] > envelope[i - 1] && envelope[i] >= envelope[i + 1];
        if is_peak && envelope[i] > threshold {
            onsets.push(i * plan.hop());
        }
    }
    onsets
}

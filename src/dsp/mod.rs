//! Shared signal primitives used by preprocessing and scoring.

pub mod fft;
pub mod onset;
pub mod pitch;
pub mod resample;

/// Root-mean-square energy of a buffer. Empty input is 0.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Amplitude ratio to decibels, floored to avoid -inf on silence.
pub fn amplitude_to_db(amplitude: f32) -> f32 {
    20.0 * amplitude.max(1e-10).log10()
}

/// Replaces NaN and infinite samples with zero, returning how many were
/// replaced. Sanitization, not rejection: a few corrupt samples in a
/// network-delivered chunk should not kill the session.
pub fn nan_to_zero(samples: &mut [f32]) -> usize {
    let mut replaced = 0;
    for s in samples.iter_mut() {
        if !s.is_finite() {
            *s = 0.0;
            replaced += 1;
        }
    }
    replaced
}

/// Frame-wise RMS over `frame_len`-sized windows advancing by `hop`.
pub fn frame_rms(samples: &[f32], frame_len: usize, hop: usize) -> Vec<f32> {
    if samples.is_empty() || frame_len == 0 || hop == 0 {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut start = 0;
    while start < samples.len() {
        let end = (start + frame_len).min(samples.len());
        out.push(rms(&samples[start..end]));
        start += hop;
    }
    out
}

//! Default tunable constants for karascore.
//!
//! The source system went through several revisions of downsample factors,
//! DTW tolerances, and score weights; none of them is authoritative. Every
//! value here can be overridden through [`crate::config::SessionConfig`].

/// Default audio sample rate in Hz.
///
/// The reference assets and the incoming stream are delivered at 8kHz,
/// which is sufficient for vocal scoring and keeps DTW costs low.
pub const SAMPLE_RATE: u32 = 8000;

/// Epsilon added to denominators in normalization and spectral masks
/// to avoid division by zero.
pub const EPSILON: f32 = 1e-12;

/// Default top-dB threshold for silence trimming and splitting.
///
/// Frames more than this many dB below the loudest frame are treated
/// as silence.
pub const TRIM_TOP_DB: f32 = 20.0;

/// FFT size for all spectral preprocessing steps and onset analysis.
pub const N_FFT: usize = 1024;

/// Hop length between STFT frames.
pub const HOP_LENGTH: usize = 256;

/// Downsample factor applied before the amplitude metric's DTW.
///
/// Amplitude envelopes survive heavy decimation, and DTW cost is quadratic
/// in sequence length. Earlier revisions ranged 8x-64x.
pub const AMPLITUDE_DOWNSAMPLE: usize = 8;

/// Downsample factor applied before pitch extraction.
pub const PITCH_DOWNSAMPLE: usize = 4;

/// Downsample factor applied before the rhythm metric's onset envelope.
pub const RHYTHM_DOWNSAMPLE: usize = 2;

/// DTW tolerance for the amplitude metric.
///
/// Tight: amplitude differences should count heavily.
pub const AMPLITUDE_TOLERANCE: f32 = 0.1;

/// DTW tolerance for the pitch metric.
///
/// Loose: contours are in Hz, so per-step distances are large and a singer
/// slightly off-key should not be clipped into oblivion.
pub const PITCH_TOLERANCE: f32 = 10.0;

/// DTW tolerance for the rhythm metric.
pub const RHYTHM_TOLERANCE: f32 = 1.0;

/// Lower bound of the tracked vocal pitch range in Hz (C2).
pub const PITCH_FMIN: f32 = 65.41;

/// Upper bound of the tracked vocal pitch range in Hz (C7).
pub const PITCH_FMAX: f32 = 2093.0;

/// Pitch score when neither the user nor the reference produced a voiced
/// contour. Nothing to compare, so stay neutral.
pub const PITCH_SCORE_BOTH_UNVOICED: f32 = 0.5;

/// Pitch score when the reference is voiced but the user is not.
pub const PITCH_SCORE_USER_UNVOICED: f32 = 0.1;

/// Metric score below which feedback switches to the "needs improvement"
/// message for the weakest metric.
pub const FEEDBACK_THRESHOLD: f32 = 0.8;

/// Number of equal parts used by chunked parallel DTW.
pub const DTW_PARALLEL_CHUNKS: usize = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_range_spans_vocal_octaves() {
        assert!(PITCH_FMIN < 100.0);
        assert!(PITCH_FMAX > 1000.0);
        assert!(PITCH_FMIN < PITCH_FMAX);
    }

    #[test]
    fn hop_divides_fft_size() {
        assert_eq!(N_FFT % HOP_LENGTH, 0);
    }
}

//! Per-chunk metric scoring.
//!
//! Five metrics per chunk: two linguistic (sharing at most one transcription
//! of each side), amplitude, pitch, and rhythm. The three signal metrics and
//! the two transcription calls fan out onto scoped threads and join before
//! the chunk's scores are assembled. A failing metric scores 0 and is
//! logged; it never aborts the chunk.

pub mod text;

use crate::defaults;
use crate::dsp::fft::StftPlan;
use crate::dsp::{onset, pitch, resample};
use crate::dtw::DtwHelper;
use crate::error::Result;
use crate::metric::{Metric, PerMetric};
use crate::stt::Transcriber;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use text::text_similarity;

/// Tunable scoring parameters.
///
/// The source system never converged on these numbers across revisions, so
/// all of them are configuration rather than constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerTuning {
    /// Downsample factors applied before each signal metric.
    pub amplitude_downsample: usize,
    pub pitch_downsample: usize,
    pub rhythm_downsample: usize,
    /// DTW step-distance clips per metric.
    pub amplitude_tolerance: f32,
    pub pitch_tolerance: f32,
    pub rhythm_tolerance: f32,
    /// Tracked vocal range in Hz.
    pub pitch_fmin: f32,
    pub pitch_fmax: f32,
    /// Fallback scores for degenerate pitch content.
    pub pitch_score_both_unvoiced: f32,
    pub pitch_score_user_unvoiced: f32,
}

impl Default for ScorerTuning {
    fn default() -> Self {
        Self {
            amplitude_downsample: defaults::AMPLITUDE_DOWNSAMPLE,
            pitch_downsample: defaults::PITCH_DOWNSAMPLE,
            rhythm_downsample: defaults::RHYTHM_DOWNSAMPLE,
            amplitude_tolerance: defaults::AMPLITUDE_TOLERANCE,
            pitch_tolerance: defaults::PITCH_TOLERANCE,
            rhythm_tolerance: defaults::RHYTHM_TOLERANCE,
            pitch_fmin: defaults::PITCH_FMIN,
            pitch_fmax: defaults::PITCH_FMAX,
            pitch_score_both_unvoiced: defaults::PITCH_SCORE_BOTH_UNVOICED,
            pitch_score_user_unvoiced: defaults::PITCH_SCORE_USER_UNVOICED,
        }
    }
}

/// Score for a signal metric whose input vanished (zero-length segment at
/// track end, or too short to analyze). Neutral rather than punitive.
const DEGENERATE_SIGNAL_SCORE: f32 = 0.5;

/// Per-chunk transcription results, produced once by the fan-out and then
/// shared by both linguistic metrics.
#[derive(Debug, Clone, Default)]
pub struct TranscriptionCache {
    /// User-side transcription, if the backend succeeded.
    pub user: Option<String>,
    /// Reference-side transcription, if the backend succeeded.
    pub reference: Option<String>,
}

/// Computes the five per-chunk metric scores.
pub struct AudioScorer {
    transcriber: Arc<dyn Transcriber>,
    dtw: DtwHelper,
    tuning: ScorerTuning,
    onset_plan: StftPlan,
}

impl AudioScorer {
    pub fn new(transcriber: Arc<dyn Transcriber>, dtw: DtwHelper, tuning: ScorerTuning) -> Self {
        Self {
            transcriber,
            dtw,
            tuning,
            onset_plan: StftPlan::new(defaults::N_FFT, defaults::HOP_LENGTH),
        }
    }

    /// Scores one chunk against its reference segment.
    ///
    /// `chunk` and `reference` carry each metric's independently preprocessed
    /// buffer. The user audio is transcribed at most once (the accuracy
    /// metric's buffer) and the reference at most once (the similarity
    /// metric's buffer); both linguistic metrics read the cached texts.
    pub fn process_audio_chunk(
        &self,
        chunk: &PerMetric<Vec<f32>>,
        reference: &PerMetric<Vec<f32>>,
        actual_lyrics: &str,
        sample_rate: u32,
    ) -> PerMetric<f32> {
        let (amplitude, pitch, rhythm, cache) = std::thread::scope(|scope| {
            let amplitude = scope.spawn(|| {
                self.amplitude_score(&chunk.amplitude, &reference.amplitude)
            });
            let pitch = scope.spawn(|| {
                self.pitch_score(&chunk.pitch, &reference.pitch, sample_rate)
            });
            let rhythm = scope.spawn(|| {
                self.rhythm_score(&chunk.rhythm, &reference.rhythm)
            });
            let user_text = scope.spawn(|| {
                self.transcriber
                    .transcribe(&chunk.linguistic_accuracy, sample_rate)
            });
            let reference_text = scope.spawn(|| {
                self.transcriber
                    .transcribe(&reference.linguistic_similarity, sample_rate)
            });

            let cache = TranscriptionCache {
                user: join_transcription(user_text.join(), "user"),
                reference: join_transcription(reference_text.join(), "reference"),
            };
            (
                join_metric(amplitude.join(), Metric::Amplitude),
                join_metric(pitch.join(), Metric::Pitch),
                join_metric(rhythm.join(), Metric::Rhythm),
                cache,
            )
        });

        let linguistic_accuracy = match &cache.user {
            Some(user) => text_similarity(user, actual_lyrics),
            None => 0.0,
        };
        let linguistic_similarity = match (&cache.user, &cache.reference) {
            (Some(user), Some(reference)) => text_similarity(user, reference),
            _ => 0.0,
        };

        PerMetric {
            linguistic_accuracy,
            linguistic_similarity,
            amplitude,
            pitch,
            rhythm,
        }
    }

    /// DTW over heavily downsampled raw samples, tight tolerance, split into
    /// parallel parts.
    pub fn amplitude_score(&self, user: &[f32], reference: &[f32]) -> Result<f32> {
        if user.is_empty() || reference.is_empty() {
            return Ok(DEGENERATE_SIGNAL_SCORE);
        }
        let user = resample::downsample(user, self.tuning.amplitude_downsample);
        let reference = resample::downsample(reference, self.tuning.amplitude_downsample);
        self.dtw.compute_similarity_chunked(
            &user,
            &reference,
            Some(self.tuning.amplitude_tolerance),
            defaults::DTW_PARALLEL_CHUNKS,
        )
    }

    /// DTW over pitch contours, loose tolerance, with fixed fallbacks when a
    /// side has no voiced content.
    pub fn pitch_score(&self, user: &[f32], reference: &[f32], sample_rate: u32) -> Result<f32> {
        if user.is_empty() || reference.is_empty() {
            return Ok(DEGENERATE_SIGNAL_SCORE);
        }
        let factor = self.tuning.pitch_downsample.max(1);
        let user = resample::downsample(user, factor);
        let reference = resample::downsample(reference, factor);
        let effective_rate = (sample_rate as usize / factor).max(1) as u32;

        let config = pitch::PitchConfig {
            fmin: self.tuning.pitch_fmin,
            fmax: self.tuning.pitch_fmax.min(effective_rate as f32 / 2.0),
            ..pitch::PitchConfig::default()
        };
        let user_contour = pitch::fill_unvoiced(&pitch::pitch_contour(&user, effective_rate, &config));
        let reference_contour =
            pitch::fill_unvoiced(&pitch::pitch_contour(&reference, effective_rate, &config));

        match (user_contour, reference_contour) {
            (Some(user), Some(reference)) => {
                self.dtw
                    .compute_similarity(&user, &reference, Some(self.tuning.pitch_tolerance))
            }
            (None, Some(_)) => Ok(self.tuning.pitch_score_user_unvoiced),
            // Reference unvoiced: nothing to match against, stay neutral.
            _ => Ok(self.tuning.pitch_score_both_unvoiced),
        }
    }

    /// DTW over onset-strength envelopes, medium tolerance.
    pub fn rhythm_score(&self, user: &[f32], reference: &[f32]) -> Result<f32> {
        if user.is_empty() || reference.is_empty() {
            return Ok(DEGENERATE_SIGNAL_SCORE);
        }
        let user = resample::downsample(user, self.tuning.rhythm_downsample);
        let reference = resample::downsample(reference, self.tuning.rhythm_downsample);
        let user_envelope = onset::onset_strength(&user, &self.onset_plan);
        let reference_envelope = onset::onset_strength(&reference, &self.onset_plan);
        if user_envelope.is_empty() || reference_envelope.is_empty() {
            return Ok(DEGENERATE_SIGNAL_SCORE);
        }
        self.dtw.compute_similarity(
            &user_envelope,
            &reference_envelope,
            Some(self.tuning.rhythm_tolerance),
        )
    }
}

fn join_metric(
    joined: std::thread::Result<Result<f32>>,
    metric: Metric,
) -> f32 {
    match joined {
        Ok(Ok(score)) => score,
        Ok(Err(e)) => {
            log::warn!("{metric} scoring failed, contributing 0: {e}");
            0.0
        }
        Err(_) => {
            log::warn!("{metric} scoring panicked, contributing 0");
            0.0
        }
    }
}

fn join_transcription(
    joined: std::thread::Result<Result<String>>,
    side: &str,
) -> Option<String> {
    match joined {
        Ok(Ok(text)) => Some(text),
        Ok(Err(e)) => {
            log::warn!("{side} transcription failed: {e}");
            None
        }
        Err(_) => {
            log::warn!("{side} transcription panicked");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stt::MockTranscriber;

    fn tone(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn scorer_with(mock: Arc<MockTranscriber>) -> AudioScorer {
        AudioScorer::new(mock, DtwHelper::default(), ScorerTuning::default())
    }

    fn per_metric(buffer: Vec<f32>) -> PerMetric<Vec<f32>> {
        PerMetric::from_fn(|_| buffer.clone())
    }

    #[test]
    fn test_identical_buffers_score_near_one_on_signal_metrics() {
        let mock = Arc::new(MockTranscriber::new("mock").with_response("hello"));
        let scorer = scorer_with(mock);
        let audio = tone(440.0, 8000, 16000);
        let scores =
            scorer.process_audio_chunk(&per_metric(audio.clone()), &per_metric(audio), "hello", 8000);
        assert!(scores.amplitude > 0.99, "amplitude {}", scores.amplitude);
        assert!(scores.rhythm > 0.99, "rhythm {}", scores.rhythm);
        assert!(scores.pitch > 0.9, "pitch {}", scores.pitch);
        assert!((scores.linguistic_accuracy - 1.0).abs() < 1e-6);
        assert!((scores.linguistic_similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_transcription_called_once_per_side() {
        let mock = Arc::new(MockTranscriber::new("mock").with_response("text"));
        let scorer = scorer_with(mock.clone());
        let audio = tone(440.0, 8000, 8000);
        let _ = scorer.process_audio_chunk(&per_metric(audio.clone()), &per_metric(audio), "text", 8000);
        // One user call + one reference call, never more.
        assert_eq!(mock.call_count(), 2);
    }

    #[test]
    fn test_failing_transcriber_zeroes_linguistic_metrics_only() {
        let mock = Arc::new(MockTranscriber::new("mock").with_failure());
        let scorer = scorer_with(mock);
        let audio = tone(440.0, 8000, 16000);
        let scores =
            scorer.process_audio_chunk(&per_metric(audio.clone()), &per_metric(audio), "lyrics", 8000);
        assert_eq!(scores.linguistic_accuracy, 0.0);
        assert_eq!(scores.linguistic_similarity, 0.0);
        assert!(scores.amplitude > 0.99);
        assert!(scores.rhythm > 0.99);
    }

    #[test]
    fn test_amplitude_prefers_matching_signal() {
        let mock = Arc::new(MockTranscriber::new("mock"));
        let scorer = scorer_with(mock);
        let a = tone(440.0, 8000, 8000);
        let different: Vec<f32> = a.iter().map(|v| v * 0.2 + 0.4).collect();
        let same = scorer.amplitude_score(&a, &a).expect("valid");
        let other = scorer.amplitude_score(&a, &different).expect("valid");
        assert!(same > other);
    }

    #[test]
    fn test_pitch_fallback_when_user_unvoiced() {
        let mock = Arc::new(MockTranscriber::new("mock"));
        let scorer = scorer_with(mock);
        let silence = vec![0.0f32; 16000];
        let voiced = tone(330.0, 8000, 16000);
        let score = scorer.pitch_score(&silence, &voiced, 8000).expect("valid");
        assert_eq!(score, defaults::PITCH_SCORE_USER_UNVOICED);
    }

    #[test]
    fn test_pitch_fallback_when_both_unvoiced() {
        let mock = Arc::new(MockTranscriber::new("mock"));
        let scorer = scorer_with(mock);
        let silence = vec![0.0f32; 16000];
        let score = scorer.pitch_score(&silence, &silence, 8000).expect("valid");
        assert_eq!(score, defaults::PITCH_SCORE_BOTH_UNVOICED);
    }

    #[test]
    fn test_empty_segment_scores_neutral_not_error() {
        let mock = Arc::new(MockTranscriber::new("mock"));
        let scorer = scorer_with(mock);
        let audio = tone(440.0, 8000, 8000);
        assert_eq!(
            scorer.amplitude_score(&audio, &[]).expect("degenerate ok"),
            DEGENERATE_SIGNAL_SCORE
        );
        assert_eq!(
            scorer.rhythm_score(&[], &audio).expect("degenerate ok"),
            DEGENERATE_SIGNAL_SCORE
        );
        assert_eq!(
            scorer.pitch_score(&[], &audio, 8000).expect("degenerate ok"),
            DEGENERATE_SIGNAL_SCORE
        );
    }

    #[test]
    fn test_silence_chunk_matching_silent_reference() {
        // Reference track of silence; user sings... also silence. Amplitude
        // and rhythm should both report a perfect match.
        let mock = Arc::new(MockTranscriber::new("mock"));
        let scorer = scorer_with(mock);
        let silence = vec![0.0f32; 16000];
        assert!(scorer.amplitude_score(&silence, &silence).expect("valid") > 0.999);
        assert!(scorer.rhythm_score(&silence, &silence).expect("valid") > 0.999);
    }
}

//! Session orchestrator.
//!
//! One `Pipeline` per streaming session: it owns the karaoke reference data,
//! the preprocessor, and the scorer, feeds each arriving chunk through all
//! of them in order, and accumulates the running weighted score. Chunks must
//! arrive in order - the reference cursor advance is stateful.

use crate::config::SessionConfig;
use crate::dsp;
use crate::dtw::DtwHelper;
use crate::error::{KarascoreError, Result};
use crate::karaoke::{KaraokeData, LyricTimeline, ReferenceTrack};
use crate::metric::{Metric, PerMetric};
use crate::preprocess::{AudioPreprocessor, StepParams};
use crate::scorer::AudioScorer;
use crate::stt::Transcriber;
use std::sync::Arc;

/// Lifecycle of a scoring session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No chunk processed yet.
    Created,
    /// First chunk aligned; scoring chunks as they arrive.
    Streaming,
    /// Final score produced; no further chunks accepted.
    Finalized,
}

/// Result of scoring one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOutcome {
    /// Weighted score of this chunk alone.
    pub instant_score: f32,
    /// Weighted average over all chunks so far.
    pub running_average: f32,
    /// Human-readable commentary derived from this chunk's metric scores.
    pub feedback: String,
}

/// End-of-session result.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalOutcome {
    /// Weighted average over the whole session.
    pub average_score: f32,
    pub feedback: String,
}

/// Stateful per-session scoring pipeline.
pub struct Pipeline {
    config: SessionConfig,
    karaoke: KaraokeData,
    preprocessor: AudioPreprocessor,
    scorer: AudioScorer,
    cumulative: PerMetric<f32>,
    chunk_count: u32,
    state: SessionState,
}

impl Pipeline {
    /// Builds a session. Configuration problems surface here, not mid-stream.
    pub fn new(
        track: ReferenceTrack,
        lyrics: LyricTimeline,
        config: SessionConfig,
        transcriber: Arc<dyn Transcriber>,
    ) -> Result<Self> {
        config.validate()?;
        let dtw = DtwHelper::new(config.dtw_backend);
        let scorer = AudioScorer::new(transcriber, dtw, config.tuning);
        let karaoke = KaraokeData::new(track, lyrics);
        Ok(Self {
            config,
            karaoke,
            preprocessor: AudioPreprocessor::new(),
            scorer,
            cumulative: PerMetric::default(),
            chunk_count: 0,
            state: SessionState::Created,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn chunk_count(&self) -> u32 {
        self.chunk_count
    }

    /// Processes one chunk: align (first chunk only), sanitize, slice the
    /// matching reference segment, preprocess per metric, score, accumulate.
    pub fn process_and_score(&mut self, chunk: &[f32]) -> Result<ChunkOutcome> {
        if self.state == SessionState::Finalized {
            return Err(KarascoreError::SessionFinalized);
        }

        if !self.karaoke.is_aligned() {
            self.karaoke.align_audio(chunk, self.config.alignment);
            self.state = SessionState::Streaming;
        }

        let mut chunk = chunk.to_vec();
        let replaced = dsp::nan_to_zero(&mut chunk);
        if replaced > 0 {
            log::warn!("audio chunk contained {replaced} non-finite samples, zeroed");
        }

        let (original, accompaniment) = {
            let (original, accompaniment) = self.karaoke.get_next_segment(chunk.len())?;
            (original.to_vec(), accompaniment.to_vec())
        };

        // The accompaniment is the backing-track bleed both signals carry;
        // reference-driven steps (noise reduction, masking) subtract it.
        let processed_chunk = self.preprocess_per_metric(&chunk, &accompaniment, true)?;
        let processed_original = self.preprocess_per_metric(&original, &accompaniment, false)?;

        let lyrics = self.karaoke.get_lyrics(None, None);
        log::debug!("scoring chunk {} against lyrics {lyrics:?}", self.chunk_count);
        let scores = self.scorer.process_audio_chunk(
            &processed_chunk,
            &processed_original,
            &lyrics,
            self.config.sample_rate,
        );

        let instant_score = scores.weighted_sum(&self.config.weights);
        let feedback = self.feedback_for(&scores);

        for metric in Metric::ALL {
            *self.cumulative.get_mut(metric) += scores.get(metric);
        }
        self.chunk_count += 1;

        Ok(ChunkOutcome {
            instant_score,
            running_average: self.running_average(),
            feedback,
        })
    }

    /// Final weighted average and feedback over the whole session.
    ///
    /// Requires at least one processed chunk; an empty session is a protocol
    /// error, not a zero score.
    pub fn final_score(&mut self) -> Result<FinalOutcome> {
        if self.chunk_count == 0 {
            return Err(KarascoreError::EmptySession);
        }
        self.state = SessionState::Finalized;
        let averages = self.average_scores();
        Ok(FinalOutcome {
            average_score: self.running_average(),
            feedback: self.feedback_for(&averages),
        })
    }

    /// Per-metric running averages.
    pub fn average_scores(&self) -> PerMetric<f32> {
        let count = self.chunk_count.max(1) as f32;
        self.cumulative.map(|_, &sum| sum / count)
    }

    fn running_average(&self) -> f32 {
        self.average_scores().weighted_sum(&self.config.weights)
    }

    fn preprocess_per_metric(
        &self,
        audio: &[f32],
        reference: &[f32],
        is_chunk: bool,
    ) -> Result<PerMetric<Vec<f32>>> {
        let params = StepParams::new(self.config.sample_rate).with_reference(reference);
        let mut out = PerMetric::default();
        for metric in Metric::ALL {
            let chains = self.config.preprocessing.get(metric);
            let steps = if is_chunk { &chains.chunk } else { &chains.original };
            *out.get_mut(metric) = self.preprocessor.preprocess_audio(audio, steps, &params)?;
        }
        Ok(out)
    }

    /// Weakest metric below the threshold gets its "needs improvement"
    /// message; otherwise the strongest metric gets its praise message.
    fn feedback_for(&self, scores: &PerMetric<f32>) -> String {
        let (lowest_metric, lowest) = scores.min_metric();
        if lowest < crate::defaults::FEEDBACK_THRESHOLD {
            self.config.feedback.get(lowest_metric).low.clone()
        } else {
            let (highest_metric, _) = scores.max_metric();
            self.config.feedback.get(highest_metric).high.clone()
        }
    }
}

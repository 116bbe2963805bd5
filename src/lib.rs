//! karascore - Real-time karaoke vocal scoring
//!
//! Scores a singer's audio chunks against a reference recording across five
//! metrics (lyric accuracy, vocal similarity, amplitude, pitch, rhythm) and
//! streams instant and running scores back as the song plays.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod config;
pub mod defaults;
pub mod dsp;
pub mod dtw;
pub mod error;
pub mod karaoke;
pub mod metric;
pub mod pipeline;
pub mod preprocess;
pub mod scorer;
pub mod session;
pub mod stt;

// Core traits and session entry points
pub use stt::transcriber::{MockTranscriber, Transcriber};

// Pipeline
pub use pipeline::{ChunkOutcome, FinalOutcome, Pipeline, SessionState};
pub use session::{SessionEvent, SessionHandle};

// Error handling
pub use error::{KarascoreError, Result};

// Config and domain data
pub use config::SessionConfig;
pub use karaoke::{AlignmentMethod, KaraokeData, LyricEntry, LyricTimeline, ReferenceTrack};
pub use metric::{Metric, PerMetric};

// Scoring building blocks
pub use dtw::{DtwBackend, DtwHelper};
pub use preprocess::{AudioPreprocessor, PreprocessStep, StepParams};
pub use scorer::{AudioScorer, ScorerTuning};

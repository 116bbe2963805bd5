//! Immutable session configuration.
//!
//! Constructed once (defaults, or a TOML file) and moved into each session's
//! `Pipeline`. There is no process-wide configuration state.

use crate::defaults;
use crate::dtw::DtwBackend;
use crate::error::{KarascoreError, Result};
use crate::karaoke::AlignmentMethod;
use crate::metric::{Metric, PerMetric};
use crate::preprocess::PreprocessStep;
use crate::scorer::ScorerTuning;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Step chains for one metric: incoming chunks and the reference segment are
/// conditioned independently.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StepChains {
    pub chunk: Vec<PreprocessStep>,
    pub original: Vec<PreprocessStep>,
}

impl StepChains {
    pub fn same(steps: Vec<PreprocessStep>) -> Self {
        Self {
            chunk: steps.clone(),
            original: steps,
        }
    }
}

/// Feedback strings for one metric.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeedbackMessages {
    /// Shown when this metric is the weakest and below the threshold.
    pub low: String,
    /// Shown when this metric is the strongest and all are healthy.
    pub high: String,
}

impl FeedbackMessages {
    fn new(low: &str, high: &str) -> Self {
        Self {
            low: low.to_string(),
            high: high.to_string(),
        }
    }
}

/// Full configuration surface consumed by a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub sample_rate: u32,
    /// How the first chunk positions the cursor.
    pub alignment: AlignmentMethod,
    pub dtw_backend: DtwBackend,
    /// Per-metric weights; by convention they sum to 1.
    pub weights: PerMetric<f32>,
    pub preprocessing: PerMetric<StepChains>,
    pub feedback: PerMetric<FeedbackMessages>,
    pub tuning: ScorerTuning,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            alignment: AlignmentMethod::Start,
            dtw_backend: DtwBackend::default(),
            weights: PerMetric {
                linguistic_accuracy: 0.3,
                linguistic_similarity: 0.1,
                amplitude: 0.2,
                pitch: 0.2,
                rhythm: 0.2,
            },
            preprocessing: PerMetric {
                linguistic_accuracy: StepChains::same(vec![
                    PreprocessStep::Normalize,
                    PreprocessStep::TrimSilences,
                ]),
                linguistic_similarity: StepChains::same(vec![
                    PreprocessStep::Normalize,
                    PreprocessStep::TrimSilences,
                ]),
                amplitude: StepChains::same(vec![PreprocessStep::Normalize]),
                pitch: StepChains::same(vec![PreprocessStep::Normalize]),
                rhythm: StepChains::same(vec![PreprocessStep::Normalize]),
            },
            feedback: PerMetric {
                linguistic_accuracy: FeedbackMessages::new(
                    "Focus on the lyrics - try singing along with the words on screen.",
                    "Great lyric delivery - every word lands!",
                ),
                linguistic_similarity: FeedbackMessages::new(
                    "Try to phrase the words the way the original singer does.",
                    "Your phrasing matches the original beautifully!",
                ),
                amplitude: FeedbackMessages::new(
                    "Match the song's energy - watch your volume against the original.",
                    "Your dynamics are spot on!",
                ),
                pitch: FeedbackMessages::new(
                    "Your pitch is drifting - listen closely and match the melody.",
                    "Excellent pitch control!",
                ),
                rhythm: FeedbackMessages::new(
                    "Watch the timing - try to lock in with the beat.",
                    "Your timing is rock solid!",
                ),
            },
            tuning: ScorerTuning::default(),
        }
    }
}

impl SessionConfig {
    /// Loads configuration from a TOML file.
    ///
    /// Missing fields fall back to defaults; unknown preprocessing step names
    /// or malformed values fail here rather than mid-session.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                KarascoreError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                KarascoreError::Io(e)
            }
        })?;
        let config: SessionConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values a type-correct TOML file can still get wrong.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(KarascoreError::ConfigInvalidValue {
                key: "sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        for (metric, &weight) in self.weights.iter() {
            if !weight.is_finite() || weight < 0.0 {
                return Err(KarascoreError::ConfigInvalidValue {
                    key: format!("weights.{metric}"),
                    message: format!("must be a non-negative finite number, got {weight}"),
                });
            }
        }
        for (key, value) in [
            ("tuning.amplitude_tolerance", self.tuning.amplitude_tolerance),
            ("tuning.pitch_tolerance", self.tuning.pitch_tolerance),
            ("tuning.rhythm_tolerance", self.tuning.rhythm_tolerance),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(KarascoreError::ConfigInvalidValue {
                    key: key.to_string(),
                    message: format!("must be a positive finite number, got {value}"),
                });
            }
        }
        if self.tuning.pitch_fmin <= 0.0 || self.tuning.pitch_fmin >= self.tuning.pitch_fmax {
            return Err(KarascoreError::ConfigInvalidValue {
                key: "tuning.pitch_fmin".to_string(),
                message: "pitch range must satisfy 0 < fmin < fmax".to_string(),
            });
        }
        Ok(())
    }

    /// Weight for one metric.
    pub fn weight(&self, metric: Metric) -> f32 {
        *self.weights.get(metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SessionConfig::default();
        config.validate().expect("defaults must validate");
        let total: f32 = Metric::ALL.iter().map(|&m| config.weight(m)).sum();
        assert!((total - 1.0).abs() < 1e-6, "default weights sum to {total}");
    }

    #[test]
    fn test_toml_round_trip() {
        let config = SessionConfig::default();
        let toml = toml::to_string(&config).expect("serialize");
        let back: SessionConfig = toml::from_str(&toml).expect("deserialize");
        assert_eq!(back, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SessionConfig = toml::from_str("sample_rate = 16000\n").expect("parses");
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.weights, SessionConfig::default().weights);
    }

    #[test]
    fn test_unknown_step_name_fails_to_parse() {
        let toml = r#"
            [preprocessing.linguistic_accuracy]
            chunk = ["normalize", "reverse_audio"]
        "#;
        assert!(toml::from_str::<SessionConfig>(toml).is_err());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut config = SessionConfig::default();
        config.weights.pitch = -0.5;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, KarascoreError::ConfigInvalidValue { .. }));
    }

    #[test]
    fn test_zero_sample_rate_rejected() {
        let mut config = SessionConfig::default();
        config.sample_rate = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_pitch_range_rejected() {
        let mut config = SessionConfig::default();
        config.tuning.pitch_fmin = 500.0;
        config.tuning.pitch_fmax = 100.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_config_file_not_found() {
        let err = SessionConfig::load(Path::new("/nonexistent/karascore.toml")).unwrap_err();
        assert!(matches!(err, KarascoreError::ConfigFileNotFound { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("karascore.toml");
        std::fs::write(&path, "sample_rate = 44100\n[weights]\nlinguistic_accuracy = 0.5\nlinguistic_similarity = 0.1\namplitude = 0.2\npitch = 0.1\nrhythm = 0.1\n").expect("write");
        let config = SessionConfig::load(&path).expect("loads");
        assert_eq!(config.sample_rate, 44100);
        assert!((config.weights.linguistic_accuracy - 0.5).abs() < 1e-6);
    }
}

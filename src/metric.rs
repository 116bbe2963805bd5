//! Metric identifiers and the per-metric value container.
//!
//! The five scored metrics form a closed catalog. `PerMetric<T>` carries one
//! value for each of them, which makes "missing weight for a scored metric"
//! unrepresentable instead of a runtime lookup failure.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The five perceptual scoring metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Transcribed user audio vs. the expected lyrics.
    LinguisticAccuracy,
    /// Transcribed user audio vs. the transcribed reference audio.
    LinguisticSimilarity,
    /// DTW over downsampled raw samples.
    Amplitude,
    /// DTW over pitch contours.
    Pitch,
    /// DTW over onset-strength envelopes.
    Rhythm,
}

impl Metric {
    /// All metrics, in scoring order.
    pub const ALL: [Metric; 5] = [
        Metric::LinguisticAccuracy,
        Metric::LinguisticSimilarity,
        Metric::Amplitude,
        Metric::Pitch,
        Metric::Rhythm,
    ];

    /// Stable snake_case name, matching configuration keys.
    pub fn name(&self) -> &'static str {
        match self {
            Metric::LinguisticAccuracy => "linguistic_accuracy",
            Metric::LinguisticSimilarity => "linguistic_similarity",
            Metric::Amplitude => "amplitude",
            Metric::Pitch => "pitch",
            Metric::Rhythm => "rhythm",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One value of type `T` per metric.
///
/// Deserialization requires all five fields, so a configuration that omits
/// a metric's weight or step chain fails at load time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerMetric<T> {
    pub linguistic_accuracy: T,
    pub linguistic_similarity: T,
    pub amplitude: T,
    pub pitch: T,
    pub rhythm: T,
}

impl<T> PerMetric<T> {
    /// Builds a `PerMetric` by evaluating `f` for each metric.
    pub fn from_fn(mut f: impl FnMut(Metric) -> T) -> Self {
        Self {
            linguistic_accuracy: f(Metric::LinguisticAccuracy),
            linguistic_similarity: f(Metric::LinguisticSimilarity),
            amplitude: f(Metric::Amplitude),
            pitch: f(Metric::Pitch),
            rhythm: f(Metric::Rhythm),
        }
    }

    pub fn get(&self, metric: Metric) -> &T {
        match metric {
            Metric::LinguisticAccuracy => &self.linguistic_accuracy,
            Metric::LinguisticSimilarity => &self.linguistic_similarity,
            Metric::Amplitude => &self.amplitude,
            Metric::Pitch => &self.pitch,
            Metric::Rhythm => &self.rhythm,
        }
    }

    pub fn get_mut(&mut self, metric: Metric) -> &mut T {
        match metric {
            Metric::LinguisticAccuracy => &mut self.linguistic_accuracy,
            Metric::LinguisticSimilarity => &mut self.linguistic_similarity,
            Metric::Amplitude => &mut self.amplitude,
            Metric::Pitch => &mut self.pitch,
            Metric::Rhythm => &mut self.rhythm,
        }
    }

    /// Iterates `(metric, value)` pairs in scoring order.
    pub fn iter(&self) -> impl Iterator<Item = (Metric, &T)> {
        Metric::ALL.iter().map(move |&m| (m, self.get(m)))
    }

    /// Applies `f` to every value, keeping the metric association.
    pub fn map<U>(&self, mut f: impl FnMut(Metric, &T) -> U) -> PerMetric<U> {
        PerMetric::from_fn(|m| f(m, self.get(m)))
    }
}

impl<T: Default> Default for PerMetric<T> {
    fn default() -> Self {
        Self::from_fn(|_| T::default())
    }
}

impl PerMetric<f32> {
    /// Weighted sum against another `PerMetric<f32>` (typically the weights).
    pub fn weighted_sum(&self, weights: &PerMetric<f32>) -> f32 {
        Metric::ALL
            .iter()
            .map(|&m| self.get(m) * weights.get(m))
            .sum()
    }

    /// Metric with the smallest value (first wins on ties).
    pub fn min_metric(&self) -> (Metric, f32) {
        self.extreme_by(|candidate, best| candidate < best)
    }

    /// Metric with the largest value (first wins on ties).
    pub fn max_metric(&self) -> (Metric, f32) {
        self.extreme_by(|candidate, best| candidate > best)
    }

    fn extreme_by(&self, better: impl Fn(f32, f32) -> bool) -> (Metric, f32) {
        let mut result = (Metric::ALL[0], *self.get(Metric::ALL[0]));
        for &m in &Metric::ALL[1..] {
            let v = *self.get(m);
            if better(v, result.1) {
                result = (m, v);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_snake_case() {
        for m in Metric::ALL {
            assert!(!m.name().is_empty());
            assert_eq!(m.name(), m.name().to_lowercase());
        }
    }

    #[test]
    fn test_from_fn_assigns_per_metric() {
        let values = PerMetric::from_fn(|m| m.name().len());
        assert_eq!(*values.get(Metric::Pitch), "pitch".len());
        assert_eq!(
            *values.get(Metric::LinguisticAccuracy),
            "linguistic_accuracy".len()
        );
    }

    #[test]
    fn test_weighted_sum() {
        let scores = PerMetric {
            linguistic_accuracy: 1.0,
            linguistic_similarity: 0.5,
            amplitude: 0.0,
            pitch: 1.0,
            rhythm: 0.0,
        };
        let weights = PerMetric {
            linguistic_accuracy: 0.2,
            linguistic_similarity: 0.2,
            amplitude: 0.2,
            pitch: 0.2,
            rhythm: 0.2,
        };
        let sum = scores.weighted_sum(&weights);
        assert!((sum - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_sum_bounded_for_unit_weights() {
        // Scores in [0,1] with weights summing to 1 stay in [0,1].
        let scores = PerMetric::from_fn(|_| 0.93_f32);
        let weights = PerMetric::from_fn(|_| 0.2_f32);
        let sum = scores.weighted_sum(&weights);
        assert!((0.0..=1.0).contains(&sum));
    }

    #[test]
    fn test_min_max_metric() {
        let mut scores = PerMetric::from_fn(|_| 0.9_f32);
        *scores.get_mut(Metric::Rhythm) = 0.1;
        *scores.get_mut(Metric::Pitch) = 0.99;
        assert_eq!(scores.min_metric().0, Metric::Rhythm);
        assert_eq!(scores.max_metric().0, Metric::Pitch);
    }

    #[test]
    fn test_serde_round_trip() {
        let weights = PerMetric {
            linguistic_accuracy: 0.3_f32,
            linguistic_similarity: 0.1,
            amplitude: 0.2,
            pitch: 0.2,
            rhythm: 0.2,
        };
        let toml = toml::to_string(&weights).expect("serialize");
        let back: PerMetric<f32> = toml::from_str(&toml).expect("deserialize");
        assert_eq!(back, weights);
    }
}

//! Dynamic time warping similarity between numeric time series.
//!
//! Two backends: an approximate FastDTW (coarsen, solve, project, refine)
//! and a banded DTW with a Sakoe-Chiba window derived from the tolerance.
//! Distances are normalized into a similarity in (0, 1]:
//! `1 / (1 + distance / (len_a + len_b))`, which keeps scores roughly
//! comparable across chunk sizes. When a tolerance is supplied, each
//! pairwise step distance is clipped to `[0, tolerance]` so a single badly
//! misaligned sample cannot dominate the score.

use crate::error::{KarascoreError, Result};
use serde::{Deserialize, Serialize};

/// Refinement radius for the FastDTW window projection.
const FAST_DTW_RADIUS: usize = 1;

/// DTW backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DtwBackend {
    /// Approximate multi-resolution DTW; near-linear time.
    FastDtw,
    /// Exact DTW restricted to a Sakoe-Chiba band of width
    /// `tolerance * max(len_a, len_b)`.
    #[default]
    Banded,
}

/// Computes bounded DTW similarity scores.
#[derive(Debug, Clone, Copy, Default)]
pub struct DtwHelper {
    backend: DtwBackend,
}

impl DtwHelper {
    pub fn new(backend: DtwBackend) -> Self {
        Self { backend }
    }

    /// DTW similarity in (0, 1] between two sequences.
    ///
    /// Both sequences must be non-empty and all-finite; violations return a
    /// descriptive [`KarascoreError::DtwInput`] instead of producing NaN.
    pub fn compute_similarity(&self, a: &[f32], b: &[f32], tolerance: Option<f32>) -> Result<f32> {
        validate_sequence(a, "first")?;
        validate_sequence(b, "second")?;

        let distance = match self.backend {
            DtwBackend::FastDtw => fast_dtw(a, b, FAST_DTW_RADIUS, tolerance).0,
            DtwBackend::Banded => {
                let window = tolerance.map(|t| {
                    let max_len = a.len().max(b.len());
                    ((t * max_len as f32).ceil() as usize).max(1)
                });
                banded_distance(a, b, window, tolerance)
            }
        };

        Ok(normalized_similarity(distance, a.len() + b.len()))
    }

    /// Splits both sequences into equal parts, scores each pair on its own
    /// scoped thread, and averages. Trades accuracy at part boundaries for
    /// wall-clock time on long inputs.
    pub fn compute_similarity_chunked(
        &self,
        a: &[f32],
        b: &[f32],
        tolerance: Option<f32>,
        parts: usize,
    ) -> Result<f32> {
        validate_sequence(a, "first")?;
        validate_sequence(b, "second")?;

        let parts = parts.max(1);
        let part_a = a.len().div_ceil(parts);
        let part_b = b.len().div_ceil(parts);

        let scores: Vec<Result<f32>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..parts)
                .filter_map(|i| {
                    let slice_a = slice_part(a, i, part_a)?;
                    let slice_b = slice_part(b, i, part_b)?;
                    Some(scope.spawn(move || self.compute_similarity(slice_a, slice_b, tolerance)))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join().unwrap_or_else(|_| {
                        Err(KarascoreError::DtwInput {
                            message: "DTW worker panicked".to_string(),
                        })
                    })
                })
                .collect()
        });

        let mut total = 0.0;
        let mut count = 0usize;
        for score in scores {
            total += score?;
            count += 1;
        }
        if count == 0 {
            return Err(KarascoreError::DtwInput {
                message: "no comparable parts after splitting".to_string(),
            });
        }
        Ok(total / count as f32)
    }
}

fn slice_part(seq: &[f32], index: usize, part_len: usize) -> Option<&[f32]> {
    let start = index * part_len;
    if start >= seq.len() {
        return None;
    }
    let end = (start + part_len).min(seq.len());
    Some(&seq[start..end])
}

fn validate_sequence(seq: &[f32], which: &str) -> Result<()> {
    if seq.is_empty() {
        return Err(KarascoreError::DtwInput {
            message: format!("{which} sequence is empty"),
        });
    }
    if let Some(pos) = seq.iter().position(|v| !v.is_finite()) {
        return Err(KarascoreError::DtwInput {
            message: format!("{which} sequence has a non-finite value at index {pos}"),
        });
    }
    Ok(())
}

fn normalized_similarity(distance: f32, total_length: usize) -> f32 {
    let normalized = distance / total_length as f32;
    1.0 / (1.0 + normalized)
}

fn step_distance(x: f32, y: f32, tolerance: Option<f32>) -> f32 {
    let d = (x - y).abs();
    match tolerance {
        Some(t) => d.clamp(0.0, t),
        None => d,
    }
}

/// Exact DTW distance within an optional Sakoe-Chiba band, two rolling rows.
fn banded_distance(a: &[f32], b: &[f32], window: Option<usize>, tolerance: Option<f32>) -> f32 {
    let (la, lb) = (a.len(), b.len());
    // The band must at least cover the length difference to stay feasible.
    let window = window
        .map(|w| w.max(la.abs_diff(lb)) + 1)
        .unwrap_or(la.max(lb));

    let mut prev = vec![f32::INFINITY; lb + 1];
    let mut cur = vec![f32::INFINITY; lb + 1];
    prev[0] = 0.0;

    for i in 1..=la {
        cur.fill(f32::INFINITY);
        let lo = i.saturating_sub(window).max(1);
        let hi = (i + window).min(lb);
        for j in lo..=hi {
            let cost = step_distance(a[i - 1], b[j - 1], tolerance);
            let best = prev[j].min(cur[j - 1]).min(prev[j - 1]);
            cur[j] = cost + best;
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[lb]
}

/// Per-row inclusive column range of the search window.
type RowRanges = Vec<(usize, usize)>;

/// FastDTW: solve at half resolution, project the warp path up, refine
/// within `radius` cells of the projection.
fn fast_dtw(
    a: &[f32],
    b: &[f32],
    radius: usize,
    tolerance: Option<f32>,
) -> (f32, Vec<(usize, usize)>) {
    let min_size = radius + 2;
    if a.len() <= min_size || b.len() <= min_size {
        let full: RowRanges = (0..a.len()).map(|_| (0, b.len() - 1)).collect();
        return windowed_dtw(a, b, &full, tolerance);
    }

    let half_a = halve(a);
    let half_b = halve(b);
    let (_, coarse_path) = fast_dtw(&half_a, &half_b, radius, tolerance);
    let ranges = project_window(&coarse_path, a.len(), b.len(), radius);
    windowed_dtw(a, b, &ranges, tolerance)
}

fn halve(seq: &[f32]) -> Vec<f32> {
    seq.chunks(2)
        .map(|pair| pair.iter().sum::<f32>() / pair.len() as f32)
        .collect()
}

/// Expands a coarse warp path into fine-resolution row ranges.
fn project_window(
    coarse_path: &[(usize, usize)],
    la: usize,
    lb: usize,
    radius: usize,
) -> RowRanges {
    let mut ranges: RowRanges = vec![(usize::MAX, 0); la];
    for &(ci, cj) in coarse_path {
        for di in 0..2 {
            let i = ci * 2 + di;
            if i >= la {
                continue;
            }
            let j_lo = (cj * 2).saturating_sub(radius * 2);
            let j_hi = ((cj * 2 + 1) + radius * 2).min(lb - 1);
            let range = &mut ranges[i];
            range.0 = range.0.min(j_lo);
            range.1 = range.1.max(j_hi);
        }
    }
    // Widen vertically by the radius and patch any row the projection missed
    // so every row keeps a non-empty, overlapping range.
    let snapshot = ranges.clone();
    for i in 0..la {
        let lo_i = i.saturating_sub(radius);
        let hi_i = (i + radius).min(la - 1);
        for (lo, hi) in &snapshot[lo_i..=hi_i] {
            if *lo != usize::MAX {
                ranges[i].0 = ranges[i].0.min(*lo);
                ranges[i].1 = ranges[i].1.max(*hi);
            }
        }
        if ranges[i].0 == usize::MAX {
            ranges[i] = (0, lb - 1);
        }
    }
    ranges[0].0 = 0;
    ranges[la - 1].1 = lb - 1;
    ranges
}

/// DTW restricted to per-row column ranges, with path backtracking.
fn windowed_dtw(
    a: &[f32],
    b: &[f32],
    ranges: &RowRanges,
    tolerance: Option<f32>,
) -> (f32, Vec<(usize, usize)>) {
    let la = a.len();
    let lb = b.len();
    let mut cost = vec![vec![f32::INFINITY; lb]; la];

    for i in 0..la {
        let (lo, hi) = ranges[i];
        for j in lo..=hi.min(lb - 1) {
            let d = step_distance(a[i], b[j], tolerance);
            let best = if i == 0 && j == 0 {
                0.0
            } else {
                let mut best = f32::INFINITY;
                if i > 0 {
                    best = best.min(cost[i - 1][j]);
                }
                if j > 0 {
                    best = best.min(cost[i][j - 1]);
                }
                if i > 0 && j > 0 {
                    best = best.min(cost[i - 1][j - 1]);
                }
                best
            };
            cost[i][j] = d + best;
        }
    }

    // Backtrack the optimal path for window projection at the next level.
    let mut path = Vec::with_capacity(la + lb);
    let (mut i, mut j) = (la - 1, lb - 1);
    path.push((i, j));
    while i > 0 || j > 0 {
        let mut next = (i.saturating_sub(1), j.saturating_sub(1));
        let mut best = cost[next.0][next.1];
        if i > 0 && cost[i - 1][j] < best {
            best = cost[i - 1][j];
            next = (i - 1, j);
        }
        if j > 0 && cost[i][j - 1] < best {
            next = (i, j - 1);
        }
        (i, j) = next;
        path.push((i, j));
    }
    path.reverse();
    (cost[la - 1][lb - 1], path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn helpers() -> [DtwHelper; 2] {
        [
            DtwHelper::new(DtwBackend::FastDtw),
            DtwHelper::new(DtwBackend::Banded),
        ]
    }

    #[test]
    fn test_identical_sequences_score_near_one() {
        let seq: Vec<f32> = (0..200).map(|i| (i as f32 * 0.1).sin()).collect();
        for helper in helpers() {
            let score = helper
                .compute_similarity(&seq, &seq, Some(0.1))
                .expect("valid input");
            assert!(score > 0.999, "self-similarity was {score}");
        }
    }

    #[test]
    fn test_different_sequences_score_below_one() {
        let a: Vec<f32> = (0..200).map(|i| (i as f32 * 0.1).sin()).collect();
        let b: Vec<f32> = (0..200).map(|i| (i as f32 * 0.1).cos() * 3.0).collect();
        for helper in helpers() {
            let score = helper.compute_similarity(&a, &b, None).expect("valid input");
            assert!(score < 0.9);
            assert!(score > 0.0);
        }
    }

    #[test]
    fn test_empty_sequence_is_an_error() {
        for helper in helpers() {
            let err = helper.compute_similarity(&[], &[1.0], None).unwrap_err();
            assert!(matches!(err, KarascoreError::DtwInput { .. }));
            let err = helper.compute_similarity(&[1.0], &[], None).unwrap_err();
            assert!(matches!(err, KarascoreError::DtwInput { .. }));
        }
    }

    #[test]
    fn test_non_finite_sequence_is_an_error() {
        for helper in helpers() {
            let err = helper
                .compute_similarity(&[1.0, f32::NAN], &[1.0, 2.0], None)
                .unwrap_err();
            assert!(matches!(err, KarascoreError::DtwInput { .. }));
        }
    }

    #[test]
    fn test_tolerance_bounds_outlier_influence() {
        let a = vec![0.0f32; 50];
        let mut b = vec![0.0f32; 50];
        b[25] = 1000.0; // single wild outlier
        let helper = DtwHelper::new(DtwBackend::Banded);
        let clipped = helper.compute_similarity(&a, &b, Some(0.5)).expect("valid");
        let unclipped = helper.compute_similarity(&a, &b, None).expect("valid");
        assert!(clipped > unclipped);
    }

    #[test]
    fn test_time_shift_tolerated_better_than_value_shift() {
        let a: Vec<f32> = (0..100).map(|i| ((i as f32) * 0.2).sin()).collect();
        let shifted: Vec<f32> = (0..100).map(|i| ((i as f32 + 3.0) * 0.2).sin()).collect();
        let offset: Vec<f32> = a.iter().map(|v| v + 0.5).collect();
        let helper = DtwHelper::new(DtwBackend::FastDtw);
        let shift_score = helper.compute_similarity(&a, &shifted, None).expect("valid");
        let offset_score = helper.compute_similarity(&a, &offset, None).expect("valid");
        assert!(shift_score > offset_score);
    }

    #[test]
    fn test_mismatched_lengths_supported() {
        let a: Vec<f32> = (0..120).map(|i| (i as f32 * 0.1).sin()).collect();
        let b: Vec<f32> = (0..80).map(|i| (i as f32 * 0.15).sin()).collect();
        for helper in helpers() {
            let score = helper.compute_similarity(&a, &b, Some(1.0)).expect("valid");
            assert!((0.0..=1.0).contains(&score));
        }
    }

    #[test]
    fn test_chunked_matches_plain_on_identical_input() {
        let seq: Vec<f32> = (0..400).map(|i| (i as f32 * 0.05).sin()).collect();
        let helper = DtwHelper::default();
        let score = helper
            .compute_similarity_chunked(&seq, &seq, Some(0.1), 4)
            .expect("valid");
        assert!(score > 0.999);
    }

    #[test]
    fn test_chunked_rejects_empty_input() {
        let helper = DtwHelper::default();
        assert!(helper
            .compute_similarity_chunked(&[], &[1.0], None, 4)
            .is_err());
    }
}

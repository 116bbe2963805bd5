//! Reference-track assets and the per-session alignment cursor.
//!
//! `KaraokeData` owns the original recording, the accompaniment-only track,
//! and the lyric timeline. It serves successive reference segments matching
//! incoming chunks and answers "which lyrics fall in the window just served".

use crate::defaults;
use crate::dsp::fft::StftPlan;
use crate::dsp::onset;
use crate::error::{KarascoreError, Result};
use serde::{Deserialize, Serialize};

/// One timed lyric fragment. Raw text may contain the literal soft-break
/// marker `\n` (backslash-n) carried over from the lyric source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricEntry {
    /// Start time in seconds.
    pub time: f64,
    pub text: String,
}

impl LyricEntry {
    pub fn new(time: f64, text: impl Into<String>) -> Self {
        Self {
            time,
            text: text.into(),
        }
    }
}

/// Immutable, time-ordered lyric timeline, built once at session start.
#[derive(Debug, Clone, Default)]
pub struct LyricTimeline {
    entries: Vec<LyricEntry>,
}

impl LyricTimeline {
    /// Builds a timeline, sorting entries by start time.
    pub fn new(mut entries: Vec<LyricEntry>) -> Self {
        entries.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first(&self) -> Option<&LyricEntry> {
        self.entries.first()
    }

    /// All fragments whose timestamp falls in `[start, end]`, joined with the
    /// soft-break convention: fragments accumulate into a word, a `\n` marker
    /// flushes the accumulated line.
    pub fn text_in_window(&self, start: f64, end: f64) -> String {
        let fragments = self
            .entries
            .iter()
            .filter(|e| e.time >= start && e.time <= end)
            .map(|e| e.text.as_str());

        let mut out = String::new();
        let mut word = String::new();
        for fragment in fragments {
            if let Some((head, tail)) = fragment.split_once("\\n") {
                word.push_str(head);
                out.push_str(word.trim());
                out.push('\n');
                word = format!("{tail} ");
            } else {
                word.push_str(fragment);
                word.push(' ');
            }
        }
        out.push_str(word.trim());
        out
    }
}

/// Immutable per-session reference assets: the original vocal+instrumental
/// recording and the accompaniment-only track, at a shared sample rate.
#[derive(Debug, Clone)]
pub struct ReferenceTrack {
    pub original: Vec<f32>,
    pub accompaniment: Vec<f32>,
    pub sample_rate: u32,
}

impl ReferenceTrack {
    pub fn new(original: Vec<f32>, accompaniment: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            original,
            accompaniment,
            sample_rate,
        }
    }
}

/// How the session cursor is positioned on the first chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentMethod {
    /// Cursor at sample 0.
    #[default]
    Start,
    /// Cursor at the first lyric entry's timestamp.
    LyricsData,
    /// Cursor at the offset between the first reference onset and the first
    /// chunk onset.
    OnsetDetection,
}

/// Reference assets plus the mutable read cursor.
pub struct KaraokeData {
    original: Vec<f32>,
    accompaniment: Vec<f32>,
    sample_rate: u32,
    lyrics: LyricTimeline,
    current_position: usize,
    previous_position: usize,
    initial_alignment_done: bool,
    plan: StftPlan,
}

impl KaraokeData {
    pub fn new(track: ReferenceTrack, lyrics: LyricTimeline) -> Self {
        Self {
            original: track.original,
            accompaniment: track.accompaniment,
            sample_rate: track.sample_rate,
            lyrics,
            current_position: 0,
            previous_position: 0,
            initial_alignment_done: false,
            plan: StftPlan::new(defaults::N_FFT, defaults::HOP_LENGTH),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_aligned(&self) -> bool {
        self.initial_alignment_done
    }

    pub fn track_len(&self) -> usize {
        self.original.len()
    }

    /// One-time alignment on the first chunk of a session.
    ///
    /// Returns the chunk-relative onset index for `OnsetDetection` (callers
    /// may trim leading silence from the first chunk with it), 0 otherwise.
    /// Calling again before [`reset`](Self::reset) is a no-op.
    pub fn align_audio(&mut self, chunk: &[f32], method: AlignmentMethod) -> usize {
        if self.initial_alignment_done {
            return 0;
        }
        let onset_in_chunk = match method {
            AlignmentMethod::Start => {
                self.current_position = 0;
                0
            }
            AlignmentMethod::LyricsData => {
                let start_time = self.lyrics.first().map(|e| e.time).unwrap_or(0.0);
                self.current_position = self.time_to_samples(start_time);
                0
            }
            AlignmentMethod::OnsetDetection => self.align_by_onsets(chunk),
        };
        self.previous_position = self.current_position;
        self.initial_alignment_done = true;
        onset_in_chunk
    }

    fn align_by_onsets(&mut self, chunk: &[f32]) -> usize {
        let reference_onsets = onset::detect_onsets(&self.original, &self.plan);
        let chunk_onsets = onset::detect_onsets(chunk, &self.plan);

        match (reference_onsets.first(), chunk_onsets.first()) {
            (Some(&ref_onset), Some(&chunk_onset)) => {
                self.current_position = ref_onset.saturating_sub(chunk_onset);
                chunk_onset
            }
            _ => {
                // No onsets on one side - fall back to the track start.
                log::warn!("onset alignment found no onsets, falling back to start");
                self.current_position = 0;
                0
            }
        }
    }

    /// Serves the next `length` samples of original and accompaniment audio,
    /// clipped at track end, and advances the cursor.
    pub fn get_next_segment(&mut self, length: usize) -> Result<(&[f32], &[f32])> {
        if !self.initial_alignment_done {
            return Err(KarascoreError::AlignmentNotInitialized);
        }
        let start = self.current_position.min(self.original.len());
        let end = (start + length).min(self.original.len());
        let accompaniment_end = (start + length).min(self.accompaniment.len());
        let accompaniment_start = start.min(self.accompaniment.len());

        self.previous_position = start;
        self.current_position = end;

        Ok((
            &self.original[start..end],
            &self.accompaniment[accompaniment_start..accompaniment_end],
        ))
    }

    /// Lyrics in `[start_time, end_time]` seconds; both default to the
    /// window implied by the most recently served segment.
    pub fn get_lyrics(&self, start_time: Option<f64>, end_time: Option<f64>) -> String {
        let start = start_time.unwrap_or_else(|| self.samples_to_time(self.previous_position));
        let end = end_time.unwrap_or_else(|| self.samples_to_time(self.current_position));
        self.lyrics.text_in_window(start, end)
    }

    /// Clears alignment state so a new take can re-align.
    pub fn reset(&mut self) {
        self.current_position = 0;
        self.previous_position = 0;
        self.initial_alignment_done = false;
    }

    fn samples_to_time(&self, samples: usize) -> f64 {
        samples as f64 / self.sample_rate as f64
    }

    fn time_to_samples(&self, time: f64) -> usize {
        (time * self.sample_rate as f64).round().max(0.0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_lyrics() -> LyricTimeline {
        LyricTimeline::new(vec![
            LyricEntry::new(0.0, "hello"),
            LyricEntry::new(2.0, "world"),
        ])
    }

    fn karaoke(track_len: usize) -> KaraokeData {
        KaraokeData::new(
            ReferenceTrack::new(vec![0.0; track_len], vec![0.0; track_len], 8000),
            simple_lyrics(),
        )
    }

    #[test]
    fn test_segment_before_alignment_is_an_error() {
        let mut data = karaoke(16000);
        let err = data.get_next_segment(1000).unwrap_err();
        assert!(matches!(err, KarascoreError::AlignmentNotInitialized));
    }

    #[test]
    fn test_start_alignment_then_segments_are_monotonic() {
        let mut data = karaoke(80000);
        data.align_audio(&[0.0; 16000], AlignmentMethod::Start);

        let (first, _) = data.get_next_segment(16000).expect("aligned");
        assert_eq!(first.len(), 16000);
        let first_end = 16000;

        let (second, _) = data.get_next_segment(16000).expect("aligned");
        assert_eq!(second.len(), 16000);
        // The second segment starts exactly where the first ended.
        assert_eq!(data.previous_position, first_end);
    }

    #[test]
    fn test_segment_clipped_at_track_end() {
        let mut data = karaoke(10000);
        data.align_audio(&[0.0; 8000], AlignmentMethod::Start);
        let (a, b) = data.get_next_segment(8000).expect("aligned");
        assert_eq!(a.len(), 8000);
        assert_eq!(b.len(), 8000);
        let (a, b) = data.get_next_segment(8000).expect("aligned");
        assert_eq!(a.len(), 2000);
        assert_eq!(b.len(), 2000);
        let (a, _) = data.get_next_segment(8000).expect("aligned");
        assert!(a.is_empty());
    }

    #[test]
    fn test_realign_is_noop_until_reset() {
        let mut data = karaoke(80000);
        data.align_audio(&[], AlignmentMethod::Start);
        let _ = data.get_next_segment(16000).expect("aligned");
        // Second alignment attempt must not move the cursor.
        data.align_audio(&[], AlignmentMethod::Start);
        assert_eq!(data.current_position, 16000);

        data.reset();
        assert!(!data.is_aligned());
        data.align_audio(&[], AlignmentMethod::Start);
        assert_eq!(data.current_position, 0);
    }

    #[test]
    fn test_lyrics_alignment_starts_at_first_entry() {
        let mut data = KaraokeData::new(
            ReferenceTrack::new(vec![0.0; 80000], vec![0.0; 80000], 8000),
            LyricTimeline::new(vec![LyricEntry::new(1.5, "late start")]),
        );
        data.align_audio(&[], AlignmentMethod::LyricsData);
        assert_eq!(data.current_position, 12000);
    }

    #[test]
    fn test_lyrics_window_after_first_chunk() {
        // Chunk covering [0, 16000) at 8kHz maps to [0.0, 2.0] seconds,
        // which includes both "hello" (0.0s) and "world" (exactly 2.0s);
        // a window ending just shy of 2.0s returns "hello" only.
        let mut data = karaoke(80000);
        data.align_audio(&[0.0; 15999], AlignmentMethod::Start);
        let _ = data.get_next_segment(15999).expect("aligned");
        assert_eq!(data.get_lyrics(None, None), "hello");
    }

    #[test]
    fn test_lyrics_explicit_window() {
        let data = karaoke(80000);
        assert_eq!(data.get_lyrics(Some(0.0), Some(2.5)), "hello world");
        assert_eq!(data.get_lyrics(Some(1.0), Some(1.5)), "");
    }

    #[test]
    fn test_soft_break_marker_flushes_line() {
        let timeline = LyricTimeline::new(vec![
            LyricEntry::new(0.0, "hel"),
            LyricEntry::new(0.5, "lo\\nwor"),
            LyricEntry::new(1.0, "ld"),
        ]);
        assert_eq!(timeline.text_in_window(0.0, 2.0), "hel lo\nwor ld");
    }

    #[test]
    fn test_timeline_sorts_entries() {
        let timeline = LyricTimeline::new(vec![
            LyricEntry::new(2.0, "second"),
            LyricEntry::new(1.0, "first"),
        ]);
        assert_eq!(timeline.first().map(|e| e.time), Some(1.0));
    }

    #[test]
    fn test_onset_alignment_offsets_cursor() {
        let sr = 8000u32;
        // Reference: tone burst starting at sample 8000.
        let mut original = vec![0.0f32; 32000];
        for (i, s) in original[8000..16000].iter_mut().enumerate() {
            *s = (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sr as f32).sin();
        }
        // Chunk: the same burst starting at sample 2000.
        let mut chunk = vec![0.0f32; 16000];
        for (i, s) in chunk[2000..10000].iter_mut().enumerate() {
            *s = (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sr as f32).sin();
        }

        let mut data = KaraokeData::new(
            ReferenceTrack::new(original, vec![0.0; 32000], sr),
            LyricTimeline::default(),
        );
        let onset_in_chunk = data.align_audio(&chunk, AlignmentMethod::OnsetDetection);
        assert!(onset_in_chunk > 0);
        // Offset should land near 8000 - 2000 = 6000.
        let pos = data.current_position as i64;
        assert!((pos - 6000).abs() < 2048, "cursor at {pos}, expected ~6000");
    }

    #[test]
    fn test_onset_alignment_on_silence_falls_back_to_start() {
        let mut data = karaoke(32000);
        let onset_in_chunk = data.align_audio(&[0.0; 16000], AlignmentMethod::OnsetDetection);
        assert_eq!(onset_in_chunk, 0);
        assert_eq!(data.current_position, 0);
        assert!(data.is_aligned());
    }
}

//! Per-metric signal conditioning.
//!
//! Each scoring metric runs the chunk and the reference segment through its
//! own ordered chain of named steps. The catalog is closed: step names map to
//! a tagged enum, so an unknown name in configuration fails at load time
//! rather than mid-session. Steps declare their inputs through
//! [`StepParams`]; the three reference-driven steps error when no reference
//! buffer was supplied.

use crate::defaults;
use crate::dsp;
use crate::dsp::fft::StftPlan;
use crate::error::{KarascoreError, Result};
use serde::{Deserialize, Serialize};

/// The closed catalog of preprocessing steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreprocessStep {
    /// Z-score normalization with an epsilon-guarded denominator.
    Normalize,
    /// Drops leading and trailing silence.
    TrimSilences,
    /// Removes interior silent intervals, concatenating the voiced ones.
    SplitAudio,
    /// Biquad low-pass filter.
    ApplyLowpass,
    /// Soft-knee downward compression above a threshold.
    DynamicRangeCompression,
    /// Biquad band-pass filter around the vocal band.
    BandpassFilter,
    /// Soft spectral gate: tanh mask around a per-frame power threshold.
    SpectralGate,
    /// Ratio mask from user vs. reference magnitude spectra (needs reference).
    SpectralMasking,
    /// Keeps only frames with voice-level energy.
    VoiceActivityDetection,
    /// Spectral subtraction of the reference's noise profile (needs reference).
    AdaptiveNoiseReduction,
    /// Wiener ratio mask from magnitude-squared spectra (needs reference).
    WienerFilter,
}

impl PreprocessStep {
    /// Looks a step up by its configuration name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "normalize" => Ok(Self::Normalize),
            "trim_silences" => Ok(Self::TrimSilences),
            "split_audio" => Ok(Self::SplitAudio),
            "apply_lowpass" => Ok(Self::ApplyLowpass),
            "dynamic_range_compression" => Ok(Self::DynamicRangeCompression),
            "bandpass_filter" => Ok(Self::BandpassFilter),
            "spectral_gate" => Ok(Self::SpectralGate),
            "spectral_masking" => Ok(Self::SpectralMasking),
            "voice_activity_detection" => Ok(Self::VoiceActivityDetection),
            "adaptive_noise_reduction" => Ok(Self::AdaptiveNoiseReduction),
            "wiener_filter" => Ok(Self::WienerFilter),
            other => Err(KarascoreError::UnknownStep {
                name: other.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Normalize => "normalize",
            Self::TrimSilences => "trim_silences",
            Self::SplitAudio => "split_audio",
            Self::ApplyLowpass => "apply_lowpass",
            Self::DynamicRangeCompression => "dynamic_range_compression",
            Self::BandpassFilter => "bandpass_filter",
            Self::SpectralGate => "spectral_gate",
            Self::SpectralMasking => "spectral_masking",
            Self::VoiceActivityDetection => "voice_activity_detection",
            Self::AdaptiveNoiseReduction => "adaptive_noise_reduction",
            Self::WienerFilter => "wiener_filter",
        }
    }

    /// Whether the step consumes the reference buffer from [`StepParams`].
    pub fn needs_reference(&self) -> bool {
        matches!(
            self,
            Self::SpectralMasking | Self::AdaptiveNoiseReduction | Self::WienerFilter
        )
    }
}

/// Named parameters available to preprocessing steps.
///
/// Each step reads only the fields its contract declares; there is no
/// reflection over what a caller happened to supply.
#[derive(Debug, Clone, Copy)]
pub struct StepParams<'a> {
    pub sample_rate: u32,
    /// Frames this many dB below the loudest frame count as silence.
    pub trim_db: f32,
    /// Steepness of the spectral gate's tanh mask.
    pub gate_strength: f32,
    /// Low-pass cutoff in Hz.
    pub lowpass_cutoff_hz: f32,
    /// Band-pass edges in Hz.
    pub bandpass_low_hz: f32,
    pub bandpass_high_hz: f32,
    /// Compression threshold (linear amplitude) and ratio.
    pub compression_threshold: f32,
    pub compression_ratio: f32,
    /// The opposite signal, for reference-driven steps.
    pub reference: Option<&'a [f32]>,
}

impl<'a> StepParams<'a> {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            trim_db: defaults::TRIM_TOP_DB,
            gate_strength: 4.0,
            lowpass_cutoff_hz: 3500.0,
            bandpass_low_hz: 80.0,
            bandpass_high_hz: 3400.0,
            compression_threshold: 0.5,
            compression_ratio: 4.0,
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: &'a [f32]) -> Self {
        self.reference = Some(reference);
        self
    }
}

/// Applies ordered step chains to audio buffers.
pub struct AudioPreprocessor {
    plan: StftPlan,
    analysis_frame: usize,
}

impl Default for AudioPreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioPreprocessor {
    pub fn new() -> Self {
        Self {
            plan: StftPlan::new(defaults::N_FFT, defaults::HOP_LENGTH),
            analysis_frame: 512,
        }
    }

    /// Runs `audio` through `steps` in order. An empty step list returns the
    /// input unchanged.
    pub fn preprocess_audio(
        &self,
        audio: &[f32],
        steps: &[PreprocessStep],
        params: &StepParams,
    ) -> Result<Vec<f32>> {
        let mut buffer = audio.to_vec();
        for step in steps {
            buffer = self.apply_step(buffer, *step, params)?;
        }
        Ok(buffer)
    }

    fn apply_step(
        &self,
        audio: Vec<f32>,
        step: PreprocessStep,
        params: &StepParams,
    ) -> Result<Vec<f32>> {
        let reference = if step.needs_reference() {
            Some(
                params
                    .reference
                    .ok_or_else(|| KarascoreError::MissingReference {
                        step: step.name().to_string(),
                    })?,
            )
        } else {
            None
        };

        Ok(match step {
            PreprocessStep::Normalize => normalize(&audio),
            PreprocessStep::TrimSilences => {
                self.trim_silences(&audio, params.trim_db)
            }
            PreprocessStep::SplitAudio => self.split_audio(&audio, params.trim_db),
            PreprocessStep::ApplyLowpass => {
                lowpass(&audio, params.sample_rate, params.lowpass_cutoff_hz)
            }
            PreprocessStep::DynamicRangeCompression => {
                compress(&audio, params.compression_threshold, params.compression_ratio)
            }
            PreprocessStep::BandpassFilter => bandpass(
                &audio,
                params.sample_rate,
                params.bandpass_low_hz,
                params.bandpass_high_hz,
            ),
            PreprocessStep::SpectralGate => self.spectral_gate(&audio, params.gate_strength),
            PreprocessStep::SpectralMasking => {
                // reference checked above
                self.spectral_masking(&audio, reference.unwrap_or(&[]))
            }
            PreprocessStep::VoiceActivityDetection => {
                self.voice_activity_detection(&audio, params.trim_db)
            }
            PreprocessStep::AdaptiveNoiseReduction => {
                self.adaptive_noise_reduction(&audio, reference.unwrap_or(&[]))
            }
            PreprocessStep::WienerFilter => {
                self.wiener_filter(&audio, reference.unwrap_or(&[]))
            }
        })
    }

    /// Sample index ranges of frames louder than `top_db` below the peak.
    fn non_silent_intervals(&self, audio: &[f32], top_db: f32) -> Vec<(usize, usize)> {
        let frame = self.analysis_frame;
        let levels = dsp::frame_rms(audio, frame, frame);
        let peak_db = levels
            .iter()
            .copied()
            .map(dsp::amplitude_to_db)
            .fold(f32::NEG_INFINITY, f32::max);
        if !peak_db.is_finite() {
            return Vec::new();
        }
        let threshold = peak_db - top_db;

        let mut intervals = Vec::new();
        let mut open: Option<usize> = None;
        for (idx, level) in levels.iter().enumerate() {
            let loud = dsp::amplitude_to_db(*level) >= threshold;
            match (loud, open) {
                (true, None) => open = Some(idx * frame),
                (false, Some(start)) => {
                    intervals.push((start, idx * frame));
                    open = None;
                }
                _ => {}
            }
        }
        if let Some(start) = open {
            intervals.push((start, audio.len()));
        }
        intervals
    }

    fn trim_silences(&self, audio: &[f32], top_db: f32) -> Vec<f32> {
        match self.non_silent_intervals(audio, top_db) {
            intervals if intervals.is_empty() => audio.to_vec(),
            intervals => {
                let start = intervals[0].0;
                let end = intervals[intervals.len() - 1].1;
                audio[start..end].to_vec()
            }
        }
    }

    fn split_audio(&self, audio: &[f32], top_db: f32) -> Vec<f32> {
        let intervals = self.non_silent_intervals(audio, top_db);
        if intervals.is_empty() {
            return audio.to_vec();
        }
        let mut out = Vec::new();
        for (start, end) in intervals {
            out.extend_from_slice(&audio[start..end]);
        }
        out
    }

    fn voice_activity_detection(&self, audio: &[f32], top_db: f32) -> Vec<f32> {
        // Same interval detection as split, but framed for speech energy.
        self.split_audio(audio, top_db)
    }

    fn spectral_gate(&self, audio: &[f32], strength: f32) -> Vec<f32> {
        let mut frames = self.plan.stft(audio);
        for frame in &mut frames {
            let powers: Vec<f32> = frame.iter().map(|c| c.norm_sqr()).collect();
            let mean = powers.iter().sum::<f32>() / powers.len() as f32;
            let variance =
                powers.iter().map(|p| (p - mean) * (p - mean)).sum::<f32>() / powers.len() as f32;
            let threshold = mean + variance.sqrt();

            for (bin, power) in frame.iter_mut().zip(&powers) {
                // Smooth tanh mask instead of a hard cutoff.
                let mask =
                    0.5 * (1.0 + (strength * (power - threshold) / (threshold + defaults::EPSILON)).tanh());
                *bin *= mask;
            }
        }
        self.plan.istft(&frames, audio.len())
    }

    fn spectral_masking(&self, audio: &[f32], reference: &[f32]) -> Vec<f32> {
        let reference = &reference[..reference.len().min(audio.len())];
        let mut user_frames = self.plan.stft(audio);
        let ref_frames = self.plan.stft(reference);

        for (user, refer) in user_frames.iter_mut().zip(&ref_frames) {
            for (u, r) in user.iter_mut().zip(refer) {
                let mask = u.norm() / (u.norm() + r.norm() + 1e-10);
                *u *= mask;
            }
        }
        self.plan.istft(&user_frames, audio.len())
    }

    fn adaptive_noise_reduction(&self, audio: &[f32], reference: &[f32]) -> Vec<f32> {
        let mut frames = self.plan.stft(audio);
        let ref_frames = self.plan.stft(reference);
        if frames.is_empty() || ref_frames.is_empty() {
            return audio.to_vec();
        }

        // Noise magnitude profile: per-bin mean across reference frames.
        let n_bins = self.plan.n_fft();
        let mut profile = vec![0.0f32; n_bins];
        for frame in &ref_frames {
            for (acc, bin) in profile.iter_mut().zip(frame) {
                *acc += bin.norm();
            }
        }
        for acc in &mut profile {
            *acc /= ref_frames.len() as f32;
        }

        // Subtract, floor at zero, keep the original phase.
        for frame in &mut frames {
            for (bin, noise) in frame.iter_mut().zip(&profile) {
                let magnitude = (bin.norm() - noise).max(0.0);
                let phase = if bin.norm() > defaults::EPSILON {
                    *bin / bin.norm()
                } else {
                    rustfft::num_complex::Complex::new(1.0, 0.0)
                };
                *bin = phase * magnitude;
            }
        }
        self.plan.istft(&frames, audio.len())
    }

    fn wiener_filter(&self, audio: &[f32], reference: &[f32]) -> Vec<f32> {
        let mut user_frames = self.plan.stft(audio);
        let ref_frames = self.plan.stft(reference);

        for (user, refer) in user_frames.iter_mut().zip(&ref_frames) {
            for (u, r) in user.iter_mut().zip(refer) {
                let signal_power = u.norm_sqr();
                let noise_power = r.norm_sqr();
                let mask = signal_power / (signal_power + noise_power + defaults::EPSILON);
                *u *= mask;
            }
        }
        self.plan.istft(&user_frames, audio.len())
    }
}

/// Z-score normalization; epsilon keeps a flat signal from dividing by zero.
fn normalize(audio: &[f32]) -> Vec<f32> {
    if audio.is_empty() {
        return Vec::new();
    }
    let mean = audio.iter().sum::<f32>() / audio.len() as f32;
    let variance = audio.iter().map(|s| (s - mean) * (s - mean)).sum::<f32>() / audio.len() as f32;
    let std = variance.sqrt();
    audio
        .iter()
        .map(|s| (s - mean) / (std + defaults::EPSILON))
        .collect()
}

/// Downward compression: amplitude above the threshold is scaled by 1/ratio.
fn compress(audio: &[f32], threshold: f32, ratio: f32) -> Vec<f32> {
    audio
        .iter()
        .map(|&s| {
            let magnitude = s.abs();
            if magnitude <= threshold {
                s
            } else {
                let compressed = threshold + (magnitude - threshold) / ratio;
                compressed.copysign(s)
            }
        })
        .collect()
}

fn lowpass(audio: &[f32], sample_rate: u32, cutoff_hz: f32) -> Vec<f32> {
    let (b0, b1, b2, a1, a2) = lowpass_coeffs(sample_rate, cutoff_hz);
    biquad(audio, b0, b1, b2, a1, a2)
}

fn bandpass(audio: &[f32], sample_rate: u32, low_hz: f32, high_hz: f32) -> Vec<f32> {
    let center = (low_hz * high_hz).sqrt();
    let bandwidth = high_hz - low_hz;
    let q = if bandwidth > 0.0 { center / bandwidth } else { 0.707 };
    let (b0, b1, b2, a1, a2) = bandpass_coeffs(sample_rate, center, q);
    biquad(audio, b0, b1, b2, a1, a2)
}

/// RBJ cookbook low-pass, Q = 1/sqrt(2).
fn lowpass_coeffs(sample_rate: u32, cutoff_hz: f32) -> (f32, f32, f32, f32, f32) {
    let omega = 2.0 * std::f32::consts::PI * cutoff_hz / sample_rate as f32;
    let q = std::f32::consts::FRAC_1_SQRT_2;
    let alpha = omega.sin() / (2.0 * q);
    let cos = omega.cos();
    let a0 = 1.0 + alpha;
    (
        ((1.0 - cos) / 2.0) / a0,
        (1.0 - cos) / a0,
        ((1.0 - cos) / 2.0) / a0,
        (-2.0 * cos) / a0,
        (1.0 - alpha) / a0,
    )
}

/// RBJ cookbook band-pass (constant 0 dB peak gain).
fn bandpass_coeffs(sample_rate: u32, center_hz: f32, q: f32) -> (f32, f32, f32, f32, f32) {
    let omega = 2.0 * std::f32::consts::PI * center_hz / sample_rate as f32;
    let alpha = omega.sin() / (2.0 * q);
    let cos = omega.cos();
    let a0 = 1.0 + alpha;
    (
        alpha / a0,
        0.0,
        -alpha / a0,
        (-2.0 * cos) / a0,
        (1.0 - alpha) / a0,
    )
}

/// Direct form I biquad.
fn biquad(audio: &[f32], b0: f32, b1: f32, b2: f32, a1: f32, a2: f32) -> Vec<f32> {
    let mut out = Vec::with_capacity(audio.len());
    let (mut x1, mut x2, mut y1, mut y2) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
    for &x in audio {
        let y = b0 * x + b1 * x1 + b2 * x2 - a1 * y1 - a2 * y2;
        x2 = x1;
        x1 = x;
        y2 = y1;
        y1 = y;
        out.push(y);
    }
    out
}

//! Short-time Fourier transform and overlap-add reconstruction.
//!
//! All spectral preprocessing steps share one Hann-windowed STFT so that a
//! masked spectrum can be inverted with the same plan that produced it.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// One STFT frame: full (two-sided) complex spectrum of length `n_fft`.
pub type Spectrum = Vec<Complex<f32>>;

/// Reusable STFT/ISTFT plan for a fixed FFT size and hop.
pub struct StftPlan {
    n_fft: usize,
    hop: usize,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl StftPlan {
    pub fn new(n_fft: usize, hop: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(n_fft);
        let inverse = planner.plan_fft_inverse(n_fft);
        let window = hann_window(n_fft);
        Self {
            n_fft,
            hop,
            window,
            forward,
            inverse,
        }
    }

    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Computes windowed STFT frames. Input shorter than one frame is
    /// zero-padded to a single frame; empty input yields no frames.
    pub fn stft(&self, samples: &[f32]) -> Vec<Spectrum> {
        if samples.is_empty() {
            return Vec::new();
        }
        let mut frames = Vec::new();
        let mut start = 0;
        loop {
            let mut buf: Vec<Complex<f32>> = (0..self.n_fft)
                .map(|i| {
                    let sample = samples.get(start + i).copied().unwrap_or(0.0);
                    Complex::new(sample * self.window[i], 0.0)
                })
                .collect();
            self.forward.process(&mut buf);
            frames.push(buf);

            start += self.hop;
            if start >= samples.len() {
                break;
            }
        }
        frames
    }

    /// Inverts STFT frames via windowed overlap-add, trimming or padding the
    /// result to `out_len` samples.
    pub fn istft(&self, frames: &[Spectrum], out_len: usize) -> Vec<f32> {
        if frames.is_empty() {
            return vec![0.0; out_len];
        }
        let total = (frames.len() - 1) * self.hop + self.n_fft;
        let mut out = vec![0.0f32; total];
        let mut window_sum = vec![0.0f32; total];

        for (frame_idx, frame) in frames.iter().enumerate() {
            let mut buf = frame.clone();
            self.inverse.process(&mut buf);
            let offset = frame_idx * self.hop;
            for i in 0..self.n_fft {
                // rustfft's inverse is unnormalized
                let sample = buf[i].re / self.n_fft as f32;
                out[offset + i] += sample * self.window[i];
                window_sum[offset + i] += self.window[i] * self.window[i];
            }
        }

        for (sample, w) in out.iter_mut().zip(&window_sum) {
            if *w > 1e-8 {
                *sample /= *w;
            }
        }

        out.resize(out_len, 0.0);
        out
    }

    /// Per-frame magnitude spectra (first `n_fft/2 + 1` bins).
    pub fn magnitudes(&self, frames: &[Spectrum]) -> Vec<Vec<f32>> {
        let bins = self.n_fft / 2 + 1;
        frames
            .iter()
            .map(|frame| frame[..bins].iter().map(|c| c.norm()).collect())
            .collect()
    }
}

fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / n as f32;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

//! Monophonic pitch tracking using the YIN algorithm.
//!
//! Difference function, cumulative-mean normalization, absolute threshold,
//! parabolic refinement. The search is bounded to a configured vocal range,
//! and low-energy frames are reported as unvoiced.

/// Pitch tracker parameters.
#[derive(Debug, Clone, Copy)]
pub struct PitchConfig {
    /// Lowest tracked frequency in Hz.
    pub fmin: f32,
    /// Highest tracked frequency in Hz.
    pub fmax: f32,
    /// Analysis frame length in samples.
    pub frame_len: usize,
    /// Hop between frames in samples.
    pub hop: usize,
    /// YIN aperiodicity threshold; frames above it are unvoiced.
    pub threshold: f32,
    /// RMS below which a frame is unvoiced without running YIN.
    pub energy_floor: f32,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            fmin: crate::defaults::PITCH_FMIN,
            fmax: crate::defaults::PITCH_FMAX,
            frame_len: 512,
            hop: 256,
            threshold: 0.15,
            energy_floor: 1e-4,
        }
    }
}

/// Extracts a pitch contour; `None` marks unvoiced frames.
pub fn pitch_contour(samples: &[f32], sample_rate: u32, config: &PitchConfig) -> Vec<Option<f32>> {
    if samples.len() < config.frame_len || config.hop == 0 {
        return Vec::new();
    }
    let mut contour = Vec::new();
    let mut start = 0;
    while start + config.frame_len <= samples.len() {
        let frame = &samples[start..start + config.frame_len];
        contour.push(detect_frame(frame, sample_rate, config));
        start += config.hop;
    }
    contour
}

/// Replaces unvoiced frames by carrying the last voiced value forward, then
/// filling any leading gap backward from the first voiced value.
///
/// Returns `None` when the contour has no voiced frame at all.
pub fn fill_unvoiced(contour: &[Option<f32>]) -> Option<Vec<f32>> {
    let first_voiced = contour.iter().find_map(|&v| v)?;

    let mut filled = Vec::with_capacity(contour.len());
    let mut last = first_voiced;
    for &value in contour {
        if let Some(hz) = value {
            last = hz;
        }
        filled.push(last);
    }
    Some(filled)
}

fn detect_frame(frame: &[f32], sample_rate: u32, config: &PitchConfig) -> Option<f32> {
    if super::rms(frame) < config.energy_floor {
        return None;
    }

    let tau_min = (sample_rate as f32 / config.fmax).floor().max(2.0) as usize;
    let tau_max = ((sample_rate as f32 / config.fmin).ceil() as usize).min(frame.len() / 2);
    if tau_min >= tau_max {
        return None;
    }

    // Difference function over the candidate lag range.
    let window = frame.len() / 2;
    let mut diff = vec![0.0f32; tau_max + 1];
    for (tau, d) in diff.iter_mut().enumerate().skip(1) {
        let mut sum = 0.0;
        for j in 0..window {
            let delta = frame[j] - frame[j + tau];
            sum += delta * delta;
        }
        *d = sum;
    }

    // Cumulative-mean normalized difference.
    let mut cmnd = vec![1.0f32; tau_max + 1];
    let mut running_sum = 0.0;
    for tau in 1..=tau_max {
        running_sum += diff[tau];
        cmnd[tau] = if running_sum > 0.0 {
            diff[tau] * tau as f32 / running_sum
        } else {
            1.0
        };
    }

    // First lag under the threshold, extended to its local minimum.
    let mut tau = tau_min;
    while tau < tau_max {
        if cmnd[tau] < config.threshold {
            while tau + 1 < tau_max && cmnd[tau + 1] < cmnd[tau] {
                tau += 1;
            }
            let refined = parabolic_refine(&cmnd, tau);
            return Some(sample_rate as f32 / refined);
        }
        tau += 1;
    }
    None
}

/// Parabolic interpolation around the chosen lag for sub-sample precision.
fn parabolic_refine(cmnd: &[f32], tau: usize) -> f32 {
    if tau == 0 || tau + 1 >= cmnd.len() {
        return tau as f32;
    }
    let (left, mid, right) = (cmnd[tau - 1], cmnd[tau], cmnd[tau + 1]);
    let denom = 2.0 * (2.0 * mid - left - right);
    if denom.abs() < 1e-12 {
        return tau as f32;
    }
    tau as f32 + (right - left) / denom
}

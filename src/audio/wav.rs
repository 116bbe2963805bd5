//! WAV loading for the reference tracks a session scores against.
//!
//! Both integer and float WAVs are accepted; everything is converted to f32
//! mono at the session sample rate.

use crate::error::{KarascoreError, Result};
use crate::karaoke::ReferenceTrack;
use std::io::Read;
use std::path::Path;

/// Loads a WAV file as f32 mono at `target_rate`.
pub fn load_wav_mono(path: &Path, target_rate: u32) -> Result<Vec<f32>> {
    let file = std::fs::File::open(path).map_err(|e| KarascoreError::AudioRead {
        message: format!("failed to open {}: {e}", path.display()),
    })?;
    read_wav_mono(std::io::BufReader::new(file), target_rate)
}

/// Reads WAV data from any reader as f32 mono at `target_rate`.
pub fn read_wav_mono(reader: impl Read, target_rate: u32) -> Result<Vec<f32>> {
    let mut wav_reader = hound::WavReader::new(reader).map_err(|e| KarascoreError::AudioRead {
        message: format!("failed to parse WAV data: {e}"),
    })?;

    let spec = wav_reader.spec();
    let raw = match spec.sample_format {
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            wav_reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<Vec<f32>, _>>()
        }
        hound::SampleFormat::Float => wav_reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>(),
    }
    .map_err(|e| KarascoreError::AudioRead {
        message: format!("failed to read WAV samples: {e}"),
    })?;

    let mono = downmix(&raw, spec.channels);
    Ok(resample_linear(&mono, spec.sample_rate, target_rate))
}

/// Loads the original and accompaniment recordings of one song.
///
/// Both files are converted to `sample_rate` so the session's sample cursor
/// indexes them consistently.
pub fn load_reference_track(
    original: &Path,
    accompaniment: &Path,
    sample_rate: u32,
) -> Result<ReferenceTrack> {
    let original = load_wav_mono(original, sample_rate)?;
    let accompaniment = load_wav_mono(accompaniment, sample_rate)?;
    Ok(ReferenceTrack::new(original, accompaniment, sample_rate))
}

fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear interpolation resampling. Good enough for reference material that
/// only feeds similarity scoring, not playback.
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(samples.len() - 1);
            let fraction = (source_pos - source_idx as f64) as f32;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx];
                let right = samples[source_idx + 1];
                left + (right - left) * fraction
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn make_wav_data(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_mono_int16_scaled_to_unit_range() {
        let wav = make_wav_data(8000, 1, &[0, 16384, -16384, 32767]);
        let samples = read_wav_mono(Cursor::new(wav), 8000).unwrap();
        assert_eq!(samples.len(), 4);
        assert!((samples[0] - 0.0).abs() < 1e-6);
        assert!((samples[1] - 0.5).abs() < 1e-4);
        assert!((samples[2] + 0.5).abs() < 1e-4);
        assert!(samples[3] <= 1.0 && samples[3] > 0.999);
    }

    #[test]
    fn test_stereo_downmixes_to_mono() {
        // Pairs (100, 300), (-200, 200)
        let wav = make_wav_data(8000, 2, &[100, 300, -200, 200]);
        let samples = read_wav_mono(Cursor::new(wav), 8000).unwrap();
        assert_eq!(samples.len(), 2);
        assert!((samples[0] - 200.0 / 32768.0).abs() < 1e-6);
        assert!(samples[1].abs() < 1e-6);
    }

    #[test]
    fn test_resamples_to_target_rate() {
        let wav = make_wav_data(16000, 1, &vec![1000i16; 16000]);
        let samples = read_wav_mono(Cursor::new(wav), 8000).unwrap();
        assert!(samples.len() >= 7900 && samples.len() <= 8100);
        let expected = 1000.0 / 32768.0;
        assert!(samples.iter().all(|&s| (s - expected).abs() < 1e-3));
    }

    #[test]
    fn test_invalid_data_is_rejected() {
        let result = read_wav_mono(Cursor::new(vec![0u8, 1, 2, 3, 4, 5]), 8000);
        assert!(matches!(result, Err(KarascoreError::AudioRead { .. })));
    }

    #[test]
    fn test_missing_file_is_audio_read_error() {
        let result = load_wav_mono(Path::new("/nonexistent/track.wav"), 8000);
        assert!(matches!(result, Err(KarascoreError::AudioRead { .. })));
    }

    #[test]
    fn test_load_reference_track_pairs_files() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("original.wav");
        let accompaniment = dir.path().join("accompaniment.wav");
        std::fs::write(&original, make_wav_data(8000, 1, &vec![500i16; 800])).unwrap();
        std::fs::write(&accompaniment, make_wav_data(8000, 1, &vec![100i16; 800])).unwrap();

        let track = load_reference_track(&original, &accompaniment, 8000).unwrap();
        assert_eq!(track.original.len(), 800);
        assert_eq!(track.accompaniment.len(), 800);
        assert_eq!(track.sample_rate, 8000);
    }

    #[test]
    fn test_resample_linear_upsample_interpolates() {
        let samples = vec![0.0f32, 1.0, 2.0];
        let up = resample_linear(&samples, 8000, 16000);
        assert_eq!(up.len(), 6);
        assert!((up[0] - 0.0).abs() < 1e-6);
        assert!(up[1] > 0.0 && up[1] < 1.0);
        assert!((up[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_resample_linear_empty_input() {
        assert!(resample_linear(&[], 16000, 8000).is_empty());
    }
}

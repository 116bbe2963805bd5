//! Audio file loading for reference tracks.

mod wav;

pub use wav::{load_reference_track, load_wav_mono, read_wav_mono};

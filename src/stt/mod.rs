//! Speech-to-text capability boundary.

pub mod transcriber;

pub use transcriber::{MockTranscriber, Transcriber};

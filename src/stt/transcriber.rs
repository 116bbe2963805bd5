//! Transcription trait and test double.
//!
//! The concrete backend (cloud API, local model) lives outside this crate;
//! scoring depends only on the `transcribe(audio, sample_rate) -> text`
//! capability. Implementations must tolerate empty or near-silent input by
//! returning an empty string rather than erroring. Latency is unbounded from
//! the core's point of view; retry policy, if any, belongs to the backend.

use crate::error::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Trait for speech-to-text transcription.
///
/// This trait allows swapping implementations (real backend vs mock).
pub trait Transcriber: Send + Sync {
    /// Transcribe mono audio samples to text.
    fn transcribe(&self, audio: &[f32], sample_rate: u32) -> Result<String>;

    /// Human-readable backend name, for logs.
    fn name(&self) -> &str;
}

/// Implement Transcriber for Arc<T> to allow sharing across sessions.
impl<T: Transcriber + ?Sized> Transcriber for Arc<T> {
    fn transcribe(&self, audio: &[f32], sample_rate: u32) -> Result<String> {
        (**self).transcribe(audio, sample_rate)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Mock transcriber for testing.
///
/// Returns a canned response (or a configured failure) and counts calls so
/// tests can assert the at-most-once-per-side transcription guarantee.
pub struct MockTranscriber {
    name: String,
    response: String,
    fail: bool,
    calls: AtomicUsize,
}

impl MockTranscriber {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            response: "mock transcription".to_string(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Number of transcribe calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transcriber for MockTranscriber {
    fn transcribe(&self, audio: &[f32], _sample_rate: u32) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(crate::error::KarascoreError::Transcription {
                message: format!("{} configured to fail", self.name),
            });
        }
        if audio.is_empty() {
            return Ok(String::new());
        }
        Ok(self.response.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_returns_response() {
        let mock = MockTranscriber::new("mock").with_response("la la la");
        let text = mock.transcribe(&[0.1; 100], 8000).expect("mock succeeds");
        assert_eq!(text, "la la la");
        assert_eq!(mock.call_count(), 1);
    }

    #[test]
    fn test_mock_empty_audio_gives_empty_text() {
        let mock = MockTranscriber::new("mock");
        assert_eq!(mock.transcribe(&[], 8000).expect("tolerates empty"), "");
    }

    #[test]
    fn test_mock_failure_mode() {
        let mock = MockTranscriber::new("mock").with_failure();
        assert!(mock.transcribe(&[0.1; 100], 8000).is_err());
        assert_eq!(mock.call_count(), 1);
    }

    #[test]
    fn test_arc_blanket_impl() {
        let mock: Arc<dyn Transcriber> = Arc::new(MockTranscriber::new("shared"));
        assert_eq!(mock.name(), "shared");
        assert!(mock.transcribe(&[0.1; 10], 8000).is_ok());
    }
}

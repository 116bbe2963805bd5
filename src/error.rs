//! Error types for karascore.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KarascoreError {
    // Configuration errors - deployment bugs, fatal at construction/first use
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Unknown preprocessing step: {name}")]
    UnknownStep { name: String },

    #[error("Preprocessing step {step} requires a reference buffer")]
    MissingReference { step: String },

    // Sequencing errors - protocol misuse by the orchestrating layer
    #[error("Initial alignment is required before accessing segments")]
    AlignmentNotInitialized,

    #[error("Final score requested before any chunk was processed")]
    EmptySession,

    #[error("Session already finalized, no further chunks accepted")]
    SessionFinalized,

    #[error("Session worker is no longer running: {message}")]
    SessionClosed { message: String },

    // DTW input validation
    #[error("Invalid DTW input: {message}")]
    DtwInput { message: String },

    // Collaborator failures
    #[error("Transcription failed: {message}")]
    Transcription { message: String },

    // Audio decoding
    #[error("Failed to read audio: {message}")]
    AudioRead { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, KarascoreError>;

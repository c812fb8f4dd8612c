//! # Playback Error Types
//!
//! Error types for sample sources, the chunk cache and the streaming voice.

use bridge_traits::BridgeError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Source Errors
    // ========================================================================
    /// The sample source failed to render or decode.
    #[error("Sample source error: {0}")]
    SourceError(String),

    /// Sample data does not match the declared layout.
    #[error("Unsupported or invalid audio format: {0}")]
    InvalidFormat(String),

    // ========================================================================
    // Cache Errors
    // ========================================================================
    /// Chunk cache invariant violated.
    #[error("Cache error: {0}")]
    CacheError(String),

    // ========================================================================
    // Voice Errors
    // ========================================================================
    /// The voice device could not provide a voice.
    #[error("Audio device unavailable: {0}")]
    AudioDeviceUnavailable(String),

    /// The hardware voice reported an error.
    #[error("Audio device error: {0}")]
    AudioDevice(#[from] BridgeError),

    // ========================================================================
    // Playback Control Errors
    // ========================================================================
    /// The hardware never reported playing within the start timeout.
    #[error("Voice did not start within {0:?}")]
    StartTimeout(Duration),

    /// The streaming voice has been disposed.
    #[error("Streaming voice disposed")]
    Disposed,

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// Returns `true` if the current session cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PlaybackError::AudioDevice(_)
                | PlaybackError::AudioDeviceUnavailable(_)
                | PlaybackError::StartTimeout(_)
                | PlaybackError::Internal(_)
        )
    }

    /// Returns `true` if retrying the operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlaybackError::AudioDeviceUnavailable(_) | PlaybackError::StartTimeout(_)
        )
    }

    /// Returns `true` if this error is related to sample layout issues.
    pub fn is_format_error(&self) -> bool {
        matches!(self, PlaybackError::InvalidFormat(_))
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;

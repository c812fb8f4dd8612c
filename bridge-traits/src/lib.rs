//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the playback core and
//! platform-specific implementations. Each trait represents a capability the
//! core requires but that is implemented differently per platform.
//!
//! ## Traits
//!
//! ### Audio output
//! - [`VoiceDevice`](voice::VoiceDevice) - Allocates hardware voices
//! - [`AudioVoice`](voice::AudioVoice) - Buffer-queue playback channel
//!
//! ### Utilities
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with a descriptive error when a required capability is
//! missing:
//!
//! ```ignore
//! let device = config.voice_device
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "VoiceDevice".to_string(),
//!         message: "No audio output provided. \
//!                  Desktop: enable the 'desktop-shims' feature.".to_string(),
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! convert platform-specific failures into it with an actionable message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`; a voice is polled from the
//! streaming task while position queries arrive from other tasks.

pub mod error;
pub mod logging;
pub mod voice;

pub use error::BridgeError;

// Re-export commonly used types
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use voice::{AudioVoice, BufferId, PcmFormat, VoiceDevice, VoiceState};

//! # Core Configuration Module
//!
//! Provides configuration management for the playback engine.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the host capabilities and settings the engine needs.
//! It enforces fail-fast validation so a missing capability is reported at
//! startup rather than on first playback.
//!
//! ## Required Dependencies
//!
//! - `VoiceDevice` - Opens hardware voices for streaming playback
//!
//! ## Optional Dependencies
//!
//! - `LoggerSink` - Mirrors log records into the host's logging pipeline
//!
//! When the `desktop-shims` feature is enabled, the software
//! `ClockedVoiceDevice` is injected automatically if no device is provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .voice_device(Arc::new(MyAudioDevice::open()?))
//!     .event_capacity(256)
//!     .enable_event_log(true)
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! Without `desktop-shims`, omitting the voice device fails with
//! [`Error::CapabilityMissing`] and a message describing what to inject.

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{LoggerSink, VoiceDevice};
use std::sync::Arc;

/// Upper bound for the event bus buffer.
const MAX_EVENT_CAPACITY: usize = 10_000;

/// Core configuration for the playback engine.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Device that opens hardware voices (required)
    pub voice_device: Arc<dyn VoiceDevice>,

    /// Host logger (optional)
    pub logger_sink: Option<Arc<dyn LoggerSink>>,

    /// Per-subscriber buffer of the event bus
    pub event_capacity: usize,

    /// Features flags
    pub features: FeatureFlags,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("voice_device", &self.voice_device.name())
            .field(
                "logger_sink",
                &self.logger_sink.as_ref().map(|_| "LoggerSink { ... }"),
            )
            .field("event_capacity", &self.event_capacity)
            .field("features", &self.features)
            .finish()
    }
}

/// Feature flags control optional functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Wrap forward-only sources in a chunk cache so seeks and rewinds do
    /// not replay the whole song
    pub enable_chunk_cache: bool,

    /// Log every event published on the bus at its severity
    pub enable_event_log: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_chunk_cache: true,
            enable_event_log: false,
        }
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Event capacity is within `1..=10_000`
    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(Error::Config(
                "Event capacity must be greater than 0".to_string(),
            ));
        }

        if self.event_capacity > MAX_EVENT_CAPACITY {
            return Err(Error::Config(format!(
                "Event capacity exceeds maximum of {}",
                MAX_EVENT_CAPACITY
            )));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn voice_device_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "VoiceDevice".to_string(),
        message: "VoiceDevice implementation is required for playback. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default ClockedVoiceDevice. \
                 Native hosts: inject a device backed by the platform audio API."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_voice_device() -> Result<Arc<dyn VoiceDevice>> {
    Ok(Arc::new(bridge_desktop::ClockedVoiceDevice::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_voice_device() -> Result<Arc<dyn VoiceDevice>> {
    Err(voice_device_missing_error())
}

/// Builder for constructing a [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    voice_device: Option<Arc<dyn VoiceDevice>>,
    logger_sink: Option<Arc<dyn LoggerSink>>,
    event_capacity: Option<usize>,
    features: FeatureFlags,
}

impl CoreConfigBuilder {
    /// Sets the voice device (required unless `desktop-shims` is enabled).
    pub fn voice_device(mut self, device: Arc<dyn VoiceDevice>) -> Self {
        self.voice_device = Some(device);
        self
    }

    /// Sets the host logger sink.
    pub fn logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    /// Sets the event bus buffer size (default: 100).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = Some(capacity);
        self
    }

    /// Enables or disables chunk caching for forward-only sources.
    pub fn enable_chunk_cache(mut self, enable: bool) -> Self {
        self.features.enable_chunk_cache = enable;
        self
    }

    /// Enables or disables logging of every bus event.
    pub fn enable_event_log(mut self, enable: bool) -> Self {
        self.features.enable_event_log = enable;
        self
    }

    /// Replaces all feature flags at once.
    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - `CapabilityMissing` if no voice device was provided and no default
    ///   is available
    /// - `Config` if a setting is out of range
    pub fn build(self) -> Result<CoreConfig> {
        let voice_device = match self.voice_device {
            Some(device) => device,
            None => provide_default_voice_device()?,
        };

        let config = CoreConfig {
            voice_device,
            logger_sink: self.logger_sink,
            event_capacity: self.event_capacity.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            features: self.features,
        };

        config.validate()?;

        Ok(config)
    }
}

//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the playback engine:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the playback, library and
//! service crates depend on. It establishes the logging conventions, host
//! capability injection and event broadcasting used throughout the system.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, FeatureFlags};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventStream, PlaybackEvent, PlaylistEvent};

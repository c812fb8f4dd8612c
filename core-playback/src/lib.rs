//! # Playback & Streaming Module
//!
//! Streams rendered PCM to a hardware voice.
//!
//! ## Overview
//!
//! This module handles:
//! - The [`SampleSource`] contract implemented by decoders and synthesizers
//! - [`PcmChunk`] buffers in 8/16-bit, mono/stereo layouts
//! - [`ChunkCache`], which adds random access to forward-only sources
//! - [`StreamingVoice`], which queues chunks on an
//!   [`AudioVoice`](bridge_traits::AudioVoice) with pre-buffering,
//!   back-pressure and generation-safe seeking

pub mod cache;
pub mod config;
pub mod error;
pub mod pcm;
pub mod streaming;
pub mod traits;

pub use cache::{CacheConfig, CacheStats, ChunkCache};
pub use config::{StreamingConfig, StreamingStats};
pub use error::{PlaybackError, Result};
pub use pcm::{PcmChunk, PcmData};
pub use streaming::{SessionFailure, StreamingVoice};
pub use traits::{PlayState, SampleSource};

pub use bridge_traits::PcmFormat;

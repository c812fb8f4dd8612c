//! # Core Playback Traits
//!
//! Abstractions shared by every stage of the playback pipeline.
//!
//! ## Architecture
//!
//! Playback is pull-based: a [`SampleSource`] renders PCM on demand and the
//! streaming voice pulls chunks from it and queues them on a hardware voice.
//!
//! ```text
//! ┌──────────────┐  fill_buffer  ┌──────────────┐  queue_buffer  ┌────────────┐
//! │ SampleSource ├──────────────>│StreamingVoice├───────────────>│ AudioVoice │
//! │ (ChunkCache) │               │ (tokio task) │                │ (hardware) │
//! └──────────────┘               └──────────────┘                └────────────┘
//! ```
//!
//! ## Threading Model
//!
//! Sources are `Send` but not `Sync`: the streaming voice serialises access
//! and runs each render on the blocking thread pool, so implementations may
//! do CPU-heavy synthesis inside [`SampleSource::fill_buffer`].
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use core_playback::{SampleSource, Result};
//!
//! fn render_all(source: &mut dyn SampleSource) -> Result<usize> {
//!     source.reset(0)?;
//!     let mut total = 0;
//!     loop {
//!         let chunk = source.fill_buffer(4096)?;
//!         if chunk.is_empty() {
//!             return Ok(total);
//!         }
//!         total += chunk.samples();
//!     }
//! }
//! ```

use crate::error::Result;
use crate::pcm::PcmChunk;
use bridge_traits::PcmFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ============================================================================
// Sample Source
// ============================================================================

/// Pull-based producer of interleaved PCM frames.
///
/// A source has a read cursor. [`reset`](SampleSource::reset) moves it and
/// [`fill_buffer`](SampleSource::fill_buffer) reads forward from it. Sources
/// backed by a sequencer or synthesizer may only be able to render forward
/// from the beginning, in which case `reset` replays from sample zero and is
/// expensive; such sources report `false` from
/// [`is_seekable`](SampleSource::is_seekable) and are wrapped in a
/// [`ChunkCache`](crate::cache::ChunkCache) before playback.
pub trait SampleSource: Send {
    /// Layout of every chunk this source produces.
    fn format(&self) -> PcmFormat;

    /// Frames per second.
    fn sample_rate(&self) -> u32;

    /// Length of the material in frames.
    fn total_samples(&self) -> u64;

    /// Move the read cursor to `sample`.
    fn reset(&mut self, sample: u64) -> Result<()>;

    /// Render up to `wanted` frames from the cursor and advance it.
    ///
    /// Returns an empty chunk once the material is exhausted. A short,
    /// non-empty chunk does not imply the end.
    fn fill_buffer(&mut self, wanted: usize) -> Result<PcmChunk>;

    /// `true` if [`reset`](SampleSource::reset) to an arbitrary sample is cheap.
    fn is_seekable(&self) -> bool {
        false
    }

    /// Length of the material as a duration.
    fn duration(&self) -> Duration {
        let rate = self.sample_rate();
        if rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.total_samples() as f64 / f64::from(rate))
    }
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn format(&self) -> PcmFormat {
        (**self).format()
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn total_samples(&self) -> u64 {
        (**self).total_samples()
    }

    fn reset(&mut self, sample: u64) -> Result<()> {
        (**self).reset(sample)
    }

    fn fill_buffer(&mut self, wanted: usize) -> Result<PcmChunk> {
        (**self).fill_buffer(wanted)
    }

    fn is_seekable(&self) -> bool {
        (**self).is_seekable()
    }
}

// ============================================================================
// Play State
// ============================================================================

/// Observable state of a streaming voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayState {
    /// No session started yet, or pre-buffering before the hardware starts.
    Initial,
    /// Hardware is consuming queued audio.
    Playing,
    /// Hardware paused with audio still queued.
    Paused,
    /// No active session (stopped, or cancelled by a seek).
    Stopped,
    /// The session's source was exhausted.
    Ended,
    /// The hardware reported something unexpected.
    Unknown,
}

impl PlayState {
    /// Returns `true` if a session is running on the hardware.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Initial | Self::Playing | Self::Paused)
    }

    /// Wire code used by the display-state framing.
    pub fn code(&self) -> u8 {
        match self {
            PlayState::Initial => 0,
            PlayState::Playing => 1,
            PlayState::Paused => 2,
            PlayState::Stopped => 3,
            PlayState::Ended => 4,
            PlayState::Unknown => 255,
        }
    }

    /// Inverse of [`code`](PlayState::code); unrecognised codes map to `Unknown`.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => PlayState::Initial,
            1 => PlayState::Playing,
            2 => PlayState::Paused,
            3 => PlayState::Stopped,
            4 => PlayState::Ended,
            _ => PlayState::Unknown,
        }
    }
}

impl fmt::Display for PlayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlayState::Initial => "initial",
            PlayState::Playing => "playing",
            PlayState::Paused => "paused",
            PlayState::Stopped => "stopped",
            PlayState::Ended => "ended",
            PlayState::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

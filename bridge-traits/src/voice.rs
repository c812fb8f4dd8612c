//! Hardware voice bridge traits and supporting PCM types.
//!
//! A *voice* is a platform playback channel that consumes a queue of PCM
//! buffers, in the style of a buffer-queue audio API. The core streaming engine
//! owns exactly one voice per playback session and drives it through this
//! synchronous, non-blocking surface; host applications provide the concrete
//! device (native audio API, software mixer, test double).
//!
//! ## Buffer lifecycle
//!
//! ```text
//! create_buffer ──> queue_buffer ──> (hardware plays it) ──> processed
//!                                                                │
//!        delete_buffer <── unqueue_buffer <──────────────────────┘
//! ```
//!
//! Every buffer created through [`AudioVoice::create_buffer`] must eventually
//! be passed to [`AudioVoice::delete_buffer`]. Stopping a voice marks every
//! queued buffer as processed so that the queue can be emptied.

use crate::error::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Interleaved PCM layouts accepted by a voice.
///
/// 8-bit samples are unsigned (silence at 128), 16-bit samples are signed
/// little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PcmFormat {
    /// 8-bit mono.
    Pcm8X1,
    /// 8-bit stereo.
    Pcm8X2,
    /// 16-bit mono.
    Pcm16X1,
    /// 16-bit stereo.
    Pcm16X2,
}

impl PcmFormat {
    /// Number of interleaved channels.
    pub fn channels(&self) -> u16 {
        match self {
            PcmFormat::Pcm8X1 | PcmFormat::Pcm16X1 => 1,
            PcmFormat::Pcm8X2 | PcmFormat::Pcm16X2 => 2,
        }
    }

    /// Bits per individual channel sample.
    pub fn bits_per_sample(&self) -> u16 {
        match self {
            PcmFormat::Pcm8X1 | PcmFormat::Pcm8X2 => 8,
            PcmFormat::Pcm16X1 | PcmFormat::Pcm16X2 => 16,
        }
    }

    /// Size in bytes of one sample frame (all channels).
    pub fn frame_bytes(&self) -> usize {
        self.channels() as usize * (self.bits_per_sample() as usize / 8)
    }
}

impl fmt::Display for PcmFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit x{}", self.bits_per_sample(), self.channels())
    }
}

/// Handle to a PCM buffer owned by a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf#{}", self.0)
    }
}

/// State reported by the hardware for a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    /// Freshly allocated, never played.
    Initial,
    /// Consuming queued buffers.
    Playing,
    /// Paused by request; queued buffers are retained.
    Paused,
    /// Stopped by request or because the queue ran dry.
    Stopped,
    /// A state code the bridge could not map.
    Unrecognized(i32),
}

impl VoiceState {
    /// Returns `true` while the voice is audibly consuming buffers.
    pub fn is_playing(&self) -> bool {
        matches!(self, VoiceState::Playing)
    }
}

/// A single hardware playback channel.
///
/// All methods are synchronous and expected to return quickly; the streaming
/// engine polls them from its own task. Errors are treated as fatal for the
/// current playback session.
pub trait AudioVoice: Send + Sync {
    /// Upload interleaved PCM bytes into a new buffer.
    fn create_buffer(&self, format: PcmFormat, sample_rate: u32, data: Bytes) -> Result<BufferId>;

    /// Free a buffer. The buffer must not be queued.
    fn delete_buffer(&self, buffer: BufferId) -> Result<()>;

    /// Append a buffer to the voice's play queue.
    fn queue_buffer(&self, buffer: BufferId) -> Result<()>;

    /// Remove the oldest processed buffer from the queue.
    ///
    /// Fails when no processed buffer is available.
    fn unqueue_buffer(&self) -> Result<BufferId>;

    /// Number of buffers in the queue, processed or not.
    fn queued_buffers(&self) -> Result<usize>;

    /// Number of queued buffers that have been fully played.
    fn processed_buffers(&self) -> Result<usize>;

    /// Play cursor in sample frames, measured from the start of the oldest
    /// buffer still in the queue (processed buffers included).
    fn sample_offset(&self) -> Result<u64>;

    /// Current hardware state.
    fn state(&self) -> Result<VoiceState>;

    /// Start or resume consuming the queue.
    fn play(&self) -> Result<()>;

    /// Pause without discarding queued buffers.
    fn pause(&self) -> Result<()>;

    /// Stop playback and mark every queued buffer as processed.
    fn stop(&self) -> Result<()>;

    /// Release the underlying channel. Calling it more than once is a no-op.
    fn release(&self) -> Result<()>;
}

/// Allocates hardware voices.
///
/// The streaming engine retires its voice after every cancelled session and
/// asks the device for a fresh one, so implementations should make voice
/// allocation cheap.
pub trait VoiceDevice: Send + Sync {
    /// Human-readable device name for diagnostics.
    fn name(&self) -> &str;

    /// Allocate a new voice.
    fn open_voice(&self) -> Result<Arc<dyn AudioVoice>>;
}

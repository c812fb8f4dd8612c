//! # Streaming Configuration
//!
//! Configuration and statistics types for the streaming voice.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Streaming voice configuration.
///
/// Controls chunk size, pre-buffering, back-pressure polling and the
/// near-end guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Frames pulled from the source per queueing round.
    ///
    /// A round may span several source reads; each read becomes its own
    /// hardware buffer.
    ///
    /// Default: 8192 frames.
    #[serde(default = "default_chunk_samples")]
    pub chunk_samples: usize,

    /// Audio queued before the hardware is told to play.
    ///
    /// Hides render latency of slow sources at session start.
    ///
    /// Default: 0.5 seconds.
    #[serde(default = "default_prebuffer")]
    pub prebuffer: Duration,

    /// Minimum material that must remain after a play target.
    ///
    /// Requests closer to the end mark the session ended without starting
    /// the hardware.
    ///
    /// Default: 1 second.
    #[serde(default = "default_min_tail")]
    pub min_tail: Duration,

    /// Polls spent waiting for a processed buffer before queueing anyway.
    ///
    /// Running out is logged and counted in
    /// [`StreamingStats::backpressure_timeouts`].
    ///
    /// Default: 100.
    #[serde(default = "default_drain_retries")]
    pub drain_retries: u32,

    /// Delay between hardware polls.
    ///
    /// Default: 10 milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Maximum time `play` waits for the hardware to report playing.
    ///
    /// Default: 30 seconds.
    #[serde(default = "default_start_timeout")]
    pub start_timeout: Duration,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_samples: default_chunk_samples(),
            prebuffer: default_prebuffer(),
            min_tail: default_min_tail(),
            drain_retries: default_drain_retries(),
            poll_interval: default_poll_interval(),
            start_timeout: default_start_timeout(),
        }
    }
}

impl StreamingConfig {
    /// Create a configuration optimized for low latency.
    ///
    /// - Smaller chunks (2048 frames)
    /// - Shorter pre-buffer (0.2s)
    /// - Faster polling
    pub fn low_latency() -> Self {
        Self {
            chunk_samples: 2048,
            prebuffer: Duration::from_millis(200),
            poll_interval: Duration::from_millis(5),
            drain_retries: 200,
            ..Default::default()
        }
    }

    /// Create a configuration for sources that render slowly.
    ///
    /// - Larger chunks (16384 frames)
    /// - Longer pre-buffer (1.5s)
    pub fn slow_source() -> Self {
        Self {
            chunk_samples: 16384,
            prebuffer: Duration::from_millis(1500),
            ..Default::default()
        }
    }

    /// Set frames per queueing round.
    pub fn with_chunk_samples(mut self, samples: usize) -> Self {
        self.chunk_samples = samples;
        self
    }

    /// Set the pre-buffer duration.
    pub fn with_prebuffer(mut self, prebuffer: Duration) -> Self {
        self.prebuffer = prebuffer;
        self
    }

    /// Set the hardware poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the back-pressure retry budget.
    pub fn with_drain_retries(mut self, retries: u32) -> Self {
        self.drain_retries = retries;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_samples == 0 {
            return Err("chunk_samples must be > 0".to_string());
        }

        if self.poll_interval.is_zero() {
            return Err("poll_interval must be > 0".to_string());
        }

        if self.start_timeout < self.poll_interval {
            return Err("start_timeout cannot be shorter than poll_interval".to_string());
        }

        Ok(())
    }

    /// Duration of one queueing round at `sample_rate`.
    pub fn chunk_duration(&self, sample_rate: u32) -> Duration {
        if sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.chunk_samples as f64 / f64::from(sample_rate))
    }

    /// `min_tail` expressed in frames at `sample_rate`.
    pub fn min_tail_samples(&self, sample_rate: u32) -> u64 {
        (self.min_tail.as_secs_f64() * f64::from(sample_rate)) as u64
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_chunk_samples() -> usize {
    8192
}

fn default_prebuffer() -> Duration {
    Duration::from_millis(500)
}

fn default_min_tail() -> Duration {
    Duration::from_secs(1)
}

fn default_drain_retries() -> u32 {
    100
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(10)
}

fn default_start_timeout() -> Duration {
    Duration::from_secs(30)
}

// ============================================================================
// Streaming Statistics
// ============================================================================

/// Counters accumulated over the lifetime of a streaming voice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingStats {
    /// Sessions started on the hardware.
    pub sessions: u64,
    /// Buffers handed to the hardware.
    pub buffers_queued: u64,
    /// Processed buffers unqueued and credited to the play position.
    pub buffers_reclaimed: u64,
    /// Frames handed to the hardware.
    pub samples_queued: u64,
    /// Back-pressure waits that ran out of retries.
    pub backpressure_timeouts: u32,
    /// Times a starved voice had to be restarted.
    pub underrun_restarts: u32,
}

impl StreamingStats {
    /// Buffers queued but not yet reclaimed.
    pub fn buffers_in_flight(&self) -> u64 {
        self.buffers_queued.saturating_sub(self.buffers_reclaimed)
    }
}

//! Chunk cache configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`ChunkCache`](super::ChunkCache).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Frames rendered and stored per chunk (default: 8192).
    #[serde(default = "default_chunk_samples")]
    pub chunk_samples: usize,

    /// Upper bound on the audio held in memory (default: 10 s).
    #[serde(default = "default_max_cached")]
    pub max_cached: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            chunk_samples: default_chunk_samples(),
            max_cached: default_max_cached(),
        }
    }
}

impl CacheConfig {
    /// Create a new cache configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the chunk size in frames.
    pub fn with_chunk_samples(mut self, samples: usize) -> Self {
        self.chunk_samples = samples;
        self
    }

    /// Set the cached-audio cap.
    pub fn with_max_cached(mut self, max: Duration) -> Self {
        self.max_cached = max;
        self
    }

    /// Maximum number of full chunks that fit under the cap at `sample_rate`.
    pub fn max_resident_chunks(&self, sample_rate: u32) -> usize {
        if self.chunk_samples == 0 {
            return 0;
        }
        let cap_samples = self.max_cached.as_secs_f64() * f64::from(sample_rate);
        (cap_samples / self.chunk_samples as f64).floor() as usize
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_samples == 0 {
            return Err("chunk_samples must be greater than 0".to_string());
        }

        if self.max_cached.is_zero() {
            return Err("max_cached must be greater than 0".to_string());
        }

        Ok(())
    }
}

fn default_chunk_samples() -> usize {
    8192
}

fn default_max_cached() -> Duration {
    Duration::from_secs(10)
}

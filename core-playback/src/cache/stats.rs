//! Cache statistics

use serde::{Deserialize, Serialize};

/// Counters describing how a [`ChunkCache`](super::ChunkCache) has been used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Reads served from a resident chunk.
    pub hits: u64,

    /// Reads that required rendering.
    pub misses: u64,

    /// Times the inner source was rewound to sample zero.
    pub source_resets: u64,

    /// Chunks rendered by the inner source.
    pub chunks_rendered: u64,

    /// Chunks dropped to stay under the cap.
    pub evictions: u64,

    /// Chunks currently held.
    pub resident_chunks: usize,

    /// Frames currently held.
    pub resident_samples: u64,
}

impl CacheStats {
    /// Fraction of reads served without rendering.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

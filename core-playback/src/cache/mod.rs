//! # Chunk Cache Module
//!
//! Adds random access to a forward-only [`SampleSource`].
//!
//! ## Overview
//!
//! Sequencer-driven synthesizers can only render forward from a reset
//! point, so seeking backwards means replaying the whole song. The
//! [`ChunkCache`] keeps recently rendered chunks in memory:
//! - Reads that land inside a resident chunk are served by copying
//! - Reads behind the synthesis cursor rewind the inner source to zero and
//!   re-render forward, caching every chunk on the way
//! - A duration cap bounds memory; the chunk farthest from the synthesis
//!   cursor is evicted first
//!
//! Chunk boundaries are always multiples of the chunk size counted from
//! sample zero, so a re-rendered chunk is identical to the evicted one it
//! replaces and output never depends on cache contents.
//!
//! ## Architecture
//!
//! ```text
//!            fill_at(target)
//!                  │
//!        ┌─────────▼─────────┐  hit   ┌───────────────────┐
//!        │ binary search by  ├───────>│ slice from chunk  │
//!        │ chunk start       │        └───────────────────┘
//!        └─────────┬─────────┘
//!                  │ miss
//!        ┌─────────▼─────────┐ target behind cursor
//!        │ inner source      ├──────────> reset(0)
//!        │ (forward render)  │
//!        └─────────┬─────────┘
//!                  ▼
//!          cache chunk, evict
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_playback::cache::{CacheConfig, ChunkCache};
//!
//! let mut cache = ChunkCache::with_config(synth, CacheConfig::default())?;
//! let chunk = cache.fill_at(44_100, 4096)?;
//! ```

pub mod config;
pub mod stats;

pub use config::CacheConfig;
pub use stats::CacheStats;

use crate::error::{PlaybackError, Result};
use crate::pcm::PcmChunk;
use crate::traits::SampleSource;
use bridge_traits::PcmFormat;
use std::time::Duration;
use tracing::{debug, trace};

/// A rendered run of frames starting at a fixed sample index.
#[derive(Debug, Clone)]
pub struct CacheChunk {
    start: u64,
    data: PcmChunk,
}

impl CacheChunk {
    /// Index of the first frame.
    pub fn start_sample(&self) -> u64 {
        self.start
    }

    /// Number of frames held.
    pub fn sample_count(&self) -> u64 {
        self.data.samples() as u64
    }

    /// One past the last frame.
    pub fn end_sample(&self) -> u64 {
        self.start + self.sample_count()
    }

    pub fn contains(&self, sample: u64) -> bool {
        (self.start..self.end_sample()).contains(&sample)
    }

    pub fn data(&self) -> &PcmChunk {
        &self.data
    }
}

/// Seekable adapter over a forward-only source.
pub struct ChunkCache<S> {
    inner: S,
    config: CacheConfig,
    format: PcmFormat,
    sample_rate: u32,
    total_samples: u64,
    /// Sorted by start, non-overlapping.
    chunks: Vec<CacheChunk>,
    /// Next frame the inner source will render.
    synth_cursor: u64,
    /// Read cursor for the [`SampleSource`] view.
    read_cursor: u64,
    stats: CacheStats,
}

impl<S: SampleSource> ChunkCache<S> {
    /// Wrap `inner` with the default configuration.
    pub fn new(inner: S) -> Result<Self> {
        Self::with_config(inner, CacheConfig::default())
    }

    /// Wrap `inner`. The inner source is rewound to sample zero.
    pub fn with_config(mut inner: S, config: CacheConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| PlaybackError::InvalidConfig(format!("cache: {}", e)))?;
        let sample_rate = inner.sample_rate();
        if sample_rate == 0 {
            return Err(PlaybackError::InvalidFormat(
                "sample rate must be positive".to_string(),
            ));
        }
        inner.reset(0)?;

        Ok(Self {
            format: inner.format(),
            sample_rate,
            total_samples: inner.total_samples(),
            inner,
            config,
            chunks: Vec::new(),
            synth_cursor: 0,
            read_cursor: 0,
            stats: CacheStats::default(),
        })
    }

    /// Read up to `wanted` frames starting at `target`.
    ///
    /// The result never crosses a chunk boundary, so it may be shorter than
    /// requested. An empty chunk means `target` is at or past the end.
    pub fn fill_at(&mut self, target: u64, wanted: usize) -> Result<PcmChunk> {
        if wanted == 0 || target >= self.total_samples {
            return Ok(PcmChunk::empty(self.format));
        }

        if let Some(index) = self.lookup(target) {
            self.stats.hits += 1;
            let chunk = &self.chunks[index];
            trace!(target, chunk_start = chunk.start, "Cache hit");
            return Ok(chunk.data.slice((target - chunk.start) as usize, wanted));
        }

        self.stats.misses += 1;
        if target < self.synth_cursor {
            debug!(
                target,
                cursor = self.synth_cursor,
                "Seek behind synthesis cursor; rewinding source"
            );
            self.inner.reset(0)?;
            self.synth_cursor = 0;
            self.stats.source_resets += 1;
        }

        loop {
            let start = self.synth_cursor;
            let rendered = self.render_chunk()?;
            if rendered.is_empty() {
                // Source ended earlier than total_samples claimed.
                debug!(target, cursor = start, "Source exhausted before target");
                return Ok(PcmChunk::empty(self.format));
            }
            let count = rendered.samples() as u64;
            self.synth_cursor = start + count;

            let covering = (start..start + count).contains(&target);
            let result = covering.then(|| rendered.slice((target - start) as usize, wanted));

            self.insert(CacheChunk {
                start,
                data: rendered,
            });
            self.evict();

            if let Some(result) = result {
                return Ok(result);
            }
        }
    }

    /// Chunks currently resident, ordered by start.
    pub fn chunks(&self) -> &[CacheChunk] {
        &self.chunks
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Audio currently held in memory.
    pub fn cached_duration(&self) -> Duration {
        Duration::from_secs_f64(self.cached_samples() as f64 / f64::from(self.sample_rate))
    }

    pub fn synth_cursor(&self) -> u64 {
        self.synth_cursor
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.resident_chunks = self.chunks.len();
        stats.resident_samples = self.cached_samples();
        stats
    }

    /// Drop every cached chunk and return the inner source.
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn cached_samples(&self) -> u64 {
        self.chunks.iter().map(CacheChunk::sample_count).sum()
    }

    fn lookup(&self, sample: u64) -> Option<usize> {
        let after = self.chunks.partition_point(|c| c.start <= sample);
        let index = after.checked_sub(1)?;
        self.chunks[index].contains(sample).then_some(index)
    }

    /// Render one chunk from the synthesis cursor, across as many inner reads
    /// as needed. Short only at the end of the material.
    fn render_chunk(&mut self) -> Result<PcmChunk> {
        let size = self.config.chunk_samples;
        let mut chunk = PcmChunk::empty(self.format);
        while chunk.samples() < size {
            let part = self.inner.fill_buffer(size - chunk.samples())?;
            if part.is_empty() {
                break;
            }
            if part.samples() > size - chunk.samples() {
                chunk.append(&part.slice(0, size - chunk.samples()))?;
            } else {
                chunk.append(&part)?;
            }
        }
        if !chunk.is_empty() {
            self.stats.chunks_rendered += 1;
        }
        Ok(chunk)
    }

    fn insert(&mut self, chunk: CacheChunk) {
        match self.chunks.binary_search_by_key(&chunk.start, |c| c.start) {
            // Re-render of a resident chunk after a rewind; contents are identical.
            Ok(_) => {}
            Err(position) => self.chunks.insert(position, chunk),
        }
    }

    fn evict(&mut self) {
        let cap = self.config.max_cached.as_secs_f64();
        let rate = f64::from(self.sample_rate);
        while !self.chunks.is_empty() && self.cached_samples() as f64 / rate > cap {
            let cursor = self.synth_cursor;
            let first = self.chunks[0].start.abs_diff(cursor);
            let last = self.chunks[self.chunks.len() - 1].start.abs_diff(cursor);
            let evicted = if first >= last {
                self.chunks.remove(0)
            } else {
                self.chunks.remove(self.chunks.len() - 1)
            };
            self.stats.evictions += 1;
            trace!(start = evicted.start, "Evicted cached chunk");
        }
    }
}

impl<S: SampleSource> SampleSource for ChunkCache<S> {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_samples(&self) -> u64 {
        self.total_samples
    }

    fn reset(&mut self, sample: u64) -> Result<()> {
        self.read_cursor = sample.min(self.total_samples);
        Ok(())
    }

    fn fill_buffer(&mut self, wanted: usize) -> Result<PcmChunk> {
        let chunk = self.fill_at(self.read_cursor, wanted)?;
        self.read_cursor += chunk.samples() as u64;
        Ok(chunk)
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

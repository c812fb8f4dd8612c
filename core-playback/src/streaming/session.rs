//! Streaming session task.
//!
//! One [`StreamTask`] runs per playback session. It owns the hardware voice
//! handle and the map from queued buffer ids to frame counts; everything the
//! control side needs to observe lives in [`SessionShared`].
//!
//! Lock order is `book` then `voice` (or `stats`). Nothing takes `book`
//! while holding another of these locks.

use crate::config::{StreamingConfig, StreamingStats};
use crate::error::{PlaybackError, Result};
use crate::pcm::PcmChunk;
use crate::traits::SampleSource;
use bridge_traits::{AudioVoice, BufferId, PcmFormat, VoiceState};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

pub(crate) type SharedSource = Arc<Mutex<Box<dyn SampleSource>>>;

// ============================================================================
// Shared State
// ============================================================================

/// Position bookkeeping for the current session.
///
/// The play position is `base_sample + processed_samples + sample_in_buffer`.
#[derive(Debug, Default)]
pub(crate) struct SessionBook {
    /// Sample the session started from.
    pub base_sample: u64,
    /// Frames in buffers that played out and were unqueued.
    pub processed_samples: u64,
    /// Hardware offset into the buffers still queued.
    pub sample_in_buffer: u64,
    pub ended: bool,
    pub streaming: bool,
    pub paused: bool,
    /// Bumped for every new session; completions from older sessions are
    /// never credited.
    pub generation: u64,
    pub sessions: u64,
    /// `stop()` was called at least once.
    pub stop_requested: bool,
    /// Set when the latest session aborted on an error.
    pub failure: Option<SessionFailure>,
}

impl SessionBook {
    pub fn position(&self) -> u64 {
        self.base_sample + self.processed_samples + self.sample_in_buffer
    }
}

/// Why the latest session stopped early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFailure {
    pub message: String,
    /// Mirrors [`PlaybackError::is_fatal`] for the error that ended the session.
    pub fatal: bool,
}

/// Hardware voice currently owned by the streaming voice.
pub(crate) struct VoiceSlot {
    pub voice: Option<Arc<dyn AudioVoice>>,
    /// Set once a session has queued audio on this voice.
    pub used: bool,
}

pub(crate) struct SessionShared {
    pub book: Mutex<SessionBook>,
    pub voice: RwLock<VoiceSlot>,
    pub stats: Mutex<StreamingStats>,
    /// The owning `StreamingVoice` was dropped without `dispose`.
    pub orphaned: AtomicBool,
}

impl SessionShared {
    pub fn new(voice: Arc<dyn AudioVoice>) -> Self {
        Self {
            book: Mutex::new(SessionBook::default()),
            voice: RwLock::new(VoiceSlot {
                voice: Some(voice),
                used: false,
            }),
            stats: Mutex::new(StreamingStats::default()),
            orphaned: AtomicBool::new(false),
        }
    }

    pub fn current_voice(&self) -> Option<Arc<dyn AudioVoice>> {
        self.voice.read().voice.clone()
    }
}

// ============================================================================
// Event Notifier
// ============================================================================

/// Publishes playback events for one voice.
#[derive(Clone)]
pub(crate) struct Notifier {
    bus: EventBus,
    track_id: String,
}

impl Notifier {
    pub fn new(bus: EventBus, track_id: String) -> Self {
        Self { bus, track_id }
    }

    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    pub fn emit(&self, build: impl FnOnce(String) -> PlaybackEvent) {
        // No subscribers is not an error.
        self.bus
            .emit(CoreEvent::Playback(build(self.track_id.clone())))
            .ok();
    }
}

pub(crate) fn notify(notifier: &Option<Notifier>, build: impl FnOnce(String) -> PlaybackEvent) {
    if let Some(notifier) = notifier {
        notifier.emit(build);
    }
}

pub(crate) fn samples_to_ms(samples: u64, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    samples.saturating_mul(1000) / u64::from(sample_rate)
}

// ============================================================================
// Stream Task
// ============================================================================

/// How a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamExit {
    Ended,
    Cancelled,
}

enum Interrupt {
    Cancelled,
    Failed(PlaybackError),
}

impl From<PlaybackError> for Interrupt {
    fn from(err: PlaybackError) -> Self {
        Interrupt::Failed(err)
    }
}

impl From<bridge_traits::BridgeError> for Interrupt {
    fn from(err: bridge_traits::BridgeError) -> Self {
        Interrupt::Failed(err.into())
    }
}

type Step<T = ()> = std::result::Result<T, Interrupt>;

pub(crate) struct StreamTask {
    pub generation: u64,
    pub voice: Arc<dyn AudioVoice>,
    pub source: SharedSource,
    pub shared: Arc<SessionShared>,
    pub config: StreamingConfig,
    pub format: PcmFormat,
    pub sample_rate: u32,
    pub cancel: CancellationToken,
    pub notifier: Option<Notifier>,
    /// Queued buffers and their frame counts.
    pub pending: HashMap<BufferId, u64>,
}

impl StreamTask {
    /// Stream the source to the voice until it is exhausted, cancelled or
    /// the hardware fails.
    #[instrument(name = "stream_session", skip_all, fields(generation = self.generation))]
    pub async fn run(mut self) -> Result<StreamExit> {
        debug!("Streaming session started");

        let mut failure = None;
        let exit = match self.stream().await {
            Ok(()) => {
                self.finish_ended();
                Ok(StreamExit::Ended)
            }
            Err(Interrupt::Cancelled) => {
                self.finish_cancelled();
                Ok(StreamExit::Cancelled)
            }
            Err(Interrupt::Failed(err)) => {
                error!(error = %err, "Streaming session failed");
                self.release_buffers();
                notify(&self.notifier, |track_id| PlaybackEvent::Error {
                    track_id: Some(track_id),
                    message: err.to_string(),
                    recoverable: !err.is_fatal(),
                });
                failure = Some(SessionFailure {
                    message: err.to_string(),
                    fatal: err.is_fatal(),
                });
                Err(err)
            }
        };

        {
            let mut book = self.shared.book.lock();
            if book.generation == self.generation {
                book.streaming = false;
                book.paused = false;
                if failure.is_some() {
                    book.failure = failure;
                }
            }
        }

        if self.shared.orphaned.load(Ordering::SeqCst) {
            debug!("Owner dropped, releasing voice");
            self.voice.release().ok();
        }

        exit
    }

    async fn stream(&mut self) -> Step {
        let chunk_samples = self.config.chunk_samples;
        let prebuffer_samples =
            (self.config.prebuffer.as_secs_f64() * f64::from(self.sample_rate)) as u64;
        let mut prebuffered: u64 = 0;
        let mut started = false;

        loop {
            self.check_cancelled()?;

            let mut round = 0usize;
            let mut exhausted = false;
            while round < chunk_samples {
                let chunk = self.render(chunk_samples - round).await?;
                if chunk.is_empty() {
                    exhausted = true;
                    break;
                }
                round += chunk.samples();
                if !started {
                    prebuffered += chunk.samples() as u64;
                }
                self.enqueue(&chunk)?;
            }

            if !started && prebuffered >= prebuffer_samples {
                self.start_voice()?;
                started = true;
            }

            if exhausted {
                break;
            }

            if started {
                self.recover_underrun()?;
                self.wait_for_buffers().await?;
            }
        }

        if !started {
            // Source was shorter than the pre-buffer.
            self.start_voice()?;
        }

        self.drain().await
    }

    fn check_cancelled(&self) -> Step {
        if self.cancel.is_cancelled() {
            Err(Interrupt::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn sleep(&self) -> Step {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Interrupt::Cancelled),
            _ = tokio::time::sleep(self.config.poll_interval) => Ok(()),
        }
    }

    /// Pull up to `wanted` frames on the blocking pool.
    ///
    /// The render is always awaited to completion so a cancelled session
    /// never advances the source after the next session has reset it.
    async fn render(&self, wanted: usize) -> Step<PcmChunk> {
        let source = Arc::clone(&self.source);
        let chunk = tokio::task::spawn_blocking(move || source.lock().fill_buffer(wanted))
            .await
            .map_err(|e| PlaybackError::Internal(format!("render task failed: {e}")))??;

        if !chunk.is_empty() && chunk.format() != self.format {
            return Err(PlaybackError::InvalidFormat(format!(
                "source produced {} frames for a {} stream",
                chunk.format(),
                self.format
            ))
            .into());
        }
        Ok(chunk)
    }

    fn enqueue(&mut self, chunk: &PcmChunk) -> Step {
        let samples = chunk.samples() as u64;
        let id = self
            .voice
            .create_buffer(self.format, self.sample_rate, chunk.to_le_bytes())?;
        if let Err(err) = self.voice.queue_buffer(id) {
            self.voice.delete_buffer(id).ok();
            return Err(err.into());
        }
        self.pending.insert(id, samples);
        trace!(buffer = %id, samples, "Queued buffer");

        let mut stats = self.shared.stats.lock();
        stats.buffers_queued += 1;
        stats.samples_queued += samples;
        Ok(())
    }

    fn start_voice(&self) -> Step {
        let book = self.shared.book.lock();
        if book.paused {
            return Ok(());
        }
        self.voice.play()?;
        debug!(queued = self.pending.len(), "Pre-buffer satisfied, voice playing");
        Ok(())
    }

    /// Unqueue processed buffers, crediting their frames to the position.
    ///
    /// Runs under the book lock so position queries never see a buffer
    /// counted twice or not at all.
    fn reclaim(&mut self) -> Step<usize> {
        let mut book = self.shared.book.lock();
        let processed = self.voice.processed_buffers()?;
        let mut credited = 0u64;

        for _ in 0..processed {
            let id = self.voice.unqueue_buffer()?;
            let samples = self.pending.remove(&id).unwrap_or_default();
            if book.generation == self.generation {
                book.processed_samples += samples;
            }
            self.voice.delete_buffer(id)?;
            credited += 1;
        }

        if credited > 0 {
            if book.generation == self.generation {
                // The hardware offset no longer covers the unqueued buffers.
                book.sample_in_buffer = self.voice.sample_offset()?;
            }
            self.shared.stats.lock().buffers_reclaimed += credited;
        }
        Ok(processed)
    }

    /// Restart a voice that ran dry while audio is still queued.
    fn recover_underrun(&self) -> Step {
        let book = self.shared.book.lock();
        if book.paused {
            return Ok(());
        }
        if !matches!(
            self.voice.state()?,
            VoiceState::Stopped | VoiceState::Initial
        ) {
            return Ok(());
        }
        if self.voice.queued_buffers()? > self.voice.processed_buffers()? {
            warn!("Voice starved, restarting playback");
            self.voice.play()?;
            self.shared.stats.lock().underrun_restarts += 1;
        }
        Ok(())
    }

    /// Wait until the hardware has released at least one buffer.
    ///
    /// Waiting while paused does not spend retries. Running out of retries
    /// is reported and streaming continues.
    async fn wait_for_buffers(&mut self) -> Step {
        let mut retries = 0u32;
        loop {
            self.check_cancelled()?;
            if self.reclaim()? > 0 {
                return Ok(());
            }

            let paused = self.shared.book.lock().paused;
            if !paused {
                if retries >= self.config.drain_retries {
                    warn!(retries, "Timed out waiting for a processed buffer");
                    self.shared.stats.lock().backpressure_timeouts += 1;
                    notify(&self.notifier, |track_id| PlaybackEvent::BufferStall {
                        track_id,
                        retries,
                    });
                    return Ok(());
                }
                retries += 1;
            }

            self.sleep().await?;
        }
    }

    /// Let every queued buffer play out.
    async fn drain(&mut self) -> Step {
        loop {
            self.check_cancelled()?;
            self.reclaim()?;
            if self.voice.queued_buffers()? == 0 {
                return Ok(());
            }
            self.recover_underrun()?;
            self.sleep().await?;
        }
    }

    fn finish_ended(&mut self) {
        self.voice.stop().ok();
        {
            let mut book = self.shared.book.lock();
            if book.generation == self.generation {
                book.sample_in_buffer = 0;
                book.ended = true;
            }
        }
        info!(samples = self.shared.stats.lock().samples_queued, "Source exhausted");
        notify(&self.notifier, |track_id| PlaybackEvent::TrackEnded { track_id });
    }

    fn finish_cancelled(&mut self) {
        if let Err(Interrupt::Failed(err)) = self.reclaim() {
            debug!(error = %err, "Reclaim failed during cancel");
        }
        {
            let mut book = self.shared.book.lock();
            if book.generation == self.generation {
                book.sample_in_buffer = self.voice.sample_offset().unwrap_or(0);
            }
        }
        debug!("Streaming session cancelled");
        self.release_buffers();
    }

    /// Stop the voice and free every buffer this session created without
    /// crediting any of them to the position.
    fn release_buffers(&mut self) {
        if let Err(err) = self.voice.stop() {
            debug!(error = %err, "Stop failed during teardown");
        }

        while let Ok(id) = self.voice.unqueue_buffer() {
            self.pending.remove(&id);
            if let Err(err) = self.voice.delete_buffer(id) {
                debug!(buffer = %id, error = %err, "Delete failed during teardown");
            }
        }

        for (id, _) in self.pending.drain() {
            if let Err(err) = self.voice.delete_buffer(id) {
                debug!(buffer = %id, error = %err, "Delete failed during teardown");
            }
        }
    }
}

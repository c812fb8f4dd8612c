//! # Streaming Voice
//!
//! Plays a [`SampleSource`] on a hardware voice by queueing a bounded number
//! of PCM buffers and refilling as the hardware releases them.
//!
//! ## Architecture
//!
//! Control calls run on the caller's task; the queueing loop runs as one
//! background tokio task per session.
//!
//! ```text
//! ┌─────────────────────────────┐
//! │ StreamingVoice (control)    │ play / seek / stop / pause / dispose
//! │  async Mutex<Control>       │──────────────┐
//! └──────────────┬──────────────┘              │ cancel + await
//!                │ position / play_state       ▼
//!                │                ┌─────────────────────────────┐
//!                │                │ StreamTask (tokio task)      │
//!                ▼                │  render (blocking pool)      │
//! ┌─────────────────────────────┐ │  create/queue buffers        │
//! │ SessionShared               │◄┤  reclaim processed buffers   │
//! │  book: base/processed/...   │ │  drain, mark ended           │
//! │  voice slot, stats          │ └──────────────┬──────────────┘
//! └─────────────────────────────┘                ▼
//!                                           AudioVoice
//! ```
//!
//! Every session gets a fresh hardware voice: the previous session's task is
//! cancelled and awaited, then its voice is released and replaced before
//! anything is queued.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_playback::{StreamingConfig, StreamingVoice};
//! use std::time::Duration;
//!
//! let voice = StreamingVoice::new(device, Box::new(source), StreamingConfig::default())?;
//! voice.play(Duration::from_secs(30)).await?;
//! voice.seek(-5.0).await?;
//! voice.stop().await?;
//! voice.dispose().await?;
//! ```

mod session;

use crate::config::{StreamingConfig, StreamingStats};
use crate::error::{PlaybackError, Result};
use crate::traits::{PlayState, SampleSource};
use bridge_traits::{AudioVoice, PcmFormat, VoiceDevice, VoiceState};
use core_runtime::events::{EventBus, PlaybackEvent};
use parking_lot::Mutex;
use session::{notify, samples_to_ms, Notifier, SessionShared, SharedSource, StreamExit, StreamTask};

pub use session::SessionFailure;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

struct ActiveStream {
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<Result<StreamExit>>,
}

#[derive(Default)]
struct Control {
    active: Option<ActiveStream>,
}

/// A sample source bound to a hardware voice.
pub struct StreamingVoice {
    device: Arc<dyn VoiceDevice>,
    source: SharedSource,
    format: PcmFormat,
    sample_rate: u32,
    total_samples: u64,
    config: StreamingConfig,
    shared: Arc<SessionShared>,
    control: tokio::sync::Mutex<Control>,
    disposed: AtomicBool,
    notifier: Option<Notifier>,
}

impl StreamingVoice {
    /// Bind `source` to a new voice from `device`.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` if `config` does not validate
    /// - `InvalidFormat` if the source reports a zero sample rate
    /// - `AudioDeviceUnavailable` if the device cannot open a voice
    pub fn new(
        device: Arc<dyn VoiceDevice>,
        source: Box<dyn SampleSource>,
        config: StreamingConfig,
    ) -> Result<Self> {
        config.validate().map_err(PlaybackError::InvalidConfig)?;

        let sample_rate = source.sample_rate();
        if sample_rate == 0 {
            return Err(PlaybackError::InvalidFormat(
                "source sample rate is zero".to_string(),
            ));
        }

        let voice = open_voice(device.as_ref())?;
        debug!(
            device = device.name(),
            format = %source.format(),
            sample_rate,
            total_samples = source.total_samples(),
            "Created streaming voice"
        );

        Ok(Self {
            format: source.format(),
            sample_rate,
            total_samples: source.total_samples(),
            device,
            source: Arc::new(Mutex::new(source)),
            config,
            shared: Arc::new(SessionShared::new(voice)),
            control: tokio::sync::Mutex::new(Control::default()),
            disposed: AtomicBool::new(false),
            notifier: None,
        })
    }

    /// Publish playback events for this voice on `bus`, labelled `track_id`.
    pub fn with_event_bus(mut self, bus: EventBus, track_id: impl Into<String>) -> Self {
        self.notifier = Some(Notifier::new(bus, track_id.into()));
        self
    }

    // ========================================================================
    // Control
    // ========================================================================

    /// Start playing from `at`, replacing any running session.
    pub async fn play(&self, at: Duration) -> Result<()> {
        let sample = (at.as_secs_f64() * f64::from(self.sample_rate)).round() as u64;
        self.play_at_sample(sample).await
    }

    /// Start playing from `at_sample`, replacing any running session.
    ///
    /// Returns once the hardware reports playing, the session ends, or it
    /// fails. If less than `min_tail` of material remains after the target
    /// the session is marked ended without touching the hardware.
    #[instrument(skip(self), fields(track = self.label()))]
    pub async fn play_at_sample(&self, at_sample: u64) -> Result<()> {
        self.ensure_live()?;
        let target = at_sample.min(self.total_samples);

        let mut control = self.control.lock().await;
        self.retire_session(&mut control).await;

        let remaining = self.total_samples - target;
        if remaining < self.config.min_tail_samples(self.sample_rate) {
            let mut book = self.shared.book.lock();
            book.generation += 1;
            book.base_sample = target;
            book.processed_samples = 0;
            book.sample_in_buffer = 0;
            book.ended = true;
            book.streaming = false;
            book.paused = false;
            book.failure = None;
            debug!(target, remaining, "Too close to the end, marking ended");
            return Ok(());
        }

        let source = Arc::clone(&self.source);
        tokio::task::spawn_blocking(move || source.lock().reset(target))
            .await
            .map_err(|e| PlaybackError::Internal(format!("source reset failed: {e}")))??;

        let voice = self.fresh_voice()?;

        let generation = {
            let mut book = self.shared.book.lock();
            book.generation += 1;
            book.base_sample = target;
            book.processed_samples = 0;
            book.sample_in_buffer = 0;
            book.ended = false;
            book.streaming = true;
            book.paused = false;
            book.failure = None;
            book.sessions += 1;
            book.generation
        };
        self.shared.stats.lock().sessions += 1;

        let cancel = CancellationToken::new();
        let task = StreamTask {
            generation,
            voice: Arc::clone(&voice),
            source: Arc::clone(&self.source),
            shared: Arc::clone(&self.shared),
            config: self.config.clone(),
            format: self.format,
            sample_rate: self.sample_rate,
            cancel: cancel.clone(),
            notifier: self.notifier.clone(),
            pending: HashMap::new(),
        };
        control.active = Some(ActiveStream {
            generation,
            cancel,
            handle: tokio::spawn(task.run()),
        });

        self.wait_until_started(&mut control, voice.as_ref()).await?;

        info!(
            position_ms = samples_to_ms(target, self.sample_rate),
            "Playback started"
        );
        notify(&self.notifier, |track_id| PlaybackEvent::TrackStarted {
            track_id,
            position_ms: samples_to_ms(target, self.sample_rate),
        });
        Ok(())
    }

    /// Move the play position by `delta_secs` (negative rewinds) and play.
    pub async fn seek(&self, delta_secs: f64) -> Result<()> {
        self.ensure_live()?;
        let from = self.position();
        let now = from as f64 / f64::from(self.sample_rate);
        let target = (now + delta_secs).max(0.0);
        let target_sample = (target * f64::from(self.sample_rate)) as u64;

        debug!(from, to = target_sample, "Seeking");
        notify(&self.notifier, |track_id| PlaybackEvent::Seeked {
            track_id,
            from_ms: samples_to_ms(from, self.sample_rate),
            to_ms: samples_to_ms(target_sample.min(self.total_samples), self.sample_rate),
        });
        self.play_at_sample(target_sample).await
    }

    /// Stop the running session and wait for it to unwind.
    ///
    /// The position is kept, so [`resume`](Self::resume) continues from it.
    /// Does nothing after [`dispose`](Self::dispose).
    pub async fn stop(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let mut control = self.control.lock().await;
        self.shared.book.lock().stop_requested = true;
        if self.retire_session(&mut control).await {
            let position = self.position();
            debug!(position, "Playback stopped");
            notify(&self.notifier, |track_id| PlaybackEvent::Stopped {
                track_id,
                position_ms: samples_to_ms(position, self.sample_rate),
            });
        }
        Ok(())
    }

    /// Pause the hardware, keeping queued audio.
    pub async fn pause(&self) -> Result<()> {
        self.ensure_live()?;
        let _control = self.control.lock().await;

        let position = {
            let mut book = self.shared.book.lock();
            if !book.streaming || book.paused {
                return Ok(());
            }
            if let Some(voice) = self.shared.current_voice() {
                voice.pause()?;
                book.sample_in_buffer = voice.sample_offset().unwrap_or(book.sample_in_buffer);
            }
            book.paused = true;
            book.position()
        };

        notify(&self.notifier, |track_id| PlaybackEvent::Paused {
            track_id,
            position_ms: samples_to_ms(position, self.sample_rate),
        });
        Ok(())
    }

    /// Continue after [`pause`](Self::pause), or start a new session at the
    /// current position if nothing is streaming.
    pub async fn resume(&self) -> Result<()> {
        self.ensure_live()?;
        {
            let _control = self.control.lock().await;
            let resumed = {
                let mut book = self.shared.book.lock();
                if book.streaming && !book.paused {
                    return Ok(());
                }
                if book.streaming {
                    if let Some(voice) = self.shared.current_voice() {
                        voice.play()?;
                    }
                    book.paused = false;
                    Some(book.position())
                } else {
                    None
                }
            };

            if let Some(position) = resumed {
                notify(&self.notifier, |track_id| PlaybackEvent::Resumed {
                    track_id,
                    position_ms: samples_to_ms(position, self.sample_rate),
                });
                return Ok(());
            }
        }

        self.play_at_sample(self.position()).await
    }

    /// Stop streaming and release the hardware voice.
    ///
    /// Safe to call more than once. Later control calls fail with
    /// [`PlaybackError::Disposed`]; queries keep answering.
    pub async fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut control = self.control.lock().await;
        self.retire_session(&mut control).await;

        let voice = self.shared.voice.write().voice.take();
        if let Some(voice) = voice {
            voice.release()?;
        }
        debug!(track = self.label(), "Streaming voice disposed");
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Current state, safe to call while a session is running.
    pub fn play_state(&self) -> PlayState {
        let book = self.shared.book.lock();
        if book.ended {
            return PlayState::Ended;
        }
        if book.sessions == 0 && !book.stop_requested {
            return PlayState::Initial;
        }
        if !book.streaming {
            return PlayState::Stopped;
        }
        if book.paused {
            return PlayState::Paused;
        }

        let Some(voice) = self.shared.current_voice() else {
            return PlayState::Stopped;
        };
        match voice.state() {
            Ok(VoiceState::Initial) => PlayState::Initial,
            Ok(VoiceState::Playing) => PlayState::Playing,
            Ok(VoiceState::Paused) => PlayState::Paused,
            Ok(VoiceState::Stopped) => PlayState::Stopped,
            Ok(VoiceState::Unrecognized(code)) => {
                warn!(code, "Voice reported an unrecognized state");
                PlayState::Unknown
            }
            Err(err) => {
                warn!(error = %err, "Voice state query failed");
                PlayState::Unknown
            }
        }
    }

    /// Play position in sample frames.
    pub fn position(&self) -> u64 {
        let mut book = self.shared.book.lock();
        if book.streaming {
            if let Some(voice) = self.shared.current_voice() {
                // A voice that ran dry reports no offset until its buffers
                // are reclaimed.
                if let (Ok(VoiceState::Playing | VoiceState::Paused), Ok(offset)) =
                    (voice.state(), voice.sample_offset())
                {
                    book.sample_in_buffer = offset;
                }
            }
        }
        book.position().min(self.total_samples)
    }

    /// Play position as a duration.
    pub fn time_approx(&self) -> Duration {
        Duration::from_secs_f64(self.position() as f64 / f64::from(self.sample_rate))
    }

    /// Length of the source material.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.total_samples as f64 / f64::from(self.sample_rate))
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// Error that aborted the latest session, if it failed.
    pub fn failure(&self) -> Option<SessionFailure> {
        self.shared.book.lock().failure.clone()
    }

    /// Lifetime counters.
    pub fn stats(&self) -> StreamingStats {
        self.shared.stats.lock().clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn label(&self) -> &str {
        self.notifier
            .as_ref()
            .map(Notifier::track_id)
            .unwrap_or("voice")
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            Err(PlaybackError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Cancel the running session, if any, and wait for it to unwind.
    ///
    /// Returns `true` if a session was running.
    async fn retire_session(&self, control: &mut Control) -> bool {
        let Some(active) = control.active.take() else {
            return false;
        };
        active.cancel.cancel();
        match active.handle.await {
            Ok(Ok(exit)) => debug!(generation = active.generation, ?exit, "Session retired"),
            Ok(Err(err)) => {
                debug!(generation = active.generation, error = %err, "Retired a failed session")
            }
            Err(err) => warn!(generation = active.generation, error = %err, "Session task panicked"),
        }
        true
    }

    /// The voice for the next session, replacing one a previous session used.
    fn fresh_voice(&self) -> Result<Arc<dyn AudioVoice>> {
        let mut slot = self.shared.voice.write();
        if let (Some(voice), false) = (&slot.voice, slot.used) {
            let voice = Arc::clone(voice);
            slot.used = true;
            return Ok(voice);
        }

        if let Some(old) = slot.voice.take() {
            if let Err(err) = old.release() {
                debug!(error = %err, "Releasing retired voice failed");
            }
        }
        let voice = open_voice(self.device.as_ref())?;
        slot.voice = Some(Arc::clone(&voice));
        slot.used = true;
        Ok(voice)
    }

    /// Wait for the new session to reach the hardware.
    async fn wait_until_started(
        &self,
        control: &mut Control,
        voice: &dyn AudioVoice,
    ) -> Result<()> {
        let started_at = Instant::now();
        loop {
            let ended = self.shared.book.lock().ended;
            if ended {
                return Ok(());
            }
            if matches!(voice.state(), Ok(VoiceState::Playing)) {
                return Ok(());
            }

            let finished = control
                .active
                .as_ref()
                .map_or(true, |active| active.handle.is_finished());
            if finished {
                let Some(active) = control.active.take() else {
                    return Ok(());
                };
                return match active.handle.await {
                    Ok(Ok(_)) => Ok(()),
                    Ok(Err(err)) => Err(err),
                    Err(err) => Err(PlaybackError::Internal(format!(
                        "streaming task panicked: {err}"
                    ))),
                };
            }

            if started_at.elapsed() >= self.config.start_timeout {
                warn!(timeout = ?self.config.start_timeout, "Voice never started");
                self.retire_session(control).await;
                return Err(PlaybackError::StartTimeout(self.config.start_timeout));
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

impl Drop for StreamingVoice {
    fn drop(&mut self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        self.shared.orphaned.store(true, Ordering::SeqCst);

        if let Some(active) = self.control.get_mut().active.take() {
            active.cancel.cancel();
            if !active.handle.is_finished() {
                // The task releases the voice when it sees the orphan flag.
                return;
            }
        }

        if let Some(voice) = self.shared.voice.write().voice.take() {
            voice.release().ok();
        }
    }
}

impl std::fmt::Debug for StreamingVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingVoice")
            .field("format", &self.format)
            .field("sample_rate", &self.sample_rate)
            .field("total_samples", &self.total_samples)
            .field("state", &self.play_state())
            .finish()
    }
}

fn open_voice(device: &dyn VoiceDevice) -> Result<Arc<dyn AudioVoice>> {
    device
        .open_voice()
        .map_err(|e| PlaybackError::AudioDeviceUnavailable(e.to_string()))
}

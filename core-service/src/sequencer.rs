//! # Playlist Sequencer
//!
//! Chains streaming sessions across a playlist.
//!
//! ## Overview
//!
//! The sequencer owns navigation policy. It plays the current entry on a
//! fresh [`StreamingVoice`], polls it, and moves on when the track ends or a
//! skip intent is consumed:
//! - Natural end advances by one
//! - `skip(v)` moves by `v`; a `-1` within the double-back threshold of the
//!   track start steps back one further, like a CD player's previous button
//! - Indices are resolved from the *id* of the current entry at transition
//!   time, so edits to the playlist while it plays are honoured
//! - An index past the end of the playlist ends the run; one before the
//!   start restarts the first entry
//!
//! Skip intents live in a single slot: a newer `skip` overwrites an
//! unconsumed one, and the run loop takes it with an atomic swap.
//!
//! ## Architecture
//!
//! ```text
//!   skip(v) ──> AtomicI32 ──swap(0)──┐
//!                                    ▼
//!  ┌──────────┐ index  ┌────────────────────┐ open_source ┌────────────┐
//!  │ Playlist ├───────>│ run loop           ├────────────>│ Track      │
//!  │ (RwLock) │<───────┤ poll every 10 ms   │             └────────────┘
//!  └──────────┘ ids    └─────────┬──────────┘
//!                                │ play / dispose
//!                      ┌─────────▼──────────┐
//!                      │ StreamingVoice     │<── stop_current / seek / toggle
//!                      └────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let sequencer = Arc::new(PlaylistSequencer::new(device, playlist, SequencerConfig::default()));
//! let runner = tokio::spawn({
//!     let sequencer = sequencer.clone();
//!     async move { sequencer.run().await }
//! });
//!
//! sequencer.skip(1);
//! sequencer.request_stop();
//! runner.await??;
//! ```

use crate::display::DisplayState;
use crate::error::{CoreError, Result};
use bridge_traits::VoiceDevice;
use core_library::{Playlist, Track, TrackId};
use core_playback::cache::{CacheConfig, ChunkCache};
use core_playback::{
    PlayState, PlaybackError, SampleSource, SessionFailure, StreamingConfig, StreamingVoice,
};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent, PlaylistEvent};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

// ============================================================================
// Configuration
// ============================================================================

/// Sequencer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencerConfig {
    /// Delay between checks for track end and skip intents (default: 10 ms).
    #[serde(default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// A `skip(-1)` this early in a track goes to the previous track
    /// instead of restarting the current one (default: 2 s).
    #[serde(default = "default_double_back_threshold")]
    pub double_back_threshold: Duration,

    /// Wrap sources that cannot seek in a [`ChunkCache`] (default: true).
    #[serde(default = "default_true")]
    pub wrap_forward_only_sources: bool,

    /// Settings for every streaming voice the sequencer creates.
    #[serde(default)]
    pub streaming: StreamingConfig,

    /// Settings for chunk caches around forward-only sources.
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            double_back_threshold: default_double_back_threshold(),
            wrap_forward_only_sources: default_true(),
            streaming: StreamingConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl SequencerConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_double_back_threshold(mut self, threshold: Duration) -> Self {
        self.double_back_threshold = threshold;
        self
    }

    pub fn with_chunk_cache(mut self, enable: bool) -> Self {
        self.wrap_forward_only_sources = enable;
        self
    }

    pub fn with_streaming(mut self, streaming: StreamingConfig) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.poll_interval.is_zero() {
            return Err("poll_interval must be greater than 0".to_string());
        }
        self.streaming
            .validate()
            .map_err(|e| format!("streaming: {}", e))?;
        self.cache.validate().map_err(|e| format!("cache: {}", e))
    }
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(10)
}

fn default_double_back_threshold() -> Duration {
    Duration::from_secs(2)
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Navigation
// ============================================================================

/// Offset from the current index that a consumed skip intent of `delta`
/// produces after `elapsed` of playback.
pub fn skip_offset(delta: i32, elapsed: Duration, double_back_threshold: Duration) -> i64 {
    let delta = i64::from(delta);
    if delta == -1 && elapsed < double_back_threshold {
        delta - 1
    } else {
        delta
    }
}

/// Next index to play, or `None` once it runs past the end of a playlist of
/// `len`. Targets before the start clamp to the first entry.
///
/// `current` is the live index of the entry that was playing; `None` if it
/// has been removed, in which case navigation counts from just before the
/// start.
pub fn next_index(current: Option<usize>, offset: i64, len: usize) -> Option<usize> {
    let base = current.map_or(-1, |index| index as i64);
    usize::try_from((base + offset).max(0))
        .ok()
        .filter(|&index| index < len)
}

/// Why the poll loop let go of a track.
enum Transition {
    Advance(i64),
    Failed(SessionFailure),
    Stopped,
}

// ============================================================================
// Sequencer
// ============================================================================

struct NowPlaying {
    id: TrackId,
    track: Arc<dyn Track>,
    voice: Arc<StreamingVoice>,
}

/// Drives a playlist through streaming voices.
pub struct PlaylistSequencer {
    device: Arc<dyn VoiceDevice>,
    playlist: RwLock<Playlist>,
    config: SequencerConfig,
    event_bus: Option<EventBus>,
    pending_skip: AtomicI32,
    started: AtomicBool,
    ended: AtomicBool,
    cancel: CancellationToken,
    current: Mutex<Option<NowPlaying>>,
    message: Mutex<Option<String>>,
}

impl PlaylistSequencer {
    pub fn new(device: Arc<dyn VoiceDevice>, playlist: Playlist, config: SequencerConfig) -> Self {
        Self {
            device,
            playlist: RwLock::new(playlist),
            config,
            event_bus: None,
            pending_skip: AtomicI32::new(0),
            started: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            current: Mutex::new(None),
            message: Mutex::new(None),
        }
    }

    /// Publish playlist and playback events on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    // ========================================================================
    // Playlist Access
    // ========================================================================

    /// Shared view of the playlist.
    pub fn playlist(&self) -> RwLockReadGuard<'_, Playlist> {
        self.playlist.read()
    }

    /// Edit the playlist, possibly while it plays.
    pub fn edit_playlist<R>(&self, edit: impl FnOnce(&mut Playlist) -> R) -> R {
        edit(&mut self.playlist.write())
    }

    // ========================================================================
    // Run Loop
    // ========================================================================

    /// Play the playlist from the first entry until it runs out or
    /// [`request_stop`](Self::request_stop) is called.
    ///
    /// # Errors
    ///
    /// - `AlreadyRunning` on a second call
    /// - `Playback` or `SessionFailed` if a voice fails fatally; the run ends
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(CoreError::AlreadyRunning);
        }

        let mut played = 0u32;
        let result = self.run_playlist(&mut played).await;

        self.current.lock().take();
        self.ended.store(true, Ordering::SeqCst);
        self.emit(PlaylistEvent::Finished {
            tracks_played: played,
        });
        match &result {
            Ok(()) => info!(tracks_played = played, "Playlist finished"),
            Err(e) => error!(error = %e, tracks_played = played, "Playlist aborted"),
        }
        result
    }

    async fn run_playlist(&self, played: &mut u32) -> Result<()> {
        let mut index = 0usize;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            let Some((id, track)) = self
                .playlist
                .read()
                .get(index)
                .map(|entry| (entry.id, entry.track.clone()))
            else {
                return Ok(());
            };

            self.emit(PlaylistEvent::TrackChanged {
                track_id: id.to_string(),
                index,
                title: track.name().to_string(),
            });
            info!(index, track = track.name(), "Starting track");

            let transition = match self.open_voice(id, track.as_ref()) {
                Ok(voice) => {
                    *played += 1;
                    self.play_track(id, track, voice).await?
                }
                Err(e) if !e.is_fatal() => {
                    warn!(index, error = %e, "Track failed to open; skipping");
                    self.emit_error(id, &e);
                    Transition::Advance(1)
                }
                Err(e) => return Err(e.into()),
            };

            let offset = match transition {
                Transition::Advance(offset) => offset,
                Transition::Failed(failure) if !failure.fatal => {
                    warn!(index, error = %failure.message, "Track failed while playing; skipping");
                    1
                }
                Transition::Failed(failure) => {
                    return Err(CoreError::SessionFailed(failure.message));
                }
                Transition::Stopped => return Ok(()),
            };
            let (current, len) = {
                let playlist = self.playlist.read();
                (playlist.index_of(id), playlist.len())
            };
            match next_index(current, offset, len) {
                Some(next) => {
                    debug!(from = ?current, to = next, "Advancing");
                    index = next;
                }
                None => return Ok(()),
            }
        }
    }

    async fn play_track(
        &self,
        id: TrackId,
        track: Arc<dyn Track>,
        voice: StreamingVoice,
    ) -> Result<Transition> {
        let voice = Arc::new(voice);

        if let Err(e) = voice.play(Duration::ZERO).await {
            voice.dispose().await.ok();
            if e.is_fatal() {
                return Err(e.into());
            }
            warn!(error = %e, "Track failed to start; skipping");
            self.emit_error(id, &e);
            return Ok(Transition::Advance(1));
        }

        *self.current.lock() = Some(NowPlaying {
            id,
            track,
            voice: voice.clone(),
        });

        let transition = self.watch(&voice).await;

        self.current.lock().take();
        if let Err(e) = voice.dispose().await {
            warn!(error = %e, "Failed to dispose voice");
        }
        Ok(transition)
    }

    async fn watch(&self, voice: &StreamingVoice) -> Transition {
        loop {
            let delta = self.pending_skip.swap(0, Ordering::SeqCst);
            if delta != 0 {
                let elapsed = voice.time_approx();
                let offset = skip_offset(delta, elapsed, self.config.double_back_threshold);
                debug!(delta, ?elapsed, offset, "Consumed skip intent");
                return Transition::Advance(offset);
            }
            if voice.play_state() == PlayState::Ended {
                return Transition::Advance(1);
            }
            if let Some(failure) = voice.failure() {
                return Transition::Failed(failure);
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Transition::Stopped,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    fn open_voice(&self, id: TrackId, track: &dyn Track) -> core_playback::Result<StreamingVoice> {
        let source = track.open_source()?;
        let source: Box<dyn SampleSource> =
            if self.config.wrap_forward_only_sources && !source.is_seekable() {
                debug!(track = track.name(), "Wrapping forward-only source in chunk cache");
                Box::new(ChunkCache::with_config(source, self.config.cache.clone())?)
            } else {
                source
            };

        let voice = StreamingVoice::new(self.device.clone(), source, self.config.streaming.clone())?;
        Ok(match &self.event_bus {
            Some(bus) => voice.with_event_bus(bus.clone(), id.to_string()),
            None => voice,
        })
    }

    // ========================================================================
    // Transport Controls
    // ========================================================================

    /// Record a skip intent of `delta` tracks, replacing any unconsumed one.
    pub fn skip(&self, delta: i32) {
        if delta == 0 {
            return;
        }
        self.pending_skip.store(delta, Ordering::SeqCst);
        self.emit(PlaylistEvent::SkipRequested { delta });
    }

    /// Unconsumed skip intent, `0` if none.
    pub fn pending_skip(&self) -> i32 {
        self.pending_skip.load(Ordering::SeqCst)
    }

    /// Stop the current voice without leaving the track.
    pub async fn stop_current(&self) -> Result<()> {
        match self.current_voice() {
            Some(voice) => settle(voice.stop().await),
            None => Ok(()),
        }
    }

    /// Move within the current track by `delta_secs`.
    pub async fn seek(&self, delta_secs: f64) -> Result<()> {
        match self.current_voice() {
            Some(voice) => settle(voice.seek(delta_secs).await),
            None => Ok(()),
        }
    }

    /// Stop if playing, otherwise resume from the current time.
    pub async fn toggle(&self) -> Result<()> {
        let Some(voice) = self.current_voice() else {
            return Ok(());
        };
        match voice.play_state() {
            PlayState::Playing | PlayState::Initial => settle(voice.stop().await),
            _ => settle(voice.seek(0.0).await),
        }
    }

    /// Ask the run loop to stop. The current voice is disposed as it exits.
    pub fn request_stop(&self) {
        self.cancel.cancel();
    }

    /// Token cancelled by [`request_stop`](Self::request_stop).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// `true` once [`run`](Self::run) has returned.
    pub fn ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.ended()
    }

    // ========================================================================
    // Display
    // ========================================================================

    /// Status line attached to display snapshots.
    pub fn set_message(&self, message: Option<String>) {
        *self.message.lock() = message;
    }

    /// Snapshot of the current track, or `None` between tracks.
    pub fn display_state(&self) -> Option<DisplayState> {
        let current = self.current.lock();
        let now = current.as_ref()?;
        let playlist = self.playlist.read();

        Some(DisplayState {
            track_index: playlist
                .index_of(now.id)
                .and_then(|index| i32::try_from(index).ok())
                .unwrap_or(-1),
            track_count: i32::try_from(playlist.len()).unwrap_or(i32::MAX),
            elapsed_seconds: now.voice.time_approx().as_secs_f64(),
            duration_seconds: now.voice.duration().as_secs_f64(),
            play_state: now.voice.play_state(),
            name: now.track.name().to_string(),
            album: now.track.album().to_string(),
            artist: now.track.artist().to_string(),
            message: self.message.lock().clone(),
        })
    }

    /// Id of the entry being played.
    pub fn current_id(&self) -> Option<TrackId> {
        self.current.lock().as_ref().map(|now| now.id)
    }

    fn current_voice(&self) -> Option<Arc<StreamingVoice>> {
        self.current.lock().as_ref().map(|now| now.voice.clone())
    }

    fn emit(&self, event: PlaylistEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Playlist(event)).ok();
        }
    }

    fn emit_error(&self, id: TrackId, error: &PlaybackError) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Playback(PlaybackEvent::Error {
                track_id: Some(id.to_string()),
                message: error.to_string(),
                recoverable: true,
            }))
            .ok();
        }
    }
}

impl std::fmt::Debug for PlaylistSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tracks = self.playlist.read().len();
        let current = self.current_id();
        f.debug_struct("PlaylistSequencer")
            .field("tracks", &tracks)
            .field("current", &current)
            .field("pending_skip", &self.pending_skip())
            .field("ended", &self.ended())
            .finish()
    }
}

/// A voice the run loop has just disposed is no longer a control target.
fn settle(result: core_playback::Result<()>) -> Result<()> {
    match result {
        Err(PlaybackError::Disposed) => Ok(()),
        other => other.map_err(CoreError::from),
    }
}

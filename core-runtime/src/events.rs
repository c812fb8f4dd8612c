//! # Event Bus System
//!
//! Event-driven notifications for the playback engine using `tokio::sync::broadcast`.
//! Streaming voices and the playlist sequencer publish typed events; hosts
//! subscribe to drive UI, logging or diagnostics without polling.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enums for playback and playlist events
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐    emit     ┌───────────┐
//! │ StreamingVoice ├────────────>│           │    subscribe   ┌────────────┐
//! └────────────────┘             │ EventBus  ├───────────────>│ Subscriber │
//!                                │ (broadcast│                └────────────┘
//! ┌────────────────┐    emit     │  channel) │    subscribe   ┌────────────┐
//! │   Sequencer    ├────────────>│           ├───────────────>│ Subscriber │
//! └────────────────┘             └───────────┘                └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, PlaylistEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Playlist(PlaylistEvent::SkipRequested { delta: 1 })).ok();
//!
//! let event = rx.recv().await.unwrap();
//! assert_eq!(event.description(), "Skip requested");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Publishers ignore send errors: having no subscribers is normal.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError, TryRecvError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Streaming voice events
    Playback(PlaybackEvent),
    /// Playlist sequencer events
    Playlist(PlaylistEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Playback(e) => e.description(),
            CoreEvent::Playlist(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Playback(PlaybackEvent::Error { .. }) => EventSeverity::Error,
            CoreEvent::Playback(PlaybackEvent::BufferStall { .. }) => EventSeverity::Warning,
            CoreEvent::Playlist(PlaylistEvent::TrackChanged { .. })
            | CoreEvent::Playlist(PlaylistEvent::Finished { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Playback Events
// ============================================================================

/// Events published by a streaming voice.
///
/// `track_id` is the label the voice was created with; the sequencer uses
/// the playlist entry id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// The hardware started playing a new session.
    TrackStarted {
        track_id: String,
        /// Session start position (milliseconds).
        position_ms: u64,
    },
    /// Playback paused.
    Paused { track_id: String, position_ms: u64 },
    /// Playback resumed after pause.
    Resumed { track_id: String, position_ms: u64 },
    /// The session was stopped before the source ran out.
    Stopped { track_id: String, position_ms: u64 },
    /// A relative seek was requested.
    Seeked {
        track_id: String,
        from_ms: u64,
        to_ms: u64,
    },
    /// The source was exhausted and every queued buffer played.
    TrackEnded { track_id: String },
    /// The hardware did not release a buffer within the retry budget.
    BufferStall {
        track_id: String,
        /// Polls spent before giving up on the wait.
        retries: u32,
    },
    /// Playback error occurred.
    Error {
        track_id: Option<String>,
        /// Human-readable error message.
        message: String,
        /// Whether playback can be retried.
        recoverable: bool,
    },
}

impl PlaybackEvent {
    /// Label of the voice that published the event.
    pub fn track_id(&self) -> Option<&str> {
        match self {
            PlaybackEvent::TrackStarted { track_id, .. }
            | PlaybackEvent::Paused { track_id, .. }
            | PlaybackEvent::Resumed { track_id, .. }
            | PlaybackEvent::Stopped { track_id, .. }
            | PlaybackEvent::Seeked { track_id, .. }
            | PlaybackEvent::TrackEnded { track_id }
            | PlaybackEvent::BufferStall { track_id, .. } => Some(track_id),
            PlaybackEvent::Error { track_id, .. } => track_id.as_deref(),
        }
    }

    fn description(&self) -> &str {
        match self {
            PlaybackEvent::TrackStarted { .. } => "Playback started",
            PlaybackEvent::Paused { .. } => "Playback paused",
            PlaybackEvent::Resumed { .. } => "Playback resumed",
            PlaybackEvent::Stopped { .. } => "Playback stopped",
            PlaybackEvent::Seeked { .. } => "Playback position moved",
            PlaybackEvent::TrackEnded { .. } => "Track ended",
            PlaybackEvent::BufferStall { .. } => "Buffer wait exhausted",
            PlaybackEvent::Error { .. } => "Playback error",
        }
    }
}

// ============================================================================
// Playlist Events
// ============================================================================

/// Events published by the playlist sequencer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaylistEvent {
    /// A skip intent was recorded (overwriting any unconsumed one).
    SkipRequested { delta: i32 },
    /// The sequencer moved to another track.
    TrackChanged {
        track_id: String,
        index: usize,
        title: String,
    },
    /// The run loop finished.
    Finished {
        /// Tracks that were started during the run.
        tracks_played: u32,
    },
}

impl PlaylistEvent {
    fn description(&self) -> &str {
        match self {
            PlaylistEvent::SkipRequested { .. } => "Skip requested",
            PlaylistEvent::TrackChanged { .. } => "Track changed",
            PlaylistEvent::Finished { .. } => "Playlist finished",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast hub shared by every voice and sequencer of a service.
///
/// Cloning is cheap and every clone publishes into the same channel. Each
/// [`subscribe`](EventBus::subscribe) call gets its own receiver with
/// `capacity` slots; a receiver that falls further behind sees
/// `RecvError::Lagged` and then continues with newer events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Bus with [`DEFAULT_EVENT_BUFFER_SIZE`] slots per subscriber.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publish `event`, returning how many subscribers will see it.
    ///
    /// Fails only when nobody is subscribed.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Receiver that skips events rejected by any of its filters.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream, PlaybackEvent};
///
/// let bus = EventBus::new(100);
/// let stream = EventStream::new(bus.subscribe())
///     .for_track("4a1c")
///     .filter(|event| !matches!(event, CoreEvent::Playback(PlaybackEvent::Seeked { .. })));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filters: Vec<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filters: Vec::new(),
        }
    }

    /// Add a filter; an event must pass every filter to be returned.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filters.push(Box::new(predicate));
        self
    }

    /// Keep only playback events published by the voice labelled `track_id`.
    pub fn for_track(self, track_id: impl Into<String>) -> Self {
        let track_id = track_id.into();
        self.filter(move |event| match event {
            CoreEvent::Playback(playback) => playback.track_id() == Some(track_id.as_str()),
            CoreEvent::Playlist(_) => false,
        })
    }

    /// Keep only sequencer events.
    pub fn playlist_only(self) -> Self {
        self.filter(|event| matches!(event, CoreEvent::Playlist(_)))
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filters.iter().all(|filter| filter(event))
    }

    /// Wait for the next accepted event.
    ///
    /// # Errors
    ///
    /// - `Lagged(n)` if `n` events were dropped before this receiver saw them
    /// - `Closed` once every bus clone is gone
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Next accepted event already queued, `Ok(None)` if there is none.
    pub fn try_recv(&mut self) -> Result<Option<CoreEvent>, RecvError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Ok(Some(event)),
                Ok(_) => {}
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Lagged(n)) => return Err(RecvError::Lagged(n)),
                Err(TryRecvError::Closed) => return Err(RecvError::Closed),
            }
        }
    }

    /// Drain every accepted event already queued, skipping over lag.
    pub fn drain(&mut self) -> Vec<CoreEvent> {
        let mut events = Vec::new();
        loop {
            match self.try_recv() {
                Ok(Some(event)) => events.push(event),
                Err(RecvError::Lagged(_)) => continue,
                Ok(None) | Err(RecvError::Closed) => return events,
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("filters", &self.filters.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

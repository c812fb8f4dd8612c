//! Domain models for the song library
//!
//! A [`Track`] is anything that can describe itself and open a fresh
//! [`SampleSource`] for playback. Loaders produce tracks; playlists order them.

use core_playback::{Result as PlaybackResult, SampleSource};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

// =============================================================================
// ID Types
// =============================================================================

/// Stable identifier of a playlist entry, independent of its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackId(pub Uuid);

impl TrackId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for TrackId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Track Contract
// =============================================================================

/// A playable song.
///
/// Implementations are usually produced by a
/// [`SongLoader`](crate::loader::SongLoader) and must be cheap to clone
/// behind an `Arc`; the expensive part happens in
/// [`open_source`](Track::open_source), which is called once per playback.
pub trait Track: Send + Sync {
    fn name(&self) -> &str;

    fn album(&self) -> &str;

    fn artist(&self) -> &str;

    /// Length if known without rendering.
    fn duration(&self) -> Option<Duration> {
        None
    }

    /// Open a new source positioned at the start of the song.
    fn open_source(&self) -> PlaybackResult<Box<dyn SampleSource>>;
}

impl fmt::Debug for dyn Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("name", &self.name())
            .field("album", &self.album())
            .field("artist", &self.artist())
            .finish()
    }
}

/// Display metadata of a track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub name: String,
    pub album: String,
    pub artist: String,
    #[serde(default)]
    pub duration: Option<Duration>,
}

impl TrackInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = album.into();
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = artist.into();
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

type SourceFactory = dyn Fn() -> PlaybackResult<Box<dyn SampleSource>> + Send + Sync;

/// Track whose source comes from a factory closure.
///
/// Handy for generated material and for loaders that have already parsed
/// everything they need up front.
#[derive(Clone)]
pub struct FactoryTrack {
    info: TrackInfo,
    factory: Arc<SourceFactory>,
}

impl FactoryTrack {
    pub fn new<F>(info: TrackInfo, factory: F) -> Self
    where
        F: Fn() -> PlaybackResult<Box<dyn SampleSource>> + Send + Sync + 'static,
    {
        Self {
            info,
            factory: Arc::new(factory),
        }
    }

    pub fn info(&self) -> &TrackInfo {
        &self.info
    }
}

impl Track for FactoryTrack {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn album(&self) -> &str {
        &self.info.album
    }

    fn artist(&self) -> &str {
        &self.info.artist
    }

    fn duration(&self) -> Option<Duration> {
        self.info.duration
    }

    fn open_source(&self) -> PlaybackResult<Box<dyn SampleSource>> {
        (self.factory)()
    }
}

impl fmt::Debug for FactoryTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryTrack")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

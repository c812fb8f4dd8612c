//! # Playlist Model
//!
//! Ordered list of tracks where every entry carries a stable [`TrackId`].
//!
//! ## Overview
//!
//! Positions shift as entries are inserted or removed while a playlist is
//! playing, so the sequencer remembers the *id* of the current entry and
//! resolves its live index at transition time. Replacing the track at a
//! position assigns a new id: the old entry is gone even though the slot
//! survives.

use crate::error::{LibraryError, Result};
use crate::models::{Track, TrackId};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A track together with its playlist identity.
#[derive(Clone)]
pub struct PlaylistEntry {
    pub id: TrackId,
    pub track: Arc<dyn Track>,
    pub added_at: DateTime<Utc>,
}

impl PlaylistEntry {
    fn new(track: Arc<dyn Track>) -> Self {
        Self {
            id: TrackId::new(),
            track,
            added_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for PlaylistEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaylistEntry")
            .field("id", &self.id)
            .field("track", &self.track)
            .field("added_at", &self.added_at)
            .finish()
    }
}

/// Ordered, mutable track list with stable ids.
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    entries: Vec<PlaylistEntry>,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a track and return its new id.
    pub fn push(&mut self, track: Arc<dyn Track>) -> TrackId {
        let entry = PlaylistEntry::new(track);
        let id = entry.id;
        self.entries.push(entry);
        id
    }

    /// Insert a track at `index`, shifting later entries back.
    pub fn insert(&mut self, index: usize, track: Arc<dyn Track>) -> Result<TrackId> {
        if index > self.entries.len() {
            return Err(out_of_bounds(index, self.entries.len()));
        }
        let entry = PlaylistEntry::new(track);
        let id = entry.id;
        self.entries.insert(index, entry);
        Ok(id)
    }

    /// Remove the entry at `index`.
    pub fn remove(&mut self, index: usize) -> Option<PlaylistEntry> {
        (index < self.entries.len()).then(|| self.entries.remove(index))
    }

    /// Remove the entry with `id`. Returns `false` if it is not present.
    pub fn remove_id(&mut self, id: TrackId) -> bool {
        match self.index_of(id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Put `track` at `index` under a fresh id and return that id.
    pub fn replace(&mut self, index: usize, track: Arc<dyn Track>) -> Result<TrackId> {
        let len = self.entries.len();
        let slot = self
            .entries
            .get_mut(index)
            .ok_or_else(|| out_of_bounds(index, len))?;
        *slot = PlaylistEntry::new(track);
        Ok(slot.id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Live position of the entry with `id`.
    pub fn index_of(&self, id: TrackId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == id)
    }

    pub fn get(&self, index: usize) -> Option<&PlaylistEntry> {
        self.entries.get(index)
    }

    pub fn get_by_id(&self, id: TrackId) -> Option<&PlaylistEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Ids in playlist order.
    pub fn ids(&self) -> Vec<TrackId> {
        self.entries.iter().map(|entry| entry.id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlaylistEntry> {
        self.entries.iter()
    }
}

impl Extend<Arc<dyn Track>> for Playlist {
    fn extend<I: IntoIterator<Item = Arc<dyn Track>>>(&mut self, tracks: I) {
        self.entries
            .extend(tracks.into_iter().map(PlaylistEntry::new));
    }
}

impl FromIterator<Arc<dyn Track>> for Playlist {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Track>>>(tracks: I) -> Self {
        let mut playlist = Playlist::new();
        playlist.extend(tracks);
        playlist
    }
}

fn out_of_bounds(index: usize, len: usize) -> LibraryError {
    LibraryError::InvalidInput {
        field: "index".to_string(),
        message: format!("{} is out of bounds for a playlist of {}", index, len),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FactoryTrack, TrackInfo};
    use core_playback::{PlaybackError, SampleSource};

    fn track(name: &str) -> Arc<dyn Track> {
        Arc::new(FactoryTrack::new(TrackInfo::new(name), || {
            Err::<Box<dyn SampleSource>, _>(PlaybackError::SourceError("unused".into()))
        }))
    }

    fn names(playlist: &Playlist) -> Vec<String> {
        playlist
            .iter()
            .map(|entry| entry.track.name().to_string())
            .collect()
    }

    #[test]
    fn test_ids_survive_reordering() {
        let mut playlist = Playlist::new();
        let a = playlist.push(track("a"));
        let b = playlist.push(track("b"));
        assert_eq!(playlist.index_of(b), Some(1));

        playlist.insert(0, track("intro")).unwrap();
        assert_eq!(playlist.index_of(a), Some(1));
        assert_eq!(playlist.index_of(b), Some(2));

        assert!(playlist.remove_id(a));
        assert!(!playlist.remove_id(a));
        assert_eq!(playlist.index_of(b), Some(1));
        assert_eq!(names(&playlist), ["intro", "b"]);
    }

    #[test]
    fn test_replace_assigns_new_id() {
        let mut playlist: Playlist = [track("a"), track("b")].into_iter().collect();
        let old = playlist.ids()[1];

        let new = playlist.replace(1, track("c")).unwrap();
        assert_ne!(old, new);
        assert_eq!(playlist.index_of(old), None);
        assert_eq!(playlist.index_of(new), Some(1));
        assert_eq!(playlist.get_by_id(new).unwrap().track.name(), "c");
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let mut playlist = Playlist::new();
        assert!(playlist.insert(1, track("a")).is_err());
        assert!(playlist.replace(0, track("a")).is_err());
        assert!(playlist.remove(0).is_none());
        assert!(playlist.insert(0, track("a")).is_ok());
    }

    #[test]
    fn test_clear_and_get() {
        let mut playlist = Playlist::new();
        playlist.extend([track("a"), track("b"), track("c")]);
        assert_eq!(playlist.len(), 3);
        assert_eq!(playlist.get(2).unwrap().track.name(), "c");

        let removed = playlist.remove(0).unwrap();
        assert_eq!(removed.track.name(), "a");

        playlist.clear();
        assert!(playlist.is_empty());
        assert!(playlist.ids().is_empty());
    }
}

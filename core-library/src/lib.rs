//! # Library Management Module
//!
//! Owns the song-side models the playback engine plays from.
//!
//! ## Overview
//!
//! This module manages:
//! - The [`Track`] contract and stable [`TrackId`]s
//! - The ordered [`Playlist`] model used by the sequencer
//! - Song loader plugins and the [`LoaderRegistry`] that runs them

pub mod error;
pub mod loader;
pub mod models;
pub mod playlist;

pub use error::{LibraryError, Result};
pub use loader::{LoaderRegistry, ReadSeek, SongLoader};
pub use models::{FactoryTrack, Track, TrackId, TrackInfo};
pub use playlist::{Playlist, PlaylistEntry};

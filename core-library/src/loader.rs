//! # Song Loaders
//!
//! Loaders turn a byte stream plus its URI into tracks. A container format
//! such as a ROM or a module archive can yield many songs from one stream,
//! so every loader returns a collection.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_library::loader::LoaderRegistry;
//!
//! let mut registry = LoaderRegistry::new();
//! registry.register(Arc::new(RomLoader::default()));
//!
//! let mut file = std::fs::File::open(path)?;
//! let tracks = registry.load(&mut file, "file:///music/game.gba#3,7")?;
//! ```

use crate::error::{LibraryError, Result};
use crate::models::Track;
use core_runtime::logging::strip_path;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Seekable byte stream handed to loaders.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// A format plugin.
pub trait SongLoader: Send + Sync {
    /// Short identifier used in logs, e.g. `"gba"`.
    fn name(&self) -> &str;

    /// Try to read songs from `reader`.
    ///
    /// Returns `Ok(None)` when the stream is not in this loader's format. The
    /// reader starts at offset zero; loaders may leave it anywhere.
    fn try_load_songs(
        &self,
        reader: &mut dyn ReadSeek,
        uri: &str,
    ) -> Result<Option<Vec<Arc<dyn Track>>>>;
}

/// Ordered set of loaders tried against every stream.
#[derive(Default, Clone)]
pub struct LoaderRegistry {
    loaders: Vec<Arc<dyn SongLoader>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, loader: Arc<dyn SongLoader>) {
        debug!(loader = loader.name(), "Registered song loader");
        self.loaders.push(loader);
    }

    pub fn with_loader(mut self, loader: Arc<dyn SongLoader>) -> Self {
        self.register(loader);
        self
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.loaders.iter().map(|loader| loader.name()).collect()
    }

    /// Run every loader against `reader`, rewinding before each attempt, and
    /// collect the tracks of all loaders that recognised it.
    ///
    /// A loader that fails is logged and skipped.
    ///
    /// # Errors
    ///
    /// - `Io` if the stream cannot be rewound
    /// - `Unrecognized` if no loader accepted the stream
    #[instrument(skip(self, reader), fields(file = strip_path(uri)))]
    pub fn load(&self, reader: &mut dyn ReadSeek, uri: &str) -> Result<Vec<Arc<dyn Track>>> {
        let mut tracks = Vec::new();
        let mut recognised = false;

        for loader in &self.loaders {
            reader.seek(SeekFrom::Start(0))?;
            match loader.try_load_songs(reader, uri) {
                Ok(Some(songs)) => {
                    debug!(loader = loader.name(), songs = songs.len(), "Loader accepted stream");
                    recognised = true;
                    tracks.extend(songs);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(loader = loader.name(), error = %e, "Song loader failed; skipping");
                }
            }
        }

        if !recognised {
            return Err(LibraryError::Unrecognized {
                uri: strip_path(uri).to_string(),
            });
        }

        info!(tracks = tracks.len(), "Loaded songs");
        Ok(tracks)
    }
}

impl std::fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderRegistry")
            .field("loaders", &self.names())
            .finish()
    }
}

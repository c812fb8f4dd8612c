use core_playback::PlaybackError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Loader {loader} failed: {message}")]
    Loader { loader: String, message: String },

    #[error("No loader recognised {uri}")]
    Unrecognized { uri: String },

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LibraryError>;

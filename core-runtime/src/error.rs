//! Runtime error types.

use thiserror::Error;

/// Errors raised while bootstrapping the runtime.
#[derive(Error, Debug)]
pub enum Error {
    /// A setting is missing or out of range.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required host capability was not injected.
    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns `true` if the host must inject something before retrying.
    pub fn is_capability_missing(&self) -> bool {
        matches!(self, Error::CapabilityMissing { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

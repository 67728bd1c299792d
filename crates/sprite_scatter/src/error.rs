//! Error types and result alias for the crate.
//!
//! This module defines [`enum@crate::error::Error`] and the crate-wide [Result] alias.
//! Variants cover invalid configuration, asset resolution failures, missing
//! textures and edit targets, persistence failures, payload versioning, and
//! generic errors.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to resolve asset '{src}': {reason}")]
    AssetResolve { src: String, reason: String },

    #[error("missing texture '{id}'")]
    MissingTexture { id: String },

    #[error("persistence operation failed: {0}")]
    Persistence(String),

    #[error("missing edit target '{id}'")]
    MissingTarget { id: String },

    #[error("no render surface available")]
    NoRenderSurface,

    #[error("flags payload version {found} does not match expected {expected}")]
    PayloadVersion { found: u32, expected: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Error::Other(value)
    }
}

impl From<&str> for Error {
    fn from(value: &str) -> Self {
        Error::Other(value.to_owned())
    }
}

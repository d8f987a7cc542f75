//! Platform client error types

use thiserror::Error;

/// Remote errors, normalized by HTTP status
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] stackmig_archive::ArchiveError),
}

impl PlatformError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PlatformError::NotFound(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, PlatformError::Unauthorized(_))
    }
}

pub type Result<T> = std::result::Result<T, PlatformError>;

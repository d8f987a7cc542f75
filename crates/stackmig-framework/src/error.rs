//! Framework error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameworkError {
    #[error("Resource not found in state: {0}")]
    ResourceNotFound(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FrameworkError>;

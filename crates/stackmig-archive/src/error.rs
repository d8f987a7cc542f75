use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Path is not absolute: {0}")]
    NotAbsolute(PathBuf),

    #[error("Path does not exist: {0}")]
    NotFound(PathBuf),

    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Symbolic link cycle at {0}")]
    SymlinkCycle(PathBuf),

    #[error("Failed to pack {path}: {source}")]
    Pack {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ArchiveError {
    /// The path exists-or-is-a-directory checks failed
    pub fn is_invalid_path(&self) -> bool {
        matches!(
            self,
            ArchiveError::NotFound(_) | ArchiveError::NotADirectory(_)
        )
    }

    /// The path is unusable as configured (not absolute)
    pub fn is_invalid_config(&self) -> bool {
        matches!(self, ArchiveError::NotAbsolute(_))
    }

    pub(crate) fn pack(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchiveError::Pack {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

//! Configuration directory checks

use crate::error::{ArchiveError, Result};
use std::path::{Path, PathBuf};

/// Check that `path` is absolute, exists, and is a directory.
///
/// Absoluteness is checked first so a relative path is always reported as
/// such, whatever the current directory contains. Symbolic links are
/// followed.
pub fn check_directory(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();

    if !path.is_absolute() {
        return Err(ArchiveError::NotAbsolute(path.to_path_buf()));
    }

    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ArchiveError::NotFound(path.to_path_buf()));
        }
        Err(e) => return Err(ArchiveError::pack(path, e)),
    };

    if !metadata.is_dir() {
        return Err(ArchiveError::NotADirectory(path.to_path_buf()));
    }

    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_accepts_directory() {
        let temp_dir = tempdir().unwrap();
        let checked = check_directory(temp_dir.path()).unwrap();
        assert_eq!(checked, temp_dir.path());
    }

    #[test]
    fn test_rejects_relative() {
        let err = check_directory("configs/stack").unwrap_err();
        assert!(err.is_invalid_config());
        assert!(!err.is_invalid_path());

        // Relative paths are rejected even when they exist
        let err = check_directory(".").unwrap_err();
        assert!(matches!(err, ArchiveError::NotAbsolute(_)));
    }

    #[test]
    fn test_rejects_missing() {
        let temp_dir = tempdir().unwrap();
        let err = check_directory(temp_dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, ArchiveError::NotFound(_)));
        assert!(err.is_invalid_path());
    }

    #[test]
    fn test_rejects_regular_file() {
        let temp_dir = tempdir().unwrap();
        let file = temp_dir.path().join("main.tf");
        fs::write(&file, "terraform {}").unwrap();

        let err = check_directory(&file).unwrap_err();
        assert!(matches!(err, ArchiveError::NotADirectory(_)));
        assert!(err.is_invalid_path());
    }

    #[cfg(unix)]
    #[test]
    fn test_follows_symlink_to_directory() {
        let temp_dir = tempdir().unwrap();
        let real = temp_dir.path().join("real");
        fs::create_dir(&real).unwrap();
        let link = temp_dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        assert!(check_directory(&link).is_ok());
    }
}

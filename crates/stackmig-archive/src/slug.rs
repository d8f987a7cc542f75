//! Deterministic configuration slugs
//!
//! A slug is a tar archive of a configuration directory whose bytes depend
//! only on relative paths, file contents, and the executable bit. Entries are
//! sorted by name, timestamps and ownership are zeroed, and symbolic links are
//! dereferenced, so the same tree hashes the same on every host.

use crate::error::{ArchiveError, Result};
use crate::path::check_directory;
use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header};

const DIR_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;
const EXEC_MODE: u32 = 0o755;

/// Upload size above which a warning is logged
const LARGE_SLUG_SIZE: usize = 100 * 1024 * 1024;

/// Packed configuration directory
#[derive(Debug, Clone)]
pub struct Slug {
    archive: Vec<u8>,
}

impl Slug {
    /// Pack `dir` into a deterministic tar archive
    pub fn pack(dir: &Path) -> Result<Self> {
        let root = check_directory(dir)?;
        tracing::debug!(dir = %root.display(), "packing configuration directory");

        let mut builder = Builder::new(Vec::new());
        let canonical_root = fs::canonicalize(&root).map_err(|e| ArchiveError::pack(&root, e))?;
        let mut ancestors = vec![canonical_root];
        append_dir(&mut builder, &root, Path::new(""), &mut ancestors)?;

        let archive = builder
            .into_inner()
            .map_err(|e| ArchiveError::pack(&root, e))?;

        tracing::debug!(bytes = archive.len(), "configuration packed");
        Ok(Self { archive })
    }

    /// Lowercase hex SHA-256 of the archive bytes
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(&self.archive))
    }

    /// Gzip the archive for upload
    pub fn gzip(&self) -> Result<Vec<u8>> {
        let gzip_err = |e| ArchiveError::pack(PathBuf::from("<gzip>"), e);

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&self.archive).map_err(gzip_err)?;
        let compressed = encoder.finish().map_err(gzip_err)?;

        if compressed.len() > LARGE_SLUG_SIZE {
            tracing::warn!(
                mb = compressed.len() / 1024 / 1024,
                "configuration upload is large; consider trimming the directory"
            );
        }
        Ok(compressed)
    }
}

/// Content digest of a configuration directory
pub fn hash_directory(dir: impl AsRef<Path>) -> Result<String> {
    Ok(Slug::pack(dir.as_ref())?.digest())
}

fn append_dir(
    builder: &mut Builder<Vec<u8>>,
    dir: &Path,
    relative: &Path,
    ancestors: &mut Vec<PathBuf>,
) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| ArchiveError::pack(dir, e))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| ArchiveError::pack(dir, e))?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let name = relative.join(entry.file_name());
        // Follows symbolic links
        let metadata = fs::metadata(&path).map_err(|e| ArchiveError::pack(&path, e))?;

        if metadata.is_dir() {
            let canonical = fs::canonicalize(&path).map_err(|e| ArchiveError::pack(&path, e))?;
            if ancestors.contains(&canonical) {
                return Err(ArchiveError::SymlinkCycle(path));
            }

            let mut header = base_header(EntryType::Directory, DIR_MODE, 0);
            builder
                .append_data(&mut header, &name, std::io::empty())
                .map_err(|e| ArchiveError::pack(&path, e))?;

            ancestors.push(canonical);
            append_dir(builder, &path, &name, ancestors)?;
            ancestors.pop();
        } else if metadata.is_file() {
            let mode = if is_executable(&metadata) {
                EXEC_MODE
            } else {
                FILE_MODE
            };
            let mut header = base_header(EntryType::Regular, mode, metadata.len());
            let file = File::open(&path).map_err(|e| ArchiveError::pack(&path, e))?;
            builder
                .append_data(&mut header, &name, file)
                .map_err(|e| ArchiveError::pack(&path, e))?;
        } else {
            tracing::trace!(path = %path.display(), "skipping special file");
        }
    }

    Ok(())
}

fn base_header(entry_type: EntryType, mode: u32, size: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mode(mode);
    header.set_size(size);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}

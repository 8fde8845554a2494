//! Package archive access and the nested-package extraction cache.
//!
//! Candidate archives are gzipped tarballs. Descriptors are read by streaming
//! the archive; nested packages (archives embedded inside another archive) are
//! copied out to a stable cache path keyed by the source's identity, so
//! repeated runs skip re-extraction.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use thiserror::Error;
use tracing::debug;

/// File extension of candidate archives.
pub const ARCHIVE_EXTENSION: &str = "mod";

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to read archive {archive}: {source}")]
    Io {
        archive: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Archive {archive} has no entry '{entry}'")]
    EntryMissing { archive: PathBuf, entry: String },

    #[error("Archive {archive} entry '{entry}' escapes the archive root")]
    PathEscape { archive: PathBuf, entry: String },
}

/// Read a single entry out of a gzipped tarball, `None` if absent.
pub fn read_archive_entry(archive: &Path, entry: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
    let file = File::open(archive).map_err(|e| ArchiveError::Io {
        archive: archive.to_path_buf(),
        source: e,
    })?;

    let mut tar = Archive::new(GzDecoder::new(file));
    let entries = tar.entries().map_err(|e| ArchiveError::Io {
        archive: archive.to_path_buf(),
        source: e,
    })?;

    for result in entries {
        let mut item = result.map_err(|e| ArchiveError::Io {
            archive: archive.to_path_buf(),
            source: e,
        })?;

        let path = item.path().map_err(|e| ArchiveError::Io {
            archive: archive.to_path_buf(),
            source: e,
        })?;

        if entry_matches(&path, entry) {
            let mut bytes = Vec::new();
            item.read_to_end(&mut bytes).map_err(|e| ArchiveError::Io {
                archive: archive.to_path_buf(),
                source: e,
            })?;
            return Ok(Some(bytes));
        }
    }

    Ok(None)
}

/// Whether a tar entry path names `wanted` (tolerating a leading "./").
fn entry_matches(path: &Path, wanted: &str) -> bool {
    let normalized: PathBuf = path
        .components()
        .filter(|c| matches!(c, std::path::Component::Normal(_)))
        .collect();
    normalized == Path::new(wanted)
}

/// On-disk cache for packages extracted out of other packages.
///
/// The cache key covers the parent path, entry name, size, and modification
/// time, so a changed parent archive naturally misses the old entry.
#[derive(Debug, Clone)]
pub struct ExtractionCache {
    root: PathBuf,
}

impl ExtractionCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Extract one nested archive entry to its cache path, reusing a previous
    /// extraction when the key still matches.
    pub fn extract(&self, parent: &Path, entry: &str) -> Result<PathBuf, ArchiveError> {
        if entry.contains("..") {
            return Err(ArchiveError::PathEscape {
                archive: parent.to_path_buf(),
                entry: entry.to_string(),
            });
        }

        let file_name = Path::new(entry)
            .file_name()
            .ok_or_else(|| ArchiveError::PathEscape {
                archive: parent.to_path_buf(),
                entry: entry.to_string(),
            })?;

        let destination = self.root.join(self.cache_key(parent, entry)?).join(file_name);

        if destination.is_file() {
            debug!(path = %destination.display(), "reusing cached nested package");
            return Ok(destination);
        }

        let bytes = read_archive_entry(parent, entry)?.ok_or_else(|| {
            ArchiveError::EntryMissing {
                archive: parent.to_path_buf(),
                entry: entry.to_string(),
            }
        })?;

        let parent_dir = destination.parent().expect("cache path has a parent");
        fs::create_dir_all(parent_dir).map_err(|e| ArchiveError::Io {
            archive: parent.to_path_buf(),
            source: e,
        })?;

        fs::write(&destination, bytes).map_err(|e| ArchiveError::Io {
            archive: parent.to_path_buf(),
            source: e,
        })?;

        debug!(
            entry,
            parent = %parent.display(),
            path = %destination.display(),
            "extracted nested package"
        );

        Ok(destination)
    }

    /// Content key: blake3 over source path, entry name, size, and mtime.
    fn cache_key(&self, parent: &Path, entry: &str) -> Result<String, ArchiveError> {
        let stat = fs::metadata(parent).map_err(|e| ArchiveError::Io {
            archive: parent.to_path_buf(),
            source: e,
        })?;

        let mut hasher = blake3::Hasher::new();
        hasher.update(parent.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        hasher.update(entry.as_bytes());
        hasher.update(b"\0");
        hasher.update(&stat.len().to_le_bytes());

        if let Ok(modified) = stat.modified() {
            if let Ok(elapsed) = modified.duration_since(std::time::UNIX_EPOCH) {
                hasher.update(&elapsed.as_nanos().to_le_bytes());
            }
        }

        Ok(hex::encode(&hasher.finalize().as_bytes()[..16]))
    }
}

//! Finder that scans a mods directory.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{CandidateCollector, ModCandidateFinder};
use crate::nested::ARCHIVE_EXTENSION;
use crate::DiscoveryError;

/// Scans one directory for candidate archives and candidate subdirectories.
///
/// A missing root is created empty rather than treated as an error; a root
/// that exists but is not a directory is fatal. Hidden entries (dot-prefixed)
/// are skipped. Archives are matched by extension at the top level; an
/// immediate subdirectory counts as a candidate when it contains the
/// descriptor file.
#[derive(Debug)]
pub struct DirectoryModCandidateFinder {
    root: PathBuf,
    descriptor: String,
    follow_links: bool,
    requires_transform: bool,
}

impl DirectoryModCandidateFinder {
    pub fn new(root: impl Into<PathBuf>, descriptor: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            descriptor: descriptor.into(),
            follow_links: true,
            requires_transform: false,
        }
    }

    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Mark every unit from this root as still needing the host's transform
    /// step, e.g. a directory of unprocessed development builds.
    pub fn requires_transform(mut self, requires: bool) -> Self {
        self.requires_transform = requires;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_hidden(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false)
    }

    fn is_archive(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
            .unwrap_or(false)
    }
}

impl ModCandidateFinder for DirectoryModCandidateFinder {
    fn scan(&self, collector: &dyn CandidateCollector) -> Result<(), DiscoveryError> {
        if !self.root.exists() {
            info!(root = %self.root.display(), "mods directory missing, creating it");
            fs::create_dir_all(&self.root).map_err(|e| DiscoveryError::RootUnusable {
                root: self.root.clone(),
                source: e,
            })?;
            return Ok(());
        }

        if !self.root.is_dir() {
            return Err(DiscoveryError::RootNotADirectory {
                root: self.root.clone(),
            });
        }

        let walk = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(self.follow_links)
            .sort_by_file_name();

        for entry in walk {
            let entry = entry.map_err(|e| DiscoveryError::WalkFailed {
                root: self.root.clone(),
                message: e.to_string(),
            })?;
            let path = entry.path();

            if Self::is_hidden(path) {
                debug!(path = %path.display(), "skipping hidden entry");
                continue;
            }

            if entry.file_type().is_file() || (entry.path_is_symlink() && path.is_file()) {
                if Self::is_archive(path) {
                    collector.add(vec![path.to_path_buf()], self.requires_transform);
                } else {
                    debug!(path = %path.display(), "skipping non-candidate file");
                }
            } else if path.is_dir() {
                if path.join(&self.descriptor).is_file() {
                    collector.add(vec![path.to_path_buf()], self.requires_transform);
                } else {
                    warn!(
                        path = %path.display(),
                        descriptor = %self.descriptor,
                        "subdirectory has no descriptor, ignoring"
                    );
                }
            }
        }

        Ok(())
    }
}

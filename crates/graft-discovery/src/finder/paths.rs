//! Finder for explicitly listed candidate paths.

use std::path::PathBuf;

use tracing::debug;

use super::{CandidateCollector, ModCandidateFinder};
use crate::DiscoveryError;

/// Presents explicitly configured path groups as candidates.
///
/// Unlike a directory scan, these paths were asked for by name, so a missing
/// path is fatal rather than silently skipped. Each group is submitted as one
/// logical candidate unit even when it spans several paths.
#[derive(Debug, Default)]
pub struct PathListCandidateFinder {
    groups: Vec<(Vec<PathBuf>, bool)>,
}

impl PathListCandidateFinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single-path candidate.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.groups.push((vec![path.into()], false));
        self
    }

    /// Add a multi-path candidate treated as one unit.
    pub fn group(mut self, paths: Vec<PathBuf>) -> Self {
        self.groups.push((paths, false));
        self
    }

    /// Add a candidate unit the host still has to transform before loading.
    pub fn transformable_group(mut self, paths: Vec<PathBuf>) -> Self {
        self.groups.push((paths, true));
        self
    }
}

impl ModCandidateFinder for PathListCandidateFinder {
    fn scan(&self, collector: &dyn CandidateCollector) -> Result<(), DiscoveryError> {
        for (group, requires_transform) in &self.groups {
            for path in group {
                if !path.exists() {
                    return Err(DiscoveryError::MissingPath { path: path.clone() });
                }
            }

            if collector.add(group.clone(), *requires_transform) {
                debug!(?group, "collected configured candidate paths");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finder::LocationCollector;
    use tempfile::tempdir;

    #[test]
    fn test_existing_paths_are_collected_as_units() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.mod");
        let b = dir.path().join("b");
        std::fs::write(&a, b"x").unwrap();
        std::fs::create_dir(&b).unwrap();

        let finder = PathListCandidateFinder::new()
            .path(&a)
            .group(vec![a.clone(), b.clone()]);

        let collector = LocationCollector::new();
        finder.scan(&collector).unwrap();

        let groups = collector.into_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].paths, [a, b]);
    }

    #[test]
    fn test_missing_path_is_fatal() {
        let dir = tempdir().unwrap();
        let finder = PathListCandidateFinder::new().path(dir.path().join("gone.mod"));

        let collector = LocationCollector::new();
        let err = finder.scan(&collector).unwrap_err();
        assert!(matches!(err, DiscoveryError::MissingPath { .. }));
    }
}

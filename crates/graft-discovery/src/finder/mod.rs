//! Candidate finders and the shared collector they feed.
//!
//! A finder knows one way of locating candidate path groups (a mods
//! directory, an explicit path list). Finders run concurrently and push into a
//! single collector that deduplicates by canonical path and preserves
//! insertion order.

pub mod directory;
pub mod paths;

use std::path::PathBuf;

use dashmap::DashSet;
use parking_lot::Mutex;

use crate::DiscoveryError;

pub use directory::DirectoryModCandidateFinder;
pub use paths::PathListCandidateFinder;

/// One candidate path group as emitted by a finder.
///
/// A group is one logical unit: usually a single archive or directory, but an
/// explicit path list may present several paths as one candidate. The
/// `requires_transform` flag marks units the host's code-loading boundary
/// still has to run its transformation step over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateLocation {
    pub paths: Vec<PathBuf>,
    pub requires_transform: bool,
}

/// Receives candidate path groups from finders.
pub trait CandidateCollector: Send + Sync {
    /// Submit a path group. Returns false if an equivalent group was already
    /// collected.
    fn add(&self, paths: Vec<PathBuf>, requires_transform: bool) -> bool;
}

/// Thread-safe collector keyed by canonicalized path groups.
///
/// The first submission of a group wins; later equivalents (symlinks, repeat
/// scans) are dropped. Accepted groups keep their submission order so the
/// overall pipeline stays deterministic for a fixed finder order.
#[derive(Debug, Default)]
pub struct LocationCollector {
    seen: DashSet<Vec<PathBuf>>,
    groups: Mutex<Vec<CandidateLocation>>,
}

impl LocationCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the accepted groups in insertion order.
    pub fn into_groups(self) -> Vec<CandidateLocation> {
        self.groups.into_inner()
    }

    fn canonical_key(paths: &[PathBuf]) -> Vec<PathBuf> {
        paths
            .iter()
            .map(|p| p.canonicalize().unwrap_or_else(|_| p.clone()))
            .collect()
    }
}

impl CandidateCollector for LocationCollector {
    fn add(&self, paths: Vec<PathBuf>, requires_transform: bool) -> bool {
        if !self.seen.insert(Self::canonical_key(&paths)) {
            return false;
        }

        self.groups.lock().push(CandidateLocation {
            paths,
            requires_transform,
        });
        true
    }
}

/// A source of candidate path groups.
pub trait ModCandidateFinder: Send + Sync {
    /// Scan this finder's locations and submit every candidate group found.
    fn scan(&self, collector: &dyn CandidateCollector) -> Result<(), DiscoveryError>;
}

//! Candidate discovery for the Graft mod loader.
//!
//! Discovery turns configured locations into a deduplicated set of frozen
//! [`ModCandidate`]s. Finders locate candidate path groups concurrently, each
//! group's descriptor is parsed, nested packages are extracted and processed
//! recursively, and duplicate ids collapse deterministically. Locations whose
//! descriptor is missing or malformed never abort the run; they are reported
//! alongside the candidates.

pub mod finder;
pub mod metadata;
pub mod nested;

#[cfg(test)]
pub(crate) mod testutil;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use indexmap::IndexMap;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use graft_core::types::{ModCandidate, ModOrigin};

use crate::finder::{LocationCollector, ModCandidateFinder};
use crate::metadata::{JsonMetadataReader, MetadataOverrides, MetadataReader, ModMetadata};
use crate::nested::{read_archive_entry, ExtractionCache, ARCHIVE_EXTENSION};

pub use crate::finder::{
    CandidateCollector, CandidateLocation, DirectoryModCandidateFinder, PathListCandidateFinder,
};
pub use crate::metadata::{MetadataError, DEFAULT_ADAPTER, DEFAULT_DESCRIPTOR};

/// Fatal discovery failures. Per-location descriptor problems are reported as
/// [`NonConformingLocation`]s instead.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Mod location {root} exists but is not a directory")]
    RootNotADirectory { root: PathBuf },

    #[error("Mod location {root} is unusable: {source}")]
    RootUnusable {
        root: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Configured mod path {path} does not exist")]
    MissingPath { path: PathBuf },

    #[error("Failed to scan {root}: {message}")]
    WalkFailed { root: PathBuf, message: String },

    #[error("Discovery did not finish within {waited:?}")]
    Timeout { waited: Duration },
}

/// A location that was found but could not be turned into a candidate.
#[derive(Debug, Clone)]
pub struct NonConformingLocation {
    pub paths: Vec<PathBuf>,
    pub reason: String,
}

/// The outcome of a discovery run.
#[derive(Debug, Default)]
pub struct DiscoveredMods {
    /// Deduplicated candidates, in deterministic first-seen order.
    pub candidates: Vec<ModCandidate>,
    /// Locations excluded for descriptor problems, for user-facing reporting.
    pub non_conforming: Vec<NonConformingLocation>,
}

/// Orchestrates finders, metadata reading, and nested-package processing.
pub struct ModDiscoverer {
    finders: Vec<Box<dyn ModCandidateFinder>>,
    reader: Arc<dyn MetadataReader>,
    overrides: MetadataOverrides,
    cache: Option<ExtractionCache>,
    timeout: Option<Duration>,
}

impl Default for ModDiscoverer {
    fn default() -> Self {
        Self::new()
    }
}

impl ModDiscoverer {
    pub fn new() -> Self {
        Self {
            finders: Vec::new(),
            reader: Arc::new(JsonMetadataReader),
            overrides: MetadataOverrides::default(),
            cache: None,
            timeout: None,
        }
    }

    pub fn finder(mut self, finder: impl ModCandidateFinder + 'static) -> Self {
        self.finders.push(Box::new(finder));
        self
    }

    /// Replace the descriptor reader, e.g. for a non-JSON metadata format.
    pub fn reader(mut self, reader: impl MetadataReader + 'static) -> Self {
        self.reader = Arc::new(reader);
        self
    }

    pub fn overrides(mut self, overrides: MetadataOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Cache directory for packages extracted out of archives. Without one,
    /// archive-nested packages are reported as non-conforming.
    pub fn extraction_cache(mut self, cache: ExtractionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run discovery to completion, enforcing the configured timeout.
    pub fn discover(self) -> Result<DiscoveredMods, DiscoveryError> {
        match self.timeout {
            None => self.run(),
            Some(waited) => {
                let (tx, rx) = mpsc::channel();
                thread::spawn(move || {
                    let _ = tx.send(self.run());
                });

                match rx.recv_timeout(waited) {
                    Ok(result) => result,
                    Err(_) => Err(DiscoveryError::Timeout { waited }),
                }
            }
        }
    }

    fn run(&self) -> Result<DiscoveredMods, DiscoveryError> {
        // Finders scan in parallel into private collectors; merging in finder
        // order afterwards keeps the pipeline deterministic.
        let scanned: Result<Vec<Vec<CandidateLocation>>, DiscoveryError> = self
            .finders
            .par_iter()
            .map(|finder| {
                let collector = LocationCollector::new();
                finder.scan(&collector)?;
                Ok(collector.into_groups())
            })
            .collect();

        let merged = LocationCollector::new();
        for locations in scanned? {
            for location in locations {
                merged.add(location.paths, location.requires_transform);
            }
        }
        let locations = merged.into_groups();

        info!(locations = locations.len(), "collected candidate locations");

        let mut roots = Vec::new();
        let mut non_conforming = Vec::new();

        for location in locations {
            if let Some(candidate) = self.load_root(&location, &mut non_conforming) {
                roots.push(candidate);
            }
        }

        let candidates = dedup_candidates(roots);

        info!(
            mods = candidates.len(),
            rejected = non_conforming.len(),
            "discovery finished"
        );

        Ok(DiscoveredMods {
            candidates,
            non_conforming,
        })
    }

    /// Load one root location. Descriptor problems land in `non_conforming`.
    fn load_root(
        &self,
        location: &CandidateLocation,
        non_conforming: &mut Vec<NonConformingLocation>,
    ) -> Option<ModCandidate> {
        let group = location.paths.as_slice();

        let bytes = match self.read_descriptor(group) {
            Ok(bytes) => bytes,
            Err(reason) => {
                warn!(?group, %reason, "excluding non-conforming location");
                non_conforming.push(NonConformingLocation {
                    paths: group.to_vec(),
                    reason,
                });
                return None;
            }
        };

        let metadata = match self.reader.read(&bytes, &group[0]) {
            Ok(metadata) => metadata,
            Err(error) => {
                warn!(?group, %error, "excluding non-conforming location");
                non_conforming.push(NonConformingLocation {
                    paths: group.to_vec(),
                    reason: error.to_string(),
                });
                return None;
            }
        };

        let origin = ModOrigin::Paths(group.to_vec());
        Some(self.build_candidate(
            metadata,
            origin,
            None,
            group,
            location.requires_transform,
            non_conforming,
        ))
    }

    /// Locate and read the descriptor within a path group.
    fn read_descriptor(&self, group: &[PathBuf]) -> Result<Vec<u8>, String> {
        let descriptor = self.reader.descriptor_name();

        for path in group {
            if path.is_dir() {
                let file = path.join(descriptor);
                if file.is_file() {
                    return fs::read(&file).map_err(|e| {
                        format!("failed to read {}: {}", file.display(), e)
                    });
                }
            } else if path.is_file() {
                match read_archive_entry(path, descriptor) {
                    Ok(Some(bytes)) => return Ok(bytes),
                    Ok(None) => {}
                    Err(e) => return Err(e.to_string()),
                }
            }
        }

        Err(format!(
            "no {} found in {}",
            descriptor,
            group
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" + ")
        ))
    }

    /// Turn parsed metadata into a frozen candidate, recursing into nested
    /// packages. `unit` is the path group backing this candidate; nested
    /// packages inherit its `requires_transform` flag.
    fn build_candidate(
        &self,
        metadata: ModMetadata,
        origin: ModOrigin,
        parent: Option<&str>,
        unit: &[PathBuf],
        requires_transform: bool,
        non_conforming: &mut Vec<NonConformingLocation>,
    ) -> ModCandidate {
        let id = metadata.id.clone();

        let mut builder = ModCandidate::builder(metadata.id, metadata.version)
            .provides(metadata.provides)
            .environment(metadata.environment)
            .requires_transform(requires_transform)
            .origin(origin);

        for dependency in metadata.dependencies {
            builder = builder.dependency(dependency);
        }
        for (key, declarations) in metadata.entrypoints {
            for declaration in declarations {
                builder = builder.entrypoint(key.clone(), declaration);
            }
        }
        if let Some(parent) = parent {
            builder = builder.parent(parent);
        }

        for entry in &metadata.nested_paths {
            if let Some(nested) =
                self.load_nested(&id, unit, entry, requires_transform, non_conforming)
            {
                builder = builder.nested(nested);
            }
        }

        builder = self.overrides.apply(&id, builder);
        builder.build()
    }

    /// Resolve one nested package reference to an on-disk archive and load it.
    fn load_nested(
        &self,
        parent_id: &str,
        unit: &[PathBuf],
        entry: &str,
        requires_transform: bool,
        non_conforming: &mut Vec<NonConformingLocation>,
    ) -> Option<ModCandidate> {
        match self.locate_nested(unit, entry) {
            Ok(path) => {
                debug!(parent = parent_id, entry, path = %path.display(), "found nested package");

                let bytes = match read_archive_entry(&path, self.reader.descriptor_name()) {
                    Ok(Some(bytes)) => bytes,
                    Ok(None) => {
                        non_conforming.push(NonConformingLocation {
                            paths: vec![path.clone()],
                            reason: format!(
                                "nested package '{}' in '{}' has no {}",
                                entry,
                                parent_id,
                                self.reader.descriptor_name()
                            ),
                        });
                        return None;
                    }
                    Err(e) => {
                        non_conforming.push(NonConformingLocation {
                            paths: vec![path.clone()],
                            reason: e.to_string(),
                        });
                        return None;
                    }
                };

                let metadata = match self.reader.read(&bytes, &path) {
                    Ok(metadata) => metadata,
                    Err(error) => {
                        non_conforming.push(NonConformingLocation {
                            paths: vec![path.clone()],
                            reason: error.to_string(),
                        });
                        return None;
                    }
                };

                let origin = ModOrigin::Nested {
                    parent: parent_id.to_string(),
                    paths: vec![path.clone()],
                };
                let nested_unit = vec![path];
                Some(self.build_candidate(
                    metadata,
                    origin,
                    Some(parent_id),
                    &nested_unit,
                    requires_transform,
                    non_conforming,
                ))
            }
            Err(reason) => {
                non_conforming.push(NonConformingLocation {
                    paths: unit.to_vec(),
                    reason,
                });
                None
            }
        }
    }

    /// Find the archive file behind a nested reference: a plain file under a
    /// directory unit, or a cache extraction out of an archive unit.
    fn locate_nested(&self, unit: &[PathBuf], entry: &str) -> Result<PathBuf, String> {
        for path in unit {
            if path.is_dir() {
                let candidate = path.join(entry);
                if candidate.is_file() {
                    return Ok(candidate);
                }
            } else if path.is_file() && has_archive_extension(path) {
                let cache = self
                    .cache
                    .as_ref()
                    .ok_or_else(|| "no extraction cache configured for nested packages".to_string())?;
                match cache.extract(path, entry) {
                    Ok(extracted) => return Ok(extracted),
                    Err(nested::ArchiveError::EntryMissing { .. }) => {}
                    Err(e) => return Err(e.to_string()),
                }
            }
        }

        Err(format!("nested package '{}' not found", entry))
    }
}

fn has_archive_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
        .unwrap_or(false)
}

/// Collapse duplicate ids across the candidate forest.
///
/// Root-level candidates shadow nested copies of the same id. When an id only
/// appears nested, the highest version survives and the parent links of every
/// dropped copy are merged onto it. Distinct root-level duplicates are all
/// kept; rejecting them with a proper diagnostic is resolution's job.
fn dedup_candidates(roots: Vec<ModCandidate>) -> Vec<ModCandidate> {
    let mut by_id: IndexMap<String, Vec<ModCandidate>> = IndexMap::new();
    for root in roots {
        flatten_into(root, &mut by_id);
    }

    let mut result = Vec::new();
    for (id, copies) in by_id {
        let (root_copies, nested_copies): (Vec<_>, Vec<_>) =
            copies.into_iter().partition(|c| c.parents().is_empty());

        if !root_copies.is_empty() {
            if !nested_copies.is_empty() {
                debug!(
                    id = %id,
                    shadowed = nested_copies.len(),
                    "root-level mod shadows nested copies"
                );
            }
            result.extend(root_copies);
            continue;
        }

        let mut best: Option<ModCandidate> = None;
        let mut parents = Vec::new();
        for copy in nested_copies {
            for parent in copy.parents() {
                if !parents.contains(parent) {
                    parents.push(parent.clone());
                }
            }

            best = Some(match best.take() {
                None => copy,
                Some(current) => {
                    if copy.version().sort_cmp(current.version()).is_gt() {
                        copy
                    } else {
                        current
                    }
                }
            });
        }

        if let Some(best) = best {
            let mut builder = best.into_builder();
            for parent in parents {
                builder = builder.parent(parent);
            }
            result.push(builder.build());
        }
    }

    result
}

/// Flatten one candidate and its nested descendants into the id map.
fn flatten_into(candidate: ModCandidate, by_id: &mut IndexMap<String, Vec<ModCandidate>>) {
    for nested in candidate.nested().to_vec() {
        flatten_into(nested, by_id);
    }

    by_id
        .entry(candidate.id().to_string())
        .or_default()
        .push(candidate);
}

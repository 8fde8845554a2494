//! The Graft loader context.
//!
//! `Loader` wires the whole pipeline together: a builtin candidate for the
//! host, candidate discovery, mod set resolution, the hand-off of activated
//! mod paths to the host's code-loading boundary, and entrypoint storage.
//! Each loader instance is self-contained; hosts that need more than one
//! (tests, embedding) just construct more.

pub mod config;

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use graft_core::types::{ModCandidate, ModOrigin};
use graft_discovery::nested::ExtractionCache;
use graft_discovery::{
    DirectoryModCandidateFinder, DiscoveryError, ModDiscoverer, NonConformingLocation,
    PathListCandidateFinder,
};
use graft_entrypoint::{
    AdapterRegistry, EntrypointContainer, EntrypointError, EntrypointStorage,
};
use graft_resolver::{resolve, ResolutionWarning, ResolveError, ResolveOptions};

pub use config::LoaderConfig;
pub use graft_entrypoint::{FunctionAdapter, LanguageAdapter};
pub use graft_resolver::LoadOrder;

/// The host's code-loading boundary.
///
/// The loader never loads code itself; it hands each activated mod's paths to
/// the host, in activation order, and the host makes them loadable however it
/// sees fit.
pub trait SearchPathSink {
    fn add_to_search_path(&mut self, id: &str, paths: &[&Path]) -> anyhow::Result<()>;
}

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Entrypoint(#[from] EntrypointError),

    #[error("Host rejected search path entry for mod '{id}': {source}")]
    SearchPath {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Loader has already loaded a mod set")]
    AlreadyLoaded,
}

/// What a completed load produced.
#[derive(Debug)]
pub struct LoadSummary {
    pub mods: usize,
    pub warnings: Vec<ResolutionWarning>,
    pub non_conforming: usize,
}

/// One loader instance: configuration, the activated mod set, and entrypoint
/// storage.
pub struct Loader {
    config: LoaderConfig,
    storage: EntrypointStorage,
    mods: Vec<ModCandidate>,
    non_conforming: Vec<NonConformingLocation>,
    loaded: bool,
}

impl Loader {
    pub fn new(config: LoaderConfig, adapters: AdapterRegistry) -> Self {
        Self {
            config,
            storage: EntrypointStorage::new(adapters),
            mods: Vec::new(),
            non_conforming: Vec::new(),
            loaded: false,
        }
    }

    /// Run the full pipeline: discover, resolve, hand paths to the host, and
    /// populate entrypoint storage. One-shot per loader instance.
    pub fn load(&mut self, sink: &mut dyn SearchPathSink) -> Result<LoadSummary, LoaderError> {
        if self.loaded {
            return Err(LoaderError::AlreadyLoaded);
        }

        let discovered = self.discover()?;
        self.non_conforming = discovered.non_conforming;
        for location in &self.non_conforming {
            warn!(paths = ?location.paths, reason = %location.reason, "skipped non-conforming mod");
        }

        let mut candidates = discovered.candidates;
        candidates.insert(0, self.builtin_candidate());

        let options = ResolveOptions {
            load_order: self.config.load_order,
            load_late: self.config.load_late.clone(),
            timeout: self.config.resolution_timeout,
        };
        let resolution = resolve(
            candidates,
            self.config.env,
            self.config.disabled.clone(),
            options,
        )?;

        for warning in &resolution.warnings {
            warn!("{}", warning);
        }

        for candidate in &resolution.mods {
            if candidate.is_builtin() {
                continue;
            }

            let paths: Vec<&Path> = candidate.paths().iter().map(|p| p.as_path()).collect();
            sink.add_to_search_path(candidate.id(), &paths)
                .map_err(|source| LoaderError::SearchPath {
                    id: candidate.id().to_string(),
                    source,
                })?;
        }

        for candidate in &resolution.mods {
            for (key, declarations) in candidate.entrypoints() {
                for declaration in declarations {
                    self.storage.add(candidate.id(), key, declaration.clone());
                }
            }
        }

        info!("Loading {} mods:", resolution.mods.len());
        for candidate in &resolution.mods {
            info!("\t- {} {}", candidate.id(), candidate.version());
        }

        self.mods = resolution.mods;
        self.loaded = true;

        Ok(LoadSummary {
            mods: self.mods.len(),
            warnings: resolution.warnings,
            non_conforming: self.non_conforming.len(),
        })
    }

    fn discover(&self) -> Result<graft_discovery::DiscoveredMods, DiscoveryError> {
        let mut discoverer = ModDiscoverer::new().overrides(self.config.overrides.clone());

        for dir in &self.config.mod_dirs {
            discoverer = discoverer.finder(DirectoryModCandidateFinder::new(
                dir,
                graft_discovery::DEFAULT_DESCRIPTOR,
            ));
        }

        if !self.config.path_groups.is_empty() {
            let mut finder = PathListCandidateFinder::new();
            for group in &self.config.path_groups {
                finder = finder.group(group.clone());
            }
            discoverer = discoverer.finder(finder);
        }

        if let Some(cache_dir) = &self.config.cache_dir {
            discoverer = discoverer.extraction_cache(ExtractionCache::new(cache_dir));
        }

        if let Some(timeout) = self.config.discovery_timeout {
            discoverer = discoverer.timeout(timeout);
        }

        discoverer.discover()
    }

    /// Synthetic candidate representing the host, so mods can depend on it.
    fn builtin_candidate(&self) -> ModCandidate {
        ModCandidate::builder(&self.config.host_id, self.config.host_version.clone())
            .origin(ModOrigin::Builtin)
            .build()
    }

    /// Activated mods in activation order. Empty before `load`.
    pub fn mods(&self) -> &[ModCandidate] {
        &self.mods
    }

    /// Whether an activated mod satisfies `id` directly or via an alias.
    pub fn is_mod_loaded(&self, id: &str) -> bool {
        self.mods.iter().any(|c| c.satisfies_id(id))
    }

    /// Locations discovery excluded, for host-side diagnostics.
    pub fn non_conforming(&self) -> &[NonConformingLocation] {
        &self.non_conforming
    }

    pub fn get_entrypoints<T: Any + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Vec<Arc<T>>, EntrypointError> {
        self.storage.get_entrypoints(key)
    }

    pub fn get_entrypoint_containers<T: Any + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Vec<EntrypointContainer<T>>, EntrypointError> {
        self.storage.get_entrypoint_containers(key)
    }

    /// Invoke every subscriber of `key` in activation order, aggregating
    /// failures.
    pub fn invoke_entrypoints<T, F>(&self, key: &str, invoker: F) -> Result<(), EntrypointError>
    where
        T: Any + Send + Sync,
        F: FnMut(&str, Arc<T>) -> anyhow::Result<()>,
    {
        self.storage.invoke_entrypoints(key, invoker)
    }
}

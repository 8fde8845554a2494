//! Loader configuration.
//!
//! Everything the loader needs is carried explicitly in this struct; there is
//! no global state and nothing is read from the environment. Hosts that want
//! env or CLI driven settings populate the config themselves.

use std::path::PathBuf;
use std::time::Duration;

use graft_core::types::{EnvType, Version};
use graft_discovery::metadata::MetadataOverrides;
use graft_resolver::LoadOrder;

/// Configuration for one loader instance.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub(crate) env: EnvType,
    pub(crate) host_id: String,
    pub(crate) host_version: Version,
    pub(crate) mod_dirs: Vec<PathBuf>,
    pub(crate) path_groups: Vec<Vec<PathBuf>>,
    pub(crate) cache_dir: Option<PathBuf>,
    pub(crate) disabled: Vec<String>,
    pub(crate) overrides: MetadataOverrides,
    pub(crate) discovery_timeout: Option<Duration>,
    pub(crate) resolution_timeout: Option<Duration>,
    pub(crate) load_order: LoadOrder,
    pub(crate) load_late: Vec<String>,
}

impl LoaderConfig {
    /// A config for the given environment and host identity. The host appears
    /// to mods as a builtin with this id and version.
    pub fn new(env: EnvType, host_id: impl Into<String>, host_version: Version) -> Self {
        Self {
            env,
            host_id: host_id.into(),
            host_version,
            mod_dirs: Vec::new(),
            path_groups: Vec::new(),
            cache_dir: None,
            disabled: Vec::new(),
            overrides: MetadataOverrides::default(),
            discovery_timeout: None,
            resolution_timeout: None,
            load_order: LoadOrder::Discovery,
            load_late: Vec::new(),
        }
    }

    /// Add a mods directory to scan. Created empty if missing.
    pub fn mod_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.mod_dirs.push(dir.into());
        self
    }

    /// Add an explicit path group treated as one candidate unit. Missing
    /// paths are fatal at discovery time.
    pub fn path_group(mut self, paths: Vec<PathBuf>) -> Self {
        self.path_groups.push(paths);
        self
    }

    /// Cache directory for nested package extraction.
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Exclude a mod id from activation.
    pub fn disable(mut self, id: impl Into<String>) -> Self {
        self.disabled.push(id.into());
        self
    }

    /// Metadata override tables applied before candidates freeze.
    pub fn overrides(mut self, overrides: MetadataOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = Some(timeout);
        self
    }

    pub fn resolution_timeout(mut self, timeout: Duration) -> Self {
        self.resolution_timeout = Some(timeout);
        self
    }

    pub fn load_order(mut self, order: LoadOrder) -> Self {
        self.load_order = order;
        self
    }

    /// Stably move a mod id to the end of the activation order.
    pub fn load_late(mut self, id: impl Into<String>) -> Self {
        self.load_late.push(id.into());
        self
    }

    pub fn env(&self) -> EnvType {
        self.env
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    pub fn host_version(&self) -> &Version {
        &self.host_version
    }
}

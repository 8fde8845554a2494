//! Mod descriptor reading.
//!
//! The on-disk descriptor format belongs to the metadata reader, not the
//! loader core: discovery only requires that a reader turns raw descriptor
//! bytes into a structured `ModMetadata` or a typed error. The default reader
//! consumes a `mod.json` JSON document.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

use graft_core::types::{
    DependencyKind, EntrypointDeclaration, Environment, ModCandidateBuilder, ModDependency,
    Version, VersionPredicate,
};

/// Descriptor file name looked for inside every candidate unit.
pub const DEFAULT_DESCRIPTOR: &str = "mod.json";

/// Adapter key used when a declaration does not name one.
pub const DEFAULT_ADAPTER: &str = "default";

/// Structured metadata parsed from one candidate's descriptor.
#[derive(Debug, Clone)]
pub struct ModMetadata {
    pub id: String,
    pub version: Version,
    pub provides: Vec<String>,
    pub environment: Environment,
    pub dependencies: Vec<ModDependency>,
    /// Entrypoint declarations by lifecycle key, in declaration order.
    pub entrypoints: IndexMap<String, Vec<EntrypointDeclaration>>,
    /// Paths of nested packages inside this unit, relative to its root.
    pub nested_paths: Vec<String>,
}

/// Per-candidate metadata failure. Never aborts discovery as a whole; the
/// offending location is excluded and reported as non-conforming.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("No {descriptor} found in {location}")]
    MissingDescriptor { descriptor: String, location: PathBuf },

    #[error("Failed to parse descriptor in {location}: {message}")]
    Parse { location: PathBuf, message: String },

    #[error("Descriptor field '{field}' in {location} is invalid: {reason}")]
    InvalidField {
        location: PathBuf,
        field: String,
        reason: String,
    },
}

/// Turns raw descriptor bytes into structured metadata.
pub trait MetadataReader: Send + Sync {
    /// File name of the descriptor inside a candidate unit.
    fn descriptor_name(&self) -> &str;

    fn read(&self, bytes: &[u8], location: &Path) -> Result<ModMetadata, MetadataError>;
}

/// Default descriptor reader for `mod.json` documents.
#[derive(Debug, Default)]
pub struct JsonMetadataReader;

/// On-disk descriptor shape. Dependency tables accept a single predicate
/// string or an array of alternatives; entrypoints accept a bare declaration
/// string or an `{adapter, value}` object.
#[derive(Deserialize)]
struct RawDescriptor {
    id: String,
    version: Version,
    #[serde(default)]
    provides: Vec<String>,
    #[serde(default)]
    environment: Environment,
    #[serde(default)]
    depends: IndexMap<String, RawPredicates>,
    #[serde(default)]
    recommends: IndexMap<String, RawPredicates>,
    #[serde(default)]
    conflicts: IndexMap<String, RawPredicates>,
    #[serde(default)]
    breaks: IndexMap<String, RawPredicates>,
    #[serde(default)]
    entrypoints: IndexMap<String, Vec<RawEntrypoint>>,
    #[serde(default)]
    bundled: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPredicates {
    One(VersionPredicate),
    Many(Vec<VersionPredicate>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEntrypoint {
    Plain(String),
    Tagged { adapter: String, value: String },
}

impl RawPredicates {
    fn into_vec(self) -> Vec<VersionPredicate> {
        match self {
            RawPredicates::One(p) => vec![p],
            RawPredicates::Many(list) => list,
        }
    }
}

impl MetadataReader for JsonMetadataReader {
    fn descriptor_name(&self) -> &str {
        DEFAULT_DESCRIPTOR
    }

    fn read(&self, bytes: &[u8], location: &Path) -> Result<ModMetadata, MetadataError> {
        let raw: RawDescriptor =
            serde_json::from_slice(bytes).map_err(|e| MetadataError::Parse {
                location: location.to_path_buf(),
                message: e.to_string(),
            })?;

        if !is_valid_mod_id(&raw.id) {
            return Err(MetadataError::InvalidField {
                location: location.to_path_buf(),
                field: "id".to_string(),
                reason: format!(
                    "'{}' must be non-empty lowercase alphanumerics, '-' or '_'",
                    raw.id
                ),
            });
        }

        for alias in &raw.provides {
            if !is_valid_mod_id(alias) {
                return Err(MetadataError::InvalidField {
                    location: location.to_path_buf(),
                    field: "provides".to_string(),
                    reason: format!("invalid alias id '{}'", alias),
                });
            }
        }

        let mut dependencies = Vec::new();
        for (table, kind) in [
            (raw.depends, DependencyKind::Depends),
            (raw.recommends, DependencyKind::Recommends),
            (raw.conflicts, DependencyKind::Conflicts),
            (raw.breaks, DependencyKind::Breaks),
        ] {
            for (target, predicates) in table {
                dependencies.push(ModDependency {
                    target,
                    kind,
                    predicates: predicates.into_vec(),
                });
            }
        }

        let mut entrypoints = IndexMap::new();
        for (key, declarations) in raw.entrypoints {
            let converted: Vec<EntrypointDeclaration> = declarations
                .into_iter()
                .map(|declaration| match declaration {
                    RawEntrypoint::Plain(value) => EntrypointDeclaration {
                        adapter: DEFAULT_ADAPTER.to_string(),
                        value,
                    },
                    RawEntrypoint::Tagged { adapter, value } => {
                        EntrypointDeclaration { adapter, value }
                    }
                })
                .collect();
            entrypoints.insert(key, converted);
        }

        Ok(ModMetadata {
            id: raw.id,
            version: raw.version,
            provides: raw.provides,
            environment: raw.environment,
            dependencies,
            entrypoints,
            nested_paths: raw.bundled,
        })
    }
}

/// External override tables keyed by mod id, applied before candidates freeze.
#[derive(Debug, Clone, Default)]
pub struct MetadataOverrides {
    versions: HashMap<String, Version>,
    /// Per mod id: replacement dependency sets per target id. An empty
    /// replacement removes the dependency entirely.
    dependencies: HashMap<String, Vec<(String, Vec<ModDependency>)>>,
}

impl MetadataOverrides {
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty() && self.dependencies.is_empty()
    }

    /// Force the declared version of `id`.
    pub fn version(mut self, id: impl Into<String>, version: Version) -> Self {
        self.versions.insert(id.into(), version);
        self
    }

    /// Replace the dependencies of `id` on `target` with `replacements`.
    pub fn dependency(
        mut self,
        id: impl Into<String>,
        target: impl Into<String>,
        replacements: Vec<ModDependency>,
    ) -> Self {
        self.dependencies
            .entry(id.into())
            .or_default()
            .push((target.into(), replacements));
        self
    }

    /// Apply any overrides registered for `id` to a builder.
    pub fn apply(&self, id: &str, mut builder: ModCandidateBuilder) -> ModCandidateBuilder {
        if let Some(version) = self.versions.get(id) {
            builder = builder.version(version.clone());
        }

        if let Some(replacements) = self.dependencies.get(id) {
            for (target, deps) in replacements {
                builder = builder.replace_dependencies_on(target, deps.clone());
            }
        }

        builder
    }
}

fn is_valid_mod_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

//! Mod candidate and dependency types.
//!
//! A candidate is a discovered, metadata-parsed but not-yet-activated package.
//! Candidates are frozen: they are only built through `ModCandidateBuilder`,
//! which is also where version/dependency overrides are applied before the
//! candidate becomes immutable.

use std::fmt;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::predicate::VersionPredicate;
use crate::types::version::Version;

/// The environment a mod declares itself for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Environment {
    #[serde(rename = "client")]
    Client,
    #[serde(rename = "server")]
    Server,
    #[default]
    #[serde(rename = "*", alias = "universal")]
    Universal,
}

/// The environment a load actually runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvType {
    Client,
    Server,
}

/// Kind of declared inter-mod dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    /// Target must be present and match (hard)
    Depends,
    /// Target should be present and match; absence only warns (soft)
    Recommends,
    /// Target should not be present and match; presence only warns (soft)
    Conflicts,
    /// Target must not be present and match (hard)
    Breaks,
}

/// A declared dependency edge: target id, kind, and acceptable versions.
///
/// The predicate list is a disjunction: the dependency matches a version if
/// any one predicate matches. An empty list matches every version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModDependency {
    pub target: String,
    pub kind: DependencyKind,
    pub predicates: Vec<VersionPredicate>,
}

/// One entrypoint declaration from mod metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrypointDeclaration {
    /// Language adapter key; "default" unless the mod says otherwise.
    pub adapter: String,
    /// Adapter-interpreted reference to the capability implementation.
    pub value: String,
}

/// Where a candidate physically came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModOrigin {
    /// One or more co-located root paths forming a single logical unit.
    Paths(Vec<PathBuf>),
    /// Extracted from inside another candidate's distribution unit.
    Nested { parent: String, paths: Vec<PathBuf> },
    /// Synthetic entry representing the host application itself.
    Builtin,
}

/// A discovered extension package, frozen after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModCandidate {
    id: String,
    version: Version,
    provides: Vec<String>,
    environment: Environment,
    dependencies: Vec<ModDependency>,
    entrypoints: IndexMap<String, Vec<EntrypointDeclaration>>,
    origin: ModOrigin,
    nested: Vec<ModCandidate>,
    parents: Vec<String>,
    requires_transform: bool,
}

/// Builder producing an immutable `ModCandidate`.
#[derive(Debug, Clone)]
pub struct ModCandidateBuilder {
    id: String,
    version: Version,
    provides: Vec<String>,
    environment: Environment,
    dependencies: Vec<ModDependency>,
    entrypoints: IndexMap<String, Vec<EntrypointDeclaration>>,
    origin: ModOrigin,
    nested: Vec<ModCandidate>,
    parents: Vec<String>,
    requires_transform: bool,
}

impl Environment {
    /// Whether a mod declared for this environment may load in `env`.
    pub fn allows(&self, env: EnvType) -> bool {
        match self {
            Environment::Universal => true,
            Environment::Client => env == EnvType::Client,
            Environment::Server => env == EnvType::Server,
        }
    }
}

impl fmt::Display for EnvType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvType::Client => write!(f, "client"),
            EnvType::Server => write!(f, "server"),
        }
    }
}

impl DependencyKind {
    /// Whether the target is required to be present (as opposed to absent).
    pub fn is_positive(&self) -> bool {
        matches!(self, DependencyKind::Depends | DependencyKind::Recommends)
    }

    /// Whether a violation only warns instead of failing resolution.
    pub fn is_soft(&self) -> bool {
        matches!(self, DependencyKind::Recommends | DependencyKind::Conflicts)
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyKind::Depends => write!(f, "depends"),
            DependencyKind::Recommends => write!(f, "recommends"),
            DependencyKind::Conflicts => write!(f, "conflicts"),
            DependencyKind::Breaks => write!(f, "breaks"),
        }
    }
}

impl ModDependency {
    /// Create a dependency accepting any version of the target.
    pub fn any(target: impl Into<String>, kind: DependencyKind) -> Self {
        Self {
            target: target.into(),
            kind,
            predicates: Vec::new(),
        }
    }

    /// Create a dependency with a single predicate.
    pub fn new(target: impl Into<String>, kind: DependencyKind, predicate: VersionPredicate) -> Self {
        Self {
            target: target.into(),
            kind,
            predicates: vec![predicate],
        }
    }

    /// Whether a version of the target satisfies this dependency's range.
    pub fn matches(&self, version: &Version) -> bool {
        if self.predicates.is_empty() {
            return true;
        }

        self.predicates.iter().any(|p| p.matches(version))
    }

    /// Human-readable form of the acceptable range, for diagnostics.
    pub fn range_text(&self) -> String {
        if self.predicates.is_empty() {
            return "*".to_string();
        }

        self.predicates
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(" || ")
    }
}

impl ModOrigin {
    /// The physical locations backing this origin, empty for builtins.
    pub fn paths(&self) -> &[PathBuf] {
        match self {
            ModOrigin::Paths(paths) => paths,
            ModOrigin::Nested { paths, .. } => paths,
            ModOrigin::Builtin => &[],
        }
    }
}

impl fmt::Display for ModOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModOrigin::Builtin => write!(f, "<builtin>"),
            ModOrigin::Nested { parent, .. } => write!(f, "nested in '{}'", parent),
            ModOrigin::Paths(paths) => {
                let text: Vec<String> =
                    paths.iter().map(|p| p.display().to_string()).collect();
                write!(f, "{}", text.join(" + "))
            }
        }
    }
}

impl ModCandidate {
    /// Start building a candidate.
    pub fn builder(id: impl Into<String>, version: Version) -> ModCandidateBuilder {
        ModCandidateBuilder {
            id: id.into(),
            version,
            provides: Vec::new(),
            environment: Environment::Universal,
            dependencies: Vec::new(),
            entrypoints: IndexMap::new(),
            origin: ModOrigin::Paths(Vec::new()),
            nested: Vec::new(),
            parents: Vec::new(),
            requires_transform: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Alias ids this candidate also satisfies.
    pub fn provides(&self) -> &[String] {
        &self.provides
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn dependencies(&self) -> &[ModDependency] {
        &self.dependencies
    }

    /// Entrypoint declarations by lifecycle key, in declaration order.
    pub fn entrypoints(&self) -> &IndexMap<String, Vec<EntrypointDeclaration>> {
        &self.entrypoints
    }

    pub fn origin(&self) -> &ModOrigin {
        &self.origin
    }

    /// Physical locations to hand to the code-loading boundary.
    pub fn paths(&self) -> &[PathBuf] {
        self.origin.paths()
    }

    /// Candidates embedded inside this one's distribution unit.
    pub fn nested(&self) -> &[ModCandidate] {
        &self.nested
    }

    /// Ids of candidates this one was found nested inside, empty for roots.
    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self.origin, ModOrigin::Builtin)
    }

    /// Whether the host's code-loading boundary still has to run its
    /// transformation step over this unit before activation.
    pub fn requires_transform(&self) -> bool {
        self.requires_transform
    }

    /// Whether this candidate satisfies `id` directly or via an alias.
    pub fn satisfies_id(&self, id: &str) -> bool {
        self.id == id || self.provides.iter().any(|alias| alias == id)
    }

    /// Thaw back into a builder, e.g. to merge parent links when duplicate
    /// nested copies collapse into one candidate.
    pub fn into_builder(self) -> ModCandidateBuilder {
        ModCandidateBuilder {
            id: self.id,
            version: self.version,
            provides: self.provides,
            environment: self.environment,
            dependencies: self.dependencies,
            entrypoints: self.entrypoints,
            origin: self.origin,
            nested: self.nested,
            parents: self.parents,
            requires_transform: self.requires_transform,
        }
    }
}

impl fmt::Display for ModCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}

impl ModCandidateBuilder {
    /// Replace the declared version. Used by external version overrides.
    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn provides(mut self, aliases: Vec<String>) -> Self {
        self.provides = aliases;
        self
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn dependency(mut self, dependency: ModDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Replace all dependencies on one target id. Used by dependency overrides.
    pub fn replace_dependencies_on(
        mut self,
        target: &str,
        replacements: Vec<ModDependency>,
    ) -> Self {
        self.dependencies.retain(|d| d.target != target);
        self.dependencies.extend(replacements);
        self
    }

    pub fn entrypoint(mut self, key: impl Into<String>, declaration: EntrypointDeclaration) -> Self {
        self.entrypoints.entry(key.into()).or_default().push(declaration);
        self
    }

    pub fn origin(mut self, origin: ModOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn nested(mut self, candidate: ModCandidate) -> Self {
        self.nested.push(candidate);
        self
    }

    pub fn requires_transform(mut self, requires_transform: bool) -> Self {
        self.requires_transform = requires_transform;
        self
    }

    pub fn parent(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !self.parents.contains(&id) {
            self.parents.push(id);
        }
        self
    }

    /// Freeze into an immutable candidate.
    pub fn build(self) -> ModCandidate {
        ModCandidate {
            id: self.id,
            version: self.version,
            provides: self.provides,
            environment: self.environment,
            dependencies: self.dependencies,
            entrypoints: self.entrypoints,
            origin: self.origin,
            nested: self.nested,
            parents: self.parents,
            requires_transform: self.requires_transform,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(text: &str) -> Version {
        Version::parse(text)
    }

    #[test]
    fn test_environment_allows() {
        assert!(Environment::Universal.allows(EnvType::Client));
        assert!(Environment::Universal.allows(EnvType::Server));
        assert!(Environment::Client.allows(EnvType::Client));
        assert!(!Environment::Client.allows(EnvType::Server));
        assert!(!Environment::Server.allows(EnvType::Client));
    }

    #[test]
    fn test_dependency_kind_classification() {
        assert!(DependencyKind::Depends.is_positive());
        assert!(!DependencyKind::Depends.is_soft());
        assert!(DependencyKind::Recommends.is_soft());
        assert!(!DependencyKind::Breaks.is_soft());
        assert!(!DependencyKind::Breaks.is_positive());
        assert!(DependencyKind::Conflicts.is_soft());
    }

    #[test]
    fn test_dependency_predicate_disjunction() {
        let dep = ModDependency {
            target: "lib".to_string(),
            kind: DependencyKind::Depends,
            predicates: vec![
                VersionPredicate::parse("^1.0.0").unwrap(),
                VersionPredicate::parse("^3.0.0").unwrap(),
            ],
        };

        assert!(dep.matches(&v("1.5.0")));
        assert!(dep.matches(&v("3.2.0")));
        assert!(!dep.matches(&v("2.0.0")));
    }

    #[test]
    fn test_dependency_empty_predicates_match_anything() {
        let dep = ModDependency::any("lib", DependencyKind::Depends);
        assert!(dep.matches(&v("0.0.1")));
        assert!(dep.matches(&v("strange-version")));
        assert_eq!(dep.range_text(), "*");
    }

    #[test]
    fn test_builder_freezes_candidate() {
        let candidate = ModCandidate::builder("example", v("1.0.0"))
            .provides(vec!["example-api".to_string()])
            .environment(Environment::Client)
            .dependency(ModDependency::any("host", DependencyKind::Depends))
            .entrypoint(
                "init",
                EntrypointDeclaration {
                    adapter: "default".to_string(),
                    value: "example::Init".to_string(),
                },
            )
            .build();

        assert_eq!(candidate.id(), "example");
        assert!(candidate.satisfies_id("example-api"));
        assert!(!candidate.satisfies_id("other"));
        assert_eq!(candidate.entrypoints()["init"].len(), 1);
        assert!(!candidate.is_builtin());
    }

    #[test]
    fn test_version_override_through_builder() {
        let candidate = ModCandidate::builder("example", v("1.0.0"))
            .version(v("2.0.0"))
            .build();
        assert_eq!(candidate.version(), &v("2.0.0"));
    }

    #[test]
    fn test_dependency_override_replaces_single_target() {
        let candidate = ModCandidate::builder("example", v("1.0.0"))
            .dependency(ModDependency::new(
                "lib",
                DependencyKind::Depends,
                VersionPredicate::parse("^1.0.0").unwrap(),
            ))
            .dependency(ModDependency::any("other", DependencyKind::Recommends))
            .replace_dependencies_on(
                "lib",
                vec![ModDependency::new(
                    "lib",
                    DependencyKind::Depends,
                    VersionPredicate::parse("^2.0.0").unwrap(),
                )],
            )
            .build();

        assert_eq!(candidate.dependencies().len(), 2);
        let lib = candidate
            .dependencies()
            .iter()
            .find(|d| d.target == "lib")
            .unwrap();
        assert!(lib.matches(&v("2.1.0")));
        assert!(!lib.matches(&v("1.1.0")));
    }

    #[test]
    fn test_parent_links_deduplicate() {
        let candidate = ModCandidate::builder("nested-lib", v("1.0.0"))
            .parent("host-mod")
            .parent("host-mod")
            .parent("other-mod")
            .build();
        assert_eq!(candidate.parents(), ["host-mod", "other-mod"]);
    }
}

//! Core data types for the Graft mod loader.
//!
//! Exports version, interval, predicate, and candidate types used by the
//! discovery, resolution, and entrypoint crates.

pub mod candidate;
pub mod interval;
pub mod predicate;
pub mod version;

pub use candidate::{
    DependencyKind, EntrypointDeclaration, EnvType, Environment, ModCandidate,
    ModCandidateBuilder, ModDependency, ModOrigin,
};
pub use interval::VersionInterval;
pub use predicate::{ComparisonOperator, PredicateTerm, VersionPredicate};
pub use version::{RawVersion, SemanticVersion, Version, VersionError};

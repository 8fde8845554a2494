//! # graft-core
//!
//! Core types shared across all Graft crates.
//!
//! This crate provides:
//! - Version types (semantic and free-form) with fallible cross-kind comparison
//! - VersionInterval set algebra (and/or/not over interval lists)
//! - VersionPredicate constraint expressions (">=1.2.0 <2.0.0")
//! - ModCandidate and ModDependency types describing discovered packages
//!
//! Stage-specific error types live with their stages (discovery, resolution,
//! entrypoints); the only error defined here is `VersionError`.

pub mod types;

// Re-export commonly used types
pub use types::{
    ComparisonOperator, DependencyKind, Environment, EnvType, ModCandidate, ModDependency,
    SemanticVersion, Version, VersionError, VersionInterval, VersionPredicate,
};

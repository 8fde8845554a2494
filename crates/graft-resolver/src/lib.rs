//! Mod set resolution for the Graft mod loader.
//!
//! Turns the discovered candidate set into the activated mod list for one
//! environment: filtering, nested gating, duplicate detection, dependency
//! constraint verification, and deterministic activation ordering. Failures
//! carry every violation found, not just the first.

pub mod graph;
pub mod solve;

pub use graph::ActivationGraph;
pub use solve::{
    resolve, LoadOrder, Resolution, ResolutionIssue, ResolutionWarning, ResolveError,
    ResolveOptions,
};

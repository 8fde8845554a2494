//! Entrypoint handling for the Graft mod loader.
//!
//! Mods declare named entrypoints in their metadata; the host asks for them
//! by lifecycle key and a concrete Rust type. Instantiation is deferred until
//! first access and memoized per entry, and multi-subscriber invocation
//! aggregates every failure instead of stopping at the first.

pub mod adapter;
pub mod storage;

pub use adapter::{AdapterError, AdapterRegistry, FunctionAdapter, Instance, LanguageAdapter};
pub use storage::{
    EntrypointContainer, EntrypointError, EntrypointStorage, InvocationFailure, DEFAULT_KEY,
};

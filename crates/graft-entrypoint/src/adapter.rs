//! Language adapters: how a declaration string becomes a live instance.
//!
//! A declaration names an adapter and an adapter-interpreted value. Adapters
//! are registered explicitly by the host; there is no reflective lookup. The
//! built-in [`FunctionAdapter`] maps declaration values to registered
//! constructor closures, which is the natural shape for statically linked
//! hosts.

use std::any::Any;
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;

use graft_core::types::EntrypointDeclaration;

/// A constructed entrypoint instance, downcast by the caller.
pub type Instance = Arc<dyn Any + Send + Sync>;

#[derive(Error, Debug, Clone)]
pub enum AdapterError {
    #[error("No language adapter registered under '{adapter}'")]
    UnknownAdapter { adapter: String },

    #[error("Adapter '{adapter}' has no constructor for '{value}'")]
    UnknownValue { adapter: String, value: String },

    #[error("Adapter '{adapter}' failed to construct '{value}': {message}")]
    Construction {
        adapter: String,
        value: String,
        message: String,
    },
}

/// Turns entrypoint declarations into instances.
pub trait LanguageAdapter: Send + Sync {
    fn create(&self, declaration: &EntrypointDeclaration) -> Result<Instance, AdapterError>;
}

/// Adapter lookup table keyed by adapter name.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: IndexMap<String, Arc<dyn LanguageAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under a name, replacing any previous registration.
    pub fn register(mut self, name: impl Into<String>, adapter: impl LanguageAdapter + 'static) -> Self {
        self.adapters.insert(name.into(), Arc::new(adapter));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn LanguageAdapter>> {
        self.adapters.get(name)
    }

    /// Create an instance for a declaration via its named adapter.
    pub fn create(&self, declaration: &EntrypointDeclaration) -> Result<Instance, AdapterError> {
        let adapter = self
            .get(&declaration.adapter)
            .ok_or_else(|| AdapterError::UnknownAdapter {
                adapter: declaration.adapter.clone(),
            })?;
        adapter.create(declaration)
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Adapter backed by explicitly registered constructor closures.
#[derive(Default)]
pub struct FunctionAdapter {
    constructors: IndexMap<String, Box<dyn Fn() -> Instance + Send + Sync>>,
}

impl FunctionAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for a declaration value.
    pub fn constructor<T, F>(mut self, value: impl Into<String>, construct: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.constructors
            .insert(value.into(), Box::new(move || Arc::new(construct())));
        self
    }
}

impl LanguageAdapter for FunctionAdapter {
    fn create(&self, declaration: &EntrypointDeclaration) -> Result<Instance, AdapterError> {
        let construct = self.constructors.get(&declaration.value).ok_or_else(|| {
            AdapterError::UnknownValue {
                adapter: declaration.adapter.clone(),
                value: declaration.value.clone(),
            }
        })?;
        Ok(construct())
    }
}

impl std::fmt::Debug for FunctionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionAdapter")
            .field("constructors", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

//! Deferred entrypoint storage and aggregated invocation.
//!
//! Declarations are stored at load time but instances are only constructed on
//! first access, per entry, with the outcome memoized either way. Invocation
//! runs every subscriber in activation order and reports all failures in one
//! composite error instead of stopping at the first.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::{debug, warn};

use graft_core::types::EntrypointDeclaration;

use crate::adapter::{AdapterRegistry, Instance};

/// Lifecycle key deprecated bare declarations are normalized under.
pub const DEFAULT_KEY: &str = "init";

/// One stored declaration with its lazily constructed instance.
#[derive(Debug)]
struct Entry {
    owner: String,
    declaration: EntrypointDeclaration,
    /// Memoized construction outcome, failures included: a broken entry fails
    /// the same way on every access instead of retrying.
    instance: OnceCell<Result<Instance, String>>,
}

/// A resolved subscriber: the typed instance plus its owning mod.
#[derive(Debug, Clone)]
pub struct EntrypointContainer<T> {
    owner: String,
    declaration: EntrypointDeclaration,
    instance: Arc<T>,
}

impl<T> EntrypointContainer<T> {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn declaration(&self) -> &EntrypointDeclaration {
        &self.declaration
    }

    pub fn entrypoint(&self) -> Arc<T> {
        Arc::clone(&self.instance)
    }
}

/// One subscriber failure inside an aggregated invocation error.
#[derive(Debug, Clone)]
pub struct InvocationFailure {
    pub owner: String,
    pub declaration: String,
    pub message: String,
}

impl std::fmt::Display for InvocationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "mod '{}' ({}): {}",
            self.owner, self.declaration, self.message
        )
    }
}

#[derive(Error, Debug)]
pub enum EntrypointError {
    #[error("Failed to construct entrypoint '{key}' of mod '{owner}' ({declaration}): {message}")]
    Create {
        owner: String,
        key: String,
        declaration: String,
        message: String,
    },

    #[error("Entrypoint '{key}' of mod '{owner}' ({declaration}) is not a {expected}")]
    WrongType {
        owner: String,
        key: String,
        declaration: String,
        expected: &'static str,
    },

    #[error("{} subscriber(s) of '{key}' failed:\n{}", failures.len(), format_failures(failures))]
    Aggregate {
        key: String,
        failures: Vec<InvocationFailure>,
    },
}

fn format_failures(failures: &[InvocationFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("  - {}", failure))
        .collect::<Vec<_>>()
        .join("\n")
}

/// All entrypoint declarations of the activated mod set, keyed by lifecycle
/// key, in activation order.
#[derive(Debug)]
pub struct EntrypointStorage {
    entries: IndexMap<String, Vec<Entry>>,
    registry: AdapterRegistry,
}

impl EntrypointStorage {
    pub fn new(registry: AdapterRegistry) -> Self {
        Self {
            entries: IndexMap::new(),
            registry,
        }
    }

    /// Store one declaration under a lifecycle key.
    pub fn add(
        &mut self,
        owner: impl Into<String>,
        key: impl Into<String>,
        declaration: EntrypointDeclaration,
    ) {
        let owner = owner.into();
        let key = key.into();
        debug!(owner = %owner, key = %key, value = %declaration.value, "stored entrypoint");
        self.entries.entry(key).or_default().push(Entry {
            owner,
            declaration,
            instance: OnceCell::new(),
        });
    }

    /// Store a legacy bare declaration under the default lifecycle key.
    pub fn add_deprecated(&mut self, owner: impl Into<String>, declaration: EntrypointDeclaration) {
        let owner = owner.into();
        warn!(
            owner = %owner,
            value = %declaration.value,
            "declaration uses the deprecated keyless form; treating as '{}'",
            DEFAULT_KEY
        );
        self.add(owner, DEFAULT_KEY, declaration);
    }

    /// Lifecycle keys with at least one subscriber, in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn has_entrypoints(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|list| !list.is_empty())
    }

    /// Typed instances under a key, in activation order. An absent key is an
    /// empty list; a broken entry is an error attributed to its owner.
    pub fn get_entrypoints<T: Any + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Vec<Arc<T>>, EntrypointError> {
        Ok(self
            .get_entrypoint_containers(key)?
            .into_iter()
            .map(|container| container.entrypoint())
            .collect())
    }

    /// Like [`get_entrypoints`](Self::get_entrypoints), keeping each
    /// instance's owning mod attached.
    pub fn get_entrypoint_containers<T: Any + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Vec<EntrypointContainer<T>>, EntrypointError> {
        let Some(entries) = self.entries.get(key) else {
            return Ok(Vec::new());
        };

        let mut containers = Vec::with_capacity(entries.len());
        for entry in entries {
            let instance = self.instantiate(entry, key)?;
            let typed = instance
                .downcast::<T>()
                .map_err(|_| EntrypointError::WrongType {
                    owner: entry.owner.clone(),
                    key: key.to_string(),
                    declaration: entry.declaration.value.clone(),
                    expected: std::any::type_name::<T>(),
                })?;
            containers.push(EntrypointContainer {
                owner: entry.owner.clone(),
                declaration: entry.declaration.clone(),
                instance: typed,
            });
        }

        Ok(containers)
    }

    /// Invoke every subscriber of a key in activation order.
    ///
    /// Construction failures, invoker errors, and panics are all captured per
    /// subscriber; the remaining subscribers still run, and one aggregate
    /// error carrying every failure is returned at the end. No subscribers is
    /// a silent no-op.
    pub fn invoke_entrypoints<T, F>(&self, key: &str, mut invoker: F) -> Result<(), EntrypointError>
    where
        T: Any + Send + Sync,
        F: FnMut(&str, Arc<T>) -> anyhow::Result<()>,
    {
        let Some(entries) = self.entries.get(key) else {
            return Ok(());
        };

        let mut failures = Vec::new();

        for entry in entries {
            let outcome = self
                .instantiate(entry, key)
                .and_then(|instance| {
                    instance.downcast::<T>().map_err(|_| EntrypointError::WrongType {
                        owner: entry.owner.clone(),
                        key: key.to_string(),
                        declaration: entry.declaration.value.clone(),
                        expected: std::any::type_name::<T>(),
                    })
                })
                .map_err(|e| e.to_string())
                .and_then(|typed| {
                    let call = panic::catch_unwind(AssertUnwindSafe(|| {
                        invoker(&entry.owner, typed)
                    }));
                    match call {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => Err(format!("{:#}", e)),
                        Err(payload) => Err(format!("panicked: {}", panic_message(&payload))),
                    }
                });

            if let Err(message) = outcome {
                warn!(owner = %entry.owner, key, %message, "entrypoint subscriber failed");
                failures.push(InvocationFailure {
                    owner: entry.owner.clone(),
                    declaration: entry.declaration.value.clone(),
                    message,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(EntrypointError::Aggregate {
                key: key.to_string(),
                failures,
            })
        }
    }

    /// Construct (or recall) an entry's instance, attributing failures.
    fn instantiate(&self, entry: &Entry, key: &str) -> Result<Instance, EntrypointError> {
        let outcome = entry.instance.get_or_init(|| {
            self.registry
                .create(&entry.declaration)
                .map_err(|e| e.to_string())
        });

        outcome.clone().map_err(|message| EntrypointError::Create {
            owner: entry.owner.clone(),
            key: key.to_string(),
            declaration: entry.declaration.value.clone(),
            message,
        })
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

//! Handler registry.
//!
//! A [`Registry`] is an immutable map `namespace -> method -> HandlerEntry`
//! built on persistent `im` maps. It is shared through [`SharedRegistry`],
//! which hands out snapshots to workers and lets the lifecycle controller
//! swap the whole structure in one step.

pub mod entry;
pub mod shared;

pub use entry::{
    AGENT_NAMESPACE, Executor, Handler, HandlerEntry, LifecycleCommand, START_METHOD, STOP_METHOD,
};
pub use shared::SharedRegistry;

use crate::core::{DispatchError, Result};
use im::HashMap as ImHashMap;

/// Lifecycle shape of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryShape {
    /// Only `agent/Start` is installed.
    Bootstrap,
    /// Feature handlers plus `agent/Stop`; `agent/Start` is absent.
    Running,
}

#[derive(Debug, Clone)]
pub struct Registry {
    shape: RegistryShape,
    handlers: ImHashMap<String, ImHashMap<String, HandlerEntry>>,
}

impl Registry {
    /// The registry installed at process start and after every Stop.
    pub fn bootstrap() -> Self {
        let start = HandlerEntry::lifecycle(LifecycleCommand::Start);
        let mut handlers = ImHashMap::new();
        handlers.insert(
            start.namespace.clone(),
            ImHashMap::unit(start.method.clone(), start),
        );
        Self {
            shape: RegistryShape::Bootstrap,
            handlers,
        }
    }

    pub fn builder(shape: RegistryShape) -> RegistryBuilder {
        RegistryBuilder::new(shape)
    }

    pub fn shape(&self) -> RegistryShape {
        self.shape
    }

    pub fn lookup(&self, namespace: &str, method: &str) -> Option<&HandlerEntry> {
        self.handlers.get(namespace)?.get(method)
    }

    pub fn contains(&self, namespace: &str, method: &str) -> bool {
        self.lookup(namespace, method).is_some()
    }

    /// Number of installed routes.
    pub fn len(&self) -> usize {
        self.handlers.values().map(|methods| methods.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All installed `(namespace, method)` pairs, sorted.
    pub fn routes(&self) -> Vec<(String, String)> {
        let mut routes: Vec<(String, String)> = self
            .handlers
            .iter()
            .flat_map(|(namespace, methods)| {
                methods
                    .keys()
                    .map(move |method| (namespace.clone(), method.clone()))
            })
            .collect();
        routes.sort();
        routes
    }
}

/// Accumulates entries for a new registry before it is shared.
pub struct RegistryBuilder {
    shape: RegistryShape,
    handlers: ImHashMap<String, ImHashMap<String, HandlerEntry>>,
}

impl RegistryBuilder {
    fn new(shape: RegistryShape) -> Self {
        let mut builder = Self {
            shape,
            handlers: ImHashMap::new(),
        };
        let control = match shape {
            RegistryShape::Bootstrap => LifecycleCommand::Start,
            RegistryShape::Running => LifecycleCommand::Stop,
        };
        builder.insert(HandlerEntry::lifecycle(control));
        builder
    }

    fn insert(&mut self, entry: HandlerEntry) {
        self.handlers
            .entry(entry.namespace.clone())
            .or_default()
            .insert(entry.method.clone(), entry);
    }

    /// Adds a feature entry. Routes already present and the reserved
    /// lifecycle routes are rejected.
    pub fn register(mut self, entry: HandlerEntry) -> Result<Self> {
        if entry.namespace == AGENT_NAMESPACE
            && (entry.method == START_METHOD || entry.method == STOP_METHOD)
        {
            return Err(DispatchError::Collaborator(format!(
                "route {}/{} is reserved for lifecycle control",
                entry.namespace, entry.method
            )));
        }

        let duplicate = self
            .handlers
            .get(&entry.namespace)
            .is_some_and(|methods| methods.contains_key(&entry.method));
        if duplicate {
            return Err(DispatchError::Collaborator(format!(
                "duplicate handler for {}/{}",
                entry.namespace, entry.method
            )));
        }

        self.insert(entry);
        Ok(self)
    }

    pub fn register_all(self, entries: impl IntoIterator<Item = HandlerEntry>) -> Result<Self> {
        entries
            .into_iter()
            .try_fold(self, |builder, entry| builder.register(entry))
    }

    pub fn build(self) -> Registry {
        Registry {
            shape: self.shape,
            handlers: self.handlers,
        }
    }
}

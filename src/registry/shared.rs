use super::{Registry, RegistryShape};
use std::sync::{Arc, RwLock};

/// The engine-owned registry reference.
///
/// Readers take an `Arc` snapshot and release the lock before executing
/// anything; the writer holds the lock only for the pointer swap. A worker
/// therefore sees either the old registry or the new one, never a mix.
#[derive(Debug, Clone)]
pub struct SharedRegistry {
    current: Arc<RwLock<Arc<Registry>>>,
}

impl SharedRegistry {
    pub fn new(registry: Registry) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(registry))),
        }
    }

    /// Returns the currently installed registry.
    pub fn snapshot(&self) -> Arc<Registry> {
        // The guarded value is a plain pointer, so a poisoned lock still holds a valid one.
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Installs `registry` and returns the one it replaced.
    pub fn replace(&self, registry: Registry) -> Arc<Registry> {
        let next = Arc::new(registry);
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *guard, next)
    }

    pub fn shape(&self) -> RegistryShape {
        self.snapshot().shape()
    }
}

impl Default for SharedRegistry {
    fn default() -> Self {
        Self::new(Registry::bootstrap())
    }
}

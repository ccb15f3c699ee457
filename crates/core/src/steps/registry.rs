//! Runner registry
//!
//! Maps step type tags to the factories that build their runners. The host
//! fills it during start-up and then seals it; after that it is read-only
//! and shared by every pipeline build.
//!
//! # Thread Safety
//!
//! Lookups are frequent and registrations rare, so the table sits behind a
//! `parking_lot::RwLock`. Factories are called outside the lock.

use super::{PipelineStepConfig, PipelineStepRunner, RunnerFactory};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

struct Registration {
    factory: Arc<dyn RunnerFactory>,
    factory_type: TypeId,
    factory_name: &'static str,
}

#[derive(Default)]
struct RegistryState {
    factories: HashMap<String, Registration>,
    sealed: bool,
}

/// Registry of step runner factories
///
/// # Example
///
/// ```
/// use inferhost_core::steps::RunnerRegistry;
///
/// let registry = RunnerRegistry::new();
/// assert!(registry.is_empty());
/// ```
#[derive(Default)]
pub struct RunnerRegistry {
    state: RwLock<RegistryState>,
}

impl RunnerRegistry {
    /// Create an empty, unsealed registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `tag`
    ///
    /// Registering the same factory type under the same tag again is a
    /// no-op. A different factory type fails with
    /// [`Error::DuplicateRegistration`]; any registration after
    /// [`seal`](Self::seal) fails with [`Error::RegistrySealed`].
    pub fn register<F>(&self, tag: &str, factory: F) -> Result<()>
    where
        F: RunnerFactory + 'static,
    {
        let mut state = self.state.write();
        if state.sealed {
            return Err(Error::RegistrySealed(tag.to_string()));
        }

        let factory_type = TypeId::of::<F>();
        if let Some(existing) = state.factories.get(tag) {
            if existing.factory_type == factory_type {
                debug!(tag, "Step factory already registered; ignoring");
                return Ok(());
            }
            return Err(Error::DuplicateRegistration {
                tag: tag.to_string(),
            });
        }

        let factory_name = type_name::<F>();
        debug!(tag, factory = factory_name, "Registered step factory");
        state.factories.insert(
            tag.to_string(),
            Registration {
                factory: Arc::new(factory),
                factory_type,
                factory_name,
            },
        );
        Ok(())
    }

    /// Build a runner for `config`
    ///
    /// Fails with [`Error::UnresolvedType`] when no factory is registered
    /// for the config's tag. Factory errors are returned unchanged.
    pub fn resolve(&self, config: &dyn PipelineStepConfig) -> Result<Box<dyn PipelineStepRunner>> {
        let tag = config.type_tag();
        let factory = self
            .state
            .read()
            .factories
            .get(tag)
            .map(|r| Arc::clone(&r.factory))
            .ok_or_else(|| Error::UnresolvedType(tag.to_string()))?;
        factory.create(config)
    }

    /// Whether a factory is registered for `tag`
    pub fn contains(&self, tag: &str) -> bool {
        self.state.read().factories.contains_key(tag)
    }

    /// Registered tags, sorted
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.state.read().factories.keys().cloned().collect();
        tags.sort();
        tags
    }

    /// Rust type name of the factory registered for `tag`
    pub fn factory_name(&self, tag: &str) -> Option<&'static str> {
        self.state.read().factories.get(tag).map(|r| r.factory_name)
    }

    pub fn len(&self) -> usize {
        self.state.read().factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().factories.is_empty()
    }

    /// Reject all further registrations
    pub fn seal(&self) {
        let mut state = self.state.write();
        if !state.sealed {
            state.sealed = true;
            info!(factories = state.factories.len(), "Runner registry sealed");
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.state.read().sealed
    }
}

impl std::fmt::Debug for RunnerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerRegistry")
            .field("tags", &self.tags())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}

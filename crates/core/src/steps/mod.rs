//! Pipeline steps: configs, runners and the factories between them
//!
//! A step has two halves:
//!
//! - a [`PipelineStepConfig`]: immutable, serializable parameters identified
//!   by a short type tag
//! - a [`PipelineStepRunner`]: the live counterpart built from one config,
//!   owning whatever expensive resources the step needs
//!
//! A [`RunnerFactory`] turns the first into the second. Factories are looked
//! up by tag in the [`RunnerRegistry`]; configs are decoded from their
//! serialized form through the [`StepCatalog`]. Neither the registry nor the
//! pipeline names a concrete step type.

use crate::data::Data;
use crate::pipeline::Context;
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

pub mod catalog;
pub mod keys;
pub mod model;
pub mod passthrough;
pub mod registration_macros;
pub mod registry;

pub use catalog::{discovered_modules, ExtensionModule, StepCatalog, StepDeclaration};
pub use keys::{RenameKeysConfig, SelectKeysConfig};
pub use model::{ModelStepConfig, ModelStepFactory};
pub use passthrough::PassThroughConfig;
pub use registry::RunnerRegistry;

/// Object-safe view of a step configuration
///
/// Implemented for every [`StepConfigType`]; use that trait to define new
/// configs.
pub trait PipelineStepConfig: fmt::Debug + Send + Sync + 'static {
    /// Type tag used in serialized form and for factory lookup
    fn type_tag(&self) -> &'static str;

    /// Parameters as a JSON object (without the tag)
    fn to_params(&self) -> Result<serde_json::Value>;

    /// Downcast support for factories
    fn as_any(&self) -> &dyn Any;
}

/// A concrete, serde-backed step configuration
pub trait StepConfigType:
    fmt::Debug + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Type tag; unique across every loaded extension module
    const TAG: &'static str;
}

impl<T: StepConfigType> PipelineStepConfig for T {
    fn type_tag(&self) -> &'static str {
        T::TAG
    }

    fn to_params(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn PipelineStepConfig {
    /// Downcast to a concrete config type
    pub fn downcast_ref<C: StepConfigType>(&self) -> Option<&C> {
        self.as_any().downcast_ref::<C>()
    }
}

/// Executable counterpart of one step config
///
/// `process` takes the request's Data by value: a stage owns it exclusively
/// until it hands its output to the next stage.
pub trait PipelineStepRunner: Send + Sync {
    /// Config this runner was built from
    fn config(&self) -> &dyn PipelineStepConfig;

    /// Transform one Data value
    fn process(&self, data: Data, ctx: &Context) -> Result<Data>;

    /// Release held resources; called once by the owning executor
    fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Type tag of the bound config
    fn step_type(&self) -> &'static str {
        self.config().type_tag()
    }
}

/// Builds a runner from a config
pub trait RunnerFactory: Send + Sync {
    /// Create a runner, or fail with an initialization error
    fn create(&self, config: &dyn PipelineStepConfig) -> Result<Box<dyn PipelineStepRunner>>;
}

impl<F> RunnerFactory for F
where
    F: Fn(&dyn PipelineStepConfig) -> Result<Box<dyn PipelineStepRunner>> + Send + Sync,
{
    fn create(&self, config: &dyn PipelineStepConfig) -> Result<Box<dyn PipelineStepRunner>> {
        self(config)
    }
}

/// Factory for one concrete config type
///
/// Downcasts the incoming config and hands it to the wrapped closure.
pub struct TypedFactory<C, F, R> {
    create: F,
    _marker: PhantomData<fn(&C) -> R>,
}

impl<C, F, R> TypedFactory<C, F, R>
where
    C: StepConfigType,
    F: Fn(&C) -> Result<R> + Send + Sync,
    R: PipelineStepRunner + 'static,
{
    pub fn new(create: F) -> Self {
        Self {
            create,
            _marker: PhantomData,
        }
    }
}

impl<C, F, R> RunnerFactory for TypedFactory<C, F, R>
where
    C: StepConfigType,
    F: Fn(&C) -> Result<R> + Send + Sync,
    R: PipelineStepRunner + 'static,
{
    fn create(&self, config: &dyn PipelineStepConfig) -> Result<Box<dyn PipelineStepRunner>> {
        let typed = config.downcast_ref::<C>().ok_or_else(|| {
            Error::ConfigError(format!(
                "factory for '{}' received a '{}' config",
                C::TAG,
                config.type_tag()
            ))
        })?;
        let runner = (self.create)(typed)?;
        Ok(Box::new(runner))
    }
}

/// Registration hook of the built-in module
pub(crate) fn register_builtin_steps(registry: &RunnerRegistry) -> Result<()> {
    crate::register_step!(registry, PassThroughConfig, |config| {
        Ok(passthrough::PassThroughRunner::new(config.clone()))
    })?;
    crate::register_step!(registry, RenameKeysConfig, |config| {
        keys::RenameKeysRunner::new(config.clone())
    })?;
    crate::register_step!(registry, SelectKeysConfig, |config| {
        Ok(keys::SelectKeysRunner::new(config.clone()))
    })?;
    // `model` needs a loader; the host registers it once one is supplied.
    Ok(())
}

crate::declare_extension_module!(
    "builtin",
    [
        PassThroughConfig,
        RenameKeysConfig,
        SelectKeysConfig,
        ModelStepConfig,
    ],
    register_builtin_steps
);

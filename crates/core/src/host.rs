//! Host start-up
//!
//! The start-up phase, in order:
//!
//! 1. gather extension modules (discovered through `inventory`, plus any
//!    supplied explicitly), sorted by name
//! 2. build the step catalog; a tag declared by two modules aborts here
//! 3. run every module's registration hook against a fresh registry
//! 4. register the loader-backed `model` factory and explicit factories
//! 5. seal the registry
//!
//! Only then can pipelines be built.

use crate::config::HostConfig;
use crate::data::Data;
use crate::model_worker::{BoxedLoader, DataModelLoader, InferenceModel, ModelLoader};
use crate::pipeline::{Pipeline, PipelineExecutor};
use crate::steps::{
    discovered_modules, ExtensionModule, ModelStepConfig, ModelStepFactory, RunnerFactory,
    RunnerRegistry, StepCatalog, StepConfigType,
};
use crate::{Error, Result};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

type DeferredRegistration = Box<dyn FnOnce(&RunnerRegistry) -> Result<()>>;

/// Builder returned by [`Host::builder`]
pub struct HostBuilder {
    config: HostConfig,
    discover: bool,
    modules: Vec<&'static ExtensionModule>,
    factories: Vec<DeferredRegistration>,
    model_loader: Option<Arc<DataModelLoader>>,
}

impl HostBuilder {
    fn new() -> Self {
        Self {
            config: HostConfig::default(),
            discover: true,
            modules: Vec::new(),
            factories: Vec::new(),
            model_loader: None,
        }
    }

    /// Host configuration
    pub fn config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a module explicitly, in addition to the discovered ones
    pub fn module(mut self, module: &'static ExtensionModule) -> Self {
        self.modules.push(module);
        self
    }

    /// Use only explicitly added modules
    pub fn without_discovery(mut self) -> Self {
        self.discover = false;
        self
    }

    /// Register a factory directly, after the module hooks have run
    pub fn factory<F>(mut self, tag: impl Into<String>, factory: F) -> Self
    where
        F: RunnerFactory + 'static,
    {
        let tag = tag.into();
        self.factories
            .push(Box::new(move |registry: &RunnerRegistry| registry.register(&tag, factory)));
        self
    }

    /// Loader backing the `model` step
    pub fn model_loader<L>(mut self, loader: L) -> Self
    where
        L: ModelLoader + 'static,
        L::Model: InferenceModel<Input = Data, Output = Data>,
    {
        self.model_loader = Some(Arc::new(BoxedLoader(loader)));
        self
    }

    /// Run the start-up phase
    pub fn start(self) -> Result<Host> {
        self.config.validate()?;

        let mut modules = if self.discover {
            discovered_modules()
        } else {
            Vec::new()
        };
        modules.extend(self.modules);
        modules.sort_by_key(|m| m.name);

        let catalog = StepCatalog::from_modules(modules.iter().copied())?;

        let registry = RunnerRegistry::new();
        let mut registered = HashSet::new();
        for module in &modules {
            if registered.insert(module.name) {
                (module.register)(&registry).map_err(|e| match e {
                    conflict @ (Error::DuplicateRegistration { .. } | Error::RegistrySealed(_)) => {
                        conflict
                    }
                    other => Error::Initialization(format!(
                        "module '{}' failed to register: {}",
                        module.name, other
                    )),
                })?;
            }
        }

        if let Some(loader) = self.model_loader {
            registry.register(
                ModelStepConfig::TAG,
                ModelStepFactory::new(loader, self.config.executioner.clone()),
            )?;
        }
        for register in self.factories {
            register(&registry)?;
        }
        registry.seal();

        info!(
            modules = catalog.modules().len(),
            declared = catalog.len(),
            resolvable = registry.len(),
            "Host started"
        );
        Ok(Host {
            config: self.config,
            catalog,
            registry,
        })
    }
}

/// A started host: sealed registry plus step catalog
#[derive(Debug)]
pub struct Host {
    config: HostConfig,
    catalog: StepCatalog,
    registry: RunnerRegistry,
}

impl Host {
    pub fn builder() -> HostBuilder {
        HostBuilder::new()
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn catalog(&self) -> &StepCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &RunnerRegistry {
        &self.registry
    }

    /// Build an executor for `pipeline`
    pub fn build(&self, pipeline: &Pipeline) -> Result<PipelineExecutor> {
        pipeline.build(&self.registry)
    }

    pub fn load_pipeline_json(&self, text: &str) -> Result<Pipeline> {
        Pipeline::from_json(text, &self.catalog)
    }

    pub fn load_pipeline_yaml(&self, text: &str) -> Result<Pipeline> {
        Pipeline::from_yaml(text, &self.catalog)
    }

    /// Load a `.json`, `.yaml` or `.yml` pipeline file
    pub fn load_pipeline_file(&self, path: impl AsRef<Path>) -> Result<Pipeline> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => self.load_pipeline_json(&text),
            Some("yaml") | Some("yml") => self.load_pipeline_yaml(&text),
            _ => Err(Error::ConfigError(format!(
                "{}: pipelines must be .json, .yaml or .yml",
                path.display()
            ))),
        }
    }
}

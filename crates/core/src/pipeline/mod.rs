//! Pipelines: ordered step configs and their executors
//!
//! A [`Pipeline`] is the immutable description; [`Pipeline::build`]
//! resolves every config through the registry and yields a
//! [`PipelineExecutor`] holding the live runners.
//!
//! Building is all or nothing. Every tag is checked against the registry
//! before any factory runs, and if a factory fails part-way the runners
//! already built are closed again.

mod context;
mod executor;

pub use context::{Context, StageInfo, StageObserver};
pub use executor::PipelineExecutor;

use crate::steps::{PipelineStepConfig, RunnerRegistry, StepCatalog};
use crate::{Error, Result};
use executor::Stage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Serialized pipeline layout; steps are decoded through a catalog
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct PipelineDocument {
    #[serde(default)]
    name: String,
    steps: Vec<serde_json::Value>,
}

/// Ordered, immutable sequence of step configs
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    steps: Vec<Arc<dyn PipelineStepConfig>>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, steps: Vec<Arc<dyn PipelineStepConfig>>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    /// Start building a pipeline in code
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Decode from JSON; each step is `{"type": tag, ..params}`
    pub fn from_json(text: &str, catalog: &StepCatalog) -> Result<Self> {
        let document: PipelineDocument = serde_json::from_str(text)
            .map_err(|e| Error::InvalidPipeline(format!("pipeline JSON: {}", e)))?;
        Self::from_document(document, catalog)
    }

    /// Decode from YAML, same layout as JSON
    pub fn from_yaml(text: &str, catalog: &StepCatalog) -> Result<Self> {
        let document: PipelineDocument = serde_yaml::from_str(text)
            .map_err(|e| Error::InvalidPipeline(format!("pipeline YAML: {}", e)))?;
        Self::from_document(document, catalog)
    }

    fn from_document(document: PipelineDocument, catalog: &StepCatalog) -> Result<Self> {
        let steps = document
            .steps
            .into_iter()
            .map(|step| catalog.decode(step))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(document.name, steps))
    }

    /// Encode to the JSON layout [`from_json`](Self::from_json) reads
    pub fn to_json(&self, catalog: &StepCatalog) -> Result<String> {
        let document = PipelineDocument {
            name: self.name.clone(),
            steps: self
                .steps
                .iter()
                .map(|step| catalog.encode(step.as_ref()))
                .collect::<Result<Vec<_>>>()?,
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Arc<dyn PipelineStepConfig>] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Resolve every step into a runner
    ///
    /// Fails with [`Error::InvalidPipeline`] for an empty pipeline and with
    /// [`Error::UnresolvedType`] before any runner is built when a tag has
    /// no factory. Factory errors are returned unchanged.
    pub fn build(&self, registry: &RunnerRegistry) -> Result<PipelineExecutor> {
        if self.steps.is_empty() {
            return Err(Error::InvalidPipeline(format!(
                "pipeline '{}' has no steps",
                self.name
            )));
        }
        if let Some(missing) = self.steps.iter().find(|s| !registry.contains(s.type_tag())) {
            error!(pipeline = %self.name, step_type = missing.type_tag(), "Unresolved step type");
            return Err(Error::UnresolvedType(missing.type_tag().to_string()));
        }

        let mut stages: Vec<Stage> = Vec::with_capacity(self.steps.len());
        for (index, config) in self.steps.iter().enumerate() {
            match registry.resolve(config.as_ref()) {
                Ok(runner) => stages.push(Stage {
                    step_type: config.type_tag(),
                    runner,
                }),
                Err(e) => {
                    error!(
                        pipeline = %self.name,
                        index,
                        step_type = config.type_tag(),
                        error = %e,
                        "Failed to build stage"
                    );
                    for built in stages.iter().rev() {
                        let _ = built.runner.close();
                    }
                    return Err(e);
                }
            }
        }

        info!(pipeline = %self.name, stages = stages.len(), "Pipeline built");
        Ok(PipelineExecutor::new(self.name.clone(), stages))
    }
}

/// Builder returned by [`Pipeline::builder`]
#[derive(Debug)]
pub struct PipelineBuilder {
    name: String,
    steps: Vec<Arc<dyn PipelineStepConfig>>,
}

impl PipelineBuilder {
    /// Append a step
    pub fn step<C: PipelineStepConfig>(mut self, config: C) -> Self {
        self.steps.push(Arc::new(config));
        self
    }

    /// Append an already shared step config
    pub fn shared_step(mut self, config: Arc<dyn PipelineStepConfig>) -> Self {
        self.steps.push(config);
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline::new(self.name, self.steps)
    }
}

//! Model inference step
//!
//! The `model` runner loads its model once through the host's
//! [`ModelLoader`](crate::model_worker::ModelLoader) and serves it from an
//! [`InferenceExecutioner`]. Concurrent pipeline executions sharing the
//! runner are batched together by the pool.

use super::{PipelineStepConfig, PipelineStepRunner, RunnerFactory, StepConfigType};
use crate::config::ExecutionerConfig;
use crate::data::{Data, Value};
use crate::model_worker::{DataModel, DataModelLoader, InferenceExecutioner};
use crate::pipeline::Context;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Config of the `model` step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelStepConfig {
    /// Model location handed to the loader
    pub model_uri: String,

    /// Keys passed to the model; empty passes the whole Data value
    #[serde(default)]
    pub input_names: Vec<String>,

    /// Keys copied back from the model output; empty copies every key
    #[serde(default)]
    pub output_names: Vec<String>,

    /// Pool settings; the host defaults apply when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executioner: Option<ExecutionerConfig>,
}

impl ModelStepConfig {
    pub fn new(model_uri: impl Into<String>) -> Self {
        Self {
            model_uri: model_uri.into(),
            input_names: Vec::new(),
            output_names: Vec::new(),
            executioner: None,
        }
    }

    pub fn with_inputs<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.input_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_outputs<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.output_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_executioner(mut self, config: ExecutionerConfig) -> Self {
        self.executioner = Some(config);
        self
    }
}

impl StepConfigType for ModelStepConfig {
    const TAG: &'static str = "model";
}

/// Factory for `model` runners, bound to one loader
pub struct ModelStepFactory {
    loader: Arc<DataModelLoader>,
    defaults: ExecutionerConfig,
}

impl ModelStepFactory {
    pub fn new(loader: Arc<DataModelLoader>, defaults: ExecutionerConfig) -> Self {
        Self { loader, defaults }
    }
}

impl RunnerFactory for ModelStepFactory {
    fn create(&self, config: &dyn PipelineStepConfig) -> Result<Box<dyn PipelineStepRunner>> {
        let config = config.downcast_ref::<ModelStepConfig>().ok_or_else(|| {
            Error::ConfigError(format!(
                "model factory received a '{}' config",
                config.type_tag()
            ))
        })?;
        let pool_config = config
            .executioner
            .clone()
            .unwrap_or_else(|| self.defaults.clone());
        let executioner =
            InferenceExecutioner::initialize(self.loader.as_ref(), &config.model_uri, pool_config)?;
        Ok(Box::new(ModelStepRunner {
            config: config.clone(),
            executioner,
        }))
    }
}

/// Runner feeding Data through a pooled model
pub struct ModelStepRunner {
    config: ModelStepConfig,
    executioner: InferenceExecutioner<DataModel>,
}

impl ModelStepRunner {
    /// The runner's worker pool
    pub fn executioner(&self) -> &InferenceExecutioner<DataModel> {
        &self.executioner
    }

    fn model_input(&self, data: &Data) -> Result<Data> {
        if self.config.input_names.is_empty() {
            return Ok(data.clone());
        }
        self.config
            .input_names
            .iter()
            .map(|name| -> Result<(String, Value)> {
                Ok((name.clone(), data.require(name)?.clone()))
            })
            .collect()
    }
}

impl PipelineStepRunner for ModelStepRunner {
    fn config(&self) -> &dyn PipelineStepConfig {
        &self.config
    }

    fn process(&self, mut data: Data, ctx: &Context) -> Result<Data> {
        let input = self.model_input(&data)?;
        debug!(
            request_id = %ctx.request_id(),
            model = self.executioner.model_id(),
            "Submitting to model"
        );
        let mut output = self.executioner.execute(input)?;

        if self.config.output_names.is_empty() {
            data.extend(output);
        } else {
            for name in &self.config.output_names {
                let value = output
                    .remove(name)
                    .ok_or_else(|| Error::MissingKey(name.clone()))?;
                data.put(name.clone(), value);
            }
        }
        Ok(data)
    }

    fn close(&self) -> Result<()> {
        self.executioner.stop();
        Ok(())
    }
}

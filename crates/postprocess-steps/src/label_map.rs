//! `label_map`: class index to label

use inferhost_core::data::{Data, Value, ValueKind};
use inferhost_core::{Context, Error, PipelineStepConfig, PipelineStepRunner, Result, StepConfigType};
use serde::{Deserialize, Serialize};

fn default_output_key() -> String {
    "label".to_string()
}

/// Config of the `label_map` step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelMapConfig {
    /// Key holding the class index: an int or a zero-dimensional integer array
    pub key: String,

    /// Labels in class order
    pub labels: Vec<String>,

    /// Key the label is written to
    #[serde(default = "default_output_key")]
    pub output_key: String,
}

impl LabelMapConfig {
    pub fn new<S: Into<String>>(key: impl Into<String>, labels: impl IntoIterator<Item = S>) -> Self {
        Self {
            key: key.into(),
            labels: labels.into_iter().map(Into::into).collect(),
            output_key: default_output_key(),
        }
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }
}

impl StepConfigType for LabelMapConfig {
    const TAG: &'static str = "label_map";
}

#[derive(Debug)]
pub struct LabelMapRunner {
    config: LabelMapConfig,
}

impl LabelMapRunner {
    /// Fails on an empty label list
    pub fn new(config: LabelMapConfig) -> Result<Self> {
        if config.labels.is_empty() {
            return Err(Error::ConfigError(
                "label_map needs at least one label".to_string(),
            ));
        }
        Ok(Self { config })
    }

    fn class_index(&self, data: &Data) -> Result<i64> {
        let key = &self.config.key;
        match data.require(key)? {
            Value::Int(index) => Ok(*index),
            Value::Array(array) => array.scalar_i64(),
            other => Err(Error::TypeMismatch {
                key: key.clone(),
                expected: ValueKind::Int,
                actual: other.kind(),
            }),
        }
    }
}

impl PipelineStepRunner for LabelMapRunner {
    fn config(&self) -> &dyn PipelineStepConfig {
        &self.config
    }

    fn process(&self, mut data: Data, _ctx: &Context) -> Result<Data> {
        let index = self.class_index(&data)?;
        let label = usize::try_from(index)
            .ok()
            .and_then(|i| self.config.labels.get(i))
            .ok_or_else(|| {
                Error::InvalidValue(format!(
                    "class index {} outside 0..{}",
                    index,
                    self.config.labels.len()
                ))
            })?;
        data.put(self.config.output_key.clone(), label.as_str());
        Ok(data)
    }
}

//! Key-shaping steps: `rename_keys` and `select_keys`
//!
//! Small glue stages that adapt one step's output keys to the next step's
//! expected inputs.

use super::{PipelineStepConfig, PipelineStepRunner, StepConfigType};
use crate::data::Data;
use crate::pipeline::Context;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Config of the `rename_keys` step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenameKeysConfig {
    /// Old key -> new key
    pub mapping: BTreeMap<String, String>,
}

impl StepConfigType for RenameKeysConfig {
    const TAG: &'static str = "rename_keys";
}

/// Renames keys; every source key must be present
///
/// All renames happen at once, so `{a: b, b: a}` swaps.
#[derive(Debug)]
pub struct RenameKeysRunner {
    config: RenameKeysConfig,
}

impl RenameKeysRunner {
    /// Fails when two source keys map onto the same target
    pub fn new(config: RenameKeysConfig) -> Result<Self> {
        let mut targets = BTreeSet::new();
        for target in config.mapping.values() {
            if !targets.insert(target) {
                return Err(Error::ConfigError(format!(
                    "rename_keys maps more than one key onto '{}'",
                    target
                )));
            }
        }
        Ok(Self { config })
    }
}

impl PipelineStepRunner for RenameKeysRunner {
    fn config(&self) -> &dyn PipelineStepConfig {
        &self.config
    }

    fn process(&self, mut data: Data, _ctx: &Context) -> Result<Data> {
        let mut moved = Vec::with_capacity(self.config.mapping.len());
        for (from, to) in &self.config.mapping {
            let value = data
                .remove(from)
                .ok_or_else(|| Error::MissingKey(from.clone()))?;
            moved.push((to.clone(), value));
        }
        data.extend(moved);
        Ok(data)
    }
}

/// Config of the `select_keys` step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectKeysConfig {
    /// Keys to keep
    pub keys: Vec<String>,
    /// Fail when a listed key is absent instead of skipping it
    #[serde(default)]
    pub strict: bool,
}

impl StepConfigType for SelectKeysConfig {
    const TAG: &'static str = "select_keys";
}

/// Drops every key not listed
#[derive(Debug)]
pub struct SelectKeysRunner {
    config: SelectKeysConfig,
}

impl SelectKeysRunner {
    pub fn new(config: SelectKeysConfig) -> Self {
        Self { config }
    }
}

impl PipelineStepRunner for SelectKeysRunner {
    fn config(&self) -> &dyn PipelineStepConfig {
        &self.config
    }

    fn process(&self, mut data: Data, _ctx: &Context) -> Result<Data> {
        let mut selected = Data::new();
        for key in &self.config.keys {
            match data.remove(key) {
                Some(value) => {
                    selected.put(key.clone(), value);
                }
                None if self.config.strict => return Err(Error::MissingKey(key.clone())),
                None => {}
            }
        }
        Ok(selected)
    }
}

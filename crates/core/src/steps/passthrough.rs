//! Pass-through step
//!
//! Returns its input unchanged. Useful as a placeholder stage and for
//! exercising pipeline plumbing.

use super::{PipelineStepConfig, PipelineStepRunner, StepConfigType};
use crate::data::Data;
use crate::pipeline::Context;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Config of the `passthrough` step; it has no parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PassThroughConfig {}

impl StepConfigType for PassThroughConfig {
    const TAG: &'static str = "passthrough";
}

/// Runner that returns input unchanged
#[derive(Debug)]
pub struct PassThroughRunner {
    config: PassThroughConfig,
}

impl PassThroughRunner {
    pub fn new(config: PassThroughConfig) -> Self {
        Self { config }
    }
}

impl PipelineStepRunner for PassThroughRunner {
    fn config(&self) -> &dyn PipelineStepConfig {
        &self.config
    }

    fn process(&self, data: Data, _ctx: &Context) -> Result<Data> {
        Ok(data)
    }
}

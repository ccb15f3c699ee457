//! Pipeline executor: the runners of one built pipeline

use super::context::{Context, StageInfo};
use crate::data::Data;
use crate::error::panic_message;
use crate::steps::PipelineStepRunner;
use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, debug_span, info_span, warn};

pub(crate) struct Stage {
    pub(crate) step_type: &'static str,
    pub(crate) runner: Box<dyn PipelineStepRunner>,
}

/// Runs Data through a fixed sequence of runners
///
/// Safe to share across threads: concurrent `exec` calls each thread their
/// own Data value through the same runners.
pub struct PipelineExecutor {
    name: String,
    stages: Vec<Stage>,
    closed: AtomicBool,
}

impl PipelineExecutor {
    pub(crate) fn new(name: String, stages: Vec<Stage>) -> Self {
        Self {
            name,
            stages,
            closed: AtomicBool::new(false),
        }
    }

    /// Execute with a fresh context
    pub fn exec(&self, data: Data) -> Result<Data> {
        self.exec_with(data, &Context::new())
    }

    /// Execute every stage in order, stopping at the first failure
    ///
    /// A failure is wrapped in [`Error::StepFailed`] naming the stage. A
    /// runner that panics fails its stage with [`Error::Internal`].
    pub fn exec_with(&self, mut data: Data, ctx: &Context) -> Result<Data> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Shutdown);
        }
        let request_id = ctx.request_id().to_string();
        let _pipeline =
            info_span!("pipeline", request_id = %request_id, pipeline = %self.name).entered();

        for (index, stage) in self.stages.iter().enumerate() {
            let _stage = debug_span!("stage", index, step_type = stage.step_type).entered();
            let info = StageInfo {
                index,
                step_type: stage.step_type,
            };
            if let Some(observer) = ctx.observer() {
                observer.on_stage_start(ctx, info);
            }

            let started = Instant::now();
            let result = panic::catch_unwind(AssertUnwindSafe(|| stage.runner.process(data, ctx)))
                .unwrap_or_else(|payload| {
                    Err(Error::Internal(format!(
                        "stage panicked: {}",
                        panic_message(&*payload)
                    )))
                });
            let elapsed = started.elapsed();

            if let Some(observer) = ctx.observer() {
                observer.on_stage_end(ctx, info, elapsed, result.as_ref().map(|_| ()));
            }

            data = match result {
                Ok(output) => output,
                Err(source) => {
                    debug!(error = %source, "Stage failed");
                    return Err(Error::StepFailed {
                        index,
                        step_type: stage.step_type.to_string(),
                        source: Box::new(source),
                    });
                }
            };
        }
        Ok(data)
    }

    /// Run [`exec`](Self::exec) on the tokio blocking pool
    pub async fn exec_async(self: Arc<Self>, data: Data) -> Result<Data> {
        tokio::task::spawn_blocking(move || self.exec(data))
            .await
            .map_err(|e| Error::Internal(format!("pipeline task failed: {}", e)))?
    }

    /// Close every runner, last stage first
    ///
    /// Attempts all runners and returns the first error. Idempotent;
    /// `exec` fails with [`Error::Shutdown`] afterwards.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut first_error = None;
        for (index, stage) in self.stages.iter().enumerate().rev() {
            if let Err(e) = stage.runner.close() {
                warn!(
                    pipeline = %self.name,
                    index,
                    step_type = stage.step_type,
                    error = %e,
                    "Failed to close stage"
                );
                first_error.get_or_insert(e);
            }
        }
        debug!(pipeline = %self.name, "Pipeline closed");
        first_error.map_or(Ok(()), Err)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stage type tags in execution order
    pub fn step_types(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.step_type).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for PipelineExecutor {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("name", &self.name)
            .field("steps", &self.step_types())
            .field("closed", &self.is_closed())
            .finish()
    }
}

//! InferHost Core - model-serving host runtime
//!
//! This crate provides the pieces a model-serving process is assembled from:
//!
//! - [`data`]: the typed [`Data`] container every stage consumes and
//!   produces, with canonical text (JSON) and binary (bincode) encodings
//! - [`steps`]: step configs, runners, the [`RunnerRegistry`] and the
//!   [`StepCatalog`] fed by extension modules
//! - [`pipeline`]: ordered step configs built into a [`PipelineExecutor`]
//! - [`model_worker`]: the [`InferenceExecutioner`] worker pool that turns
//!   single requests into batched model calls under a bounded queue
//! - [`host`]: the start-up phase tying discovery, registration and
//!   sealing together
//!
//! Protocol adapters sit outside this crate: they decode wire bytes into
//! [`Data`], call [`PipelineExecutor::exec`] and encode the result or a
//! [`Failure`].
//!
//! # Example
//!
//! ```
//! use inferhost_core::data::Data;
//! use inferhost_core::steps::SelectKeysConfig;
//! use inferhost_core::{Host, Pipeline};
//!
//! let host = Host::builder().start().unwrap();
//! let pipeline = Pipeline::builder("tidy")
//!     .step(SelectKeysConfig { keys: vec!["label".into()], strict: true })
//!     .build();
//! let executor = host.build(&pipeline).unwrap();
//!
//! let out = executor
//!     .exec(Data::single("label", "cat").with("debug", true))
//!     .unwrap();
//! assert_eq!(out.keys(), vec!["label"]);
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod data;
pub mod host;
pub mod model_worker;
pub mod pipeline;
pub mod steps;

mod error;

pub use config::{ExecutionerConfig, HostConfig, InferenceMode};
pub use data::{Data, Value, ValueKind};
pub use error::{Error, ErrorKind, Failure, Result, StageRef};
pub use host::{Host, HostBuilder};
pub use model_worker::{
    loader_fn, DataModel, InferenceExecutioner, InferenceModel, ModelConcurrency, ModelLoader,
    PendingInference,
};
pub use pipeline::{Context, Pipeline, PipelineExecutor};
pub use steps::{
    PipelineStepConfig, PipelineStepRunner, RunnerFactory, RunnerRegistry, StepCatalog,
    StepConfigType,
};

#[doc(hidden)]
pub use inventory;

/// Initialize logging
///
/// Installs a `tracing` fmt subscriber filtered by `RUST_LOG`, or by
/// `default_filter` when that is unset. Returns `false` when a global
/// subscriber was already installed.
pub fn init_logging(default_filter: &str) -> bool {
    let initialized = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .try_init()
        .is_ok();

    if initialized {
        tracing::info!("InferHost core initialized");
    }
    initialized
}

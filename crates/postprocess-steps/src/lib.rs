//! Post-processing steps for InferHost pipelines
//!
//! Steps that turn raw model outputs into caller-facing values:
//!
//! - `squeeze_scalar` - unwrap single-element arrays into plain numbers
//! - `label_map` - map a class index onto its label
//!
//! The module registers itself through `inventory`, so a started
//! [`Host`](inferhost_core::Host) resolves both tags once this crate is
//! linked. Binaries whose linker may discard unreferenced objects can add
//! [`MODULE`] explicitly; the host counts a module seen twice once.
//!
//! # Example
//!
//! ```
//! use inferhost_core::data::{Data, NdArray};
//! use inferhost_core::{Host, Pipeline};
//! use inferhost_postprocess_steps::{LabelMapConfig, SqueezeScalarConfig};
//!
//! let host = Host::builder()
//!     .module(&inferhost_postprocess_steps::MODULE)
//!     .start()
//!     .unwrap();
//! let pipeline = Pipeline::builder("classify-tail")
//!     .step(SqueezeScalarConfig::new(["class"]))
//!     .step(LabelMapConfig::new("class", ["cat", "dog"]))
//!     .build();
//! let executor = host.build(&pipeline).unwrap();
//!
//! let out = executor
//!     .exec(Data::single("class", NdArray::from_slice(vec![1], &[1i64]).unwrap()))
//!     .unwrap();
//! assert_eq!(out.get_str("label").unwrap(), "dog");
//! ```

mod label_map;
mod squeeze;

pub use label_map::{LabelMapConfig, LabelMapRunner};
pub use squeeze::{SqueezeScalarConfig, SqueezeScalarRunner};

use inferhost_core::steps::{ExtensionModule, StepDeclaration};
use inferhost_core::{Result, RunnerRegistry};

/// Name of the extension module in the host's step catalog
pub const MODULE_NAME: &str = "postprocess";

/// The post-processing module
pub static MODULE: ExtensionModule = ExtensionModule::new(
    MODULE_NAME,
    &[
        StepDeclaration::of::<LabelMapConfig>,
        StepDeclaration::of::<SqueezeScalarConfig>,
    ],
    register_postprocess_steps,
);

/// Register the post-processing runners
pub fn register_postprocess_steps(registry: &RunnerRegistry) -> Result<()> {
    inferhost_core::register_step!(registry, LabelMapConfig, |config| {
        LabelMapRunner::new(config.clone())
    })?;
    inferhost_core::register_step!(registry, SqueezeScalarConfig, |config| {
        Ok(SqueezeScalarRunner::new(config.clone()))
    })?;
    Ok(())
}

inferhost_core::declare_extension_module!(
    "postprocess",
    [LabelMapConfig, SqueezeScalarConfig],
    register_postprocess_steps
);

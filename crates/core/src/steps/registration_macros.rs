//! Registration macros for step types
//!
//! # Macros
//!
//! - `register_step!` - Register a runner factory for one config type
//! - `declare_extension_module!` - Submit a module's step declarations and
//!   registration hook for discovery
//!
//! # Example
//!
//! ```ignore
//! use inferhost_core::{declare_extension_module, register_step};
//!
//! fn register(registry: &RunnerRegistry) -> Result<()> {
//!     register_step!(registry, LabelMapConfig, |config| LabelMapRunner::new(config.clone()))
//! }
//!
//! declare_extension_module!("postprocess", [LabelMapConfig], register);
//! ```

/// Register a runner factory for one config type
///
/// The tag is taken from the config's `StepConfigType::TAG`, so it cannot
/// drift from the serialized form. The closure receives `&Config` and
/// returns `Result<Runner>`; it is invoked once per `resolve`.
///
/// Registering from the same call site twice is a no-op, since the closure
/// type (and with it the factory type) is the same.
///
/// # Syntax
///
/// ```ignore
/// register_step!(registry, ConfigType, |config| Ok(Runner::new(config.clone())))?;
/// ```
#[macro_export]
macro_rules! register_step {
    ($registry:expr, $config:ty, $factory:expr) => {
        $registry.register(
            <$config as $crate::steps::StepConfigType>::TAG,
            $crate::steps::TypedFactory::<$config, _, _>::new($factory),
        )
    };
}

/// Declare an extension module for discovery
///
/// Submits an `ExtensionModule` to `inventory`. The host picks it up at
/// start-up, adds its config types to the step catalog and runs the
/// registration hook against the runner registry.
///
/// # Syntax
///
/// ```ignore
/// declare_extension_module!("module_name", [ConfigA, ConfigB], register_fn);
/// ```
///
/// `register_fn` must be a `fn(&RunnerRegistry) -> Result<()>`.
#[macro_export]
macro_rules! declare_extension_module {
    ($name:literal, [$($config:ty),* $(,)?], $register:path) => {
        $crate::inventory::submit! {
            $crate::steps::ExtensionModule::new(
                $name,
                &[$($crate::steps::StepDeclaration::of::<$config>),*],
                $register,
            )
        }
    };
}

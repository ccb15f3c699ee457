//! Step catalog and extension module discovery
//!
//! Every crate that contributes steps declares one [`ExtensionModule`]
//! with [`declare_extension_module!`](crate::declare_extension_module),
//! which submits it to `inventory`. At start-up the host gathers all of
//! them into a [`StepCatalog`]: the tag -> config type mapping used to
//! decode serialized pipeline steps.
//!
//! Two modules declaring the same tag is fatal. Nothing is registered
//! implicitly when a config type is merely referenced.

use super::{PipelineStepConfig, StepConfigType};
use super::registry::RunnerRegistry;
use crate::{Error, Result};
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Field carrying the type tag in a serialized step
pub const TYPE_FIELD: &str = "type";

type DecodeFn = fn(JsonValue) -> Result<Arc<dyn PipelineStepConfig>>;

/// One config type a module contributes
#[derive(Clone, Copy)]
pub struct StepDeclaration {
    tag: &'static str,
    type_name: &'static str,
    decode: DecodeFn,
}

impl StepDeclaration {
    /// Declaration for config type `C`
    pub fn of<C: StepConfigType>() -> Self {
        Self {
            tag: C::TAG,
            type_name: std::any::type_name::<C>(),
            decode: decode_params::<C>,
        }
    }

    pub fn tag(&self) -> &'static str {
        self.tag
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for StepDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDeclaration")
            .field("tag", &self.tag)
            .field("type_name", &self.type_name)
            .finish()
    }
}

fn decode_params<C: StepConfigType>(params: JsonValue) -> Result<Arc<dyn PipelineStepConfig>> {
    let config: C = serde_json::from_value(params)
        .map_err(|e| Error::ConfigError(format!("invalid parameters for '{}': {}", C::TAG, e)))?;
    Ok(Arc::new(config))
}

/// A unit of step contributions, discovered through `inventory`
pub struct ExtensionModule {
    /// Module name, unique across the binary
    pub name: &'static str,
    /// Config types the module declares
    pub steps: &'static [fn() -> StepDeclaration],
    /// Registers the module's runner factories
    pub register: fn(&RunnerRegistry) -> Result<()>,
}

impl ExtensionModule {
    pub const fn new(
        name: &'static str,
        steps: &'static [fn() -> StepDeclaration],
        register: fn(&RunnerRegistry) -> Result<()>,
    ) -> Self {
        Self {
            name,
            steps,
            register,
        }
    }

    /// Materialize the module's declarations
    pub fn declarations(&self) -> Vec<StepDeclaration> {
        self.steps.iter().map(|declare| declare()).collect()
    }

    /// (tag, config type) pairs identifying what the module declares
    fn signature(&self) -> Vec<(&'static str, &'static str)> {
        self.declarations()
            .iter()
            .map(|d| (d.tag, d.type_name))
            .collect()
    }
}

impl fmt::Debug for ExtensionModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionModule")
            .field("name", &self.name)
            .field("steps", &self.steps.len())
            .finish()
    }
}

inventory::collect!(ExtensionModule);

/// Every module linked into the binary, sorted by name
pub fn discovered_modules() -> Vec<&'static ExtensionModule> {
    let mut modules: Vec<&'static ExtensionModule> =
        inventory::iter::<ExtensionModule>.into_iter().collect();
    modules.sort_by_key(|m| m.name);
    modules
}

struct CatalogEntry {
    declaration: StepDeclaration,
    module: &'static str,
}

/// Tag -> config type mapping built from extension modules
#[derive(Default)]
pub struct StepCatalog {
    entries: BTreeMap<&'static str, CatalogEntry>,
    modules: Vec<&'static str>,
}

impl StepCatalog {
    /// Aggregate the declarations of `modules`
    ///
    /// Fails with [`Error::DuplicateTypeTag`] when two modules declare the
    /// same tag. A module listed more than once counts once; two modules
    /// sharing a name but declaring different steps fail with
    /// [`Error::DuplicateModule`].
    pub fn from_modules<'a, I>(modules: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a ExtensionModule>,
    {
        let mut catalog = Self::default();
        let mut seen: HashMap<&'static str, Vec<(&'static str, &'static str)>> = HashMap::new();
        for module in modules {
            let signature = module.signature();
            match seen.get(module.name) {
                Some(known) if *known == signature => {
                    debug!(module = module.name, "Extension module listed twice; skipping");
                    continue;
                }
                Some(_) => return Err(Error::DuplicateModule(module.name.to_string())),
                None => {}
            }
            catalog.add_module(module)?;
            seen.insert(module.name, signature);
        }
        info!(
            modules = catalog.modules.len(),
            steps = catalog.entries.len(),
            "Step catalog built"
        );
        Ok(catalog)
    }

    fn add_module(&mut self, module: &ExtensionModule) -> Result<()> {
        for declaration in module.declarations() {
            if let Some(existing) = self.entries.get(declaration.tag) {
                if existing.module == module.name
                    && existing.declaration.type_name == declaration.type_name
                {
                    continue;
                }
                return Err(Error::DuplicateTypeTag {
                    tag: declaration.tag.to_string(),
                    first: existing.module.to_string(),
                    second: module.name.to_string(),
                });
            }
            debug!(
                tag = declaration.tag,
                module = module.name,
                config = declaration.type_name,
                "Declared step type"
            );
            self.entries.insert(
                declaration.tag,
                CatalogEntry {
                    declaration,
                    module: module.name,
                },
            );
        }
        self.modules.push(module.name);
        Ok(())
    }

    /// Decode a serialized step: an object with a `type` field plus params
    pub fn decode(&self, value: JsonValue) -> Result<Arc<dyn PipelineStepConfig>> {
        let mut object = match value {
            JsonValue::Object(object) => object,
            other => {
                return Err(Error::InvalidPipeline(format!(
                    "step must be an object, found {}",
                    json_kind(&other)
                )))
            }
        };
        let tag = match object.remove(TYPE_FIELD) {
            Some(JsonValue::String(tag)) => tag,
            Some(_) => {
                return Err(Error::InvalidPipeline(format!(
                    "step field '{}' must be a string",
                    TYPE_FIELD
                )))
            }
            None => {
                return Err(Error::InvalidPipeline(format!(
                    "step is missing its '{}' field",
                    TYPE_FIELD
                )))
            }
        };
        let entry = self
            .entries
            .get(tag.as_str())
            .ok_or(Error::UnresolvedType(tag))?;
        (entry.declaration.decode)(JsonValue::Object(object))
    }

    /// Encode a config into its serialized step form
    pub fn encode(&self, config: &dyn PipelineStepConfig) -> Result<JsonValue> {
        let tag = config.type_tag();
        if !self.entries.contains_key(tag) {
            return Err(Error::UnresolvedType(tag.to_string()));
        }
        let mut object = match config.to_params()? {
            JsonValue::Object(object) => object,
            JsonValue::Null => Map::new(),
            other => {
                return Err(Error::ConfigError(format!(
                    "'{}' parameters must serialize to an object, found {}",
                    tag,
                    json_kind(&other)
                )))
            }
        };
        if object.contains_key(TYPE_FIELD) {
            return Err(Error::ConfigError(format!(
                "'{}' has a parameter named '{}'",
                tag, TYPE_FIELD
            )));
        }
        object.insert(TYPE_FIELD.to_string(), JsonValue::String(tag.to_string()));
        Ok(JsonValue::Object(object))
    }

    /// Whether `tag` is declared
    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    /// Module that declared `tag`
    pub fn module_of(&self, tag: &str) -> Option<&'static str> {
        self.entries.get(tag).map(|e| e.module)
    }

    /// Declared tags, sorted
    pub fn tags(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    /// Aggregated module names, in aggregation order
    pub fn modules(&self) -> &[&'static str] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for StepCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepCatalog")
            .field("modules", &self.modules)
            .field("tags", &self.tags())
            .finish()
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a bool",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

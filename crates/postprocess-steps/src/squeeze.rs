//! `squeeze_scalar`: single-element arrays to plain values

use inferhost_core::data::{DType, Data, NdArray, Value, ValueKind};
use inferhost_core::{Context, Error, PipelineStepConfig, PipelineStepRunner, Result, StepConfigType};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Config of the `squeeze_scalar` step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqueezeScalarConfig {
    /// Keys holding arrays of exactly one element
    pub keys: Vec<String>,
}

impl SqueezeScalarConfig {
    pub fn new<S: Into<String>>(keys: impl IntoIterator<Item = S>) -> Self {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl StepConfigType for SqueezeScalarConfig {
    const TAG: &'static str = "squeeze_scalar";
}

/// Replaces one-element arrays with `Int`, `Float` or `Bool`
///
/// Integer dtypes become `Int`, float dtypes `Float` and `bool` stays
/// `Bool`. Any shape whose dimensions are all 1 is accepted, including the
/// zero-dimensional one.
#[derive(Debug)]
pub struct SqueezeScalarRunner {
    config: SqueezeScalarConfig,
}

impl SqueezeScalarRunner {
    pub fn new(config: SqueezeScalarConfig) -> Self {
        Self { config }
    }
}

fn squeeze(key: &str, array: &NdArray) -> Result<Value> {
    if array.len() != 1 {
        return Err(Error::InvalidValue(format!(
            "'{}' has shape {:?}; only single-element arrays squeeze",
            key,
            array.shape()
        )));
    }
    let scalar = NdArray::new(Vec::new(), array.dtype(), array.as_bytes().to_vec())?;
    match scalar.dtype() {
        DType::I32 | DType::I64 | DType::U8 => Ok(Value::Int(scalar.scalar_i64()?)),
        DType::F32 | DType::F64 => Ok(Value::Float(scalar.scalar_f64()?)),
        DType::Bool => Ok(Value::Bool(scalar.scalar_f64()? != 0.0)),
        DType::F16 => Err(Error::InvalidValue(format!(
            "'{}' is f16, which cannot be read as a number",
            key
        ))),
    }
}

impl PipelineStepRunner for SqueezeScalarRunner {
    fn config(&self) -> &dyn PipelineStepConfig {
        &self.config
    }

    fn process(&self, mut data: Data, _ctx: &Context) -> Result<Data> {
        for key in &self.config.keys {
            let value = match data.require(key)? {
                Value::Array(array) => squeeze(key, array)?,
                other => {
                    return Err(Error::TypeMismatch {
                        key: key.clone(),
                        expected: ValueKind::Array,
                        actual: other.kind(),
                    })
                }
            };
            trace!(key = %key, kind = %value.kind(), "Squeezed");
            data.put(key.clone(), value);
        }
        Ok(data)
    }
}

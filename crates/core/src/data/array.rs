//! N-dimensional numeric arrays
//!
//! An [`NdArray`] is a shape, an element type and a contiguous row-major
//! backing buffer in native byte order. The core never computes on it; it
//! only validates, carries and converts.

use super::codec;
use crate::{Error, Result};
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element types for arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    /// 16-bit floating point (storage only)
    F16,
    /// 32-bit floating point
    F32,
    /// 64-bit floating point
    F64,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 8-bit unsigned integer
    U8,
    /// One byte per element, 0 or 1
    Bool,
}

impl DType {
    /// Get size in bytes for this data type
    pub fn size_bytes(&self) -> usize {
        match self {
            DType::F16 => 2,
            DType::F32 => 4,
            DType::F64 => 8,
            DType::I32 => 4,
            DType::I64 => 8,
            DType::U8 => 1,
            DType::Bool => 1,
        }
    }

    /// Get the canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            DType::F16 => "f16",
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::U8 => "u8",
            DType::Bool => "bool",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rust scalar types with typed access to an array buffer
pub trait Element: bytemuck::Pod + fmt::Debug {
    /// Matching element type tag
    const DTYPE: DType;
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;
}
impl Element for f64 {
    const DTYPE: DType = DType::F64;
}
impl Element for i32 {
    const DTYPE: DType = DType::I32;
}
impl Element for i64 {
    const DTYPE: DType = DType::I64;
}
impl Element for u8 {
    const DTYPE: DType = DType::U8;
}

/// Wire form, validated on the way in
#[derive(Serialize, Deserialize)]
struct RawArray {
    shape: Vec<usize>,
    dtype: DType,
    #[serde(with = "codec::bytes")]
    data: Vec<u8>,
}

/// N-dimensional numeric array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawArray", into = "RawArray")]
pub struct NdArray {
    shape: Vec<usize>,
    dtype: DType,
    data: Vec<u8>,
}

impl NdArray {
    /// Create from a raw buffer, checking its length against shape and dtype
    pub fn new(shape: Vec<usize>, dtype: DType, data: Vec<u8>) -> Result<Self> {
        let elements = element_count(&shape)?;
        let expected = elements
            .checked_mul(dtype.size_bytes())
            .ok_or_else(|| Error::InvalidValue(format!("array shape {:?} overflows", shape)))?;
        if data.len() != expected {
            return Err(Error::InvalidValue(format!(
                "array of shape {:?} and dtype {} needs {} bytes, got {}",
                shape,
                dtype,
                expected,
                data.len()
            )));
        }
        if dtype == DType::Bool && data.iter().any(|b| *b > 1) {
            return Err(Error::InvalidValue(
                "bool array contains bytes other than 0 and 1".to_string(),
            ));
        }
        Ok(Self { shape, dtype, data })
    }

    /// Create from typed elements
    pub fn from_slice<T: Element>(shape: Vec<usize>, values: &[T]) -> Result<Self> {
        Self::new(shape, T::DTYPE, bytemuck::cast_slice(values).to_vec())
    }

    /// Create a zero-dimensional array holding one element
    pub fn scalar_of<T: Element>(value: T) -> Self {
        Self {
            shape: Vec::new(),
            dtype: T::DTYPE,
            data: bytemuck::bytes_of(&value).to_vec(),
        }
    }

    /// Create a bool array
    pub fn from_bools(shape: Vec<usize>, values: &[bool]) -> Result<Self> {
        Self::new(
            shape,
            DType::Bool,
            values.iter().map(|b| u8::from(*b)).collect(),
        )
    }

    /// Create from an `ndarray` array (copied in logical row-major order)
    pub fn from_ndarray<T: Element>(array: &ArrayD<T>) -> Self {
        let values: Vec<T> = array.iter().copied().collect();
        Self {
            shape: array.shape().to_vec(),
            dtype: T::DTYPE,
            data: bytemuck::cast_slice(&values).to_vec(),
        }
    }

    /// Get shape
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get element type
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Number of dimensions
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// Whether the array has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get raw backing buffer
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume into the raw backing buffer
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Copy out typed elements; `T` must match the array's dtype
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        self.expect_dtype(T::DTYPE)?;
        Ok(self
            .data
            .chunks_exact(T::DTYPE.size_bytes())
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }

    /// Copy out bools; the array must be of dtype bool
    pub fn to_bools(&self) -> Result<Vec<bool>> {
        self.expect_dtype(DType::Bool)?;
        Ok(self.data.iter().map(|b| *b == 1).collect())
    }

    /// Convert into an `ndarray` array
    pub fn to_ndarray<T: Element>(&self) -> Result<ArrayD<T>> {
        let values = self.to_vec::<T>()?;
        ArrayD::from_shape_vec(IxDyn(&self.shape), values)
            .map_err(|e| Error::InvalidValue(format!("ndarray conversion failed: {}", e)))
    }

    /// The single element of a zero-dimensional array
    ///
    /// Fails for any non-empty shape, including `[1]`; there is no
    /// implicit reduction.
    pub fn scalar<T: Element>(&self) -> Result<T> {
        self.expect_scalar_shape()?;
        self.expect_dtype(T::DTYPE)?;
        Ok(bytemuck::pod_read_unaligned(&self.data))
    }

    /// Scalar value widened to f64, for any numeric or bool dtype except f16
    pub fn scalar_f64(&self) -> Result<f64> {
        self.expect_scalar_shape()?;
        match self.dtype {
            DType::F32 => self.scalar::<f32>().map(f64::from),
            DType::F64 => self.scalar::<f64>(),
            DType::I32 => self.scalar::<i32>().map(f64::from),
            DType::I64 => self.scalar::<i64>().map(|v| v as f64),
            DType::U8 => self.scalar::<u8>().map(f64::from),
            DType::Bool => Ok(f64::from(self.data[0])),
            DType::F16 => Err(Error::InvalidValue(
                "f16 arrays support storage only".to_string(),
            )),
        }
    }

    /// Scalar value widened to i64, for integer dtypes only
    pub fn scalar_i64(&self) -> Result<i64> {
        self.expect_scalar_shape()?;
        match self.dtype {
            DType::I32 => self.scalar::<i32>().map(i64::from),
            DType::I64 => self.scalar::<i64>(),
            DType::U8 => self.scalar::<u8>().map(i64::from),
            other => Err(Error::InvalidValue(format!(
                "expected an integer array, found dtype {}",
                other
            ))),
        }
    }

    fn expect_dtype(&self, dtype: DType) -> Result<()> {
        if self.dtype != dtype {
            return Err(Error::InvalidValue(format!(
                "array has dtype {}, requested {}",
                self.dtype, dtype
            )));
        }
        Ok(())
    }

    fn expect_scalar_shape(&self) -> Result<()> {
        if !self.shape.is_empty() {
            return Err(Error::InvalidValue(format!(
                "scalar access on array of shape {:?}",
                self.shape
            )));
        }
        Ok(())
    }
}

fn element_count(shape: &[usize]) -> Result<usize> {
    shape.iter().try_fold(1usize, |acc, dim| {
        acc.checked_mul(*dim)
            .ok_or_else(|| Error::InvalidValue(format!("array shape {:?} overflows", shape)))
    })
}

impl TryFrom<RawArray> for NdArray {
    type Error = Error;

    fn try_from(raw: RawArray) -> Result<Self> {
        NdArray::new(raw.shape, raw.dtype, raw.data)
    }
}

impl From<NdArray> for RawArray {
    fn from(array: NdArray) -> Self {
        RawArray {
            shape: array.shape,
            dtype: array.dtype,
            data: array.data,
        }
    }
}

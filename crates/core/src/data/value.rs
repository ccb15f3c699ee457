//! Tagged values stored in a [`Data`](super::Data)

use super::array::NdArray;
use super::codec;
use super::image::Image;
use super::Data;
use crate::{Error, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// The closed set of value kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Absence of a value
    Null,
    /// Boolean
    Bool,
    /// 64-bit signed integer
    Int,
    /// 64-bit float
    Float,
    /// UTF-8 string
    Str,
    /// Raw bytes
    Bytes,
    /// Decoded image
    Image,
    /// N-dimensional numeric array
    Array,
    /// Homogeneous list
    List,
    /// Nested Data
    Data,
}

impl ValueKind {
    /// Get the canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "str",
            ValueKind::Bytes => "bytes",
            ValueKind::Image => "image",
            ValueKind::Array => "array",
            ValueKind::List => "list",
            ValueKind::Data => "data",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tagged value
///
/// Conversions between kinds are never implicit: the `as_*` accessors
/// return `None` for any other kind, and the typed getters on `Data`
/// turn that into [`Error::TypeMismatch`].
///
/// Equality compares floats by bit pattern, except that every NaN equals
/// every other NaN. `0.0` and `-0.0` differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// Absence of a value
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(#[serde(with = "codec::float")] f64),
    /// UTF-8 string
    Str(String),
    /// Raw bytes
    Bytes(#[serde(with = "codec::bytes")] Vec<u8>),
    /// Decoded image
    Image(Image),
    /// N-dimensional numeric array
    Array(NdArray),
    /// Homogeneous list
    List(ValueList),
    /// Nested Data
    Data(Data),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => {
                (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Image(a), Value::Image(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Data(a), Value::Data(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Kind of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Image(_) => ValueKind::Image,
            Value::Array(_) => ValueKind::Array,
            Value::List(_) => ValueKind::List,
            Value::Data(_) => ValueKind::Data,
        }
    }

    /// Build a list value, checking homogeneity
    pub fn list(items: Vec<Value>) -> Result<Self> {
        ValueList::new(items).map(Value::List)
    }

    /// Whether this is `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&Image> {
        match self {
            Value::Image(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&NdArray> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ValueList> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&Data> {
        match self {
            Value::Data(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Image> for Value {
    fn from(v: Image) -> Self {
        Value::Image(v)
    }
}

impl From<NdArray> for Value {
    fn from(v: NdArray) -> Self {
        Value::Array(v)
    }
}

impl From<ValueList> for Value {
    fn from(v: ValueList) -> Self {
        Value::List(v)
    }
}

impl From<Data> for Value {
    fn from(v: Data) -> Self {
        Value::Data(v)
    }
}

/// Ordered list whose elements all share one kind
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(into = "Vec<Value>")]
pub struct ValueList {
    items: Vec<Value>,
}

impl ValueList {
    /// Create a list, rejecting mixed kinds
    pub fn new(items: Vec<Value>) -> Result<Self> {
        if let Some(first) = items.first() {
            let kind = first.kind();
            if let Some((index, odd)) = items.iter().enumerate().find(|(_, v)| v.kind() != kind) {
                return Err(Error::InvalidValue(format!(
                    "list element {} is {} but the list holds {}",
                    index,
                    odd.kind(),
                    kind
                )));
            }
        }
        Ok(Self { items })
    }

    /// Kind shared by every element, `None` for an empty list
    pub fn element_kind(&self) -> Option<ValueKind> {
        self.items.first().map(Value::kind)
    }

    /// Append an element of the list's kind
    pub fn push(&mut self, value: Value) -> Result<()> {
        if let Some(kind) = self.element_kind() {
            if value.kind() != kind {
                return Err(Error::InvalidValue(format!(
                    "cannot push {} onto a list of {}",
                    value.kind(),
                    kind
                )));
            }
        }
        self.items.push(value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.items
    }
}

impl TryFrom<Vec<Value>> for ValueList {
    type Error = Error;

    fn try_from(items: Vec<Value>) -> Result<Self> {
        ValueList::new(items)
    }
}

impl<'de> Deserialize<'de> for ValueList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let _depth = codec::DepthGuard::enter::<D::Error>()?;
        let items = Vec::<Value>::deserialize(deserializer)?;
        ValueList::new(items).map_err(D::Error::custom)
    }
}

impl From<ValueList> for Vec<Value> {
    fn from(list: ValueList) -> Self {
        list.items
    }
}

impl<'a> IntoIterator for &'a ValueList {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

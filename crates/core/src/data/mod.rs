//! Typed data container exchanged between pipeline stages
//!
//! [`Data`] maps unique string keys to [`Value`]s drawn from a closed set
//! of kinds. It is the unit every stage consumes and produces, and the
//! unit protocol adapters put on the wire through the two canonical
//! encodings:
//!
//! - text: JSON, one externally-tagged object per value
//! - binary: bincode over the same serde model
//!
//! Both satisfy `decode(encode(d)) == d` for every valid `d`.
//!
//! # Example
//!
//! ```
//! use inferhost_core::data::{Data, Value};
//!
//! let data = Data::single("label", "cat").with("score", 0.93);
//! assert_eq!(data.get_str("label").unwrap(), "cat");
//! assert!(data.get_bool("label").is_err());
//!
//! let text = data.to_text().unwrap();
//! assert_eq!(Data::from_text(&text).unwrap(), data);
//! ```

pub mod array;
mod codec;
pub mod image;
pub mod value;

pub use array::{DType, Element, NdArray};
pub use image::{Image, PixelFormat};
pub use value::{Value, ValueKind, ValueList};

use crate::{Error, Result};
use bincode::Options;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

pub use codec::MAX_DEPTH;

/// Largest binary encoding accepted, in bytes
pub const MAX_BINARY_LEN: u64 = 1 << 30;

/// Fixed-width little-endian integers, the same layout as `bincode::serialize`
fn binary_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(MAX_BINARY_LEN)
}

/// Generates a typed getter that refuses every kind but one
macro_rules! typed_getter {
    ($(#[$doc:meta])* $name:ident, $kind:ident, $variant:ident => $ret:ty, |$v:ident| $out:expr) => {
        $(#[$doc])*
        pub fn $name(&self, key: &str) -> Result<$ret> {
            match self.require(key)? {
                Value::$variant($v) => Ok($out),
                other => Err(Error::mismatch(key, ValueKind::$kind, other.kind())),
            }
        }
    };
}

/// Ordered mapping from unique keys to values
///
/// Keys iterate in sorted order, which is also the order of both
/// encodings. Putting an existing key replaces its value.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Data {
    entries: BTreeMap<String, Value>,
}

impl<'de> Deserialize<'de> for Data {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let _depth = codec::DepthGuard::enter::<D::Error>()?;
        BTreeMap::deserialize(deserializer).map(|entries| Self { entries })
    }
}

impl Data {
    /// Create an empty Data value
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a Data value holding one entry
    pub fn single(key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut data = Self::new();
        data.put(key, value);
        data
    }

    /// Builder form of [`put`](Self::put)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.put(key, value);
        self
    }

    /// Insert or replace a value, returning the previous one
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    /// Remove a key
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Whether a key is present
    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in canonical order
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Untyped lookup
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Untyped lookup that fails with [`Error::MissingKey`]
    pub fn require(&self, key: &str) -> Result<&Value> {
        self.entries
            .get(key)
            .ok_or_else(|| Error::MissingKey(key.to_string()))
    }

    typed_getter!(get_bool, Bool, Bool => bool, |v| *v);
    typed_getter!(get_int, Int, Int => i64, |v| *v);
    typed_getter!(get_float, Float, Float => f64, |v| *v);
    typed_getter!(get_str, Str, Str => &str, |v| v.as_str());
    typed_getter!(get_bytes, Bytes, Bytes => &[u8], |v| v.as_slice());
    typed_getter!(get_image, Image, Image => &Image, |v| v);
    typed_getter!(
        /// Array accessor; shape and dtype are on the returned [`NdArray`]
        get_array, Array, Array => &NdArray, |v| v
    );
    typed_getter!(get_list, List, List => &ValueList, |v| v);
    typed_getter!(get_data, Data, Data => &Data, |v| v);

    /// Whether `key` is present and holds `Null`
    pub fn is_null(&self, key: &str) -> Result<bool> {
        Ok(self.require(key)?.is_null())
    }

    /// Encode to the canonical text form (JSON)
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from the canonical text form
    pub fn from_text(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Parse(format!("text decode: {}", e)))
    }

    /// Encode to the canonical binary form (bincode)
    pub fn to_binary(&self) -> Result<Vec<u8>> {
        Ok(binary_options().serialize(self)?)
    }

    /// Decode from the canonical binary form
    ///
    /// Input larger than [`MAX_BINARY_LEN`] or nested deeper than
    /// [`MAX_DEPTH`] fails with [`Error::Parse`].
    pub fn from_binary(bytes: &[u8]) -> Result<Self> {
        binary_options()
            .deserialize(bytes)
            .map_err(|e| Error::Parse(format!("binary decode: {}", e)))
    }
}

impl FromIterator<(String, Value)> for Data {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Data {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Extend<(String, Value)> for Data {
    fn extend<I: IntoIterator<Item = (String, Value)>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

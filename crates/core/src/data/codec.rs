//! Serde helpers shared by the text (JSON) and binary (bincode) encodings
//!
//! Both encodings go through the same derived `Serialize`/`Deserialize`
//! impls; the helpers below switch representation on
//! `is_human_readable()` so raw buffers stay raw in binary form.
//! [`DepthGuard`] bounds how deep containers may nest while decoding.

use std::cell::Cell;

/// Byte buffers: base64 in text, raw in binary
pub(crate) mod bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&STANDARD.encode(bytes))
        } else {
            bytes.serialize(serializer)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        if deserializer.is_human_readable() {
            let text = String::deserialize(deserializer)?;
            STANDARD.decode(text.as_bytes()).map_err(serde::de::Error::custom)
        } else {
            Vec::<u8>::deserialize(deserializer)
        }
    }
}

/// Floats: non-finite values become strings in text so JSON can carry them
pub(crate) mod float {
    use serde::{Deserialize, Deserializer, Serializer};

    const NAN: &str = "NaN";
    const INF: &str = "Infinity";
    const NEG_INF: &str = "-Infinity";

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TextFloat {
        Number(f64),
        Special(String),
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if !serializer.is_human_readable() || value.is_finite() {
            return serializer.serialize_f64(*value);
        }
        let text = if value.is_nan() {
            NAN
        } else if value.is_sign_positive() {
            INF
        } else {
            NEG_INF
        };
        serializer.serialize_str(text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        if !deserializer.is_human_readable() {
            return f64::deserialize(deserializer);
        }
        match TextFloat::deserialize(deserializer)? {
            TextFloat::Number(n) => Ok(n),
            TextFloat::Special(s) => match s.as_str() {
                NAN => Ok(f64::NAN),
                INF => Ok(f64::INFINITY),
                NEG_INF => Ok(f64::NEG_INFINITY),
                other => Err(serde::de::Error::custom(format!(
                    "invalid float literal '{}'",
                    other
                ))),
            },
        }
    }
}

/// Deepest nesting of Data and lists a decode accepts
pub const MAX_DEPTH: usize = 64;

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// One level of container nesting in the decode running on this thread
pub(crate) struct DepthGuard(());

impl DepthGuard {
    pub(crate) fn enter<E: serde::de::Error>() -> Result<Self, E> {
        DEPTH.with(|depth| {
            let next = depth.get() + 1;
            if next > MAX_DEPTH {
                return Err(E::custom(format!(
                    "value nested deeper than {} levels",
                    MAX_DEPTH
                )));
            }
            depth.set(next);
            Ok(DepthGuard(()))
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

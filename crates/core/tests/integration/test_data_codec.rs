//! Integration tests for the text and binary Data encodings

use inferhost_core::data::{
    DType, Data, Image, NdArray, PixelFormat, Value, ValueKind, MAX_DEPTH,
};
use inferhost_core::Error;
use rand::{Rng, SeedableRng};
use serde_json::json;

fn request() -> Data {
    let nested = Data::new().with("source", "camera-3").with("frame", 1042i64);
    Data::new()
        .with("image", Image::new(2, 1, PixelFormat::Rgb8, vec![255, 0, 0, 0, 255, 0]).unwrap())
        .with("logits", NdArray::from_slice(vec![2, 2], &[0.1f32, 0.9, 0.7, 0.3]).unwrap())
        .with("mask", NdArray::from_bools(vec![3], &[true, false, true]).unwrap())
        .with("threshold", 0.5)
        .with("labels", Value::list(vec!["cat".into(), "dog".into()]).unwrap())
        .with("meta", nested)
        .with("raw", vec![0u8, 1, 2, 255])
        .with("debug", false)
        .with("cursor", Value::Null)
}

#[test]
fn test_both_encodings_preserve_every_kind() {
    let data = request();
    assert_eq!(Data::from_text(&data.to_text().unwrap()).unwrap(), data);
    assert_eq!(Data::from_binary(&data.to_binary().unwrap()).unwrap(), data);
}

#[test]
fn test_text_form_is_inspectable() {
    let text = Data::new()
        .with("raw", vec![0u8, 1, 2, 255])
        .with("n", 3i64)
        .with("scores", NdArray::from_slice(vec![1], &[1u8]).unwrap())
        .to_text()
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["raw"], json!({"bytes": "AAEC/w=="}));
    assert_eq!(json["n"], json!({"int": 3}));
    assert_eq!(json["scores"]["array"]["dtype"], "u8");
    assert_eq!(json["scores"]["array"]["shape"], json!([1]));
}

#[test]
fn test_non_finite_floats() {
    let data = Data::new()
        .with("nan", f64::NAN)
        .with("inf", f64::INFINITY)
        .with("ninf", f64::NEG_INFINITY);

    for decoded in [
        Data::from_text(&data.to_text().unwrap()).unwrap(),
        Data::from_binary(&data.to_binary().unwrap()).unwrap(),
    ] {
        assert!(decoded.get_float("nan").unwrap().is_nan());
        assert_eq!(decoded.get_float("inf").unwrap(), f64::INFINITY);
        assert_eq!(decoded.get_float("ninf").unwrap(), f64::NEG_INFINITY);
        assert_eq!(decoded, data);
    }
}

#[test]
fn test_text_preserves_every_finite_float_bit_pattern() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
    let mut checked = 0;
    while checked < 20_000 {
        let value = f64::from_bits(rng.gen::<u64>());
        if !value.is_finite() {
            continue;
        }
        let decoded = Data::from_text(&Data::single("x", value).to_text().unwrap()).unwrap();
        let back = decoded.get_float("x").unwrap();
        assert_eq!(back.to_bits(), value.to_bits(), "{:e} came back as {:e}", value, back);
        checked += 1;
    }

    for value in [1.0715660391465826e-75, -0.0, f64::MIN_POSITIVE, 5e-324, f64::MAX] {
        let decoded = Data::from_text(&Data::single("x", value).to_text().unwrap()).unwrap();
        assert_eq!(decoded.get_float("x").unwrap().to_bits(), value.to_bits());
    }
}

fn nested(depth: usize) -> Data {
    (1..depth).fold(Data::single("leaf", 1i64), |inner, _| Data::single("x", inner))
}

/// Binary form of `levels` Data values each holding the next under "x"
fn nested_binary(levels: usize) -> Vec<u8> {
    let mut bytes = Vec::new();
    for _ in 0..levels {
        bytes.extend_from_slice(&1u64.to_le_bytes());
        bytes.extend_from_slice(&1u64.to_le_bytes());
        bytes.push(b'x');
        bytes.extend_from_slice(&9u32.to_le_bytes());
    }
    bytes.extend_from_slice(&0u64.to_le_bytes());
    bytes
}

#[test]
fn test_nesting_depth_is_bounded() {
    let deepest = nested(MAX_DEPTH);
    assert_eq!(Data::from_binary(&deepest.to_binary().unwrap()).unwrap(), deepest);
    let shallow = nested(32);
    assert_eq!(Data::from_text(&shallow.to_text().unwrap()).unwrap(), shallow);

    assert_eq!(Data::from_binary(&nested_binary(3)).unwrap().len(), 1);
    assert!(matches!(
        Data::from_binary(&nested_binary(MAX_DEPTH)),
        Err(Error::Parse(_))
    ));
    assert!(matches!(
        Data::from_binary(&nested_binary(200_000)),
        Err(Error::Parse(ref msg)) if msg.contains("nested deeper")
    ));
    // the limit is per decode, not cumulative
    assert_eq!(Data::from_binary(&deepest.to_binary().unwrap()).unwrap(), deepest);
}

/// Binary form of a Data holding `levels` lists nested under "x"
fn nested_list_binary(levels: usize) -> Vec<u8> {
    let mut bytes = 1u64.to_le_bytes().to_vec();
    bytes.extend_from_slice(&1u64.to_le_bytes());
    bytes.push(b'x');
    for _ in 0..levels {
        bytes.extend_from_slice(&8u32.to_le_bytes());
        bytes.extend_from_slice(&1u64.to_le_bytes());
    }
    bytes.extend_from_slice(&2u32.to_le_bytes());
    bytes.extend_from_slice(&7i64.to_le_bytes());
    bytes
}

#[test]
fn test_nested_lists_count_toward_depth() {
    let data = Data::from_binary(&nested_list_binary(MAX_DEPTH - 1)).unwrap();
    assert_eq!(data.get("x").map(Value::kind), Some(ValueKind::List));
    assert!(matches!(
        Data::from_binary(&nested_list_binary(MAX_DEPTH)),
        Err(Error::Parse(_))
    ));
}

#[test]
fn test_oversized_length_prefix_rejected() {
    let mut bytes = 1u64.to_le_bytes().to_vec();
    bytes.extend_from_slice(&u64::MAX.to_le_bytes());
    bytes.push(b'k');
    assert!(matches!(Data::from_binary(&bytes), Err(Error::Parse(_))));
}

#[test]
fn test_keys_iterate_sorted_after_decode() {
    let text = r#"{"b": {"int": 2}, "a": {"int": 1}, "c": {"str": "x"}}"#;
    let data = Data::from_text(text).unwrap();
    assert_eq!(data.keys(), vec!["a", "b", "c"]);
    assert_eq!(data.get("c").map(Value::kind), Some(ValueKind::Str));
}

#[test]
fn test_decode_enforces_value_invariants() {
    // 4 elements of f32 need 16 bytes
    let short_array = r#"{"x": {"array": {"shape": [4], "dtype": "f32", "data": "AAAAAA=="}}}"#;
    assert!(Data::from_text(short_array).is_err());

    let mixed_list = r#"{"x": {"list": [{"int": 1}, {"str": "two"}]}}"#;
    assert!(Data::from_text(mixed_list).is_err());

    let bad_base64 = r#"{"x": {"bytes": "***"}}"#;
    assert!(matches!(Data::from_text(bad_base64), Err(Error::Parse(_))));
}

#[test]
fn test_typed_access_after_decode() {
    let data = Data::from_binary(&request().to_binary().unwrap()).unwrap();

    let logits = data.get_array("logits").unwrap();
    assert_eq!(logits.dtype(), DType::F32);
    assert_eq!(logits.to_vec::<f32>().unwrap(), vec![0.1, 0.9, 0.7, 0.3]);
    assert_eq!(data.get_image("image").unwrap().format(), PixelFormat::Rgb8);
    assert_eq!(data.get_data("meta").unwrap().get_int("frame").unwrap(), 1042);
    assert!(data.is_null("cursor").unwrap());

    match data.get_int("threshold") {
        Err(Error::TypeMismatch { expected, actual, .. }) => {
            assert_eq!((expected, actual), (ValueKind::Int, ValueKind::Float));
        }
        other => panic!("expected TypeMismatch, got {:?}", other),
    }
}

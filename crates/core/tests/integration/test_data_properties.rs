//! Property tests for the Data encodings over generated values of every kind

use inferhost_core::data::{DType, Data, Image, NdArray, PixelFormat, Value, ValueKind, ValueList};
use inferhost_core::Error;
use proptest::collection::{btree_map, vec};
use proptest::prelude::*;

fn key() -> impl Strategy<Value = String> {
    "[a-z_]{1,8}"
}

fn pixel_format() -> impl Strategy<Value = PixelFormat> {
    prop_oneof![
        Just(PixelFormat::Gray8),
        Just(PixelFormat::Rgb8),
        Just(PixelFormat::Rgba8),
        Just(PixelFormat::Bgr8),
    ]
}

fn image() -> impl Strategy<Value = Image> {
    (0u32..4, 0u32..4, pixel_format()).prop_flat_map(|(width, height, format)| {
        let len = (width * height) as usize * format.channels();
        vec(any::<u8>(), len)
            .prop_map(move |pixels| Image::new(width, height, format, pixels).unwrap())
    })
}

fn dtype() -> impl Strategy<Value = DType> {
    prop_oneof![
        Just(DType::F16),
        Just(DType::F32),
        Just(DType::F64),
        Just(DType::I32),
        Just(DType::I64),
        Just(DType::U8),
        Just(DType::Bool),
    ]
}

fn array() -> impl Strategy<Value = NdArray> {
    (dtype(), vec(0usize..4, 0..3)).prop_flat_map(|(dtype, shape)| {
        let len = shape.iter().product::<usize>() * dtype.size_bytes();
        let byte = if dtype == DType::Bool {
            (0u8..2).boxed()
        } else {
            any::<u8>().boxed()
        };
        vec(byte, len).prop_map(move |data| NdArray::new(shape.clone(), dtype, data).unwrap())
    })
}

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        any::<f64>().prop_map(Value::Float),
        any::<u64>().prop_map(|bits| Value::Float(f64::from_bits(bits))),
        "\\PC{0,12}".prop_map(Value::Str),
        vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
        image().prop_map(Value::Image),
        array().prop_map(Value::Array),
    ]
}

/// Keeps the elements sharing the first element's kind
fn homogeneous(items: Vec<Value>) -> ValueList {
    let kind = items.first().map(Value::kind);
    ValueList::new(items.into_iter().filter(|v| Some(v.kind()) == kind).collect()).unwrap()
}

fn value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(4, 48, 4, |inner| {
        prop_oneof![
            vec(inner.clone(), 0..4).prop_map(|items| Value::List(homogeneous(items))),
            btree_map(key(), inner, 0..4)
                .prop_map(|entries| Value::Data(entries.into_iter().collect())),
        ]
    })
}

fn data() -> impl Strategy<Value = Data> {
    btree_map(key(), value(), 0..6).prop_map(|entries| entries.into_iter().collect())
}

/// Whether the typed getter for `kind` accepts `key`
fn getter_accepts(data: &Data, key: &str, kind: ValueKind) -> Result<(), Error> {
    match kind {
        ValueKind::Null => data.is_null(key).map(|_| ()),
        ValueKind::Bool => data.get_bool(key).map(|_| ()),
        ValueKind::Int => data.get_int(key).map(|_| ()),
        ValueKind::Float => data.get_float(key).map(|_| ()),
        ValueKind::Str => data.get_str(key).map(|_| ()),
        ValueKind::Bytes => data.get_bytes(key).map(|_| ()),
        ValueKind::Image => data.get_image(key).map(|_| ()),
        ValueKind::Array => data.get_array(key).map(|_| ()),
        ValueKind::List => data.get_list(key).map(|_| ()),
        ValueKind::Data => data.get_data(key).map(|_| ()),
    }
}

const KINDS: [ValueKind; 9] = [
    ValueKind::Bool,
    ValueKind::Int,
    ValueKind::Float,
    ValueKind::Str,
    ValueKind::Bytes,
    ValueKind::Image,
    ValueKind::Array,
    ValueKind::List,
    ValueKind::Data,
];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn test_text_round_trip(data in data()) {
        let decoded = Data::from_text(&data.to_text().unwrap()).unwrap();
        prop_assert_eq!(decoded, data);
    }

    #[test]
    fn test_binary_round_trip(data in data()) {
        let decoded = Data::from_binary(&data.to_binary().unwrap()).unwrap();
        prop_assert_eq!(decoded, data);
    }

    #[test]
    fn test_encodings_agree(data in data()) {
        let via_text = Data::from_text(&data.to_text().unwrap()).unwrap();
        let via_binary = Data::from_binary(&data.to_binary().unwrap()).unwrap();
        prop_assert_eq!(via_text, via_binary);
    }

    #[test]
    fn test_float_bits_survive_text(bits in any::<u64>()) {
        let value = f64::from_bits(bits);
        prop_assume!(value.is_finite());
        let decoded = Data::from_text(&Data::single("x", value).to_text().unwrap()).unwrap();
        prop_assert_eq!(decoded.get_float("x").unwrap().to_bits(), bits);
    }

    #[test]
    fn test_getters_accept_only_the_stored_kind(data in data()) {
        for (key, value) in data.iter() {
            let stored = value.kind();
            prop_assert!(getter_accepts(&data, key, stored).is_ok());
            for kind in KINDS.into_iter().filter(|k| *k != stored) {
                let is_mismatch = matches!(
                    getter_accepts(&data, key, kind),
                    Err(Error::TypeMismatch { .. })
                );
                prop_assert!(is_mismatch, "{} read as {}", stored, kind);
            }
        }
    }
}

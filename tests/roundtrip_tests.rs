//! Round-trip coverage for every supported value kind, plus the exact
//! wire-size guarantees of the primitive payloads.

use num_bigint::BigInt;
use refcode::{ElemKind, Registry, Result, Value};

fn roundtrip(value: &Value) -> Value {
    let registry = Registry::new();
    let bytes = registry.serialize_value(value).expect("serialize");
    registry.deserialize_value(&bytes).expect("deserialize")
}

#[test]
fn primitives_roundtrip() {
    for value in [
        Value::Undefined,
        Value::Null,
        Value::Bool(true),
        Value::Bool(false),
        Value::Number(0.0),
        Value::Number(-1.5),
        Value::Number(f64::MAX),
        Value::str(""),
        Value::str("hello, world"),
        Value::str("héllo ✓"),
    ] {
        let decoded = roundtrip(&value);
        assert!(decoded.deep_eq(&value), "mismatch for {value:?}");
    }
}

#[test]
fn nan_roundtrips_as_nan() {
    let decoded = roundtrip(&Value::Number(f64::NAN));
    assert!(decoded.as_f64().expect("number").is_nan());
    assert!(decoded.deep_eq(&Value::Number(f64::NAN)));
}

#[test]
fn null_and_undefined_have_empty_payloads() -> Result<()> {
    let registry = Registry::new();
    // Only the 4-byte tag-hash envelope, zero payload bytes.
    assert_eq!(registry.serialize_value(&Value::Null)?.len(), 4);
    assert_eq!(registry.serialize_value(&Value::Undefined)?.len(), 4);
    Ok(())
}

#[test]
fn foobar_consumes_ten_payload_bytes() -> Result<()> {
    let registry = Registry::new();
    let bytes = registry.serialize_value(&Value::str("foobar"))?;
    // 4-byte envelope + 4-byte length prefix + 6 UTF-8 bytes.
    assert_eq!(bytes.len(), 4 + 4 + 6);
    Ok(())
}

#[test]
fn bigints_of_arbitrary_magnitude_roundtrip() {
    let cases = [
        BigInt::from(0),
        BigInt::from(1),
        BigInt::from(-1),
        BigInt::from(u64::MAX),
        BigInt::parse_bytes(b"123456789012345678901234567890123456789", 10).expect("parse"),
        BigInt::parse_bytes(b"-98765432109876543210987654321098765432109876", 10).expect("parse"),
    ];
    for big in cases {
        let decoded = roundtrip(&Value::BigInt(big.clone()));
        assert_eq!(decoded.as_bigint().expect("bigint"), &big);
    }
}

#[test]
fn byte_blobs_and_numeric_arrays_roundtrip() {
    let blob = Value::blob(vec![0, 1, 2, 255, 254]);
    let decoded = roundtrip(&blob);
    let bytes = decoded.as_bytes().expect("bytes");
    assert_eq!(bytes.kind, ElemKind::U8);
    assert_eq!(bytes.data, vec![0, 1, 2, 255, 254]);

    let mut data = Vec::new();
    for x in [1.0f64, -2.5, 1e300] {
        data.extend_from_slice(&x.to_le_bytes());
    }
    let array = Value::bytes(ElemKind::F64, data.clone());
    let decoded = roundtrip(&array);
    let bytes = decoded.as_bytes().expect("bytes");
    assert_eq!(bytes.kind, ElemKind::F64);
    assert_eq!(bytes.len_elems(), 3);
    assert_eq!(bytes.data, data);
}

#[test]
fn element_kind_zero_is_invalid() {
    assert!(ElemKind::from_wire(0).is_err());
    assert!(ElemKind::from_wire(11).is_err());
    assert_eq!(ElemKind::from_wire(10).expect("kind"), ElemKind::F64);
}

#[test]
fn empty_containers_roundtrip() {
    let decoded = roundtrip(&Value::array(Vec::new()));
    let items = decoded.as_array().expect("array");
    assert!(items.borrow().is_empty());

    let decoded = roundtrip(&Value::empty_object());
    let entries = decoded.as_object().expect("object");
    assert!(entries.borrow().is_empty());
}

#[test]
fn nested_structures_roundtrip() {
    let root = Value::object([
        ("name".to_string(), Value::str("deep")),
        (
            "items".to_string(),
            Value::array(vec![
                Value::from(1),
                Value::Null,
                Value::array(vec![Value::from(true), Value::str("inner")]),
                Value::object([("k".to_string(), Value::from(-7))]),
            ]),
        ),
        ("blob".to_string(), Value::blob(vec![9, 9, 9])),
    ]);
    let decoded = roundtrip(&root);
    assert!(decoded.deep_eq(&root));
    assert!(decoded.find_placeholder().is_none());
}

#[test]
fn object_key_order_is_preserved() {
    let root = Value::object([
        ("zeta".to_string(), Value::from(1)),
        ("alpha".to_string(), Value::from(2)),
        ("mid".to_string(), Value::from(3)),
    ]);
    let decoded = roundtrip(&root);
    let entries = decoded.as_object().expect("object");
    let keys: Vec<String> = entries.borrow().keys().cloned().collect();
    assert_eq!(keys, ["zeta", "alpha", "mid"]);
}

#[test]
fn truncated_input_is_rejected() -> Result<()> {
    let registry = Registry::new();
    let bytes = registry.serialize_value(&Value::object([(
        "a".to_string(),
        Value::str("payload"),
    )]))?;
    assert!(registry.deserialize_value(&bytes[..bytes.len() - 2]).is_err());
    Ok(())
}

#[test]
fn trailing_bytes_are_rejected() -> Result<()> {
    let registry = Registry::new();
    let mut bytes = registry.serialize_value(&Value::from(5))?;
    bytes.extend_from_slice(&[0, 0, 0]);
    assert!(registry.deserialize_value(&bytes).is_err());
    Ok(())
}

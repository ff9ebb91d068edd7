//! Shared-identity and cycle behavior of the reference-resolving codec.

use std::rc::Rc;

use refcode::{ByteWriter, RefcodeError, Registry, Result, Value};

fn roundtrip(value: &Value) -> Value {
    let registry = Registry::new();
    let bytes = registry.serialize_value(value).expect("serialize");
    registry.deserialize_value(&bytes).expect("deserialize")
}

fn get(obj: &Value, key: &str) -> Value {
    obj.as_object()
        .expect("object")
        .borrow()
        .get(key)
        .expect("key present")
        .clone()
}

#[test]
fn shared_substructure_keeps_one_identity() {
    let shared = Value::object([("x".to_string(), Value::from(1))]);
    let root = Value::object([
        ("a".to_string(), shared.clone()),
        (
            "b".to_string(),
            Value::object([("c".to_string(), shared.clone())]),
        ),
    ]);

    let decoded = roundtrip(&root);
    let a = get(&decoded, "a");
    let c = get(&get(&decoded, "b"), "c");

    // Same identity, not merely equal contents.
    assert!(Rc::ptr_eq(
        a.as_object().expect("object"),
        c.as_object().expect("object")
    ));
    assert!(a.deep_eq(&shared));
}

#[test]
fn two_object_cycle_roundtrips() {
    let a = Value::empty_object();
    let b = Value::object([("back".to_string(), a.clone())]);
    a.as_object()
        .expect("object")
        .borrow_mut()
        .insert("fwd".to_string(), b.clone());

    let decoded = roundtrip(&a);
    let fwd = get(&decoded, "fwd");
    let back = get(&fwd, "back");

    assert!(Rc::ptr_eq(
        decoded.as_object().expect("object"),
        back.as_object().expect("object")
    ));
    assert!(decoded.find_placeholder().is_none());
}

#[test]
fn self_referential_array_roundtrips() {
    let arr = Value::array(vec![Value::str("head")]);
    {
        let rc = arr.as_array().expect("array");
        let elem = arr.clone();
        rc.borrow_mut().push(elem);
    }

    let decoded = roundtrip(&arr);
    let rc = decoded.as_array().expect("array");
    assert_eq!(rc.borrow().len(), 2);
    assert_eq!(rc.borrow()[0].as_str(), Some("head"));
    let tail = rc.borrow()[1].clone();
    assert!(Rc::ptr_eq(rc, tail.as_array().expect("array")));
}

#[test]
fn sibling_heavy_graph_roundtrips() {
    // Many siblings go through the flat table, not the call stack.
    let items: Vec<Value> = (0..1000)
        .map(|i| Value::object([("i".to_string(), Value::from(i))]))
        .collect();
    let root = Value::array(items);
    let decoded = roundtrip(&root);
    assert!(decoded.deep_eq(&root));
    assert!(decoded.find_placeholder().is_none());
}

#[test]
fn deeply_nested_structure_roundtrips() {
    let mut value = Value::from(42);
    for _ in 0..200 {
        value = Value::array(vec![value]);
    }
    let decoded = roundtrip(&value);
    assert!(decoded.deep_eq(&value));
}

#[test]
fn symbol_valued_entries_are_silently_skipped() -> Result<()> {
    let registry = Registry::new();
    let root = Value::object([
        ("a".to_string(), Value::from(1)),
        ("sym".to_string(), Value::symbol("internal")),
        ("b".to_string(), Value::from(2)),
    ]);
    let decoded = registry.deserialize_value(&registry.serialize_value(&root)?)?;
    let entries = decoded.as_object().expect("object");
    let keys: Vec<String> = entries.borrow().keys().cloned().collect();
    assert_eq!(keys, ["a", "b"]);
    Ok(())
}

#[test]
fn symbols_outside_mapping_entries_are_unsupported() {
    let registry = Registry::new();
    let err = registry
        .serialize_value(&Value::symbol("lone"))
        .unwrap_err();
    assert!(matches!(err, RefcodeError::UnsupportedType(_)));

    // Array elements are not skipped; the classifier error propagates.
    let err = registry
        .serialize_value(&Value::array(vec![Value::symbol("inner")]))
        .unwrap_err();
    assert!(matches!(err, RefcodeError::UnsupportedType(_)));
}

#[test]
fn untagged_custom_values_are_rejected() {
    let registry = Registry::new();
    let err = registry
        .serialize_value(&Value::custom_untagged(Value::from(1)))
        .unwrap_err();
    assert!(matches!(err, RefcodeError::UntaggedCustomType(_)));
}

#[test]
fn dangling_reference_id_is_detected() {
    let registry = Registry::new();

    // Hand-craft a root object whose single entry points at a table id
    // that was never written.
    let mut w = ByteWriter::new();
    w.write_u32(registry.hash_for("object"));
    w.write_flags(&[true, false]).expect("flags"); // root, not array
    w.write_u32(1); // table entry count
    w.write_u32(0); // entry id 0
    w.write_u32(registry.hash_for("object"));
    w.write_flags(&[false, false]).expect("flags"); // nested object
    w.write_u32(1); // one entry
    w.write_str("a").expect("key");
    w.write_u32(registry.hash_for("reference"));
    w.write_u32(7); // no table entry 7 exists

    let err = registry.deserialize_value(&w.finish()).unwrap_err();
    assert_eq!(err, RefcodeError::DanglingReferenceId(7));
}

#[test]
fn bare_reference_outside_a_table_is_rejected() {
    let registry = Registry::new();
    let mut w = ByteWriter::new();
    w.write_u32(registry.hash_for("reference"));
    w.write_u32(3);
    assert!(registry.deserialize_value(&w.finish()).is_err());
}

#[test]
fn decoded_graphs_carry_no_placeholders() {
    let shared = Value::array(vec![Value::from(1)]);
    let root = Value::object([
        ("x".to_string(), shared.clone()),
        ("y".to_string(), shared.clone()),
        (
            "z".to_string(),
            Value::array(vec![shared, Value::empty_object()]),
        ),
    ]);
    let decoded = roundtrip(&root);
    assert!(decoded.find_placeholder().is_none());
}

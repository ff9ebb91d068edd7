//! Registration semantics, hash-index dispatch, and the protocol builder.

use refcode::{ClosureProtocol, RefcodeError, Registry, Result, Value};

#[test]
fn duplicate_tag_is_rejected_without_force() {
    let mut registry = Registry::new();
    registry
        .sub(
            "blip",
            |_, _, w, _| {
                w.write_byte(1);
                Ok(())
            },
            |_, _, r| {
                r.read_byte()?;
                Ok(Value::str("v1"))
            },
        )
        .expect("first registration");

    let err = registry
        .sub(
            "blip",
            |_, _, w, _| {
                w.write_byte(1);
                Ok(())
            },
            |_, _, _| Ok(Value::Null),
        )
        .map(|_| ())
        .unwrap_err();
    assert_eq!(err, RefcodeError::DuplicateTag("blip".to_string()));
}

#[test]
fn force_override_replaces_the_implementation() -> Result<()> {
    let mut registry = Registry::new();
    registry.sub(
        "blip",
        |_, _, w, _| {
            w.write_byte(1);
            Ok(())
        },
        |_, _, r| {
            r.read_byte()?;
            Ok(Value::str("v1"))
        },
    )?;

    registry.register(
        "blip",
        Box::new(ClosureProtocol::new(
            |_, _, w, _| {
                w.write_byte(2);
                Ok(())
            },
            |_, _, r| {
                r.read_byte()?;
                Ok(Value::str("v2"))
            },
        )),
        true,
    )?;

    let tagged = Value::tagged("blip", Value::Null);
    let bytes = registry.serialize_value(&tagged)?;
    let decoded = registry.deserialize_value(&bytes)?;
    assert_eq!(decoded.as_str(), Some("v2"));
    Ok(())
}

#[test]
fn hash_collisions_are_rejected_regardless_of_force() {
    // A constant hasher makes every pair of tags collide.
    let mut registry = Registry::with_hasher(|_| 42);
    registry
        .sub("one", |_, _, _, _| Ok(()), |_, _, _| Ok(Value::Null))
        .expect("first tag");

    let err = registry
        .sub("two", |_, _, _, _| Ok(()), |_, _, _| Ok(Value::Null))
        .map(|_| ())
        .unwrap_err();
    assert!(matches!(
        err,
        RefcodeError::HashCollision { hash: 42, .. }
    ));

    let err = registry
        .register(
            "two",
            Box::new(ClosureProtocol::new(
                |_, _, _, _| Ok(()),
                |_, _, _| Ok(Value::Null),
            )),
            true,
        )
        .unwrap_err();
    assert!(matches!(err, RefcodeError::HashCollision { .. }));
}

#[test]
fn degenerate_hasher_rejects_builtin_installation() {
    let mut registry = Registry::with_hasher(|_| 7);
    assert!(registry.install_defaults().is_err());
}

#[test]
fn unknown_tag_fails_dispatch() {
    let registry = Registry::with_hasher(refcode::default_tag_hash);
    let err = registry.serialize_value(&Value::Null).unwrap_err();
    assert_eq!(err, RefcodeError::UnknownTag("null".to_string()));

    let registry = Registry::new();
    let err = registry
        .serialize_value(&Value::tagged("unregistered", Value::Null))
        .unwrap_err();
    assert_eq!(err, RefcodeError::UnknownTag("unregistered".to_string()));
}

#[test]
fn unknown_tag_hash_indicates_registry_skew() -> Result<()> {
    let mut encoder = Registry::new();
    encoder.derive(
        "point",
        |value| match value {
            Value::Tagged(t) => Ok(t.state.borrow().clone()),
            other => Err(RefcodeError::Internal(format!(
                "expected tagged point, got {}",
                other.kind_name()
            ))),
        },
        |data| Ok(Value::tagged("point", data)),
    )?;

    let bytes = encoder.serialize_value(&Value::tagged(
        "point",
        Value::object([("x".to_string(), Value::from(1))]),
    ))?;

    // The decoding side never registered "point".
    let decoder = Registry::new();
    let err = decoder.deserialize_value(&bytes).unwrap_err();
    assert_eq!(err, RefcodeError::UnknownTagHash(encoder.hash_for("point")));
    Ok(())
}

#[test]
fn hash_index_is_consistent() {
    let registry = Registry::new();
    let hash = registry.hash_for("string");
    assert_eq!(registry.tag_for_hash(hash), Some("string"));
    assert!(registry.contains_tag("object"));
    assert!(!registry.contains_tag("missing"));
}

#[test]
fn derived_roundtrip_preserves_projection_and_enrichment() -> Result<()> {
    let mut registry = Registry::new();
    registry.derive(
        "point",
        |value| match value {
            Value::Tagged(t) => Ok(t.state.borrow().clone()),
            other => Err(RefcodeError::Internal(format!(
                "expected tagged point, got {}",
                other.kind_name()
            ))),
        },
        |data| {
            if let Some(entries) = data.as_object() {
                entries
                    .borrow_mut()
                    .insert("deserialized".to_string(), Value::Bool(true));
            }
            Ok(Value::tagged("point", data))
        },
    )?;

    let point = Value::tagged(
        "point",
        Value::object([
            ("x".to_string(), Value::from(3)),
            ("y".to_string(), Value::from(-4)),
        ]),
    );
    let decoded = registry.deserialize_value(&registry.serialize_value(&point)?)?;

    let state = match &decoded {
        Value::Tagged(t) => t.state.borrow().clone(),
        other => panic!("expected tagged value, got {}", other.kind_name()),
    };
    let entries = state.as_object().expect("object state");
    let entries = entries.borrow();
    assert_eq!(entries.get("x").and_then(Value::as_f64), Some(3.0));
    assert_eq!(entries.get("y").and_then(Value::as_f64), Some(-4.0));
    assert_eq!(
        entries.get("deserialized").and_then(Value::as_bool),
        Some(true)
    );
    Ok(())
}

#[test]
fn derived_projections_resolve_shared_references() -> Result<()> {
    let mut registry = Registry::new();
    registry.derive(
        "wrap",
        |value| match value {
            Value::Tagged(t) => Ok(t.state.borrow().clone()),
            other => Err(RefcodeError::Internal(format!(
                "expected tagged wrap, got {}",
                other.kind_name()
            ))),
        },
        |data| Ok(Value::tagged("wrap", data)),
    )?;

    let shared = Value::object([("n".to_string(), Value::from(9))]);
    let wrapped = Value::tagged(
        "wrap",
        Value::object([
            ("left".to_string(), shared.clone()),
            ("right".to_string(), shared),
        ]),
    );
    let decoded = registry.deserialize_value(&registry.serialize_value(&wrapped)?)?;

    let state = match &decoded {
        Value::Tagged(t) => t.state.borrow().clone(),
        other => panic!("expected tagged value, got {}", other.kind_name()),
    };
    let entries = state.as_object().expect("object state");
    let left = entries.borrow().get("left").expect("left").clone();
    let right = entries.borrow().get("right").expect("right").clone();
    assert!(std::rc::Rc::ptr_eq(
        left.as_object().expect("object"),
        right.as_object().expect("object")
    ));
    Ok(())
}

fn wrap_registry() -> Result<Registry> {
    let mut registry = Registry::new();
    registry.derive(
        "wrap",
        |value| match value {
            Value::Tagged(t) => Ok(t.state.borrow().clone()),
            other => Err(RefcodeError::Internal(format!(
                "expected tagged wrap, got {}",
                other.kind_name()
            ))),
        },
        |data| {
            if let Some(entries) = data.as_object() {
                entries
                    .borrow_mut()
                    .insert("deserialized".to_string(), Value::Bool(true));
            }
            Ok(Value::tagged("wrap", data))
        },
    )?;
    Ok(registry)
}

fn tagged_state(value: &Value) -> Value {
    match value {
        Value::Tagged(t) => t.state.borrow().clone(),
        other => panic!("expected tagged value, got {}", other.kind_name()),
    }
}

#[test]
fn derived_state_shared_with_the_graph_keeps_identity() -> Result<()> {
    // The same object reachable both directly and through a derived
    // value's projection must come back as one identity.
    let registry = wrap_registry()?;
    let shared = Value::object([("n".to_string(), Value::from(9))]);
    let root = Value::object([
        ("direct".to_string(), shared.clone()),
        ("t".to_string(), Value::tagged("wrap", shared)),
    ]);

    let decoded = registry.deserialize_value(&registry.serialize_value(&root)?)?;
    let entries = decoded.as_object().expect("object");
    let direct = entries.borrow().get("direct").expect("direct").clone();
    let state = tagged_state(&entries.borrow().get("t").expect("t").clone());
    assert!(std::rc::Rc::ptr_eq(
        direct.as_object().expect("object"),
        state.as_object().expect("object")
    ));
    // Rebuild still ran on the resolved projection.
    assert_eq!(
        state
            .as_object()
            .expect("object")
            .borrow()
            .get("deserialized")
            .and_then(Value::as_bool),
        Some(true)
    );
    Ok(())
}

#[test]
fn derived_state_identity_is_order_independent() -> Result<()> {
    // The derived value serializes before the direct occurrence here, so
    // its projection is the first to intern the shared object.
    let registry = wrap_registry()?;
    let shared = Value::object([("n".to_string(), Value::from(9))]);
    let root = Value::object([
        ("t".to_string(), Value::tagged("wrap", shared.clone())),
        ("direct".to_string(), shared),
    ]);

    let decoded = registry.deserialize_value(&registry.serialize_value(&root)?)?;
    let entries = decoded.as_object().expect("object");
    let direct = entries.borrow().get("direct").expect("direct").clone();
    let state = tagged_state(&entries.borrow().get("t").expect("t").clone());
    assert!(std::rc::Rc::ptr_eq(
        direct.as_object().expect("object"),
        state.as_object().expect("object")
    ));
    Ok(())
}

#[test]
fn nested_derived_values_still_rebuild() -> Result<()> {
    // A derived value nested in a larger graph defers its projection to
    // the reference table; rebuild must still apply its enrichment.
    let registry = wrap_registry()?;
    let root = Value::array(vec![Value::tagged(
        "wrap",
        Value::object([("x".to_string(), Value::from(3))]),
    )]);

    let decoded = registry.deserialize_value(&registry.serialize_value(&root)?)?;
    assert!(decoded.find_placeholder().is_none());
    let items = decoded.as_array().expect("array");
    let state = tagged_state(&items.borrow()[0]);
    let entries = state.as_object().expect("object state");
    let entries = entries.borrow();
    assert_eq!(entries.get("x").and_then(Value::as_f64), Some(3.0));
    assert_eq!(
        entries.get("deserialized").and_then(Value::as_bool),
        Some(true)
    );
    Ok(())
}

#[test]
fn builtin_tag_hashes_are_distinct_under_the_default_hasher() {
    use refcode::tags;
    let registry = Registry::new();
    let all = [
        tags::UNDEF,
        tags::NULL,
        tags::BOOL,
        tags::NUMBER,
        tags::BIGINT,
        tags::STRING,
        tags::BYTES,
        tags::ARRAY,
        tags::OBJECT,
        tags::REFERENCE,
    ];
    let hashes: std::collections::HashSet<u32> =
        all.iter().map(|tag| registry.hash_for(tag)).collect();
    assert_eq!(hashes.len(), all.len());
    for tag in all {
        assert!(registry.contains_tag(tag));
    }
}

#[test]
fn sub_registers_custom_byte_level_logic() -> Result<()> {
    let mut registry = Registry::new();
    registry.sub(
        "byte",
        |_, _, w, value| match value {
            Value::Tagged(t) => {
                let n = t.state.borrow().as_f64().unwrap_or(0.0);
                w.write_byte(n as u8);
                Ok(())
            }
            other => Err(RefcodeError::Internal(format!(
                "expected tagged byte, got {}",
                other.kind_name()
            ))),
        },
        |_, _, r| {
            let n = r.read_byte()?;
            Ok(Value::tagged("byte", Value::from(i32::from(n))))
        },
    )?;

    let value = Value::tagged("byte", Value::from(200));
    let bytes = registry.serialize_value(&value)?;
    // Envelope plus exactly one payload byte.
    assert_eq!(bytes.len(), 5);
    let decoded = registry.deserialize_value(&bytes)?;
    assert!(decoded.deep_eq(&value));
    Ok(())
}

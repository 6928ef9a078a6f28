//! Edge case tests for tether-engine
//!
//! These tests cover boundary conditions and unusual inputs.

use serde_json::json;
use tether_engine::{
    AttributeMap, Decoder, Encoder, Error, Number, ObjectRef, Operation, RelationOp, SeenSet,
    SingleInstanceStore, StateStore, Value,
};

fn encode(value: &Value) -> serde_json::Value {
    Encoder::detached()
        .encode(value, false, false, &SeenSet::new())
        .unwrap()
}

// ============================================================================
// String Edge Cases
// ============================================================================

#[test]
fn unicode_field_names_and_values() {
    let mut store = SingleInstanceStore::new();
    let obj = ObjectRef::with_id("Item", "i1");

    let names = [
        "日本語テスト",
        "Привет мир",
        "مرحبا بالعالم",
        "🎉🚀💯",
        "Hello\nWorld\tTab",
        "Null\0Test",
    ];
    for (i, name) in names.iter().enumerate() {
        store.set_pending_op(&obj, name, Some(Operation::Set(Value::from(i as i64))));
    }

    let attrs = store.estimate_attributes(&obj).unwrap();
    for (i, name) in names.iter().enumerate() {
        assert_eq!(attrs.get(*name), Some(&Value::from(i as i64)), "failed for {}", name);
    }

    let value = Value::from("🎉 \"quoted\" \\ back");
    let json = encode(&value);
    assert_eq!(Decoder::new().decode(&json).unwrap(), value);
}

#[test]
fn empty_string_is_a_value() {
    let op = Operation::Set(Value::from(""));
    assert_eq!(op.apply_to(None).unwrap(), Some(Value::from("")));
    assert!(matches!(
        Operation::Increment(Number::Int(1)).apply_to(Some(&Value::from(""))),
        Err(Error::IncorrectType(_))
    ));
}

// ============================================================================
// Numeric Edge Cases
// ============================================================================

#[test]
fn integer_overflow_widens_to_float() {
    let merged = Operation::Increment(Number::Int(1))
        .merge_with(Some(&Operation::Increment(Number::Int(i64::MAX))))
        .unwrap();
    assert!(matches!(merged, Operation::Increment(Number::Float(_))));

    let applied = Operation::Increment(Number::Int(i64::MIN))
        .apply_to(Some(&Value::from(-1)))
        .unwrap();
    assert!(matches!(applied, Some(Value::Number(Number::Float(_)))));
}

#[test]
fn mixed_increments() {
    let applied = Operation::Increment(Number::Float(0.5))
        .apply_to(Some(&Value::from(2)))
        .unwrap();
    assert_eq!(applied, Some(Value::Number(Number::Float(2.5))));

    assert_eq!(Number::Int(i64::MIN).negate(), Number::Float(9.223372036854776e18));
}

#[test]
fn null_base_acts_like_absent() {
    assert_eq!(
        Operation::Increment(Number::Int(4)).apply_to(Some(&Value::Null)).unwrap(),
        Some(Value::from(4))
    );
    assert_eq!(
        Operation::Remove(vec![Value::from("a")])
            .apply_to(Some(&Value::Null))
            .unwrap(),
        Some(Value::Array(vec![]))
    );
}

// ============================================================================
// List Edge Cases
// ============================================================================

#[test]
fn remove_on_absent_field_gives_empty_list() {
    assert_eq!(
        Operation::Remove(vec![Value::from(1)]).apply_to(None).unwrap(),
        Some(Value::Array(vec![]))
    );
}

#[test]
fn remove_drops_every_occurrence() {
    let base = Value::Array(vec![Value::from(1), Value::from(2), Value::from(1)]);
    assert_eq!(
        Operation::Remove(vec![Value::from(1)])
            .apply_to(Some(&base))
            .unwrap(),
        Some(Value::Array(vec![Value::from(2)]))
    );
}

#[test]
fn add_unique_compares_pointers_by_identity() {
    let a = ObjectRef::with_id("Item", "i1");
    let same_server_object = ObjectRef::with_id("Item", "i1");
    let unsaved = ObjectRef::new("Item");
    let base = Value::Array(vec![Value::Pointer(a)]);

    let result = Operation::AddUnique(vec![
        Value::Pointer(same_server_object),
        Value::Pointer(unsaved.clone()),
        Value::Pointer(unsaved),
    ])
    .apply_to(Some(&base))
    .unwrap();

    let Some(Value::Array(items)) = result else {
        panic!("expected an array");
    };
    assert_eq!(items.len(), 2);
}

#[test]
fn list_op_on_scalar_is_incorrect_type() {
    for op in [
        Operation::Add(vec![Value::from(1)]),
        Operation::AddUnique(vec![Value::from(1)]),
        Operation::Remove(vec![Value::from(1)]),
    ] {
        assert!(matches!(
            op.apply_to(Some(&Value::from(true))),
            Err(Error::IncorrectType(_))
        ));
    }
}

// ============================================================================
// Relation Edge Cases
// ============================================================================

#[test]
fn relation_without_context_cannot_materialize() {
    let op = Operation::Relation(
        RelationOp::new(&[ObjectRef::with_id("User", "u1")], &[]).unwrap(),
    );
    assert!(matches!(op.apply_to(None), Err(Error::InvalidOperation(_))));

    let owner = ObjectRef::new("Team");
    let Some(Value::Relation(handle)) = op.apply_to_field(None, &owner, "members").unwrap() else {
        panic!("expected a relation handle");
    };
    assert_eq!(handle.target_class.as_deref(), Some("User"));
}

#[test]
fn empty_relation_op_is_a_noop() {
    let op = Operation::Relation(RelationOp::new(&[], &[]).unwrap());
    assert!(op.is_noop());
    assert_eq!(op.to_wire(&Encoder::detached()).unwrap(), json!({}));
}

#[test]
fn relation_on_scalar_is_incorrect_type() {
    let op = Operation::Relation(
        RelationOp::new(&[ObjectRef::with_id("User", "u1")], &[]).unwrap(),
    );
    assert!(matches!(
        op.apply_to(Some(&Value::from(3))),
        Err(Error::IncorrectType(_))
    ));
}

// ============================================================================
// Encoding Edge Cases
// ============================================================================

#[test]
fn deeply_nested_values() {
    let mut value = Value::from("leaf");
    for depth in 0..50 {
        let mut map = AttributeMap::new();
        map.insert(format!("level{}", depth), value);
        value = Value::Array(vec![Value::Object(map)]);
    }

    let json = encode(&value);
    assert_eq!(Decoder::new().decode(&json).unwrap(), value);
}

#[test]
fn cyclic_objects_terminate_as_pointers() {
    let mut store = SingleInstanceStore::new();
    let a = ObjectRef::with_id("Node", "a");
    let b = ObjectRef::with_id("Node", "b");
    store.commit_server_changes(
        &a,
        [("next".to_string(), Some(Value::Pointer(b.clone())))].into(),
    );
    store.commit_server_changes(
        &b,
        [("next".to_string(), Some(Value::Pointer(a.clone())))].into(),
    );

    let json = Encoder::with_store(&store)
        .encode(&Value::Pointer(a), false, false, &SeenSet::new())
        .unwrap();
    assert_eq!(
        json,
        json!({
            "__type": "Object",
            "className": "Node",
            "objectId": "a",
            "next": {
                "__type": "Object",
                "className": "Node",
                "objectId": "b",
                "next": {"__type": "Pointer", "className": "Node", "objectId": "a"},
            },
        })
    );
}

#[test]
fn sub_millisecond_dates_are_truncated() {
    let json = json!({"__type": "Date", "iso": "2024-02-01T12:30:00.123456Z"});
    let value = Decoder::new().decode(&json).unwrap();
    assert_eq!(
        encode(&value),
        json!({"__type": "Date", "iso": "2024-02-01T12:30:00.123Z"})
    );
}

#[test]
fn operation_in_value_position_is_rejected() {
    assert!(matches!(
        Decoder::new().decode(&json!({"__op": "Delete"})),
        Err(Error::InvalidWireValue(_))
    ));
    assert!(matches!(
        Decoder::new().decode_operation(&json!({"__op": "Frobnicate"})),
        Err(Error::InvalidWireValue(_))
    ));
}

// ============================================================================
// Generation Edge Cases
// ============================================================================

#[test]
fn many_generations() {
    let mut store = SingleInstanceStore::new();
    let obj = ObjectRef::with_id("Counter", "c1");

    for _ in 0..100 {
        store.set_pending_op(&obj, "n", Some(Operation::Increment(Number::Int(1))));
        store.push_pending_state(&obj);
    }
    assert_eq!(store.get_pending_ops(&obj).len(), 101);
    assert_eq!(
        store.estimate_attribute(&obj, "n").unwrap(),
        Some(Value::from(100))
    );

    while store.get_pending_ops(&obj).len() > 1 {
        store.merge_first_pending_state(&obj).unwrap();
    }
    assert_eq!(
        store.get_pending_ops(&obj)[0].get("n"),
        Some(&Operation::Increment(Number::Int(100)))
    );
}

#[test]
fn pop_on_fresh_state() {
    let mut store = SingleInstanceStore::new();
    let obj = ObjectRef::new("Item");
    assert!(store.pop_pending_state(&obj).is_empty());
    assert_eq!(store.get_pending_ops(&obj).len(), 1);
}

//! Merge algebra tests for tether-engine
//!
//! The merge table for every pairing of operations, plus property tests for
//! the laws the save cycle relies on.

use proptest::prelude::*;
use tether_engine::state::{
    estimate_attribute, merge_first_pending_state, pop_pending_state, push_pending_state,
    set_pending_op,
};
use tether_engine::{
    AttributeMap, Error, Generation, Number, ObjectRef, Operation, RelationHandle, RelationOp,
    Value,
};

fn strings(items: &[&str]) -> Vec<Value> {
    items.iter().map(|s| Value::from(*s)).collect()
}

fn users(ids: &[&str]) -> Vec<ObjectRef> {
    ids.iter().map(|id| ObjectRef::with_id("User", *id)).collect()
}

fn relation(adds: &[&str], removes: &[&str]) -> Operation {
    Operation::Relation(RelationOp::new(&users(adds), &users(removes)).unwrap())
}

// ============================================================================
// Merge Table
// ============================================================================

#[test]
fn merge_with_nothing_is_identity() {
    let ops = [
        Operation::Set(Value::from(1)),
        Operation::Delete,
        Operation::Increment(Number::Int(2)),
        Operation::Add(strings(&["a"])),
        Operation::AddUnique(strings(&["a"])),
        Operation::Remove(strings(&["a"])),
        relation(&["u1"], &[]),
    ];
    for op in ops {
        assert_eq!(op.merge_with(None).unwrap(), op);
    }
}

#[test]
fn set_and_delete_replace_anything() {
    let previous = [
        Operation::Increment(Number::Int(2)),
        Operation::Add(strings(&["a"])),
        relation(&["u1"], &[]),
    ];
    for prev in &previous {
        assert_eq!(
            Operation::Set(Value::from("x")).merge_with(Some(prev)).unwrap(),
            Operation::Set(Value::from("x"))
        );
        assert_eq!(Operation::Delete.merge_with(Some(prev)).unwrap(), Operation::Delete);
    }
}

#[test]
fn increment_merges() {
    let inc = Operation::Increment(Number::Int(3));
    assert_eq!(
        inc.merge_with(Some(&Operation::Set(Value::from(10)))).unwrap(),
        Operation::Set(Value::from(13))
    );
    assert_eq!(
        inc.merge_with(Some(&Operation::Delete)).unwrap(),
        Operation::Set(Value::from(3))
    );
    assert_eq!(
        inc.merge_with(Some(&Operation::Increment(Number::Float(0.5))))
            .unwrap(),
        Operation::Increment(Number::Float(3.5))
    );
    assert!(matches!(
        inc.merge_with(Some(&Operation::Add(strings(&["a"])))),
        Err(Error::InvalidOperation(_))
    ));
    assert!(matches!(
        inc.merge_with(Some(&Operation::Set(Value::from("ten")))),
        Err(Error::IncorrectType(_))
    ));
}

#[test]
fn add_merges() {
    let add = Operation::Add(strings(&["b"]));
    assert_eq!(
        add.merge_with(Some(&Operation::Set(Value::Array(strings(&["a"])))))
            .unwrap(),
        Operation::Set(Value::Array(strings(&["a", "b"])))
    );
    assert_eq!(
        add.merge_with(Some(&Operation::Add(strings(&["a", "b"]))))
            .unwrap(),
        Operation::Add(strings(&["a", "b", "b"]))
    );
    assert!(matches!(
        add.merge_with(Some(&Operation::Remove(strings(&["b"])))),
        Err(Error::InvalidOperation(_))
    ));
}

#[test]
fn add_unique_merges() {
    let add = Operation::AddUnique(strings(&["b", "c"]));
    assert_eq!(
        add.merge_with(Some(&Operation::AddUnique(strings(&["a", "b"]))))
            .unwrap(),
        Operation::AddUnique(strings(&["a", "b", "c"]))
    );
    assert_eq!(
        add.merge_with(Some(&Operation::Delete)).unwrap(),
        Operation::Set(Value::Array(strings(&["b", "c"])))
    );
    assert!(matches!(
        add.merge_with(Some(&Operation::Add(strings(&["a"])))),
        Err(Error::InvalidOperation(_))
    ));
}

#[test]
fn remove_merges() {
    let remove = Operation::Remove(strings(&["b"]));
    assert_eq!(
        remove
            .merge_with(Some(&Operation::Set(Value::Array(strings(&["a", "b"])))))
            .unwrap(),
        Operation::Set(Value::Array(strings(&["a"])))
    );
    assert_eq!(
        remove.merge_with(Some(&Operation::Delete)).unwrap(),
        Operation::Delete
    );
    assert_eq!(
        remove
            .merge_with(Some(&Operation::Remove(strings(&["a", "b"]))))
            .unwrap(),
        Operation::Remove(strings(&["a", "b"]))
    );
    assert!(matches!(
        remove.merge_with(Some(&Operation::AddUnique(strings(&["a"])))),
        Err(Error::InvalidOperation(_))
    ));
}

#[test]
fn relation_merges() {
    let merged = relation(&["u2"], &[])
        .merge_with(Some(&relation(&["u1"], &["u3"])))
        .unwrap();
    let Operation::Relation(op) = merged else {
        panic!("expected a relation op");
    };
    assert_eq!(op.target_class(), Some("User"));
    assert_eq!(op.relations_to_add().len(), 2);
    assert!(op.relations_to_remove().contains("u3"));

    assert!(matches!(
        relation(&["u1"], &[]).merge_with(Some(&Operation::Delete)),
        Err(Error::InvalidOperation(_))
    ));
    assert!(matches!(
        relation(&["u1"], &[]).merge_with(Some(&Operation::Increment(Number::Int(1)))),
        Err(Error::InvalidOperation(_))
    ));

    let handle = RelationHandle::new(ObjectRef::with_id("Team", "t1"), "members");
    assert!(matches!(
        relation(&["u1"], &[]).merge_with(Some(&Operation::Set(Value::Relation(handle)))),
        Err(Error::InvalidOperation(_))
    ));
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn delete_then_add_becomes_set() {
    let merged = Operation::Add(strings(&["x"]))
        .merge_with(Some(&Operation::Delete))
        .unwrap();
    assert_eq!(merged, Operation::Set(Value::Array(strings(&["x"]))));
}

#[test]
fn relation_class_mismatch_is_rejected() {
    let foo = Operation::Relation(RelationOp::new(&[ObjectRef::with_id("Foo", "a")], &[]).unwrap());
    let bar = Operation::Relation(RelationOp::new(&[ObjectRef::with_id("Bar", "b")], &[]).unwrap());
    assert!(matches!(
        foo.merge_with(Some(&bar)),
        Err(Error::InvalidOperation(_))
    ));
}

#[test]
fn relation_add_then_remove_cancels() {
    let merged = relation(&[], &["x"])
        .merge_with(Some(&relation(&["x", "y"], &[])))
        .unwrap();
    let Operation::Relation(op) = merged else {
        panic!("expected a relation op");
    };
    assert!(!op.relations_to_add().contains("x"));
    assert!(!op.relations_to_remove().contains("x"));
    assert!(op.relations_to_add().contains("y"));
}

#[test]
fn failed_save_merge_back_matches_concurrent_outcome() {
    let owner = ObjectRef::with_id("Game", "g1");
    let mut server = AttributeMap::new();
    server.insert("score".into(), Value::from(10));

    let mut pending = vec![Generation::new()];
    set_pending_op(&mut pending, "score", Some(Operation::Increment(Number::Int(5))));
    push_pending_state(&mut pending);
    set_pending_op(&mut pending, "score", Some(Operation::Increment(Number::Int(3))));
    let before = estimate_attribute(&server, &pending, &owner, "score").unwrap();

    merge_first_pending_state(&mut pending).unwrap();

    assert_eq!(pending.len(), 1);
    assert_eq!(
        pending[0].get("score"),
        Some(&Operation::Increment(Number::Int(8)))
    );
    let after = estimate_attribute(&server, &pending, &owner, "score").unwrap();
    assert_eq!(before, Some(Value::from(18)));
    assert_eq!(after, before);
}

// ============================================================================
// Properties
// ============================================================================

#[derive(Debug, Clone)]
enum GenerationStep {
    Set(String, i64),
    Push,
    Pop,
    Merge,
}

fn arb_step() -> impl Strategy<Value = GenerationStep> {
    prop_oneof![
        ("[a-c]", any::<i64>()).prop_map(|(attr, v)| GenerationStep::Set(attr, v)),
        Just(GenerationStep::Push),
        Just(GenerationStep::Pop),
        Just(GenerationStep::Merge),
    ]
}

proptest! {
    #[test]
    fn prop_later_set_wins(a in any::<i64>(), b in any::<i64>()) {
        let merged = Operation::Set(Value::from(b))
            .merge_with(Some(&Operation::Set(Value::from(a))))
            .unwrap();
        prop_assert_eq!(merged, Operation::Set(Value::from(b)));
    }

    #[test]
    fn prop_increments_add_up(
        x in -1_000_000i64..1_000_000,
        a in -1_000_000i64..1_000_000,
        b in -1_000_000i64..1_000_000,
    ) {
        let merged = Operation::Increment(Number::Int(b))
            .merge_with(Some(&Operation::Increment(Number::Int(a))))
            .unwrap();
        prop_assert_eq!(&merged, &Operation::Increment(Number::Int(a + b)));

        let applied = merged.apply_to(Some(&Value::from(x))).unwrap();
        prop_assert_eq!(applied, Some(Value::from(x + a + b)));
    }

    #[test]
    fn prop_add_unique_keeps_one_copy(
        first in prop::collection::vec("[a-e]", 0..6),
        second in prop::collection::vec("[a-e]", 0..6),
    ) {
        let to_values = |items: &[String]| -> Vec<Value> {
            items.iter().map(|s| Value::from(s.as_str())).collect()
        };
        let merged = Operation::AddUnique(to_values(&second))
            .merge_with(Some(&Operation::AddUnique(to_values(&first))))
            .unwrap();

        let Some(Value::Array(list)) = merged.apply_to(None).unwrap() else {
            panic!("expected an array");
        };
        for item in first.iter().chain(second.iter()) {
            let count = list.iter().filter(|v| v.as_str() == Some(item.as_str())).count();
            prop_assert_eq!(count, 1);
        }
    }

    #[test]
    fn prop_relation_add_remove_cancels(
        ids in prop::collection::btree_set("[a-z]{1,4}", 1..6),
        others in prop::collection::btree_set("[0-9]{1,3}", 0..4),
    ) {
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        let others: Vec<&str> = others.iter().map(String::as_str).collect();
        let mut adds = ids.clone();
        adds.extend(others.iter().copied());

        let merged = relation(&[], &ids)
            .merge_with(Some(&relation(&adds, &[])))
            .unwrap();
        let Operation::Relation(op) = merged else {
            panic!("expected a relation op");
        };
        for id in &ids {
            prop_assert!(!op.relations_to_add().contains(*id));
            prop_assert!(!op.relations_to_remove().contains(*id));
        }
        for id in &others {
            prop_assert!(op.relations_to_add().contains(*id));
        }
    }

    #[test]
    fn prop_at_least_one_generation(steps in prop::collection::vec(arb_step(), 0..40)) {
        let mut pending = vec![Generation::new()];
        for step in steps {
            match step {
                GenerationStep::Set(attr, v) => {
                    set_pending_op(&mut pending, &attr, Some(Operation::Set(Value::from(v))))
                }
                GenerationStep::Push => push_pending_state(&mut pending),
                GenerationStep::Pop => {
                    pop_pending_state(&mut pending);
                }
                GenerationStep::Merge => merge_first_pending_state(&mut pending).unwrap(),
            }
            prop_assert!(!pending.is_empty());
        }
    }
}

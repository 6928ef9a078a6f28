//! Pending field operations.
//!
//! Changes to a field are expressed as operations, not direct mutations.
//! An operation knows how to apply itself to a base value, how to fold a
//! previous pending operation for the same field into itself, and how to
//! render itself in wire form.
//!
//! `None` as a base value (or result) means the field is absent.

use crate::encode::{Encoder, SeenSet};
use crate::error::{Error, Result};
use crate::value::{Number, ObjectRef, RelationHandle, Value};
use serde_json::json;
use std::collections::BTreeSet;

/// An add/remove change to a relation field.
///
/// All ids added or removed over the lifetime of the operation belong to
/// one target class.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelationOp {
    target_class: Option<String>,
    relations_to_add: BTreeSet<String>,
    relations_to_remove: BTreeSet<String>,
}

impl RelationOp {
    /// Build a relation operation from saved objects.
    pub fn new(adds: &[ObjectRef], removes: &[ObjectRef]) -> Result<Self> {
        let mut op = RelationOp::default();
        for obj in adds {
            let id = op.member_id(obj)?;
            op.relations_to_add.insert(id);
        }
        for obj in removes {
            let id = op.member_id(obj)?;
            op.relations_to_remove.insert(id);
        }
        Ok(op)
    }

    fn member_id(&mut self, obj: &ObjectRef) -> Result<String> {
        let id = obj.object_id().ok_or_else(|| Error::UnsavedObject {
            class_name: obj.class_name().to_string(),
        })?;
        match &self.target_class {
            Some(class) if class != obj.class_name() => {
                return Err(Error::invalid_operation(format!(
                    "tried to create a relation with 2 different object types: {} and {}",
                    class,
                    obj.class_name()
                )))
            }
            Some(_) => {}
            None => self.target_class = Some(obj.class_name().to_string()),
        }
        Ok(id.to_string())
    }

    pub fn target_class(&self) -> Option<&str> {
        self.target_class.as_deref()
    }

    pub fn relations_to_add(&self) -> &BTreeSet<String> {
        &self.relations_to_add
    }

    pub fn relations_to_remove(&self) -> &BTreeSet<String> {
        &self.relations_to_remove
    }

    pub fn is_empty(&self) -> bool {
        self.relations_to_add.is_empty() && self.relations_to_remove.is_empty()
    }

    fn merge_with(&self, previous: &RelationOp) -> Result<RelationOp> {
        let target_class = match (&previous.target_class, &self.target_class) {
            (Some(prev), Some(next)) if prev != next => {
                return Err(Error::invalid_operation(format!(
                    "related object must be of class {}, but {} was passed in",
                    prev, next
                )))
            }
            (prev, next) => next.clone().or_else(|| prev.clone()),
        };

        // An id added on one side and removed on the other cancels out.
        let mut adds = previous.relations_to_add.clone();
        let mut removes = previous.relations_to_remove.clone();
        for id in &self.relations_to_remove {
            if !adds.remove(id) {
                removes.insert(id.clone());
            }
        }
        for id in &self.relations_to_add {
            if !removes.remove(id) {
                adds.insert(id.clone());
            }
        }

        Ok(RelationOp {
            target_class,
            relations_to_add: adds,
            relations_to_remove: removes,
        })
    }

    fn apply(&self, base: Option<&Value>, owner: Option<(&ObjectRef, &str)>) -> Result<Value> {
        match base {
            None => {
                let (parent, key) = owner.ok_or_else(|| {
                    Error::invalid_operation(
                        "cannot apply a relation op without either a previous value, or an object and a key",
                    )
                })?;
                let mut handle = RelationHandle::new(parent.clone(), key);
                handle.target_class = self.target_class.clone();
                Ok(Value::Relation(handle))
            }
            Some(Value::Relation(handle)) => {
                let mut handle = handle.clone();
                if let Some(class) = &self.target_class {
                    match &handle.target_class {
                        Some(existing) if existing != class => {
                            return Err(Error::invalid_operation(format!(
                                "related object must be a {}, but a {} was passed in",
                                existing, class
                            )))
                        }
                        Some(_) => {}
                        None => handle.target_class = Some(class.clone()),
                    }
                }
                Ok(Value::Relation(handle))
            }
            Some(other) => Err(Error::incorrect_type(format!(
                "relation cannot be applied to a {} field",
                other.type_name()
            ))),
        }
    }

    fn pointers(&self, ids: &BTreeSet<String>) -> Vec<serde_json::Value> {
        ids.iter()
            .map(|id| {
                json!({
                    "__type": "Pointer",
                    "className": self.target_class,
                    "objectId": id,
                })
            })
            .collect()
    }

    fn to_wire(&self) -> serde_json::Value {
        let adds = (!self.relations_to_add.is_empty()).then(|| {
            json!({"__op": "AddRelation", "objects": self.pointers(&self.relations_to_add)})
        });
        let removes = (!self.relations_to_remove.is_empty()).then(|| {
            json!({"__op": "RemoveRelation", "objects": self.pointers(&self.relations_to_remove)})
        });
        match (adds, removes) {
            (Some(adds), Some(removes)) => json!({"__op": "Batch", "ops": [adds, removes]}),
            (Some(op), None) | (None, Some(op)) => op,
            (None, None) => json!({}),
        }
    }
}

/// A single pending mutation to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Set(Value),
    Delete,
    Increment(Number),
    Add(Vec<Value>),
    AddUnique(Vec<Value>),
    Remove(Vec<Value>),
    Relation(RelationOp),
}

impl Operation {
    /// Short name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Set(_) => "Set",
            Operation::Delete => "Delete",
            Operation::Increment(_) => "Increment",
            Operation::Add(_) => "Add",
            Operation::AddUnique(_) => "AddUnique",
            Operation::Remove(_) => "Remove",
            Operation::Relation(_) => "Relation",
        }
    }

    /// Whether sending this operation would change nothing.
    pub fn is_noop(&self) -> bool {
        matches!(self, Operation::Relation(op) if op.is_empty())
    }

    /// Apply to a base value. Relation operations need an owner when the
    /// base is absent; use [`Operation::apply_to_field`] for those.
    pub fn apply_to(&self, base: Option<&Value>) -> Result<Option<Value>> {
        self.apply(base, None)
    }

    /// Apply to the value of `key` on `owner`.
    pub fn apply_to_field(
        &self,
        base: Option<&Value>,
        owner: &ObjectRef,
        key: &str,
    ) -> Result<Option<Value>> {
        self.apply(base, Some((owner, key)))
    }

    fn apply(&self, base: Option<&Value>, owner: Option<(&ObjectRef, &str)>) -> Result<Option<Value>> {
        // A stored null behaves like an absent field for the numeric and
        // list operations.
        let present = base.filter(|v| !matches!(v, Value::Null));

        match self {
            Operation::Set(value) => Ok(Some(value.clone())),
            Operation::Delete => Ok(None),
            Operation::Increment(amount) => match present {
                None => Ok(Some(Value::Number(*amount))),
                Some(Value::Number(n)) => Ok(Some(Value::Number(n.add(*amount)))),
                Some(other) => Err(Error::incorrect_type(format!(
                    "cannot increment a non-numeric value ({})",
                    other.type_name()
                ))),
            },
            Operation::Add(items) => {
                let mut list = base_list(present, "add elements to")?;
                list.extend(items.iter().cloned());
                Ok(Some(Value::Array(list)))
            }
            Operation::AddUnique(items) => {
                let mut list = base_list(present, "add elements to")?;
                for item in items {
                    if !list_contains(&list, item) {
                        list.push(item.clone());
                    }
                }
                Ok(Some(Value::Array(list)))
            }
            Operation::Remove(items) => {
                let mut list = base_list(present, "remove elements from")?;
                for item in items {
                    list.retain(|existing| !matches_for_removal(existing, item));
                }
                Ok(Some(Value::Array(list)))
            }
            Operation::Relation(op) => op.apply(base, owner).map(Some),
        }
    }

    /// Produce the single operation equivalent to `previous` followed by
    /// `self`.
    pub fn merge_with(&self, previous: Option<&Operation>) -> Result<Operation> {
        let Some(previous) = previous else {
            return Ok(self.clone());
        };

        match (self, previous) {
            (Operation::Set(_), _) | (Operation::Delete, _) => Ok(self.clone()),

            (Operation::Increment(_), Operation::Set(prev)) => self.applied_as_set(prev),
            (Operation::Increment(amount), Operation::Delete) => {
                Ok(Operation::Set(Value::Number(*amount)))
            }
            (Operation::Increment(amount), Operation::Increment(prev)) => {
                Ok(Operation::Increment(prev.add(*amount)))
            }

            (Operation::Add(_), Operation::Set(prev)) => self.applied_as_set(prev),
            (Operation::Add(items), Operation::Delete) => {
                Ok(Operation::Set(Value::Array(items.clone())))
            }
            (Operation::Add(items), Operation::Add(prev)) => {
                let mut merged = prev.clone();
                merged.extend(items.iter().cloned());
                Ok(Operation::Add(merged))
            }

            (Operation::AddUnique(_), Operation::Set(prev)) => self.applied_as_set(prev),
            (Operation::AddUnique(items), Operation::Delete) => {
                Ok(Operation::Set(Value::Array(items.clone())))
            }
            (Operation::AddUnique(_), Operation::AddUnique(prev)) => {
                match self.apply_to(Some(&Value::Array(prev.clone())))? {
                    Some(Value::Array(merged)) => Ok(Operation::AddUnique(merged)),
                    _ => Err(self.cannot_merge(previous)),
                }
            }

            (Operation::Remove(_), Operation::Set(prev)) => self.applied_as_set(prev),
            (Operation::Remove(_), Operation::Delete) => Ok(Operation::Delete),
            (Operation::Remove(items), Operation::Remove(prev)) => {
                let mut merged = prev.clone();
                for item in items {
                    if !list_contains(&merged, item) {
                        merged.push(item.clone());
                    }
                }
                Ok(Operation::Remove(merged))
            }

            (Operation::Relation(_), Operation::Delete) => Err(Error::invalid_operation(
                "you cannot modify a relation after deleting it",
            )),
            (Operation::Relation(op), Operation::Relation(prev)) => {
                op.merge_with(prev).map(Operation::Relation)
            }

            _ => Err(self.cannot_merge(previous)),
        }
    }

    fn applied_as_set(&self, previous: &Value) -> Result<Operation> {
        let value = self.apply_to(Some(previous))?.unwrap_or(Value::Null);
        Ok(Operation::Set(value))
    }

    fn cannot_merge(&self, previous: &Operation) -> Error {
        Error::invalid_operation(format!(
            "cannot merge {} op with the previous {} op",
            self.name(),
            previous.name()
        ))
    }

    /// Render in wire form. Domain objects inside values are always sent as
    /// pointers.
    pub fn to_wire(&self, encoder: &Encoder<'_>) -> Result<serde_json::Value> {
        let seen = SeenSet::new();
        match self {
            Operation::Set(value) => encoder.encode(value, false, true, &seen),
            Operation::Delete => Ok(json!({"__op": "Delete"})),
            Operation::Increment(amount) => {
                Ok(json!({"__op": "Increment", "amount": amount.to_json()?}))
            }
            Operation::Add(items) | Operation::AddUnique(items) | Operation::Remove(items) => {
                let objects = items
                    .iter()
                    .map(|item| encoder.encode(item, false, true, &seen))
                    .collect::<Result<Vec<_>>>()?;
                Ok(json!({"__op": self.name(), "objects": objects}))
            }
            Operation::Relation(op) => Ok(op.to_wire()),
        }
    }
}

fn base_list(base: Option<&Value>, action: &str) -> Result<Vec<Value>> {
    match base {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(Error::incorrect_type(format!(
            "cannot {} a non-array value ({})",
            action,
            other.type_name()
        ))),
    }
}

/// Membership by equality, or by object identity for pointers.
fn list_contains(list: &[Value], item: &Value) -> bool {
    match item {
        Value::Pointer(obj) => list
            .iter()
            .any(|v| matches!(v, Value::Pointer(existing) if existing.same_object(obj))),
        _ => list.contains(item),
    }
}

fn matches_for_removal(existing: &Value, item: &Value) -> bool {
    if existing == item {
        return true;
    }
    match (existing, item) {
        (Value::Pointer(a), Value::Pointer(b)) => a.same_object(b),
        _ => false,
    }
}

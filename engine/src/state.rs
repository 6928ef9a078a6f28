//! Per-object state and the pure functions that mutate it.
//!
//! An object's state is its last known server data, a stack of pending
//! operation generations and a cache of serialized nested values. The
//! functions here operate on those fields directly; the state store wraps
//! them behind object identities.

use crate::encode::{Encoder, SeenSet};
use crate::error::Result;
use crate::operation::Operation;
use crate::task_queue::TaskQueue;
use crate::value::{AttributeMap, AttributeUpdates, ObjectRef, Value};
use std::collections::BTreeMap;

/// Field name -> pending operation, for one save epoch.
pub type Generation = BTreeMap<String, Operation>;

/// Field name -> serialized JSON of the value last committed from the server.
pub type ObjectCache = BTreeMap<String, String>;

/// Everything tracked for one object identity.
#[derive(Debug)]
pub struct ObjectState {
    /// Last known committed values.
    pub server_data: AttributeMap,
    /// Oldest generation first. Never empty.
    pub pending_ops: Vec<Generation>,
    pub object_cache: ObjectCache,
    pub tasks: TaskQueue,
    /// Whether the object is known to exist server-side.
    pub existed: bool,
}

impl ObjectState {
    pub fn new() -> Self {
        Self {
            server_data: AttributeMap::new(),
            pending_ops: vec![Generation::new()],
            object_cache: ObjectCache::new(),
            tasks: TaskQueue::new(),
            existed: false,
        }
    }

    pub fn with_server_data(server_data: AttributeMap) -> Self {
        Self {
            server_data,
            ..Self::new()
        }
    }

    /// Deep copy of the data fields. The copy gets its own task queue.
    pub fn duplicate(&self) -> Self {
        Self {
            server_data: self.server_data.clone(),
            pending_ops: self.pending_ops.clone(),
            object_cache: self.object_cache.clone(),
            tasks: TaskQueue::new(),
            existed: self.existed,
        }
    }
}

impl Default for ObjectState {
    fn default() -> Self {
        Self::new()
    }
}

/// Assign each attribute; `None` removes the key.
pub fn set_server_data(server_data: &mut AttributeMap, attributes: AttributeUpdates) {
    for (attr, value) in attributes {
        match value {
            Some(value) => {
                server_data.insert(attr, value);
            }
            None => {
                server_data.remove(&attr);
            }
        }
    }
}

/// Write `op` for `attr` into the newest generation, or clear it with `None`.
pub fn set_pending_op(pending_ops: &mut Vec<Generation>, attr: &str, op: Option<Operation>) {
    if pending_ops.is_empty() {
        pending_ops.push(Generation::new());
    }
    let last = pending_ops.len() - 1;
    let current = &mut pending_ops[last];
    match op {
        Some(op) => {
            current.insert(attr.to_string(), op);
        }
        None => {
            current.remove(attr);
        }
    }
}

/// Open a fresh generation for edits made while a save is in flight.
pub fn push_pending_state(pending_ops: &mut Vec<Generation>) {
    pending_ops.push(Generation::new());
}

/// Remove and return the oldest generation.
pub fn pop_pending_state(pending_ops: &mut Vec<Generation>) -> Generation {
    let first = if pending_ops.is_empty() {
        Generation::new()
    } else {
        pending_ops.remove(0)
    };
    if pending_ops.is_empty() {
        pending_ops.push(Generation::new());
    }
    first
}

/// Fold the oldest generation into the next one.
///
/// Where both generations hold an op for a field, the newer op absorbs the
/// older one. Either every field merges or nothing changes.
pub fn merge_first_pending_state(pending_ops: &mut Vec<Generation>) -> Result<()> {
    if pending_ops.len() < 2 {
        return Ok(());
    }

    let first = &pending_ops[0];
    let mut merged = pending_ops[1].clone();
    for (attr, op) in first {
        let combined = match merged.get(attr) {
            Some(next) => next.merge_with(Some(op))?,
            None => op.clone(),
        };
        merged.insert(attr.clone(), combined);
    }

    pending_ops.remove(0);
    pending_ops[0] = merged;
    Ok(())
}

/// The current value of `attr`: server data folded through every
/// generation, oldest to newest.
pub fn estimate_attribute(
    server_data: &AttributeMap,
    pending_ops: &[Generation],
    owner: &ObjectRef,
    attr: &str,
) -> Result<Option<Value>> {
    let mut value = server_data.get(attr).cloned();
    for generation in pending_ops {
        if let Some(op) = generation.get(attr) {
            value = op.apply_to_field(value.as_ref(), owner, attr)?;
        }
    }
    Ok(value)
}

/// Every current value, as [`estimate_attribute`] would compute them.
pub fn estimate_attributes(
    server_data: &AttributeMap,
    pending_ops: &[Generation],
    owner: &ObjectRef,
) -> Result<AttributeMap> {
    let mut data = server_data.clone();
    for generation in pending_ops {
        for (attr, op) in generation {
            match op.apply_to_field(data.get(attr), owner, attr)? {
                Some(value) => {
                    data.insert(attr.clone(), value);
                }
                None => {
                    data.remove(attr);
                }
            }
        }
    }
    Ok(data)
}

/// Write server-confirmed values and refresh the object cache for nested
/// arrays and objects.
pub fn commit_server_changes(
    server_data: &mut AttributeMap,
    object_cache: &mut ObjectCache,
    changes: AttributeUpdates,
) {
    for (attr, value) in changes {
        match value {
            Some(value) => {
                match value.is_object_shaped().then(|| cache_entry(&value)).flatten() {
                    Some(json) => {
                        object_cache.insert(attr.clone(), json);
                    }
                    None => {
                        object_cache.remove(&attr);
                    }
                }
                server_data.insert(attr, value);
            }
            None => {
                object_cache.remove(&attr);
                server_data.remove(&attr);
            }
        }
    }
}

/// Nested values in server data whose serialization no longer matches the
/// cache, i.e. that changed without going through a commit.
pub fn dirty_object_attributes(
    server_data: &AttributeMap,
    object_cache: &ObjectCache,
) -> Vec<String> {
    server_data
        .iter()
        .filter(|(_, value)| value.is_object_shaped())
        .filter(|(attr, value)| object_cache.get(*attr) != cache_entry(value).as_ref())
        .map(|(attr, _)| attr.clone())
        .collect()
}

fn cache_entry(value: &Value) -> Option<String> {
    Encoder::detached()
        .allow_local_ids()
        .encode(value, false, true, &SeenSet::new())
        .ok()
        .map(|json| json.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Number;

    fn inc(n: i64) -> Operation {
        Operation::Increment(Number::Int(n))
    }

    #[test]
    fn server_data_undefined_removes_key() {
        let mut data = AttributeMap::new();
        data.insert("a".into(), Value::from(1));
        data.insert("b".into(), Value::from(2));

        set_server_data(
            &mut data,
            [("a".to_string(), None), ("c".to_string(), Some(Value::from(3)))].into(),
        );

        assert!(!data.contains_key("a"));
        assert_eq!(data.get("b"), Some(&Value::from(2)));
        assert_eq!(data.get("c"), Some(&Value::from(3)));
    }

    #[test]
    fn pending_op_goes_to_newest_generation() {
        let mut pending = vec![Generation::new()];
        set_pending_op(&mut pending, "score", Some(inc(1)));
        push_pending_state(&mut pending);
        set_pending_op(&mut pending, "score", Some(inc(2)));

        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].get("score"), Some(&inc(1)));
        assert_eq!(pending[1].get("score"), Some(&inc(2)));

        set_pending_op(&mut pending, "score", None);
        assert!(pending[1].is_empty());
        assert_eq!(pending[0].get("score"), Some(&inc(1)));
    }

    #[test]
    fn pop_is_fifo_and_never_empties() {
        let mut pending = vec![Generation::new()];
        set_pending_op(&mut pending, "a", Some(inc(1)));
        push_pending_state(&mut pending);
        set_pending_op(&mut pending, "b", Some(inc(2)));

        let first = pop_pending_state(&mut pending);
        assert!(first.contains_key("a"));
        assert_eq!(pending.len(), 1);

        let second = pop_pending_state(&mut pending);
        assert!(second.contains_key("b"));
        assert_eq!(pending, vec![Generation::new()]);

        let mut empty: Vec<Generation> = Vec::new();
        assert!(pop_pending_state(&mut empty).is_empty());
        assert_eq!(empty.len(), 1);
    }

    #[test]
    fn merge_first_combines_generations() {
        let mut pending = vec![Generation::new()];
        set_pending_op(&mut pending, "score", Some(inc(5)));
        set_pending_op(&mut pending, "name", Some(Operation::Set(Value::from("a"))));
        push_pending_state(&mut pending);
        set_pending_op(&mut pending, "score", Some(inc(3)));

        merge_first_pending_state(&mut pending).unwrap();

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].get("score"), Some(&inc(8)));
        assert_eq!(
            pending[0].get("name"),
            Some(&Operation::Set(Value::from("a")))
        );
    }

    #[test]
    fn merge_first_is_atomic_on_failure() {
        let mut pending = vec![Generation::new()];
        set_pending_op(&mut pending, "tags", Some(Operation::AddUnique(vec![Value::from("x")])));
        set_pending_op(&mut pending, "score", Some(inc(1)));
        push_pending_state(&mut pending);
        set_pending_op(&mut pending, "tags", Some(Operation::Add(vec![Value::from("y")])));

        let before = pending.clone();
        assert!(merge_first_pending_state(&mut pending).is_err());
        assert_eq!(pending, before);
    }

    #[test]
    fn merge_first_with_single_generation_is_noop() {
        let mut pending = vec![Generation::new()];
        set_pending_op(&mut pending, "a", Some(inc(1)));
        merge_first_pending_state(&mut pending).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].get("a"), Some(&inc(1)));
    }

    #[test]
    fn estimate_folds_oldest_to_newest() {
        let owner = ObjectRef::with_id("Game", "g1");
        let mut data = AttributeMap::new();
        data.insert("score".into(), Value::from(10));

        let mut pending = vec![Generation::new()];
        set_pending_op(&mut pending, "score", Some(Operation::Set(Value::from(1))));
        push_pending_state(&mut pending);
        set_pending_op(&mut pending, "score", Some(inc(4)));

        assert_eq!(
            estimate_attribute(&data, &pending, &owner, "score").unwrap(),
            Some(Value::from(5))
        );

        set_pending_op(&mut pending, "gone", Some(Operation::Delete));
        data.insert("gone".into(), Value::from(true));
        let all = estimate_attributes(&data, &pending, &owner).unwrap();
        assert_eq!(all.get("score"), Some(&Value::from(5)));
        assert!(!all.contains_key("gone"));
    }

    #[test]
    fn commit_caches_nested_values_only() {
        let mut data = AttributeMap::new();
        let mut cache = ObjectCache::new();
        commit_server_changes(
            &mut data,
            &mut cache,
            [
                ("tags".to_string(), Some(Value::Array(vec![Value::from("a")]))),
                ("score".to_string(), Some(Value::from(3))),
            ]
            .into(),
        );

        assert_eq!(cache.get("tags").map(String::as_str), Some(r#"["a"]"#));
        assert!(!cache.contains_key("score"));
        assert!(dirty_object_attributes(&data, &cache).is_empty());

        data.insert("tags".into(), Value::Array(vec![Value::from("b")]));
        assert_eq!(dirty_object_attributes(&data, &cache), vec!["tags".to_string()]);

        commit_server_changes(&mut data, &mut cache, [("tags".to_string(), None)].into());
        assert!(!data.contains_key("tags"));
        assert!(cache.is_empty());
    }
}

//! State stores: the owners of every [`ObjectState`].
//!
//! Two interchangeable implementations exist:
//!
//! - [`SingleInstanceStore`] keys state by `(className, id)`, so every
//!   in-memory reference to the same server object shares one state.
//! - [`InstanceStore`] keys state by the in-memory instance, so two
//!   references never see each other's uncommitted edits.
//!
//! Implementations supply lookup, creation, removal and id migration; every
//! mutation is a provided method of [`StateStore`] built on the pure
//! functions in [`crate::state`].
//!
//! Neither store releases state on its own. Callers must call
//! [`StateStore::remove_state`] (or `DataObject::dispose`) for objects they
//! are done with.

use crate::error::Result;
use crate::operation::Operation;
use crate::state::{self, Generation, ObjectCache, ObjectState};
use crate::task_queue::TaskQueue;
use crate::value::{AttributeMap, AttributeUpdates, InstanceId, ObjectRef, Value};
use std::collections::HashMap;
use tracing::trace;

/// Storage of object states keyed by object identity.
pub trait StateStore: Send {
    /// Look up state without creating it.
    fn get_state(&self, obj: &ObjectRef) -> Option<&ObjectState>;

    fn get_state_mut(&mut self, obj: &ObjectRef) -> Option<&mut ObjectState>;

    /// Return the existing state, or install `initial` (or an empty state).
    fn initialize_state(&mut self, obj: &ObjectRef, initial: Option<ObjectState>)
        -> &mut ObjectState;

    fn remove_state(&mut self, obj: &ObjectRef) -> Option<ObjectState>;

    /// Drop every state.
    fn clear_all_state(&mut self);

    /// Record that `obj` received `object_id` from the server, moving its
    /// state to the new identity where the store keys on ids.
    fn migrate_id(&mut self, obj: &ObjectRef, object_id: &str);

    /// The server id for `obj`, including ids assigned after `obj` was
    /// copied.
    fn resolve_object_id(&self, obj: &ObjectRef) -> Option<String>;

    /// Copy server data, pending operations and cache from `source` onto
    /// `dest`, replacing whatever `dest` had.
    fn duplicate_state(&mut self, source: &ObjectRef, dest: &ObjectRef) {
        let copy = self
            .get_state(source)
            .map(ObjectState::duplicate)
            .unwrap_or_default();
        let target = self.initialize_state(dest, None);
        target.server_data = copy.server_data;
        target.pending_ops = copy.pending_ops;
        target.object_cache = copy.object_cache;
        target.existed = copy.existed;
        trace!(
            class_name = %source.class_name(),
            source = %source.local_id(),
            dest = %dest.local_id(),
            "duplicated object state"
        );
    }

    fn get_server_data(&self, obj: &ObjectRef) -> AttributeMap {
        self.get_state(obj)
            .map(|s| s.server_data.clone())
            .unwrap_or_default()
    }

    fn set_server_data(&mut self, obj: &ObjectRef, attributes: AttributeUpdates) {
        let state = self.initialize_state(obj, None);
        state::set_server_data(&mut state.server_data, attributes);
    }

    fn get_pending_ops(&self, obj: &ObjectRef) -> Vec<Generation> {
        self.get_state(obj)
            .map(|s| s.pending_ops.clone())
            .unwrap_or_else(|| vec![Generation::new()])
    }

    fn set_pending_op(&mut self, obj: &ObjectRef, attr: &str, op: Option<Operation>) {
        let state = self.initialize_state(obj, None);
        state::set_pending_op(&mut state.pending_ops, attr, op);
    }

    fn push_pending_state(&mut self, obj: &ObjectRef) {
        let state = self.initialize_state(obj, None);
        state::push_pending_state(&mut state.pending_ops);
    }

    fn pop_pending_state(&mut self, obj: &ObjectRef) -> Generation {
        let state = self.initialize_state(obj, None);
        state::pop_pending_state(&mut state.pending_ops)
    }

    fn merge_first_pending_state(&mut self, obj: &ObjectRef) -> Result<()> {
        let state = self.initialize_state(obj, None);
        state::merge_first_pending_state(&mut state.pending_ops)
    }

    fn get_object_cache(&self, obj: &ObjectRef) -> ObjectCache {
        self.get_state(obj)
            .map(|s| s.object_cache.clone())
            .unwrap_or_default()
    }

    fn estimate_attribute(&self, obj: &ObjectRef, attr: &str) -> Result<Option<Value>> {
        match self.get_state(obj) {
            Some(s) => state::estimate_attribute(&s.server_data, &s.pending_ops, obj, attr),
            None => Ok(None),
        }
    }

    fn estimate_attributes(&self, obj: &ObjectRef) -> Result<AttributeMap> {
        match self.get_state(obj) {
            Some(s) => state::estimate_attributes(&s.server_data, &s.pending_ops, obj),
            None => Ok(AttributeMap::new()),
        }
    }

    fn commit_server_changes(&mut self, obj: &ObjectRef, changes: AttributeUpdates) {
        let state = self.initialize_state(obj, None);
        state::commit_server_changes(&mut state.server_data, &mut state.object_cache, changes);
    }

    fn dirty_object_attributes(&self, obj: &ObjectRef) -> Vec<String> {
        self.get_state(obj)
            .map(|s| state::dirty_object_attributes(&s.server_data, &s.object_cache))
            .unwrap_or_default()
    }

    /// Whether `obj` has pending operations or locally changed nested values.
    fn is_dirty(&self, obj: &ObjectRef) -> bool {
        self.get_state(obj).is_some_and(|s| {
            s.pending_ops.iter().any(|g| !g.is_empty())
                || !state::dirty_object_attributes(&s.server_data, &s.object_cache).is_empty()
        })
    }

    fn existed(&self, obj: &ObjectRef) -> bool {
        self.get_state(obj).is_some_and(|s| s.existed)
    }

    fn set_existed(&mut self, obj: &ObjectRef, existed: bool) {
        self.initialize_state(obj, None).existed = existed;
    }

    /// The task queue serializing async work on `obj`.
    fn task_queue(&mut self, obj: &ObjectRef) -> TaskQueue {
        self.initialize_state(obj, None).tasks.clone()
    }
}

/// State keyed by `(className, id)`; references to one server object share
/// a single state.
#[derive(Debug, Default)]
pub struct SingleInstanceStore {
    states: HashMap<String, HashMap<String, ObjectState>>,
    /// `(className, localId)` -> server id, for objects created locally.
    migrated: HashMap<(String, String), String>,
}

impl SingleInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(&self, obj: &ObjectRef) -> String {
        self.resolve_object_id(obj)
            .unwrap_or_else(|| obj.local_id().to_string())
    }

    /// Number of tracked states.
    pub fn len(&self) -> usize {
        self.states.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StateStore for SingleInstanceStore {
    fn get_state(&self, obj: &ObjectRef) -> Option<&ObjectState> {
        self.states.get(obj.class_name())?.get(&self.key(obj))
    }

    fn get_state_mut(&mut self, obj: &ObjectRef) -> Option<&mut ObjectState> {
        let key = self.key(obj);
        self.states.get_mut(obj.class_name())?.get_mut(&key)
    }

    fn initialize_state(
        &mut self,
        obj: &ObjectRef,
        initial: Option<ObjectState>,
    ) -> &mut ObjectState {
        let key = self.key(obj);
        self.states
            .entry(obj.class_name().to_string())
            .or_default()
            .entry(key)
            .or_insert_with(|| {
                trace!(class_name = %obj.class_name(), "initialized object state");
                initial.unwrap_or_default()
            })
    }

    fn remove_state(&mut self, obj: &ObjectRef) -> Option<ObjectState> {
        let key = self.key(obj);
        let class_states = self.states.get_mut(obj.class_name())?;
        let removed = class_states.remove(&key);
        if class_states.is_empty() {
            self.states.remove(obj.class_name());
        }
        if removed.is_some() {
            trace!(class_name = %obj.class_name(), key = %key, "removed object state");
        }
        removed
    }

    fn clear_all_state(&mut self) {
        self.states.clear();
        self.migrated.clear();
        trace!("cleared all object state");
    }

    fn migrate_id(&mut self, obj: &ObjectRef, object_id: &str) {
        if self.resolve_object_id(obj).as_deref() == Some(object_id) {
            return;
        }
        // The task queue moves along with the data.
        let state = self.remove_state(obj);
        self.migrated.insert(
            (obj.class_name().to_string(), obj.local_id().to_string()),
            object_id.to_string(),
        );
        if let Some(state) = state {
            let dest = obj.with_object_id(object_id);
            *self.initialize_state(&dest, None) = state;
        }
        trace!(class_name = %obj.class_name(), %object_id, "migrated object id");
    }

    fn resolve_object_id(&self, obj: &ObjectRef) -> Option<String> {
        obj.object_id().map(str::to_string).or_else(|| {
            self.migrated
                .get(&(obj.class_name().to_string(), obj.local_id().to_string()))
                .cloned()
        })
    }
}

/// State keyed by in-memory instance. Distinct instances never share state,
/// even when they refer to the same server object.
#[derive(Debug, Default)]
pub struct InstanceStore {
    states: HashMap<InstanceId, ObjectState>,
    /// localId -> server id, for objects created locally.
    migrated: HashMap<String, String>,
}

impl InstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl StateStore for InstanceStore {
    fn get_state(&self, obj: &ObjectRef) -> Option<&ObjectState> {
        self.states.get(&obj.instance())
    }

    fn get_state_mut(&mut self, obj: &ObjectRef) -> Option<&mut ObjectState> {
        self.states.get_mut(&obj.instance())
    }

    fn initialize_state(
        &mut self,
        obj: &ObjectRef,
        initial: Option<ObjectState>,
    ) -> &mut ObjectState {
        self.states.entry(obj.instance()).or_insert_with(|| {
            trace!(
                class_name = %obj.class_name(),
                instance = obj.instance().get(),
                "initialized object state"
            );
            initial.unwrap_or_default()
        })
    }

    fn remove_state(&mut self, obj: &ObjectRef) -> Option<ObjectState> {
        let removed = self.states.remove(&obj.instance());
        if removed.is_some() {
            trace!(
                class_name = %obj.class_name(),
                instance = obj.instance().get(),
                "removed object state"
            );
        }
        removed
    }

    fn clear_all_state(&mut self) {
        self.states.clear();
        self.migrated.clear();
        trace!("cleared all object state");
    }

    fn migrate_id(&mut self, obj: &ObjectRef, object_id: &str) {
        self.migrated
            .insert(obj.local_id().to_string(), object_id.to_string());
    }

    fn resolve_object_id(&self, obj: &ObjectRef) -> Option<String> {
        obj.object_id()
            .map(str::to_string)
            .or_else(|| self.migrated.get(obj.local_id()).cloned())
    }
}

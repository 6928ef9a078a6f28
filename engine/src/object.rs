//! The object facade: field mutators and the save/fetch/destroy cycle.
//!
//! A [`DataObject`] is a handle; all of its data lives in the client's state
//! store. Mutators merge a new operation into the newest pending generation.
//! Network work goes through the object's task queue so save, fetch and
//! destroy on one object run strictly in submission order.
//!
//! A save sends the oldest generation and opens a fresh one for edits made
//! while the request is in flight. On success the sent generation is
//! retired and the response committed as server data; on failure it is
//! folded back into the newer generation so a later save retries both.

use crate::client::Client;
use crate::decode::Decoder;
use crate::encode::{Encoder, SeenSet};
use crate::error::{Error, Result};
use crate::operation::{Operation, RelationOp};
use crate::state::{self, Generation};
use crate::store::StateStore;
use crate::transport::Method;
use crate::value::{AttributeMap, AttributeUpdates, Number, ObjectRef, RelationHandle, Value};
use parking_lot::RwLock;
use serde_json::Map;
use std::sync::Arc;
use tracing::{debug, warn};

/// Fields maintained by the server.
const READ_ONLY_FIELDS: [&str; 3] = ["objectId", "createdAt", "updatedAt"];

/// A handle to one domain object.
///
/// Clones share the same reference, so an id assigned by a save is visible
/// through every clone.
#[derive(Clone)]
pub struct DataObject {
    client: Client,
    reference: Arc<RwLock<ObjectRef>>,
}

impl DataObject {
    pub(crate) fn new(client: Client, obj: ObjectRef) -> Self {
        Self {
            client,
            reference: Arc::new(RwLock::new(obj)),
        }
    }

    /// The identity this handle keys into the state store with.
    pub fn to_ref(&self) -> ObjectRef {
        self.reference.read().clone()
    }

    pub fn class_name(&self) -> String {
        self.reference.read().class_name().to_string()
    }

    /// The server id, once known.
    pub fn id(&self) -> Option<String> {
        let obj = self.to_ref();
        self.client.store().resolve_object_id(&obj)
    }

    /// Current value of `attr`: server data with every pending op applied.
    pub fn get(&self, attr: &str) -> Result<Option<Value>> {
        let obj = self.to_ref();
        self.client.store().estimate_attribute(&obj, attr)
    }

    /// Current values of every field.
    pub fn attributes(&self) -> Result<AttributeMap> {
        let obj = self.to_ref();
        self.client.store().estimate_attributes(&obj)
    }

    pub fn set(&self, attr: &str, value: impl Into<Value>) -> Result<()> {
        self.apply_op(attr, Operation::Set(value.into()))
    }

    /// Remove `attr` from the object.
    pub fn unset(&self, attr: &str) -> Result<()> {
        self.apply_op(attr, Operation::Delete)
    }

    pub fn increment(&self, attr: &str, amount: impl Into<Number>) -> Result<()> {
        self.apply_op(attr, Operation::Increment(amount.into()))
    }

    pub fn decrement(&self, attr: &str, amount: impl Into<Number>) -> Result<()> {
        self.apply_op(attr, Operation::Increment(amount.into().negate()))
    }

    /// Append `item` to the list in `attr`.
    pub fn add(&self, attr: &str, item: impl Into<Value>) -> Result<()> {
        self.add_all(attr, vec![item.into()])
    }

    pub fn add_all(&self, attr: &str, items: Vec<Value>) -> Result<()> {
        self.apply_op(attr, Operation::Add(items))
    }

    /// Append `item` unless the list already contains it.
    pub fn add_unique(&self, attr: &str, item: impl Into<Value>) -> Result<()> {
        self.add_all_unique(attr, vec![item.into()])
    }

    pub fn add_all_unique(&self, attr: &str, items: Vec<Value>) -> Result<()> {
        self.apply_op(attr, Operation::AddUnique(items))
    }

    /// Remove every occurrence of `item` from the list in `attr`.
    pub fn remove(&self, attr: &str, item: impl Into<Value>) -> Result<()> {
        self.remove_all(attr, vec![item.into()])
    }

    pub fn remove_all(&self, attr: &str, items: Vec<Value>) -> Result<()> {
        self.apply_op(attr, Operation::Remove(items))
    }

    /// Add saved objects to the relation in `attr`.
    pub fn relation_add(&self, attr: &str, objects: &[&DataObject]) -> Result<()> {
        let members = self.resolve_members(objects);
        self.apply_op(attr, Operation::Relation(RelationOp::new(&members, &[])?))
    }

    /// Remove saved objects from the relation in `attr`.
    pub fn relation_remove(&self, attr: &str, objects: &[&DataObject]) -> Result<()> {
        let members = self.resolve_members(objects);
        self.apply_op(attr, Operation::Relation(RelationOp::new(&[], &members)?))
    }

    /// The relation handle for `attr`, bound to this object.
    pub fn relation(&self, attr: &str) -> Result<RelationHandle> {
        let obj = self.to_ref();
        match self.get(attr)? {
            None => Ok(RelationHandle::new(obj, attr)),
            Some(Value::Relation(handle)) => Ok(RelationHandle {
                parent: Some(obj),
                key: Some(attr.to_string()),
                target_class: handle.target_class,
            }),
            Some(other) => Err(Error::incorrect_type(format!(
                "{} is a {}, not a relation",
                attr,
                other.type_name()
            ))),
        }
    }

    fn resolve_members(&self, objects: &[&DataObject]) -> Vec<ObjectRef> {
        let store = self.client.store();
        objects
            .iter()
            .map(|object| {
                let member = object.to_ref();
                match store.resolve_object_id(&member) {
                    Some(id) if member.object_id().is_none() => member.with_object_id(id),
                    _ => member,
                }
            })
            .collect()
    }

    fn apply_op(&self, attr: &str, op: Operation) -> Result<()> {
        if READ_ONLY_FIELDS.contains(&attr) {
            return Err(Error::invalid_operation(format!(
                "{} is maintained by the server and cannot be modified",
                attr
            )));
        }

        let obj = self.to_ref();
        let mut store = self.client.store();

        let current = store.estimate_attribute(&obj, attr)?;
        op.apply_to_field(current.as_ref(), &obj, attr)?;

        let pending = store.get_pending_ops(&obj);
        let previous = pending.last().and_then(|generation| generation.get(attr));
        let merged = op.merge_with(previous)?;
        store.set_pending_op(&obj, attr, Some(merged));
        Ok(())
    }

    /// Whether the object has unsaved changes.
    pub fn is_dirty(&self) -> bool {
        let obj = self.to_ref();
        self.client.store().is_dirty(&obj)
    }

    pub fn is_key_dirty(&self, attr: &str) -> bool {
        self.dirty_keys().iter().any(|key| key == attr)
    }

    /// Fields changed since the last save began, plus nested values changed
    /// in place.
    pub fn dirty_keys(&self) -> Vec<String> {
        let obj = self.to_ref();
        let store = self.client.store();
        let mut keys: Vec<String> = store
            .get_pending_ops(&obj)
            .last()
            .map(|generation| generation.keys().cloned().collect())
            .unwrap_or_default();
        for attr in store.dirty_object_attributes(&obj) {
            if !keys.contains(&attr) {
                keys.push(attr);
            }
        }
        keys
    }

    /// Discard unsaved edits to `keys`, or to every field.
    pub fn revert(&self, keys: Option<&[&str]>) {
        let obj = self.to_ref();
        let mut store = self.client.store();
        let attrs: Vec<String> = match keys {
            Some(keys) => keys.iter().map(|key| key.to_string()).collect(),
            None => store
                .get_pending_ops(&obj)
                .last()
                .map(|generation| generation.keys().cloned().collect())
                .unwrap_or_default(),
        };
        for attr in attrs {
            store.set_pending_op(&obj, &attr, None);
        }
    }

    /// Whether the object is known to exist on the server.
    pub fn existed(&self) -> bool {
        let obj = self.to_ref();
        self.client.store().existed(&obj)
    }

    /// Release this object's state from the store.
    pub fn dispose(&self) {
        let obj = self.to_ref();
        self.client.store().remove_state(&obj);
    }

    /// Send pending changes to the server.
    ///
    /// Creates the object when it has no id yet. Runs after every save,
    /// fetch or destroy already queued for this object.
    pub async fn save(&self) -> Result<()> {
        let obj = self.to_ref();
        let queue = self.client.store().task_queue(&obj);
        let this = self.clone();
        queue.enqueue(move || async move { this.save_now().await }).await
    }

    async fn save_now(&self) -> Result<()> {
        let obj = self.to_ref();
        let (method, path, body) = {
            let mut store = self.client.store();
            let body = save_body(&**store, &obj)?;
            let (method, path) = match store.resolve_object_id(&obj) {
                Some(id) => (Method::Put, format!("classes/{}/{}", obj.class_name(), id)),
                None => (Method::Post, format!("classes/{}", obj.class_name())),
            };
            store.push_pending_state(&obj);
            (method, path, body)
        };

        debug!(
            class_name = %obj.class_name(),
            %method,
            fields = body.len(),
            "saving object"
        );

        let result = match self
            .client
            .request(method, &path, Some(serde_json::Value::Object(body)))
            .await
        {
            Ok(response) => self.handle_save_response(response),
            Err(err) => Err(err.into()),
        };

        match result {
            Ok(()) => {
                debug!(class_name = %obj.class_name(), id = ?self.id(), "saved object");
                Ok(())
            }
            Err(err) => {
                // A create may have assigned an id before the response failed.
                let obj = self.to_ref();
                if let Err(merge_err) = self.client.store().merge_first_pending_state(&obj) {
                    warn!(
                        class_name = %obj.class_name(),
                        error = %merge_err,
                        "could not merge failed save back; keeping it as the oldest generation"
                    );
                }
                debug!(class_name = %obj.class_name(), error = %err, "save failed");
                Err(err)
            }
        }
    }

    fn handle_save_response(&self, response: serde_json::Value) -> Result<()> {
        let serde_json::Value::Object(response) = response else {
            return Err(Error::invalid_wire("save response must be an object"));
        };

        let mut obj = self.to_ref();
        let mut store = self.client.store();

        if let Some(id) = response.get("objectId").and_then(|id| id.as_str()) {
            if obj.object_id().is_none() {
                store.migrate_id(&obj, id);
                obj = obj.with_object_id(id);
                *self.reference.write() = obj.clone();
            }
        }

        // The sent generation is only retired once the whole response decodes.
        let pending = store.get_pending_ops(&obj);
        let (sent, later) = match pending.split_first() {
            Some((sent, later)) => (sent.clone(), later),
            None => (Generation::new(), &[][..]),
        };
        let estimate = state::estimate_attributes(&store.get_server_data(&obj), later, &obj)?;
        let changes = save_changes(&mut **store, &obj, &sent, &estimate, &response)?;

        store.pop_pending_state(&obj);
        store.commit_server_changes(&obj, changes);
        store.set_existed(&obj, true);
        Ok(())
    }

    /// Replace server data with the server's current copy. Pending edits
    /// are kept and still apply on top.
    pub async fn fetch(&self) -> Result<()> {
        let obj = self.to_ref();
        let queue = self.client.store().task_queue(&obj);
        let this = self.clone();
        queue.enqueue(move || async move { this.fetch_now().await }).await
    }

    async fn fetch_now(&self) -> Result<()> {
        let obj = self.to_ref();
        let id = self
            .client
            .store()
            .resolve_object_id(&obj)
            .ok_or_else(|| Error::MissingObjectId {
                class_name: obj.class_name().to_string(),
            })?;

        debug!(class_name = %obj.class_name(), %id, "fetching object");
        let path = format!("classes/{}/{}", obj.class_name(), id);
        let response = self.client.request(Method::Get, &path, None).await?;
        let serde_json::Value::Object(response) = response else {
            return Err(Error::invalid_wire("fetch response must be an object"));
        };

        let obj = self.to_ref();
        let mut store = self.client.store();
        let fields = Decoder::with_store(&mut **store).decode_server_fields(&response)?;

        let mut changes: AttributeUpdates = store
            .get_server_data(&obj)
            .into_keys()
            .map(|attr| (attr, None))
            .collect();
        changes.extend(fields.into_iter().map(|(attr, value)| (attr, Some(value))));
        store.commit_server_changes(&obj, changes);
        store.set_existed(&obj, true);
        Ok(())
    }

    /// Delete the object on the server and drop its state. Runs after any
    /// queued save, so a create still in flight is deleted once it lands.
    /// An object that has no id by then only drops its state.
    pub async fn destroy(&self) -> Result<()> {
        let obj = self.to_ref();
        let queue = self.client.store().task_queue(&obj);
        let this = self.clone();
        queue.enqueue(move || async move { this.destroy_now().await }).await
    }

    async fn destroy_now(&self) -> Result<()> {
        let obj = self.to_ref();
        let id = {
            let mut store = self.client.store();
            match store.resolve_object_id(&obj) {
                Some(id) => id,
                None => {
                    store.remove_state(&obj);
                    return Ok(());
                }
            }
        };

        debug!(class_name = %obj.class_name(), %id, "destroying object");
        let path = format!("classes/{}/{}", obj.class_name(), id);
        self.client.request(Method::Delete, &path, None).await?;
        self.client.store().remove_state(&obj);
        Ok(())
    }
}

impl std::fmt::Debug for DataObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataObject")
            .field("reference", &*self.reference.read())
            .finish()
    }
}

/// Wire body for a save: the oldest generation plus nested values that
/// changed in place.
fn save_body(store: &dyn StateStore, obj: &ObjectRef) -> Result<Map<String, serde_json::Value>> {
    let encoder = Encoder::with_store(store);
    let mut body = Map::new();

    let server_data = store.get_server_data(obj);
    for attr in store.dirty_object_attributes(obj) {
        if let Some(value) = server_data.get(&attr) {
            body.insert(attr, encoder.encode(value, false, true, &SeenSet::new())?);
        }
    }

    if let Some(oldest) = store.get_pending_ops(obj).first() {
        for (attr, op) in oldest {
            if op.is_noop() {
                continue;
            }
            body.insert(attr.clone(), op.to_wire(&encoder)?);
        }
    }
    Ok(body)
}

/// Server data updates implied by a successful save of `sent`.
fn save_changes(
    store: &mut dyn StateStore,
    obj: &ObjectRef,
    sent: &Generation,
    estimate: &AttributeMap,
    response: &Map<String, serde_json::Value>,
) -> Result<AttributeUpdates> {
    let mut changes = AttributeUpdates::new();

    for (attr, op) in sent {
        match op {
            Operation::Relation(_) => {
                changes.insert(attr.clone(), op.apply_to_field(None, obj, attr)?);
            }
            _ if !response.contains_key(attr) => {
                changes.insert(attr.clone(), op.apply_to(None)?);
            }
            _ => {}
        }
    }

    let mut decoder = Decoder::with_store(store);
    for (attr, raw) in response {
        let value = match (attr.as_str(), raw) {
            ("objectId", _) => continue,
            ("createdAt" | "updatedAt", serde_json::Value::String(_)) => {
                let mut single = Map::new();
                single.insert(attr.clone(), raw.clone());
                decoder.decode_server_fields(&single)?.remove(attr)
            }
            _ => match decoder.decode_operation(raw)? {
                Operation::Set(Value::Object(echo)) => match estimate.get(attr) {
                    Some(Value::Object(current)) => {
                        let mut merged = current.clone();
                        merged.extend(echo);
                        Some(Value::Object(merged))
                    }
                    _ => Some(Value::Object(echo)),
                },
                Operation::Set(value) => Some(value),
                Operation::Delete => None,
                other => {
                    return Err(Error::invalid_wire(format!(
                        "unexpected {} operation in save response",
                        other.name()
                    )))
                }
            },
        };
        changes.insert(attr.clone(), value);
    }

    if !changes.contains_key("updatedAt") {
        if let Some(Some(created)) = changes.get("createdAt").cloned() {
            changes.insert("updatedAt".into(), Some(created));
        }
    }
    Ok(changes)
}

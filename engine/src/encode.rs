//! Encoding of in-memory values into wire JSON.
//!
//! Domain objects are written as pointers unless the encoder can prove the
//! object is clean and has server data, in which case it is inlined once as
//! a full `Object` body. The seen set records objects already inlined on the
//! current branch so cycles terminate as pointers.

use crate::error::{Error, Result};
use crate::store::StateStore;
use crate::value::{AttributeMap, ObjectRef, Value};
use chrono::SecondsFormat;
use serde_json::{json, Map};
use std::collections::HashSet;

/// `"ClassName:id"` entries for objects already inlined on this branch.
pub type SeenSet = HashSet<String>;

/// Encodes values, optionally consulting a state store for nested objects.
#[derive(Clone, Copy)]
pub struct Encoder<'a> {
    store: Option<&'a dyn StateStore>,
    allow_local_ids: bool,
}

impl<'a> Encoder<'a> {
    /// An encoder with no store: every domain object becomes a pointer.
    pub fn detached() -> Self {
        Self {
            store: None,
            allow_local_ids: false,
        }
    }

    /// An encoder that resolves ids and inlines clean objects through `store`.
    pub fn with_store(store: &'a dyn StateStore) -> Self {
        Self {
            store: Some(store),
            allow_local_ids: false,
        }
    }

    /// Write unsaved objects as `{__type: "Pointer", className, _localId}`
    /// instead of failing.
    pub fn allow_local_ids(mut self) -> Self {
        self.allow_local_ids = true;
        self
    }

    /// Encode a value.
    ///
    /// - `disallow_objects`: fail on any domain object.
    /// - `force_pointers`: never inline domain objects.
    /// - `seen`: objects already inlined by an enclosing call.
    pub fn encode(
        &self,
        value: &Value,
        disallow_objects: bool,
        force_pointers: bool,
        seen: &SeenSet,
    ) -> Result<serde_json::Value> {
        match value {
            Value::Null => Ok(serde_json::Value::Null),
            Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
            Value::Number(n) => n.to_json(),
            Value::String(s) => Ok(serde_json::Value::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| self.encode(item, disallow_objects, force_pointers, seen))
                .collect::<Result<Vec<_>>>()
                .map(serde_json::Value::Array),
            Value::Object(map) => self
                .encode_map(map, disallow_objects, force_pointers, seen)
                .map(serde_json::Value::Object),
            Value::Date(date) => Ok(json!({
                "__type": "Date",
                "iso": date.to_rfc3339_opts(SecondsFormat::Millis, true),
            })),
            Value::GeoPoint(point) => Ok(json!({
                "__type": "GeoPoint",
                "latitude": point.latitude,
                "longitude": point.longitude,
            })),
            Value::Relation(handle) => Ok(json!({
                "__type": "Relation",
                "className": handle.target_class,
            })),
            Value::Pointer(obj) => {
                if disallow_objects {
                    return Err(Error::ObjectsNotAllowed);
                }
                self.encode_object(obj, force_pointers, seen)
            }
        }
    }

    /// Encode every entry of an attribute map.
    pub fn encode_map(
        &self,
        map: &AttributeMap,
        disallow_objects: bool,
        force_pointers: bool,
        seen: &SeenSet,
    ) -> Result<Map<String, serde_json::Value>> {
        map.iter()
            .map(|(key, value)| {
                self.encode(value, disallow_objects, force_pointers, seen)
                    .map(|json| (key.clone(), json))
            })
            .collect()
    }

    /// Encode a reference as a pointer.
    pub fn encode_pointer(&self, obj: &ObjectRef) -> Result<serde_json::Value> {
        match self.resolve_id(obj) {
            Some(id) => Ok(json!({
                "__type": "Pointer",
                "className": obj.class_name(),
                "objectId": id,
            })),
            None if self.allow_local_ids => Ok(json!({
                "__type": "Pointer",
                "className": obj.class_name(),
                "_localId": obj.local_id(),
            })),
            None => Err(Error::UnsavedObject {
                class_name: obj.class_name().to_string(),
            }),
        }
    }

    fn resolve_id(&self, obj: &ObjectRef) -> Option<String> {
        match self.store {
            Some(store) => store.resolve_object_id(obj),
            None => obj.object_id().map(str::to_string),
        }
    }

    fn encode_object(
        &self,
        obj: &ObjectRef,
        force_pointers: bool,
        seen: &SeenSet,
    ) -> Result<serde_json::Value> {
        let (Some(store), Some(id)) = (self.store, self.resolve_id(obj)) else {
            return self.encode_pointer(obj);
        };

        let seen_key = format!("{}:{}", obj.class_name(), id);
        let has_server_data = store
            .get_state(obj)
            .is_some_and(|state| !state.server_data.is_empty());
        if force_pointers || seen.contains(&seen_key) || !has_server_data || store.is_dirty(obj) {
            return self.encode_pointer(obj);
        }

        let mut branch = seen.clone();
        branch.insert(seen_key);

        let attributes = store.estimate_attributes(obj)?;
        let mut body = self.encode_map(&attributes, false, false, &branch)?;
        body.insert("__type".into(), json!("Object"));
        body.insert("className".into(), json!(obj.class_name()));
        body.insert("objectId".into(), json!(id));
        Ok(serde_json::Value::Object(body))
    }
}

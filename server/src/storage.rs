//! In-memory object storage.
//!
//! Objects are kept as engine values keyed by `(className, objectId)`.
//! Incoming wire operations are decoded and applied with the engine's own
//! operation algebra, so the server computes exactly what a client
//! estimates. Relation membership is tracked per `(className, objectId,
//! key)`.

use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use serde_json::{json, Map};
use std::collections::BTreeSet;
use tether_engine::{AttributeMap, Decoder, Encoder, ObjectRef, Operation, SeenSet, Value};

use crate::error::{AppError, Result};

type ObjectKey = (String, String);
type RelationKey = (String, String, String);

/// Fields owned by the server.
const RESERVED_FIELDS: [&str; 3] = ["objectId", "createdAt", "updatedAt"];

/// A stored object.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub fields: AttributeMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a create or update.
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub object_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Wire values for fields whose result the client cannot know: the
    /// results of Increment, Add, AddUnique and Remove.
    pub echo: Map<String, serde_json::Value>,
}

/// Relation membership changes produced while applying a body.
#[derive(Default)]
struct RelationChanges {
    adds: Vec<(RelationKey, String)>,
    removes: Vec<(RelationKey, String)>,
}

/// Thread-safe in-memory object store.
#[derive(Debug, Default)]
pub struct Storage {
    objects: DashMap<ObjectKey, StoredObject>,
    relations: DashMap<RelationKey, BTreeSet<String>>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Create an object from a save body.
    pub fn create(&self, class_name: &str, body: &Map<String, serde_json::Value>) -> Result<SaveOutcome> {
        let object_id = new_object_id();
        let mut fields = AttributeMap::new();
        let (echo, relations) = apply_body(class_name, &object_id, &mut fields, body)?;

        let now = Utc::now();
        self.objects.insert(
            (class_name.to_string(), object_id.clone()),
            StoredObject {
                fields,
                created_at: now,
                updated_at: now,
            },
        );
        self.apply_relation_changes(relations);

        Ok(SaveOutcome {
            object_id,
            created_at: now,
            updated_at: now,
            echo,
        })
    }

    /// Apply a save body to an existing object. Either every field applies
    /// or the object is left untouched.
    pub fn update(
        &self,
        class_name: &str,
        object_id: &str,
        body: &Map<String, serde_json::Value>,
    ) -> Result<SaveOutcome> {
        let key = (class_name.to_string(), object_id.to_string());
        let mut entry = self.objects.get_mut(&key).ok_or(AppError::NotFound)?;

        let mut fields = entry.fields.clone();
        let (echo, relations) = apply_body(class_name, object_id, &mut fields, body)?;

        entry.fields = fields;
        entry.updated_at = Utc::now();
        let outcome = SaveOutcome {
            object_id: object_id.to_string(),
            created_at: entry.created_at,
            updated_at: entry.updated_at,
            echo,
        };
        drop(entry);

        self.apply_relation_changes(relations);
        Ok(outcome)
    }

    /// Wire form of a stored object.
    pub fn get(&self, class_name: &str, object_id: &str) -> Result<Map<String, serde_json::Value>> {
        let key = (class_name.to_string(), object_id.to_string());
        let entry = self.objects.get(&key).ok_or(AppError::NotFound)?;

        let mut body = Encoder::detached().encode_map(&entry.fields, false, true, &SeenSet::new())?;
        body.insert("objectId".into(), json!(object_id));
        body.insert("createdAt".into(), json!(format_date(&entry.created_at)));
        body.insert("updatedAt".into(), json!(format_date(&entry.updated_at)));
        Ok(body)
    }

    /// Delete an object and its relation memberships.
    pub fn delete(&self, class_name: &str, object_id: &str) -> Result<()> {
        let key = (class_name.to_string(), object_id.to_string());
        self.objects.remove(&key).ok_or(AppError::NotFound)?;
        self.relations
            .retain(|(class, id, _), _| !(class == class_name && id == object_id));
        Ok(())
    }

    /// Ids currently related to `(class_name, object_id)` through `key`.
    pub fn relation_members(&self, class_name: &str, object_id: &str, key: &str) -> BTreeSet<String> {
        self.relations
            .get(&(class_name.to_string(), object_id.to_string(), key.to_string()))
            .map(|members| members.clone())
            .unwrap_or_default()
    }

    fn apply_relation_changes(&self, changes: RelationChanges) {
        for (key, id) in changes.adds {
            self.relations.entry(key).or_default().insert(id);
        }
        for (key, id) in changes.removes {
            if let Some(mut members) = self.relations.get_mut(&key) {
                members.remove(&id);
            }
        }
    }
}

/// Apply every field of `body` to `fields`.
fn apply_body(
    class_name: &str,
    object_id: &str,
    fields: &mut AttributeMap,
    body: &Map<String, serde_json::Value>,
) -> Result<(Map<String, serde_json::Value>, RelationChanges)> {
    let owner = ObjectRef::with_id(class_name, object_id);
    let encoder = Encoder::detached();
    let mut decoder = Decoder::new();
    let mut echo = Map::new();
    let mut relations = RelationChanges::default();

    for (key, raw) in body {
        if RESERVED_FIELDS.contains(&key.as_str()) || key.starts_with('_') || key.is_empty() {
            return Err(AppError::InvalidKey(key.clone()));
        }

        let op = decoder.decode_operation(raw)?;
        let result = op.apply_to_field(fields.get(key), &owner, key)?;

        match &op {
            Operation::Increment(_)
            | Operation::Add(_)
            | Operation::AddUnique(_)
            | Operation::Remove(_) => {
                let value = result.as_ref().unwrap_or(&Value::Null);
                echo.insert(key.clone(), encoder.encode(value, false, true, &SeenSet::new())?);
            }
            Operation::Relation(relation) => {
                let relation_key = (class_name.to_string(), object_id.to_string(), key.clone());
                for id in relation.relations_to_add() {
                    relations.adds.push((relation_key.clone(), id.clone()));
                }
                for id in relation.relations_to_remove() {
                    relations.removes.push((relation_key.clone(), id.clone()));
                }
            }
            Operation::Set(_) | Operation::Delete => {}
        }

        match result {
            Some(value) => {
                fields.insert(key.clone(), value);
            }
            None => {
                fields.remove(key);
            }
        }
    }

    Ok((echo, relations))
}

fn new_object_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..10].to_string()
}

/// Dates go over the wire with millisecond precision.
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

//! Decoding of wire JSON into values and operations.

use crate::error::{Error, Result};
use crate::operation::{Operation, RelationOp};
use crate::store::StateStore;
use crate::value::{AttributeMap, GeoPoint, Number, ObjectRef, RelationHandle, Value};
use chrono::{DateTime, Utc};
use serde_json::Map;

/// Decodes wire JSON. With a store attached, full nested objects have their
/// fields committed as server data for the decoded reference.
#[derive(Default)]
pub struct Decoder<'a> {
    store: Option<&'a mut dyn StateStore>,
}

impl<'a> Decoder<'a> {
    pub fn new() -> Self {
        Self { store: None }
    }

    pub fn with_store(store: &'a mut dyn StateStore) -> Self {
        Self { store: Some(store) }
    }

    /// Decode a value.
    pub fn decode(&mut self, json: &serde_json::Value) -> Result<Value> {
        match json {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) => Number::from_json(n)
                .map(Value::Number)
                .ok_or_else(|| Error::invalid_wire(format!("unrepresentable number {}", n))),
            serde_json::Value::String(s) => Ok(Value::String(s.clone())),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| self.decode(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            serde_json::Value::Object(map) => self.decode_object(map),
        }
    }

    /// Decode the fields of a server object. `objectId` is skipped and
    /// `createdAt`/`updatedAt` strings become dates.
    pub fn decode_server_fields(&mut self, map: &Map<String, serde_json::Value>) -> Result<AttributeMap> {
        let mut fields = AttributeMap::new();
        for (key, raw) in map {
            let value = match (key.as_str(), raw) {
                ("objectId", _) => continue,
                ("createdAt" | "updatedAt", serde_json::Value::String(iso)) => {
                    Value::Date(parse_date(iso)?)
                }
                _ => self.decode(raw)?,
            };
            fields.insert(key.clone(), value);
        }
        Ok(fields)
    }

    fn decode_object(&mut self, map: &Map<String, serde_json::Value>) -> Result<Value> {
        if map.contains_key("__op") {
            return Err(Error::invalid_wire("unexpected operation in value position"));
        }

        let Some(type_name) = map.get("__type").and_then(|t| t.as_str()) else {
            let mut object = AttributeMap::new();
            for (key, raw) in map {
                object.insert(key.clone(), self.decode(raw)?);
            }
            return Ok(Value::Object(object));
        };

        match type_name {
            "Date" => {
                let iso = string_field(map, "iso")?;
                Ok(Value::Date(parse_date(iso)?))
            }
            "GeoPoint" => Ok(Value::GeoPoint(GeoPoint::new(
                float_field(map, "latitude")?,
                float_field(map, "longitude")?,
            ))),
            "Pointer" => Ok(Value::Pointer(pointer_ref(map)?)),
            "Object" => {
                let obj = pointer_ref(map)?;
                let body: Map<String, serde_json::Value> = map
                    .iter()
                    .filter(|(key, _)| !matches!(key.as_str(), "__type" | "className"))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                let fields = self.decode_server_fields(&body)?;
                if let Some(store) = self.store.as_deref_mut() {
                    store.commit_server_changes(
                        &obj,
                        fields.into_iter().map(|(k, v)| (k, Some(v))).collect(),
                    );
                    store.set_existed(&obj, true);
                }
                Ok(Value::Pointer(obj))
            }
            "Relation" => Ok(Value::Relation(RelationHandle::detached(
                map.get("className")
                    .and_then(|c| c.as_str())
                    .map(str::to_string),
            ))),
            other => Err(Error::invalid_wire(format!("unknown __type {}", other))),
        }
    }

    /// Decode a field update: an `__op` body, or a plain value meaning Set.
    pub fn decode_operation(&mut self, json: &serde_json::Value) -> Result<Operation> {
        let Some(op_name) = json.get("__op").and_then(|op| op.as_str()) else {
            return Ok(Operation::Set(self.decode(json)?));
        };

        match op_name {
            "Delete" => Ok(Operation::Delete),
            "Increment" => {
                let amount = match json.get("amount") {
                    Some(serde_json::Value::Number(n)) => Number::from_json(n),
                    _ => None,
                }
                .ok_or_else(|| Error::invalid_wire("Increment needs a numeric amount"))?;
                Ok(Operation::Increment(amount))
            }
            "Add" => Ok(Operation::Add(self.decode_objects(json)?)),
            "AddUnique" => Ok(Operation::AddUnique(self.decode_objects(json)?)),
            "Remove" => Ok(Operation::Remove(self.decode_objects(json)?)),
            "AddRelation" | "RemoveRelation" | "Batch" => {
                let mut adds = Vec::new();
                let mut removes = Vec::new();
                collect_relation_members(json, &mut adds, &mut removes)?;
                RelationOp::new(&adds, &removes).map(Operation::Relation)
            }
            other => Err(Error::invalid_wire(format!("unknown operation {}", other))),
        }
    }

    fn decode_objects(&mut self, json: &serde_json::Value) -> Result<Vec<Value>> {
        match json.get("objects") {
            Some(serde_json::Value::Array(items)) => {
                items.iter().map(|item| self.decode(item)).collect()
            }
            _ => Err(Error::invalid_wire("list operation needs an objects array")),
        }
    }
}

fn collect_relation_members(
    json: &serde_json::Value,
    adds: &mut Vec<ObjectRef>,
    removes: &mut Vec<ObjectRef>,
) -> Result<()> {
    let op_name = json.get("__op").and_then(|op| op.as_str());
    match op_name {
        Some("Batch") => {
            let ops = json
                .get("ops")
                .and_then(|ops| ops.as_array())
                .ok_or_else(|| Error::invalid_wire("Batch needs an ops array"))?;
            for op in ops {
                match op.get("__op").and_then(|op| op.as_str()) {
                    Some("AddRelation" | "RemoveRelation") => {
                        collect_relation_members(op, adds, removes)?
                    }
                    _ => {
                        return Err(Error::invalid_wire(
                            "Batch may only contain relation operations",
                        ))
                    }
                }
            }
            Ok(())
        }
        Some(name @ ("AddRelation" | "RemoveRelation")) => {
            let objects = json
                .get("objects")
                .and_then(|objects| objects.as_array())
                .ok_or_else(|| Error::invalid_wire("relation operation needs an objects array"))?;
            let target = if name == "AddRelation" { adds } else { removes };
            for object in objects {
                match object {
                    serde_json::Value::Object(map) => target.push(pointer_ref(map)?),
                    _ => return Err(Error::invalid_wire("relation members must be pointers")),
                }
            }
            Ok(())
        }
        _ => Err(Error::invalid_wire("expected a relation operation")),
    }
}

fn pointer_ref(map: &Map<String, serde_json::Value>) -> Result<ObjectRef> {
    let class_name = string_field(map, "className")?;
    let object_id = string_field(map, "objectId")?;
    Ok(ObjectRef::with_id(class_name, object_id))
}

fn string_field<'m>(map: &'m Map<String, serde_json::Value>, key: &str) -> Result<&'m str> {
    map.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::invalid_wire(format!("missing string field {}", key)))
}

fn float_field(map: &Map<String, serde_json::Value>, key: &str) -> Result<f64> {
    map.get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| Error::invalid_wire(format!("missing numeric field {}", key)))
}

fn parse_date(iso: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(iso)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|e| Error::invalid_wire(format!("invalid date {}: {}", iso, e)))
}

//! In-memory attribute values.
//!
//! Values are what `get()` returns and what operations apply to. Besides the
//! JSON shapes they cover the special types the backend understands: dates,
//! geo points, pointers to other domain objects and relation handles.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Field name -> value. Ordered so encoded bodies are deterministic.
pub type AttributeMap = BTreeMap<String, Value>;

/// Field name -> new value, where `None` means the field is removed.
pub type AttributeUpdates = BTreeMap<String, Option<Value>>;

/// A numeric value. Integers stay integers until mixed with a float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    /// Convert to f64.
    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Int(i) => *i as f64,
            Number::Float(f) => *f,
        }
    }

    /// Add two numbers, widening to float on overflow or mixed kinds.
    pub fn add(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => match a.checked_add(b) {
                Some(sum) => Number::Int(sum),
                None => Number::Float(a as f64 + b as f64),
            },
            (a, b) => Number::Float(a.as_f64() + b.as_f64()),
        }
    }

    /// Arithmetic negation.
    pub fn negate(self) -> Number {
        match self {
            Number::Int(i) => match i.checked_neg() {
                Some(n) => Number::Int(n),
                None => Number::Float(-(i as f64)),
            },
            Number::Float(f) => Number::Float(-f),
        }
    }

    /// Wire form. JSON has no NaN or infinity.
    pub(crate) fn to_json(self) -> Result<serde_json::Value> {
        match self {
            Number::Int(i) => Ok(serde_json::Value::from(i)),
            Number::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| Error::invalid_wire(format!("{} cannot be sent as a number", f))),
        }
    }

    pub(crate) fn from_json(number: &serde_json::Number) -> Option<Number> {
        if let Some(i) = number.as_i64() {
            Some(Number::Int(i))
        } else {
            number.as_f64().map(Number::Float)
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{}", i),
            Number::Float(x) => write!(f, "{}", x),
        }
    }
}

impl From<i64> for Number {
    fn from(v: i64) -> Self {
        Number::Int(v)
    }
}

impl From<i32> for Number {
    fn from(v: i32) -> Self {
        Number::Int(v as i64)
    }
}

impl From<f64> for Number {
    fn from(v: f64) -> Self {
        Number::Float(v)
    }
}

/// Opaque token for one in-memory object instance.
///
/// Tokens are minted from a process-wide counter and never reused, so a
/// token that outlives its state can never alias a newer object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Mint a fresh token.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        InstanceId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw counter value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

/// A reference to a domain object: the identity the state store keys on.
///
/// Every reference carries a local id from the moment it is created. The
/// server id is only known once the object has been saved (or when the
/// reference was built from a server pointer).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    class_name: String,
    object_id: Option<String>,
    local_id: String,
    instance: InstanceId,
}

impl ObjectRef {
    /// A reference to a brand new, unsaved object.
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            object_id: None,
            local_id: new_local_id(),
            instance: InstanceId::next(),
        }
    }

    /// A reference to an object that already exists on the server.
    pub fn with_id(class_name: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            object_id: Some(object_id.into()),
            local_id: new_local_id(),
            instance: InstanceId::next(),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn object_id(&self) -> Option<&str> {
        self.object_id.as_deref()
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// The same reference with its server id filled in.
    pub fn with_object_id(&self, object_id: impl Into<String>) -> Self {
        Self {
            object_id: Some(object_id.into()),
            ..self.clone()
        }
    }

    /// Whether two references denote the same object: the same in-memory
    /// instance, or the same class and server id.
    pub fn same_object(&self, other: &ObjectRef) -> bool {
        if self.instance == other.instance {
            return true;
        }
        match (&self.object_id, &other.object_id) {
            (Some(a), Some(b)) => a == b && self.class_name == other.class_name,
            _ => false,
        }
    }
}

fn new_local_id() -> String {
    format!("local{}", uuid::Uuid::new_v4().simple())
}

/// A lazy handle to a many-to-many association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationHandle {
    /// Object owning the relation field, when known.
    pub parent: Option<ObjectRef>,
    /// Field name on the parent.
    pub key: Option<String>,
    /// Class of the related objects, once known.
    pub target_class: Option<String>,
}

impl RelationHandle {
    pub fn new(parent: ObjectRef, key: impl Into<String>) -> Self {
        Self {
            parent: Some(parent),
            key: Some(key.into()),
            target_class: None,
        }
    }

    /// A handle decoded from the wire, with no owner context.
    pub fn detached(target_class: Option<String>) -> Self {
        Self {
            parent: None,
            key: None,
            target_class,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// An attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Value>),
    Object(AttributeMap),
    Date(DateTime<Utc>),
    GeoPoint(GeoPoint),
    Pointer(ObjectRef),
    Relation(RelationHandle),
}

impl Value {
    /// Plain arrays and objects: the mutable shapes tracked by the object
    /// cache. Special types are excluded.
    pub fn is_object_shaped(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<&ObjectRef> {
        match self {
            Value::Pointer(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Date(_) => "date",
            Value::GeoPoint(_) => "geopoint",
            Value::Pointer(_) => "pointer",
            Value::Relation(_) => "relation",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(Number::Int(v))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(Number::Int(v as i64))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(Number::Float(v))
    }
}

impl From<Number> for Value {
    fn from(v: Number) -> Self {
        Value::Number(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<AttributeMap> for Value {
    fn from(v: AttributeMap) -> Self {
        Value::Object(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Date(v)
    }
}

impl From<GeoPoint> for Value {
    fn from(v: GeoPoint) -> Self {
        Value::GeoPoint(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Value::Pointer(v)
    }
}

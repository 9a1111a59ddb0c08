//! Rows and primary keys.
//!
//! The synchronizer never looks inside a row except to read its primary
//! key. Updates replace rows wholesale.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use crate::error::CoreError;

/// Key field used when a collection does not name one.
pub const DEFAULT_KEY_FIELD: &str = "id";

/// A record with exactly one designated primary key.
///
/// `primary_key` returns `None` for payloads whose key is absent or
/// unusable. Such rows are treated as malformed and dropped by every merge
/// path.
pub trait Row: Clone + Send + Sync + 'static {
    /// The primary key type.
    type Key: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    /// Read the primary key.
    fn primary_key(&self) -> Option<Self::Key>;

    /// Name of the key field, for diagnostics.
    fn key_field(&self) -> &str {
        DEFAULT_KEY_FIELD
    }

    /// Read the primary key, failing with [`CoreError::MissingPrimaryKey`].
    fn require_key(&self) -> Result<Self::Key, CoreError> {
        self.primary_key().ok_or_else(|| CoreError::MissingPrimaryKey {
            field: self.key_field().to_string(),
        })
    }
}

/// Primary key of a [`JsonRow`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowKey {
    Int(i64),
    /// Integers above `i64::MAX`.
    UInt(u64),
    Text(String),
}

impl RowKey {
    /// Interpret a JSON value as a key. Integers and strings qualify;
    /// floats, booleans, nulls and containers do not. A number never equals
    /// a string, even one with the same digits.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(RowKey::Int(i)),
                None => n.as_u64().map(RowKey::UInt),
            },
            Value::String(s) => Some(RowKey::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Int(i) => write!(f, "{}", i),
            RowKey::UInt(u) => write!(f, "{}", u),
            RowKey::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RowKey {
    fn from(value: i64) -> Self {
        RowKey::Int(value)
    }
}

impl From<u64> for RowKey {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(i) => RowKey::Int(i),
            Err(_) => RowKey::UInt(value),
        }
    }
}

impl From<&str> for RowKey {
    fn from(value: &str) -> Self {
        RowKey::Text(value.to_string())
    }
}

impl From<String> for RowKey {
    fn from(value: String) -> Self {
        RowKey::Text(value)
    }
}

/// A JSON object row whose primary key lives in a named field.
///
/// Serializes as the bare object. Deserialized rows use
/// [`DEFAULT_KEY_FIELD`]; rebind with [`JsonRow::with_key_field`]. A
/// collection keyed by another field must rebind every row it parses, or
/// use a typed [`Row`].
#[derive(Clone, PartialEq)]
pub struct JsonRow {
    fields: Map<String, Value>,
    key_field: Arc<str>,
}

impl JsonRow {
    /// Build a row keyed by `id`.
    pub fn new(value: Value) -> Result<Self, CoreError> {
        Self::keyed_by(DEFAULT_KEY_FIELD, value)
    }

    /// Build a row keyed by `key_field`.
    pub fn keyed_by(key_field: &str, value: Value) -> Result<Self, CoreError> {
        match value {
            Value::Object(fields) => Ok(Self {
                fields,
                key_field: Arc::from(key_field),
            }),
            _ => Err(CoreError::NotAnObject),
        }
    }

    /// Rebind the key field.
    pub fn with_key_field(mut self, key_field: &str) -> Self {
        self.key_field = Arc::from(key_field);
        self
    }

    /// Read a field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// The underlying object.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Consume into a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl Row for JsonRow {
    type Key = RowKey;

    fn primary_key(&self) -> Option<RowKey> {
        self.fields.get(&*self.key_field).and_then(RowKey::from_json)
    }

    fn key_field(&self) -> &str {
        &self.key_field
    }
}

impl From<Map<String, Value>> for JsonRow {
    fn from(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            key_field: Arc::from(DEFAULT_KEY_FIELD),
        }
    }
}

impl fmt::Debug for JsonRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsonRow({})", Value::Object(self.fields.clone()))
    }
}

impl Serialize for JsonRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for JsonRow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::<String, Value>::deserialize(deserializer).map(JsonRow::from)
    }
}

//! Core types for FluxBatch

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Timestamp in nanoseconds since Unix epoch
pub type Timestamp = i64;

/// Current wall-clock time in nanoseconds
pub fn now_nanos() -> Timestamp {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

/// Key identifying which compression stream a message belongs to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Create a new partition key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartitionKey {
    fn from(v: &str) -> Self {
        PartitionKey(v.to_string())
    }
}

impl From<String> for PartitionKey {
    fn from(v: String) -> Self {
        PartitionKey(v)
    }
}

/// A pipeline message: fixed header fields, an opaque payload and
/// dynamic named fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier
    pub uuid: Uuid,
    /// Timestamp in nanoseconds
    pub timestamp: Timestamp,
    /// Message type
    pub msg_type: String,
    /// Name of the component that produced the message
    pub logger: String,
    /// Originating host
    pub hostname: String,
    /// Syslog-style severity
    pub severity: i32,
    /// Raw payload
    pub payload: Bytes,
    /// Dynamic fields
    pub fields: Fields,
}

impl Message {
    /// Create a message carrying only a payload
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            timestamp: now_nanos(),
            payload: payload.into(),
            ..Default::default()
        }
    }

    /// Add a field to the message
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name, value.into());
        self
    }

    /// Look up a field by name
    pub fn find_first_field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Reset every header, payload and field so the message can be reused
    pub fn clear(&mut self) {
        *self = Message::default();
    }
}

/// Field values container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fields(pub BTreeMap<String, FieldValue>);

impl Fields {
    /// Create empty fields
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Add a field
    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        self.0.insert(key.into(), value);
    }

    /// Get a field value
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Fields {
    fn default() -> Self {
        Self::new()
    }
}

/// Possible field value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// 64-bit float
    Float(f64),
    /// 64-bit signed integer
    Integer(i64),
    /// Boolean
    Boolean(bool),
    /// String
    String(String),
}

impl FieldValue {
    /// Get as str if this is a string field
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Boolean(v) => write!(f, "{}", v),
            FieldValue::String(v) => f.write_str(v),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

//! Document and Value types for the bookstore engine
//!
//! This module provides the core data structures for document storage:
//! - Document: a JSON-like document with nested fields and an `_id`
//! - Value: an enum covering the JSON types plus ObjectId and DateTime
//! - Canonical cross-type ordering used by filters, sorts and indexes
//! - Field path navigation for nested document access

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

/// Maximum nesting depth for documents (16 levels)
pub const MAX_NESTING_DEPTH: usize = 16;

/// Name of the primary key field
pub const ID_FIELD: &str = "_id";

static OBJECT_ID_COUNTER: AtomicU32 = AtomicU32::new(0);

/// 12-byte document identifier: 4 bytes of seconds, 5 random bytes, 3 counter bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Create a new ObjectId
    pub fn new() -> Self {
        let mut bytes = [0u8; 12];

        let timestamp = Utc::now().timestamp() as u32;
        bytes[0..4].copy_from_slice(&timestamp.to_be_bytes());

        let random: [u8; 5] = rand::random();
        bytes[4..9].copy_from_slice(&random);

        let counter = OBJECT_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed) & 0x00FF_FFFF;
        bytes[9..12].copy_from_slice(&counter.to_be_bytes()[1..4]);

        Self(bytes)
    }

    /// Create from bytes
    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Parse from a 24-character hex string
    pub fn parse_str(s: &str) -> Result<Self, DocumentError> {
        let decoded = hex::decode(s).map_err(|_| DocumentError::InvalidObjectId(s.to_string()))?;
        let bytes: [u8; 12] = decoded
            .try_into()
            .map_err(|_| DocumentError::InvalidObjectId(s.to_string()))?;
        Ok(Self(bytes))
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }

    /// Seconds since the epoch encoded in the id
    pub fn timestamp(&self) -> i64 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.0[0..4]);
        u32::from_be_bytes(bytes) as i64
    }

    /// Lowercase hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[derive(Serialize, Deserialize)]
struct ExtendedOid {
    #[serde(rename = "$oid")]
    oid: String,
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ExtendedOid { oid: self.to_hex() }.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let ext = ExtendedOid::deserialize(deserializer)?;
        ObjectId::parse_str(&ext.oid).map_err(serde::de::Error::custom)
    }
}

/// Value type supporting the JSON types plus ObjectId and DateTime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "JsonValue", into = "JsonValue")]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 32-bit integer
    Int32(i32),
    /// 64-bit integer
    Int64(i64),
    /// 64-bit floating point
    Float64(f64),
    /// String value
    String(String),
    /// Array of values
    Array(Vec<Value>),
    /// Object with string keys
    Object(BTreeMap<String, Value>),
    /// Document identifier
    ObjectId(ObjectId),
    /// DateTime with UTC timezone
    DateTime(DateTime<Utc>),
}

impl Value {
    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if value is a number (int or float)
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int32(_) | Value::Int64(_) | Value::Float64(_))
    }

    /// Check if value is a string
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// Check if value is an array
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// Check if value is an object
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(i) => Some(*i as i64),
            Value::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(i) => Some(*i as f64),
            Value::Int64(i) => Some(*i as f64),
            Value::Float64(f) => Some(*f),
            _ => None,
        }
    }

    /// Get as string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get as array reference
    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Get as object reference
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Get as ObjectId
    pub fn as_object_id(&self) -> Option<ObjectId> {
        match self {
            Value::ObjectId(oid) => Some(*oid),
            _ => None,
        }
    }

    /// Short type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int32(_) => "int",
            Value::Int64(_) => "long",
            Value::Float64(_) => "double",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::ObjectId(_) => "objectId",
            Value::DateTime(_) => "date",
        }
    }

    /// Position of this value's type in the canonical cross-type order
    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 1,
            Value::Int32(_) | Value::Int64(_) | Value::Float64(_) => 2,
            Value::String(_) => 3,
            Value::Object(_) => 4,
            Value::Array(_) => 5,
            Value::ObjectId(_) => 7,
            Value::Bool(_) => 8,
            Value::DateTime(_) => 9,
        }
    }

    /// Whether two values belong to the same comparison bracket
    pub fn same_bracket(&self, other: &Value) -> bool {
        self.type_rank() == other.type_rank()
    }

    /// Total order over all values: type bracket first, then value
    pub fn cmp_canonical(&self, other: &Value) -> Ordering {
        let rank = self.type_rank().cmp(&other.type_rank());
        if rank != Ordering::Equal {
            return rank;
        }

        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::ObjectId(a), Value::ObjectId(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let cmp = x.cmp_canonical(y);
                    if cmp != Ordering::Equal {
                        return cmp;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Object(a), Value::Object(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                    let cmp = ka.cmp(kb).then_with(|| va.cmp_canonical(vb));
                    if cmp != Ordering::Equal {
                        return cmp;
                    }
                }
                a.len().cmp(&b.len())
            }
            (a, b) => compare_numbers(a, b),
        }
    }

    /// Equality under the canonical order (numbers compare across widths)
    pub fn loose_eq(&self, other: &Value) -> bool {
        self.cmp_canonical(other) == Ordering::Equal
    }

    /// Get the nesting depth of this value
    pub fn nesting_depth(&self) -> usize {
        match self {
            Value::Array(arr) => 1 + arr.iter().map(|v| v.nesting_depth()).max().unwrap_or(0),
            Value::Object(obj) => 1 + obj.values().map(|v| v.nesting_depth()).max().unwrap_or(0),
            _ => 0,
        }
    }

    /// Convert to a plain JSON value (extended JSON for ObjectId and DateTime)
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int32(i) => JsonValue::from(*i),
            Value::Int64(i) => JsonValue::from(*i),
            Value::Float64(f) => JsonNumber::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Array(arr) => JsonValue::Array(arr.iter().map(Value::to_json).collect()),
            Value::Object(obj) => JsonValue::Object(
                obj.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::ObjectId(oid) => {
                let mut map = JsonMap::new();
                map.insert("$oid".to_string(), JsonValue::String(oid.to_hex()));
                JsonValue::Object(map)
            }
            Value::DateTime(dt) => {
                let mut map = JsonMap::new();
                map.insert("$date".to_string(), JsonValue::String(dt.to_rfc3339()));
                JsonValue::Object(map)
            }
        }
    }

    /// Convert from a JSON value, recognising `$oid` and `$date` wrappers
    pub fn from_json(json: &JsonValue) -> Value {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    if i >= i32::MIN as i64 && i <= i32::MAX as i64 {
                        Value::Int32(i as i32)
                    } else {
                        Value::Int64(i)
                    }
                } else {
                    Value::Float64(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JsonValue::String(s) => Value::String(s.clone()),
            JsonValue::Array(arr) => Value::Array(arr.iter().map(Value::from_json).collect()),
            JsonValue::Object(obj) => {
                if obj.len() == 1 {
                    if let Some(JsonValue::String(hex)) = obj.get("$oid") {
                        if let Ok(oid) = ObjectId::parse_str(hex) {
                            return Value::ObjectId(oid);
                        }
                    }
                    if let Some(JsonValue::String(date)) = obj.get("$date") {
                        if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
                            return Value::DateTime(dt.with_timezone(&Utc));
                        }
                    }
                }
                Value::Object(
                    obj.iter()
                        .map(|(k, v)| (k.clone(), Value::from_json(v)))
                        .collect(),
                )
            }
        }
    }
}

/// Arithmetic operators over numeric values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl Value {
    /// Apply an arithmetic operator to two numbers.
    ///
    /// Integer operands stay integral (Int32 when both are Int32 and the result
    /// fits) and widen to Float64 on overflow. Division always yields Float64.
    /// Returns `None` when either operand is not a number or the divisor is zero.
    pub fn numeric_op(&self, other: &Value, op: NumericOp) -> Option<Value> {
        if !self.is_number() || !other.is_number() {
            return None;
        }

        if matches!(op, NumericOp::Divide | NumericOp::Modulo) && other.as_f64() == Some(0.0) {
            return None;
        }

        if let (Some(a), Some(b)) = (self.as_i64(), other.as_i64()) {
            let checked = match op {
                NumericOp::Add => a.checked_add(b),
                NumericOp::Subtract => a.checked_sub(b),
                NumericOp::Multiply => a.checked_mul(b),
                NumericOp::Modulo => a.checked_rem(b),
                NumericOp::Divide => None,
            };

            if let Some(result) = checked {
                let both_int32 = matches!((self, other), (Value::Int32(_), Value::Int32(_)));
                return Some(match i32::try_from(result) {
                    Ok(small) if both_int32 => Value::Int32(small),
                    _ => Value::Int64(result),
                });
            }
            if op != NumericOp::Divide {
                return Some(Value::Float64(float_op(a as f64, b as f64, op)));
            }
        }

        let a = self.as_f64()?;
        let b = other.as_f64()?;
        Some(Value::Float64(float_op(a, b, op)))
    }
}

fn float_op(a: f64, b: f64, op: NumericOp) -> f64 {
    match op {
        NumericOp::Add => a + b,
        NumericOp::Subtract => a - b,
        NumericOp::Multiply => a * b,
        NumericOp::Divide => a / b,
        NumericOp::Modulo => a % b,
    }
}

fn compare_numbers(a: &Value, b: &Value) -> Ordering {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => {
            let x = a.as_f64().unwrap_or(f64::NAN);
            let y = b.as_f64().unwrap_or(f64::NAN);
            // NaN sorts below every other number
            match (x.is_nan(), y.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            }
        }
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        Value::from_json(&json)
    }
}

impl From<Value> for JsonValue {
    fn from(value: Value) -> Self {
        value.to_json()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int32(i)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int64(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float64(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(arr: Vec<Value>) -> Self {
        Value::Array(arr)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(obj: BTreeMap<String, Value>) -> Self {
        Value::Object(obj)
    }
}

impl From<ObjectId> for Value {
    fn from(oid: ObjectId) -> Self {
        Value::ObjectId(oid)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

/// Document: an ordered map of field names to values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: BTreeMap<String, Value>,
}

impl Document {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a document from fields
    pub fn from_fields(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }

    /// The document's `_id`, if it is an ObjectId
    pub fn id(&self) -> Option<ObjectId> {
        self.fields.get(ID_FIELD).and_then(Value::as_object_id)
    }

    /// Insert a field
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    /// Get a field by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a mutable field by key
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields.get_mut(key)
    }

    /// Remove a field
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// Check if a field exists
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Borrow the field map
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Consume into the field map
    pub fn into_fields(self) -> BTreeMap<String, Value> {
        self.fields
    }

    /// Number of top-level fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the document has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over top-level fields in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Get field by path (e.g., "user.address.city")
    pub fn get_by_path(&self, path: &str) -> Option<&Value> {
        let parts: Vec<&str> = path.split('.').collect();
        lookup_path(&self.fields, &parts)
    }

    /// Set field by path, creating intermediate objects as needed
    pub fn set_by_path(&mut self, path: &str, value: Value) -> Result<(), DocumentError> {
        let parts: Vec<&str> = path.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(DocumentError::InvalidPath(path.to_string()));
        }

        let (last, parents) = parts
            .split_last()
            .ok_or_else(|| DocumentError::InvalidPath(path.to_string()))?;

        let mut current = &mut self.fields;
        for &part in parents {
            let entry = current
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(BTreeMap::new()));
            current = match entry {
                Value::Object(obj) => obj,
                _ => {
                    return Err(DocumentError::InvalidPath(format!(
                        "{}: '{}' is not an object",
                        path, part
                    )))
                }
            };
        }

        current.insert(last.to_string(), value);
        Ok(())
    }

    /// Remove field by path, returning the removed value
    pub fn remove_by_path(&mut self, path: &str) -> Option<Value> {
        let parts: Vec<&str> = path.split('.').collect();
        let (last, parents) = parts.split_last()?;

        let mut current = &mut self.fields;
        for &part in parents {
            current = match current.get_mut(part) {
                Some(Value::Object(obj)) => obj,
                _ => return None,
            };
        }
        current.remove(*last)
    }

    /// Validate document constraints
    pub fn validate(&self) -> Result<(), DocumentError> {
        let max_depth = self
            .fields
            .values()
            .map(|v| v.nesting_depth())
            .max()
            .unwrap_or(0);

        if max_depth > MAX_NESTING_DEPTH {
            return Err(DocumentError::NestingTooDeep {
                depth: max_depth,
                max: MAX_NESTING_DEPTH,
            });
        }

        if self.fields.keys().any(|k| k.is_empty() || k.starts_with('$')) {
            return Err(DocumentError::InvalidFieldName(
                self.fields
                    .keys()
                    .find(|k| k.is_empty() || k.starts_with('$'))
                    .cloned()
                    .unwrap_or_default(),
            ));
        }

        Ok(())
    }

    /// Convert to a JSON object
    pub fn to_json_value(&self) -> JsonValue {
        JsonValue::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Build from a JSON object
    pub fn from_json_value(json: &JsonValue) -> Result<Self, DocumentError> {
        match Value::from_json(json) {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(DocumentError::NotAnObject(other.type_name().to_string())),
        }
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> Result<String, DocumentError> {
        serde_json::to_string(self).map_err(|e| DocumentError::SerializationError(e.to_string()))
    }

    /// Convert to pretty JSON string
    pub fn to_json_pretty(&self) -> Result<String, DocumentError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| DocumentError::SerializationError(e.to_string()))
    }

    /// Parse from JSON string
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        serde_json::from_str(json).map_err(|e| DocumentError::DeserializationError(e.to_string()))
    }

    /// Decode into a typed struct
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, DocumentError> {
        serde_json::from_value(self.to_json_value())
            .map_err(|e| DocumentError::DeserializationError(e.to_string()))
    }

    /// Encode a typed struct as a document
    pub fn from_typed<T: Serialize>(value: &T) -> Result<Self, DocumentError> {
        let json = serde_json::to_value(value)
            .map_err(|e| DocumentError::SerializationError(e.to_string()))?;
        Self::from_json_value(&json)
    }
}

impl From<BTreeMap<String, Value>> for Document {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json_value())
    }
}

fn lookup_path<'a>(fields: &'a BTreeMap<String, Value>, parts: &[&str]) -> Option<&'a Value> {
    let (first, rest) = parts.split_first()?;
    let mut current = fields.get(*first)?;

    for &part in rest {
        match current {
            Value::Object(obj) => {
                current = obj.get(part)?;
            }
            Value::Array(arr) => {
                let index = part.parse::<usize>().ok()?;
                current = arr.get(index)?;
            }
            _ => return None,
        }
    }

    Some(current)
}

/// Document-related errors
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Nesting too deep: {depth} levels (max: {max})")]
    NestingTooDeep { depth: usize, max: usize },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid field name: '{0}'")]
    InvalidFieldName(String),

    #[error("Invalid ObjectId: {0}")]
    InvalidObjectId(String),

    #[error("Expected an object, found {0}")]
    NotAnObject(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

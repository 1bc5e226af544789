//! Index key specifications and descriptors

use crate::document::ID_FIELD;
use crate::query::ast::SortOrder;
use crate::query::parser::QueryParser;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::fmt;

use super::btree::IndexError;

/// Name of the implicit primary key index
pub const ID_INDEX_NAME: &str = "_id_";

/// Ordered list of indexed fields with their directions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKeySpec {
    pub fields: Vec<(String, SortOrder)>,
}

impl IndexKeySpec {
    /// Create an empty key spec
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Add an ascending key
    pub fn asc(mut self, field: impl Into<String>) -> Self {
        self.fields.push((field.into(), SortOrder::Ascending));
        self
    }

    /// Add a descending key
    pub fn desc(mut self, field: impl Into<String>) -> Self {
        self.fields.push((field.into(), SortOrder::Descending));
        self
    }

    /// Parse `{field: 1 | -1, ...}` keeping key order
    pub fn parse(value: &JsonValue) -> Result<Self, IndexError> {
        let obj = value.as_object().ok_or_else(|| {
            IndexError::InvalidKeySpec("key spec must be an object".to_string())
        })?;

        let mut spec = Self::new();
        for (field, direction) in obj {
            if field.is_empty() || field.starts_with('$') {
                return Err(IndexError::InvalidKeySpec(format!(
                    "invalid field name '{}'",
                    field
                )));
            }
            let order = QueryParser::parse_direction(direction)
                .map_err(|e| IndexError::InvalidKeySpec(e.to_string()))?;
            spec.fields.push((field.clone(), order));
        }

        spec.validate()?;
        Ok(spec)
    }

    /// Reject empty specs and repeated fields
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.fields.is_empty() {
            return Err(IndexError::InvalidKeySpec(
                "key spec must name at least one field".to_string(),
            ));
        }
        for (i, (field, _)) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|(f, _)| f == field) {
                return Err(IndexError::InvalidKeySpec(format!(
                    "field '{}' appears twice",
                    field
                )));
            }
        }
        Ok(())
    }

    /// Generated name: `field_dir` pairs joined with `_`
    pub fn default_name(&self) -> String {
        if self.fields.len() == 1 && self.fields[0].0 == ID_FIELD {
            return ID_INDEX_NAME.to_string();
        }
        self.fields
            .iter()
            .map(|(field, order)| format!("{}_{}", field, order.as_i32()))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Field names in key order
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(f, _)| f.as_str()).collect()
    }

    /// `{field: dir, ...}` as JSON
    pub fn to_json(&self) -> JsonValue {
        let mut map = JsonMap::new();
        for (field, order) in &self.fields {
            map.insert(field.clone(), JsonValue::from(order.as_i32()));
        }
        JsonValue::Object(map)
    }
}

impl Default for IndexKeySpec {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IndexKeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|(field, order)| format!("{}: {}", field, order.as_i32()))
            .collect();
        write!(f, "{{ {} }}", parts.join(", "))
    }
}

/// Index definition: key spec, name and options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub key: IndexKeySpec,
    pub unique: bool,
}

impl IndexDefinition {
    /// Definition with the generated name
    pub fn new(key: IndexKeySpec) -> Self {
        Self {
            name: key.default_name(),
            key,
            unique: false,
        }
    }

    /// Override the generated name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Enforce unique keys
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// The implicit `_id_` index
    pub fn primary() -> Self {
        Self::new(IndexKeySpec::new().asc(ID_FIELD)).unique(true)
    }

    /// Public descriptor as returned by `list_indexes`
    pub fn descriptor(&self) -> IndexDescriptor {
        IndexDescriptor {
            v: 2,
            key: self.key.to_json(),
            name: self.name.clone(),
            unique: if self.unique && self.name != ID_INDEX_NAME {
                Some(true)
            } else {
                None
            },
        }
    }
}

/// Index descriptor in the shape document stores report them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub v: u32,
    pub key: JsonValue,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub unique: Option<bool>,
}

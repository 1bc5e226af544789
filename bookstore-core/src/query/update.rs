//! Update operators
//!
//! Parses `{"$set": {...}, "$inc": {...}, ...}` patches and applies them to
//! documents. Replacement-style patches (plain field keys) are rejected.

use crate::document::{Document, NumericOp, Value, ID_FIELD};
use serde_json::Value as JsonValue;

/// A single field modification
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    Set { field: String, value: Value },
    Unset { field: String },
    Inc { field: String, amount: Value },
    Mul { field: String, factor: Value },
    Rename { from: String, to: String },
}

impl UpdateOp {
    fn fields(&self) -> Vec<&str> {
        match self {
            UpdateOp::Set { field, .. }
            | UpdateOp::Unset { field }
            | UpdateOp::Inc { field, .. }
            | UpdateOp::Mul { field, .. } => vec![field.as_str()],
            UpdateOp::Rename { from, to } => vec![from.as_str(), to.as_str()],
        }
    }
}

/// Whether one path equals the other or names one of its ancestors
fn paths_overlap(a: &str, b: &str) -> bool {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    long == short || (long.starts_with(short) && long.as_bytes()[short.len()] == b'.')
}

/// Parsed update patch
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateSpec {
    pub ops: Vec<UpdateOp>,
}

impl UpdateSpec {
    /// Parse a patch object
    pub fn parse(value: &JsonValue) -> Result<Self, UpdateError> {
        let obj = value
            .as_object()
            .ok_or_else(|| UpdateError::InvalidUpdate("update must be an object".to_string()))?;

        if obj.is_empty() {
            return Err(UpdateError::InvalidUpdate(
                "update must contain at least one operator".to_string(),
            ));
        }

        let mut ops = Vec::new();

        for (operator, operand) in obj {
            if !operator.starts_with('$') {
                return Err(UpdateError::InvalidUpdate(format!(
                    "'{}' is not an update operator; replacement documents are not supported",
                    operator
                )));
            }

            let fields = operand.as_object().ok_or_else(|| {
                UpdateError::InvalidUpdate(format!("{} requires an object operand", operator))
            })?;

            for (field, arg) in fields {
                let arg_value = Value::from_json(arg);
                let op = match operator.as_str() {
                    "$set" => UpdateOp::Set {
                        field: field.clone(),
                        value: arg_value,
                    },
                    "$unset" => UpdateOp::Unset {
                        field: field.clone(),
                    },
                    "$inc" | "$mul" => {
                        if !arg_value.is_number() {
                            return Err(UpdateError::InvalidUpdate(format!(
                                "{} on '{}' requires a numeric operand",
                                operator, field
                            )));
                        }
                        if operator == "$inc" {
                            UpdateOp::Inc {
                                field: field.clone(),
                                amount: arg_value,
                            }
                        } else {
                            UpdateOp::Mul {
                                field: field.clone(),
                                factor: arg_value,
                            }
                        }
                    }
                    "$rename" => {
                        let to = arg.as_str().ok_or_else(|| {
                            UpdateError::InvalidUpdate(format!(
                                "$rename target for '{}' must be a string",
                                field
                            ))
                        })?;
                        if to == field {
                            return Err(UpdateError::InvalidUpdate(format!(
                                "$rename source and target are both '{}'",
                                field
                            )));
                        }
                        UpdateOp::Rename {
                            from: field.clone(),
                            to: to.to_string(),
                        }
                    }
                    other => return Err(UpdateError::UnsupportedOperator(other.to_string())),
                };
                ops.push(op);
            }
        }

        let spec = Self { ops };
        spec.validate()?;
        Ok(spec)
    }

    /// Builder: add a `$set`
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Set {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Builder: add an `$inc`
    pub fn inc(mut self, field: impl Into<String>, amount: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Inc {
            field: field.into(),
            amount: amount.into(),
        });
        self
    }

    /// Builder: add an `$unset`
    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.ops.push(UpdateOp::Unset {
            field: field.into(),
        });
        self
    }

    /// Reject `_id` changes and fields touched by more than one operator
    pub fn validate(&self) -> Result<(), UpdateError> {
        if self.ops.is_empty() {
            return Err(UpdateError::InvalidUpdate(
                "update must contain at least one operator".to_string(),
            ));
        }

        let mut seen: Vec<&str> = Vec::new();
        for op in &self.ops {
            for field in op.fields() {
                let bad_part = field.split('.').any(|p| p.is_empty() || p.starts_with('$'));
                if field.is_empty() || bad_part {
                    return Err(UpdateError::InvalidUpdate(format!(
                        "invalid field path '{}'",
                        field
                    )));
                }
                if field == ID_FIELD || field.starts_with("_id.") {
                    return Err(UpdateError::ImmutableField(ID_FIELD.to_string()));
                }
                if seen.iter().any(|other| paths_overlap(other, field)) {
                    return Err(UpdateError::Conflict(field.to_string()));
                }
                seen.push(field);
            }
        }

        Ok(())
    }

    /// Apply the patch, returning the updated copy
    pub fn apply(&self, document: &Document) -> Result<Document, UpdateError> {
        let mut updated = document.clone();

        for op in &self.ops {
            match op {
                UpdateOp::Set { field, value } => {
                    updated.set_by_path(field, value.clone())?;
                }
                UpdateOp::Unset { field } => {
                    updated.remove_by_path(field);
                }
                UpdateOp::Inc { field, amount } => {
                    let next = match updated.get_by_path(field) {
                        None => amount.clone(),
                        Some(current) => current
                            .numeric_op(amount, NumericOp::Add)
                            .ok_or_else(|| UpdateError::TypeMismatch {
                                operator: "$inc".to_string(),
                                field: field.clone(),
                                found: current.type_name().to_string(),
                            })?,
                    };
                    updated.set_by_path(field, next)?;
                }
                UpdateOp::Mul { field, factor } => {
                    let next = match updated.get_by_path(field) {
                        // a missing field becomes zero of the factor's type
                        None => factor
                            .numeric_op(&Value::Int32(0), NumericOp::Multiply)
                            .unwrap_or(Value::Int32(0)),
                        Some(current) => current
                            .numeric_op(factor, NumericOp::Multiply)
                            .ok_or_else(|| UpdateError::TypeMismatch {
                                operator: "$mul".to_string(),
                                field: field.clone(),
                                found: current.type_name().to_string(),
                            })?,
                    };
                    updated.set_by_path(field, next)?;
                }
                UpdateOp::Rename { from, to } => {
                    if let Some(value) = updated.remove_by_path(from) {
                        updated.set_by_path(to, value)?;
                    }
                }
            }
        }

        updated
            .validate()
            .map_err(|e| UpdateError::InvalidUpdate(e.to_string()))?;
        Ok(updated)
    }
}

/// Update errors
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    #[error("Unsupported update operator: {0}")]
    UnsupportedOperator(String),

    #[error("Field '{0}' is immutable")]
    ImmutableField(String),

    #[error("Conflicting update operators on '{0}'")]
    Conflict(String),

    #[error("{operator} cannot be applied to '{field}' of type {found}")]
    TypeMismatch {
        operator: String,
        field: String,
        found: String,
    },

    #[error("Document error: {0}")]
    Document(#[from] crate::document::DocumentError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gatsby() -> Document {
        Document::from_json_value(&json!({
            "title": "The Great Gatsby",
            "author": "F. Scott Fitzgerald",
            "price": 10.99,
            "in_stock": true,
            "stock": 3
        }))
        .unwrap()
    }

    #[test]
    fn test_set_replaces_value() {
        let spec = UpdateSpec::parse(&json!({"$set": {"price": 12.99}})).unwrap();
        let updated = spec.apply(&gatsby()).unwrap();
        assert_eq!(updated.get("price"), Some(&Value::Float64(12.99)));
        assert_eq!(updated.get("title"), gatsby().get("title"));
    }

    #[test]
    fn test_set_same_value_is_unchanged() {
        let spec = UpdateSpec::parse(&json!({"$set": {"price": 10.99}})).unwrap();
        assert_eq!(spec.apply(&gatsby()).unwrap(), gatsby());
    }

    #[test]
    fn test_nested_set_creates_objects() {
        let spec = UpdateSpec::parse(&json!({"$set": {"details.pages": 180}})).unwrap();
        let updated = spec.apply(&gatsby()).unwrap();
        assert_eq!(updated.get_by_path("details.pages"), Some(&Value::Int32(180)));
    }

    #[test]
    fn test_inc_and_mul() {
        let patch = json!({"$inc": {"stock": -1, "sold": 1}, "$mul": {"price": 2}});
        let spec = UpdateSpec::parse(&patch).unwrap();
        let updated = spec.apply(&gatsby()).unwrap();
        assert_eq!(updated.get("stock"), Some(&Value::Int32(2)));
        assert_eq!(updated.get("sold"), Some(&Value::Int32(1)));
        assert_eq!(updated.get("price"), Some(&Value::Float64(21.98)));
    }

    #[test]
    fn test_inc_on_string_fails() {
        let spec = UpdateSpec::parse(&json!({"$inc": {"title": 1}})).unwrap();
        assert!(matches!(
            spec.apply(&gatsby()),
            Err(UpdateError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_unset_and_rename() {
        let patch = json!({"$unset": {"in_stock": ""}, "$rename": {"stock": "quantity"}});
        let spec = UpdateSpec::parse(&patch).unwrap();
        let updated = spec.apply(&gatsby()).unwrap();
        assert!(!updated.contains_key("in_stock"));
        assert!(!updated.contains_key("stock"));
        assert_eq!(updated.get("quantity"), Some(&Value::Int32(3)));
    }

    #[test]
    fn test_rejects_replacement_documents() {
        assert!(UpdateSpec::parse(&json!({"price": 12.99})).is_err());
        assert!(UpdateSpec::parse(&json!({"$set": {"a": 1}, "price": 2})).is_err());
        assert!(UpdateSpec::parse(&json!({})).is_err());
    }

    #[test]
    fn test_rejects_unknown_operator_and_id_changes() {
        assert!(matches!(
            UpdateSpec::parse(&json!({"$push": {"tags": "x"}})),
            Err(UpdateError::UnsupportedOperator(_))
        ));
        assert!(matches!(
            UpdateSpec::parse(&json!({"$set": {"_id": 1}})),
            Err(UpdateError::ImmutableField(_))
        ));
        assert!(matches!(
            UpdateSpec::parse(&json!({"$set": {"price": 1}, "$inc": {"price": 1}})),
            Err(UpdateError::Conflict(_))
        ));
    }

    #[test]
    fn test_parent_and_child_paths_conflict() {
        for patch in [
            json!({"$set": {"meta": {"pages": 1}}, "$inc": {"meta.pages": 1}}),
            json!({"$set": {"meta.pages": 1, "meta": {}}}),
            json!({"$unset": {"meta": ""}, "$rename": {"title": "meta.title"}}),
        ] {
            assert!(
                matches!(UpdateSpec::parse(&patch), Err(UpdateError::Conflict(_))),
                "patch {}",
                patch
            );
        }

        let siblings = json!({"$set": {"meta.pages": 1, "meta.pages_read": 2, "metadata": 3}});
        assert!(UpdateSpec::parse(&siblings).is_ok());
    }

    #[test]
    fn test_builder() {
        let spec = UpdateSpec::default().set("price", 12.99).inc("stock", 1);
        assert!(spec.validate().is_ok());
        let updated = spec.apply(&gatsby()).unwrap();
        assert_eq!(updated.get("stock"), Some(&Value::Int32(4)));
    }
}

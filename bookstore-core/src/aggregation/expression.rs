//! Aggregation expressions
//!
//! Field paths (`"$price"`), literals, object/array expressions and the
//! arithmetic and string operators.

use super::AggregationError;
use crate::document::{Document, NumericOp, Value};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Expression operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Mod,
    Floor,
    Ceil,
    Abs,
    Concat,
    ToUpper,
    ToLower,
}

impl ExprOp {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "$add" => ExprOp::Add,
            "$subtract" => ExprOp::Subtract,
            "$multiply" => ExprOp::Multiply,
            "$divide" => ExprOp::Divide,
            "$mod" => ExprOp::Mod,
            "$floor" => ExprOp::Floor,
            "$ceil" => ExprOp::Ceil,
            "$abs" => ExprOp::Abs,
            "$concat" => ExprOp::Concat,
            "$toUpper" => ExprOp::ToUpper,
            "$toLower" => ExprOp::ToLower,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            ExprOp::Add => "$add",
            ExprOp::Subtract => "$subtract",
            ExprOp::Multiply => "$multiply",
            ExprOp::Divide => "$divide",
            ExprOp::Mod => "$mod",
            ExprOp::Floor => "$floor",
            ExprOp::Ceil => "$ceil",
            ExprOp::Abs => "$abs",
            ExprOp::Concat => "$concat",
            ExprOp::ToUpper => "$toUpper",
            ExprOp::ToLower => "$toLower",
        }
    }

    /// Allowed argument count range
    fn arity(self) -> (usize, Option<usize>) {
        match self {
            ExprOp::Add | ExprOp::Multiply | ExprOp::Concat => (1, None),
            ExprOp::Subtract | ExprOp::Divide | ExprOp::Mod => (2, Some(2)),
            ExprOp::Floor | ExprOp::Ceil | ExprOp::Abs | ExprOp::ToUpper | ExprOp::ToLower => {
                (1, Some(1))
            }
        }
    }
}

/// Parsed aggregation expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// `"$a.b"`
    FieldPath(String),
    /// Constant value
    Literal(Value),
    /// `{k: expr, ...}`
    Object(Vec<(String, Expression)>),
    /// `[expr, ...]`
    Array(Vec<Expression>),
    /// `{"$op": args}`
    Operator { op: ExprOp, args: Vec<Expression> },
}

impl Expression {
    /// Parse an expression from JSON
    pub fn parse(value: &JsonValue) -> Result<Self, AggregationError> {
        match value {
            JsonValue::String(s) if s.starts_with("$$") => Err(
                AggregationError::InvalidExpression(format!("variables are not supported: {}", s)),
            ),
            JsonValue::String(s) if s.starts_with('$') => {
                let path = &s[1..];
                if path.is_empty() || path.split('.').any(|p| p.is_empty()) {
                    return Err(AggregationError::InvalidExpression(format!(
                        "invalid field path '{}'",
                        s
                    )));
                }
                Ok(Expression::FieldPath(path.to_string()))
            }
            JsonValue::Array(items) => Ok(Expression::Array(
                items.iter().map(Self::parse).collect::<Result<_, _>>()?,
            )),
            JsonValue::Object(obj) => {
                let operator = obj.keys().find(|k| k.starts_with('$'));
                match operator {
                    Some(name) if obj.len() == 1 => {
                        let arg = &obj[name.as_str()];
                        if name == "$literal" {
                            return Ok(Expression::Literal(Value::from_json(arg)));
                        }
                        let op = ExprOp::from_name(name)
                            .ok_or_else(|| AggregationError::UnsupportedOperator(name.clone()))?;
                        let args = match arg {
                            JsonValue::Array(items) => {
                                items.iter().map(Self::parse).collect::<Result<Vec<_>, _>>()?
                            }
                            single => vec![Self::parse(single)?],
                        };

                        let (min, max) = op.arity();
                        if args.len() < min || max.map_or(false, |m| args.len() > m) {
                            return Err(AggregationError::InvalidExpression(format!(
                                "{} takes {} argument(s), got {}",
                                op.name(),
                                match max {
                                    Some(m) if m == min => m.to_string(),
                                    Some(m) => format!("{} to {}", min, m),
                                    None => format!("at least {}", min),
                                },
                                args.len()
                            )));
                        }

                        Ok(Expression::Operator { op, args })
                    }
                    Some(name) => Err(AggregationError::InvalidExpression(format!(
                        "operator {} must be the only key in its object",
                        name
                    ))),
                    None => Ok(Expression::Object(
                        obj.iter()
                            .map(|(k, v)| Ok((k.clone(), Self::parse(v)?)))
                            .collect::<Result<_, AggregationError>>()?,
                    )),
                }
            }
            other => Ok(Expression::Literal(Value::from_json(other))),
        }
    }

    /// Create a field path expression
    pub fn field(path: impl Into<String>) -> Self {
        Expression::FieldPath(path.into())
    }

    /// Evaluate against a document. `None` means the value is missing.
    pub fn evaluate(&self, doc: &Document) -> Result<Option<Value>, AggregationError> {
        match self {
            Expression::FieldPath(path) => Ok(doc.get_by_path(path).cloned()),
            Expression::Literal(value) => Ok(Some(value.clone())),
            Expression::Object(fields) => {
                let mut out = BTreeMap::new();
                for (key, expr) in fields {
                    if let Some(value) = expr.evaluate(doc)? {
                        out.insert(key.clone(), value);
                    }
                }
                Ok(Some(Value::Object(out)))
            }
            Expression::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.evaluate(doc)?.unwrap_or(Value::Null));
                }
                Ok(Some(Value::Array(out)))
            }
            Expression::Operator { op, args } => {
                let values = args
                    .iter()
                    .map(|a| a.evaluate(doc))
                    .collect::<Result<Vec<_>, _>>()?;
                apply_operator(*op, values).map(Some)
            }
        }
    }

    /// Evaluate, treating missing as null
    pub fn evaluate_or_null(&self, doc: &Document) -> Result<Value, AggregationError> {
        Ok(self.evaluate(doc)?.unwrap_or(Value::Null))
    }
}

fn apply_operator(op: ExprOp, values: Vec<Option<Value>>) -> Result<Value, AggregationError> {
    let values: Vec<Value> = values.into_iter().map(|v| v.unwrap_or(Value::Null)).collect();

    match op {
        ExprOp::ToUpper | ExprOp::ToLower => {
            let s = match values.first().unwrap_or(&Value::Null) {
                Value::Null => String::new(),
                Value::String(s) => s.clone(),
                other => return Err(type_mismatch(op, "a string", other)),
            };
            Ok(Value::String(if op == ExprOp::ToUpper {
                s.to_uppercase()
            } else {
                s.to_lowercase()
            }))
        }

        ExprOp::Concat => {
            let mut out = String::new();
            for value in &values {
                match value {
                    Value::Null => return Ok(Value::Null),
                    Value::String(s) => out.push_str(s),
                    other => return Err(type_mismatch(op, "strings", other)),
                }
            }
            Ok(Value::String(out))
        }

        _ if values.iter().any(Value::is_null) => Ok(Value::Null),

        ExprOp::Floor | ExprOp::Ceil | ExprOp::Abs => {
            let value = values.first().unwrap_or(&Value::Null);
            match value {
                Value::Int32(i) if op == ExprOp::Abs => Ok(i
                    .checked_abs()
                    .map(Value::Int32)
                    .unwrap_or(Value::Int64((*i as i64).abs()))),
                Value::Int64(i) if op == ExprOp::Abs => Ok(i
                    .checked_abs()
                    .map(Value::Int64)
                    .unwrap_or(Value::Float64((*i as f64).abs()))),
                Value::Int32(_) | Value::Int64(_) => Ok(value.clone()),
                Value::Float64(f) => Ok(Value::Float64(match op {
                    ExprOp::Floor => f.floor(),
                    ExprOp::Ceil => f.ceil(),
                    _ => f.abs(),
                })),
                other => Err(type_mismatch(op, "a number", other)),
            }
        }

        ExprOp::Add | ExprOp::Multiply | ExprOp::Subtract | ExprOp::Divide | ExprOp::Mod => {
            let numeric_op = match op {
                ExprOp::Add => NumericOp::Add,
                ExprOp::Multiply => NumericOp::Multiply,
                ExprOp::Subtract => NumericOp::Subtract,
                ExprOp::Divide => NumericOp::Divide,
                _ => NumericOp::Modulo,
            };

            if let Some(bad) = values.iter().find(|v| !v.is_number()) {
                return Err(type_mismatch(op, "numbers", bad));
            }
            let divisor = values.get(1).and_then(Value::as_f64);
            if matches!(op, ExprOp::Divide | ExprOp::Mod) && divisor == Some(0.0) {
                return Err(AggregationError::DivisionByZero(op.name().to_string()));
            }

            let mut iter = values.into_iter();
            let mut acc = iter.next().unwrap_or(Value::Int32(0));
            for value in iter {
                acc = acc
                    .numeric_op(&value, numeric_op)
                    .ok_or_else(|| type_mismatch(op, "numbers", &value))?;
            }
            Ok(acc)
        }
    }
}

fn type_mismatch(op: ExprOp, expected: &str, found: &Value) -> AggregationError {
    AggregationError::TypeMismatch(format!(
        "{} expects {}, found {}",
        op.name(),
        expected,
        found.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn book() -> Document {
        Document::from_json_value(&json!({
            "title": "Dune",
            "price": 9.5,
            "stock": 4,
            "details": {"pages": 412}
        }))
        .unwrap()
    }

    fn eval(expr: serde_json::Value) -> Result<Option<Value>, AggregationError> {
        Expression::parse(&expr)?.evaluate(&book())
    }

    #[test]
    fn test_field_paths() {
        assert_eq!(eval(json!("$title")).unwrap(), Some(Value::from("Dune")));
        assert_eq!(eval(json!("$details.pages")).unwrap(), Some(Value::Int32(412)));
        assert_eq!(eval(json!("$missing")).unwrap(), None);
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(
            eval(json!({"$multiply": ["$price", "$stock"]})).unwrap(),
            Some(Value::Float64(38.0))
        );
        assert_eq!(
            eval(json!({"$subtract": ["$stock", 1]})).unwrap(),
            Some(Value::Int32(3))
        );
        assert_eq!(
            eval(json!({"$floor": "$price"})).unwrap(),
            Some(Value::Float64(9.0))
        );
        assert_eq!(
            eval(json!({"$add": ["$missing", 1]})).unwrap(),
            Some(Value::Null)
        );
    }

    #[test]
    fn test_divide_by_zero() {
        assert!(matches!(
            eval(json!({"$divide": ["$price", 0]})),
            Err(AggregationError::DivisionByZero(_))
        ));
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            eval(json!({"$concat": ["$title", " (", {"$toUpper": "$title"}, ")"]})).unwrap(),
            Some(Value::from("Dune (DUNE)"))
        );
        assert!(eval(json!({"$concat": ["$title", "$stock"]})).is_err());
    }

    #[test]
    fn test_literal_and_object() {
        assert_eq!(
            eval(json!({"$literal": "$title"})).unwrap(),
            Some(Value::from("$title"))
        );
        let value = eval(json!({"t": "$title", "n": 1})).unwrap().unwrap();
        assert_eq!(value.as_object().unwrap().get("t"), Some(&Value::from("Dune")));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Expression::parse(&json!({"$pow": [2, 3]})).is_err());
        assert!(Expression::parse(&json!({"$subtract": [1]})).is_err());
        assert!(Expression::parse(&json!("$")).is_err());
        assert!(Expression::parse(&json!("$$ROOT")).is_err());
    }
}

//! `$group` accumulators

use super::expression::Expression;
use super::AggregationError;
use crate::document::{Document, NumericOp, Value};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;

/// Accumulator kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorKind {
    Sum,
    Avg,
    Min,
    Max,
    Push,
    AddToSet,
    First,
    Last,
}

impl AccumulatorKind {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "$sum" => AccumulatorKind::Sum,
            "$avg" => AccumulatorKind::Avg,
            "$min" => AccumulatorKind::Min,
            "$max" => AccumulatorKind::Max,
            "$push" => AccumulatorKind::Push,
            "$addToSet" => AccumulatorKind::AddToSet,
            "$first" => AccumulatorKind::First,
            "$last" => AccumulatorKind::Last,
            _ => return None,
        })
    }
}

/// Output field of a `$group` stage: `{"$sum": expr}` and friends
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator {
    pub kind: AccumulatorKind,
    pub expr: Expression,
}

impl Accumulator {
    /// Parse `{"$acc": expr}`
    pub fn parse(field: &str, value: &JsonValue) -> Result<Self, AggregationError> {
        let obj = value
            .as_object()
            .filter(|o| o.len() == 1)
            .ok_or_else(|| {
                AggregationError::InvalidStage(format!(
                    "$group field '{}' must be a single accumulator object",
                    field
                ))
            })?;

        let (name, arg) = obj.iter().next().ok_or_else(|| {
            AggregationError::InvalidStage(format!("$group field '{}' is empty", field))
        })?;

        let kind = AccumulatorKind::from_name(name)
            .ok_or_else(|| AggregationError::UnsupportedOperator(name.clone()))?;

        Ok(Self {
            kind,
            expr: Expression::parse(arg)?,
        })
    }

    /// Fresh running state
    pub fn start(&self) -> AccumulatorState {
        match self.kind {
            AccumulatorKind::Sum => AccumulatorState::Sum(Value::Int32(0)),
            AccumulatorKind::Avg => AccumulatorState::Avg { sum: 0.0, count: 0 },
            AccumulatorKind::Min | AccumulatorKind::Max => AccumulatorState::Extreme(None),
            AccumulatorKind::Push | AccumulatorKind::AddToSet => {
                AccumulatorState::Values(Vec::new())
            }
            AccumulatorKind::First | AccumulatorKind::Last => AccumulatorState::Single(None),
        }
    }

    /// Fold one document into the state
    pub fn accumulate(
        &self,
        state: &mut AccumulatorState,
        doc: &Document,
    ) -> Result<(), AggregationError> {
        let value = self.expr.evaluate(doc)?;

        match (self.kind, state) {
            (AccumulatorKind::Sum, AccumulatorState::Sum(total)) => {
                // non-numeric values are ignored
                if let Some(v) = value.filter(Value::is_number) {
                    if let Some(next) = total.numeric_op(&v, NumericOp::Add) {
                        *total = next;
                    }
                }
            }
            (AccumulatorKind::Avg, AccumulatorState::Avg { sum, count }) => {
                if let Some(f) = value.as_ref().and_then(Value::as_f64) {
                    *sum += f;
                    *count += 1;
                }
            }
            (
                kind @ (AccumulatorKind::Min | AccumulatorKind::Max),
                AccumulatorState::Extreme(current),
            ) => {
                let v = match value {
                    Some(v) if !v.is_null() => v,
                    _ => return Ok(()),
                };
                let wanted = if kind == AccumulatorKind::Min {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
                let replace = match current {
                    Some(existing) => v.cmp_canonical(existing) == wanted,
                    None => true,
                };
                if replace {
                    *current = Some(v);
                }
            }
            (AccumulatorKind::Push, AccumulatorState::Values(values)) => {
                if let Some(v) = value {
                    values.push(v);
                }
            }
            (AccumulatorKind::AddToSet, AccumulatorState::Values(values)) => {
                if let Some(v) = value {
                    if !values.iter().any(|existing| existing.loose_eq(&v)) {
                        values.push(v);
                    }
                }
            }
            (AccumulatorKind::First, AccumulatorState::Single(slot)) => {
                if slot.is_none() {
                    *slot = Some(value.unwrap_or(Value::Null));
                }
            }
            (AccumulatorKind::Last, AccumulatorState::Single(slot)) => {
                *slot = Some(value.unwrap_or(Value::Null));
            }
            (kind, _) => {
                return Err(AggregationError::InvalidStage(format!(
                    "accumulator state does not match {:?}",
                    kind
                )))
            }
        }

        Ok(())
    }
}

/// Running state of one accumulator within one group
#[derive(Debug, Clone, PartialEq)]
pub enum AccumulatorState {
    Sum(Value),
    Avg { sum: f64, count: u64 },
    Extreme(Option<Value>),
    Values(Vec<Value>),
    Single(Option<Value>),
}

impl AccumulatorState {
    /// Final value of the accumulator
    pub fn finish(self) -> Value {
        match self {
            AccumulatorState::Sum(total) => total,
            AccumulatorState::Avg { count: 0, .. } => Value::Null,
            AccumulatorState::Avg { sum, count } => Value::Float64(sum / count as f64),
            AccumulatorState::Extreme(v) | AccumulatorState::Single(v) => v.unwrap_or(Value::Null),
            AccumulatorState::Values(values) => Value::Array(values),
        }
    }
}

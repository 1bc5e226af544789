//! Query parser for converting JSON to Query AST
//!
//! Parses document-store style filter, projection and sort JSON into internal
//! Query structures

use super::ast::{Filter, Projection, ProjectionType, Query, Sort, SortOrder};
use crate::document::Value;
use serde_json::{Map as JsonMap, Value as JsonValue};

/// Default upper bound for `skip`
pub const DEFAULT_MAX_SKIP: u64 = 1_000_000;

/// Default upper bound for `limit`
pub const DEFAULT_MAX_LIMIT: u64 = 100_000;

/// Query parser for JSON queries
pub struct QueryParser;

impl QueryParser {
    /// Parse a query from a JSON string of the form
    /// `{"filter": {...}, "projection": {...}, "sort": {...}, "skip": n, "limit": n}`
    pub fn parse(json: &str) -> Result<Query, QueryParseError> {
        let value: JsonValue =
            serde_json::from_str(json).map_err(|e| QueryParseError::InvalidJson(e.to_string()))?;

        Self::parse_from_value(&value)
    }

    /// Parse a query from a JSON value
    pub fn parse_from_value(value: &JsonValue) -> Result<Query, QueryParseError> {
        let obj = value
            .as_object()
            .ok_or_else(|| QueryParseError::InvalidFormat("Query must be an object".to_string()))?;

        let mut query = Query::new();

        if let Some(filter_value) = obj.get("filter") {
            query.filter = Self::parse_filter(filter_value)?;
        }

        if let Some(proj_value) = obj.get("projection") {
            query.projection = Some(Self::parse_projection(proj_value)?);
        }

        if let Some(sort_value) = obj.get("sort") {
            query.sort = Some(Self::parse_sort(sort_value)?);
        }

        if let Some(skip_value) = obj.get("skip") {
            query.skip = Some(skip_value.as_u64().ok_or_else(|| {
                QueryParseError::InvalidFormat("skip must be a non-negative integer".to_string())
            })?);
        }

        if let Some(limit_value) = obj.get("limit") {
            query.limit = Some(limit_value.as_u64().ok_or_else(|| {
                QueryParseError::InvalidFormat("limit must be a non-negative integer".to_string())
            })?);
        }

        Self::validate(&query)?;
        Ok(query)
    }

    /// Parse a filter from JSON
    pub fn parse_filter(value: &JsonValue) -> Result<Filter, QueryParseError> {
        let obj = value.as_object().ok_or_else(|| {
            QueryParseError::InvalidFormat("Filter must be an object".to_string())
        })?;

        let mut filters = Vec::new();

        for (key, val) in obj {
            if key.starts_with('$') {
                let filter = match key.as_str() {
                    "$and" => Filter::And(Self::parse_filter_list(key, val)?),
                    "$or" => Filter::Or(Self::parse_filter_list(key, val)?),
                    "$nor" => Filter::Nor(Self::parse_filter_list(key, val)?),
                    _ => return Err(QueryParseError::UnsupportedOperator(key.clone())),
                };
                filters.push(filter);
            } else {
                filters.push(Self::parse_field_condition(key, val)?);
            }
        }

        Ok(Self::combine(filters))
    }

    fn parse_filter_list(op: &str, value: &JsonValue) -> Result<Vec<Filter>, QueryParseError> {
        let arr = value
            .as_array()
            .ok_or_else(|| QueryParseError::InvalidFormat(format!("{} must be an array", op)))?;
        if arr.is_empty() {
            return Err(QueryParseError::InvalidFormat(format!(
                "{} must be a non-empty array",
                op
            )));
        }
        arr.iter().map(Self::parse_filter).collect()
    }

    fn combine(mut filters: Vec<Filter>) -> Filter {
        match filters.len() {
            0 => Filter::Empty,
            1 => filters.remove(0),
            _ => Filter::And(filters),
        }
    }

    /// Parse a field condition
    fn parse_field_condition(field: &str, value: &JsonValue) -> Result<Filter, QueryParseError> {
        let obj = match value {
            JsonValue::Object(obj) if Self::is_operator_object(obj)? => obj,
            // Direct value comparison (equality), including embedded documents
            _ => return Ok(Filter::eq(field, Value::from_json(value))),
        };

        let mut filters = Vec::new();

        for (op, val) in obj {
            let filter = match op.as_str() {
                "$eq" => Filter::eq(field, Value::from_json(val)),
                "$ne" => Filter::ne(field, Value::from_json(val)),
                "$gt" => Filter::gt(field, Value::from_json(val)),
                "$gte" => Filter::gte(field, Value::from_json(val)),
                "$lt" => Filter::lt(field, Value::from_json(val)),
                "$lte" => Filter::lte(field, Value::from_json(val)),
                "$in" => Filter::in_values(field, Self::parse_value_list(op, val)?),
                "$nin" => Filter::nin(field, Self::parse_value_list(op, val)?),
                "$exists" => {
                    let exists = match val {
                        JsonValue::Bool(b) => *b,
                        JsonValue::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
                        _ => {
                            return Err(QueryParseError::InvalidFormat(
                                "$exists must be a boolean".to_string(),
                            ))
                        }
                    };
                    Filter::exists(field, exists)
                }
                "$regex" => {
                    let pattern = val.as_str().ok_or_else(|| {
                        QueryParseError::InvalidFormat("$regex must be a string".to_string())
                    })?;
                    let options = match obj.get("$options") {
                        Some(JsonValue::String(s)) => Some(s.clone()),
                        Some(_) => {
                            return Err(QueryParseError::InvalidFormat(
                                "$options must be a string".to_string(),
                            ))
                        }
                        None => None,
                    };
                    Filter::Regex {
                        field: field.to_string(),
                        pattern: pattern.to_string(),
                        options,
                    }
                }
                "$options" => {
                    if !obj.contains_key("$regex") {
                        return Err(QueryParseError::InvalidFormat(
                            "$options requires $regex".to_string(),
                        ));
                    }
                    continue;
                }
                "$not" => {
                    let inner = match val {
                        JsonValue::Object(inner) if !inner.is_empty() => val,
                        _ => {
                            return Err(QueryParseError::InvalidFormat(
                                "$not needs an operator object".to_string(),
                            ))
                        }
                    };
                    Filter::not(Self::parse_field_condition(field, inner)?)
                }
                _ => return Err(QueryParseError::UnsupportedOperator(op.clone())),
            };
            filters.push(filter);
        }

        Ok(Self::combine(filters))
    }

    /// An object is an operator expression when its keys start with `$`.
    /// Mixing operators and plain keys is rejected.
    fn is_operator_object(obj: &JsonMap<String, JsonValue>) -> Result<bool, QueryParseError> {
        let operators = obj.keys().filter(|k| k.starts_with('$')).count();
        if operators == 0 {
            return Ok(false);
        }
        if operators != obj.len() {
            return Err(QueryParseError::InvalidFormat(
                "Cannot mix operators and fields in a condition".to_string(),
            ));
        }
        Ok(true)
    }

    fn parse_value_list(op: &str, value: &JsonValue) -> Result<Vec<Value>, QueryParseError> {
        let arr = value
            .as_array()
            .ok_or_else(|| QueryParseError::InvalidFormat(format!("{} must be an array", op)))?;
        Ok(arr.iter().map(Value::from_json).collect())
    }

    /// Parse projection from JSON
    pub fn parse_projection(value: &JsonValue) -> Result<Projection, QueryParseError> {
        let obj = value.as_object().ok_or_else(|| {
            QueryParseError::InvalidFormat("Projection must be an object".to_string())
        })?;

        let mut projection = Projection::new();

        for (field, val) in obj {
            let include = match val {
                JsonValue::Number(n) => match n.as_i64() {
                    Some(0) => false,
                    Some(1) => true,
                    _ => {
                        return Err(QueryParseError::InvalidFormat(
                            "Projection value must be 0 or 1".to_string(),
                        ))
                    }
                },
                JsonValue::Bool(b) => *b,
                _ => {
                    return Err(QueryParseError::InvalidFormat(
                        "Projection value must be 0, 1, true, or false".to_string(),
                    ))
                }
            };

            projection = if include {
                projection.include(field)
            } else {
                projection.exclude(field)
            };
        }

        Ok(projection)
    }

    /// Parse sort from JSON, keeping key order
    pub fn parse_sort(value: &JsonValue) -> Result<Sort, QueryParseError> {
        let obj = value
            .as_object()
            .ok_or_else(|| QueryParseError::InvalidFormat("Sort must be an object".to_string()))?;

        let mut sort = Sort::new();

        for (field, val) in obj {
            sort = sort.add(field, Self::parse_direction(val)?);
        }

        Ok(sort)
    }

    /// Parse a single direction: `1`, `-1`, `"asc"` or `"desc"`
    pub fn parse_direction(value: &JsonValue) -> Result<SortOrder, QueryParseError> {
        match value {
            JsonValue::Number(n) => match n.as_i64() {
                Some(1) => Ok(SortOrder::Ascending),
                Some(-1) => Ok(SortOrder::Descending),
                _ => Err(QueryParseError::InvalidFormat(
                    "Sort value must be 1 or -1".to_string(),
                )),
            },
            JsonValue::String(s) => match s.as_str() {
                "asc" | "ascending" => Ok(SortOrder::Ascending),
                "desc" | "descending" => Ok(SortOrder::Descending),
                _ => Err(QueryParseError::InvalidFormat(
                    "Sort value must be 'asc' or 'desc'".to_string(),
                )),
            },
            _ => Err(QueryParseError::InvalidFormat(
                "Sort value must be 1, -1, 'asc', or 'desc'".to_string(),
            )),
        }
    }

    /// Validate a query against the default limits
    pub fn validate(query: &Query) -> Result<(), QueryParseError> {
        Self::validate_with_limits(query, DEFAULT_MAX_SKIP, DEFAULT_MAX_LIMIT)
    }

    /// Validate a query against explicit skip/limit bounds
    pub fn validate_with_limits(
        query: &Query,
        max_skip: u64,
        max_limit: u64,
    ) -> Result<(), QueryParseError> {
        if let Some(skip) = query.skip {
            if skip > max_skip {
                return Err(QueryParseError::ValidationError(format!(
                    "Skip value too large (max: {})",
                    max_skip
                )));
            }
        }

        if let Some(limit) = query.limit {
            if limit > max_limit {
                return Err(QueryParseError::ValidationError(format!(
                    "Limit value too large (max: {})",
                    max_limit
                )));
            }
        }

        if let Some(ref projection) = query.projection {
            if projection.is_mixed() {
                return Err(QueryParseError::ValidationError(
                    "Cannot mix inclusion and exclusion in projection (except _id)".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Query parsing errors
#[derive(Debug, thiserror::Error)]
pub enum QueryParseError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_empty_filter() {
        let filter = QueryParser::parse_filter(&json!({})).unwrap();
        assert!(filter.is_empty());
    }

    #[test]
    fn test_parse_simple_equality() {
        let filter = QueryParser::parse_filter(&json!({"genre": "Fiction"})).unwrap();
        assert_eq!(filter, Filter::eq("genre", "Fiction"));
    }

    #[test]
    fn test_parse_comparison_operators() {
        let filter = QueryParser::parse_filter(&json!({"published_year": {"$gt": 2000}})).unwrap();
        assert_eq!(filter, Filter::gt("published_year", 2000i32));
    }

    #[test]
    fn test_parse_range_on_one_field() {
        let filter =
            QueryParser::parse_filter(&json!({"price": {"$gte": 10, "$lt": 20.5}})).unwrap();
        assert_eq!(
            filter,
            Filter::and(vec![Filter::gte("price", 10i32), Filter::lt("price", 20.5)])
        );
    }

    #[test]
    fn test_parse_in_operator() {
        let filter =
            QueryParser::parse_filter(&json!({"genre": {"$in": ["Fiction", "Fantasy"]}})).unwrap();
        match filter {
            Filter::In { field, values } => {
                assert_eq!(field, "genre");
                assert_eq!(values.len(), 2);
            }
            _ => panic!("Expected In filter"),
        }
    }

    #[test]
    fn test_parse_regex_with_options() {
        let filter =
            QueryParser::parse_filter(&json!({"title": {"$regex": "^the", "$options": "i"}}))
                .unwrap();
        assert_eq!(
            filter,
            Filter::Regex {
                field: "title".to_string(),
                pattern: "^the".to_string(),
                options: Some("i".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_and_operator() {
        let filter = QueryParser::parse_filter(&json!({
            "$and": [{"in_stock": true}, {"published_year": {"$gt": 2010}}]
        }))
        .unwrap();

        match filter {
            Filter::And(filters) => assert_eq!(filters.len(), 2),
            _ => panic!("Expected And filter"),
        }
    }

    #[test]
    fn test_parse_logical_with_field_conditions() {
        let filter = QueryParser::parse_filter(&json!({
            "in_stock": true,
            "$or": [{"genre": "Fiction"}, {"genre": "Fantasy"}]
        }))
        .unwrap();

        match filter {
            Filter::And(filters) => {
                assert_eq!(filters[0], Filter::eq("in_stock", true));
                assert!(matches!(filters[1], Filter::Or(_)));
            }
            _ => panic!("Expected implicit And filter"),
        }
    }

    #[test]
    fn test_parse_not_operator() {
        let filter = QueryParser::parse_filter(&json!({"price": {"$not": {"$gt": 20}}})).unwrap();
        assert_eq!(filter, Filter::not(Filter::gt("price", 20i32)));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(QueryParser::parse_filter(&json!([])).is_err());
        assert!(QueryParser::parse_filter(&json!({"$and": []})).is_err());
        assert!(matches!(
            QueryParser::parse_filter(&json!({"$where": "1"})),
            Err(QueryParseError::UnsupportedOperator(_))
        ));
        assert!(matches!(
            QueryParser::parse_filter(&json!({"price": {"$near": 1}})),
            Err(QueryParseError::UnsupportedOperator(_))
        ));
        assert!(QueryParser::parse_filter(&json!({"price": {"$gt": 1, "x": 2}})).is_err());
    }

    #[test]
    fn test_parse_projection() {
        let projection =
            QueryParser::parse_projection(&json!({"title": 1, "author": 1, "price": 1, "_id": 0}))
                .unwrap();
        assert!(projection.is_inclusion());
        assert!(!projection.includes_id());
        assert_eq!(projection.fields.get("title"), Some(&ProjectionType::Include));
    }

    #[test]
    fn test_parse_sort_keeps_key_order() {
        let sort = QueryParser::parse_sort(&json!({"price": -1, "author": 1})).unwrap();
        assert_eq!(
            sort.fields,
            vec![
                ("price".to_string(), SortOrder::Descending),
                ("author".to_string(), SortOrder::Ascending)
            ]
        );
    }

    #[test]
    fn test_parse_full_query() {
        let query = QueryParser::parse(
            r#"{
                "filter": {"genre": "Fiction"},
                "projection": {"title": 1, "_id": 0},
                "sort": {"price": 1},
                "skip": 5,
                "limit": 5
            }"#,
        )
        .unwrap();

        assert_eq!(query.filter, Filter::eq("genre", "Fiction"));
        assert_eq!(query.skip, Some(5));
        assert_eq!(query.limit, Some(5));
    }

    #[test]
    fn test_validate_limits_and_projection() {
        let mut query = Query::new();
        query.skip = Some(2_000_000);
        assert!(QueryParser::validate(&query).is_err());

        query.skip = Some(100);
        query.limit = Some(200_000);
        assert!(QueryParser::validate(&query).is_err());

        query.limit = Some(100);
        assert!(QueryParser::validate(&query).is_ok());
        assert!(QueryParser::validate_with_limits(&query, 10, 1000).is_err());

        let mixed = Query::new().projection(Projection::new().include("title").exclude("price"));
        assert!(QueryParser::validate(&mixed).is_err());
    }
}

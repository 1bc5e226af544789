//! Query Abstract Syntax Tree (AST) definitions
//!
//! Defines filters, projections and sort specifications for `find` requests

use crate::document::{Value, ID_FIELD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Query structure with filter, projection, sort, skip, limit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Query {
    /// Filter conditions
    pub filter: Filter,
    /// Projection (fields to include/exclude)
    pub projection: Option<Projection>,
    /// Sort specification
    pub sort: Option<Sort>,
    /// Number of documents to skip
    pub skip: Option<u64>,
    /// Maximum number of documents to return
    pub limit: Option<u64>,
}

impl Query {
    /// Create a new empty query (matches all documents)
    pub fn new() -> Self {
        Self::with_filter(Filter::Empty)
    }

    /// Create a query with a filter
    pub fn with_filter(filter: Filter) -> Self {
        Self {
            filter,
            projection: None,
            sort: None,
            skip: None,
            limit: None,
        }
    }

    /// Set projection
    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Set sort
    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Set skip
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Set limit
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

/// Filter conditions for queries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", content = "args")]
pub enum Filter {
    /// Empty filter (matches all documents)
    Empty,

    /// Equality: field == value
    Eq { field: String, value: Value },

    /// Not equal: field != value (also matches missing fields)
    Ne { field: String, value: Value },

    /// Greater than: field > value
    Gt { field: String, value: Value },

    /// Greater than or equal: field >= value
    Gte { field: String, value: Value },

    /// Less than: field < value
    Lt { field: String, value: Value },

    /// Less than or equal: field <= value
    Lte { field: String, value: Value },

    /// In: field in [values]
    In { field: String, values: Vec<Value> },

    /// Not in: field not in [values]
    Nin { field: String, values: Vec<Value> },

    /// Exists: field exists (or not)
    Exists { field: String, exists: bool },

    /// Regex: field matches pattern
    Regex {
        field: String,
        pattern: String,
        options: Option<String>,
    },

    /// Logical AND: all conditions must match
    And(Vec<Filter>),

    /// Logical OR: at least one condition must match
    Or(Vec<Filter>),

    /// Logical NOR: no condition may match
    Nor(Vec<Filter>),

    /// Logical NOT: condition must not match
    Not(Box<Filter>),
}

impl Filter {
    /// Create an equality filter
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a not-equal filter
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ne {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a greater-than filter
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gt {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a greater-than-or-equal filter
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gte {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a less-than filter
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lt {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a less-than-or-equal filter
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lte {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create an in filter
    pub fn in_values(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::In {
            field: field.into(),
            values,
        }
    }

    /// Create a not-in filter
    pub fn nin(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::Nin {
            field: field.into(),
            values,
        }
    }

    /// Create an exists filter
    pub fn exists(field: impl Into<String>, exists: bool) -> Self {
        Self::Exists {
            field: field.into(),
            exists,
        }
    }

    /// Create a regex filter
    pub fn regex(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Regex {
            field: field.into(),
            pattern: pattern.into(),
            options: None,
        }
    }

    /// Create an AND filter
    pub fn and(filters: Vec<Filter>) -> Self {
        Self::And(filters)
    }

    /// Create an OR filter
    pub fn or(filters: Vec<Filter>) -> Self {
        Self::Or(filters)
    }

    /// Create a NOR filter
    pub fn nor(filters: Vec<Filter>) -> Self {
        Self::Nor(filters)
    }

    /// Create a NOT filter
    pub fn not(filter: Filter) -> Self {
        Self::Not(Box::new(filter))
    }

    /// Get all fields referenced in this filter
    pub fn get_fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        self.collect_fields(&mut fields);
        fields.sort();
        fields.dedup();
        fields
    }

    fn collect_fields(&self, fields: &mut Vec<String>) {
        match self {
            Filter::Empty => {}
            Filter::And(filters) | Filter::Or(filters) | Filter::Nor(filters) => {
                for f in filters {
                    f.collect_fields(fields);
                }
            }
            Filter::Not(filter) => filter.collect_fields(fields),
            other => {
                if let Some(field) = other.field() {
                    fields.push(field.to_string());
                }
            }
        }
    }

    /// The field of a single-field predicate
    pub fn field(&self) -> Option<&str> {
        match self {
            Filter::Eq { field, .. }
            | Filter::Ne { field, .. }
            | Filter::Gt { field, .. }
            | Filter::Gte { field, .. }
            | Filter::Lt { field, .. }
            | Filter::Lte { field, .. }
            | Filter::In { field, .. }
            | Filter::Nin { field, .. }
            | Filter::Exists { field, .. }
            | Filter::Regex { field, .. } => Some(field.as_str()),
            _ => None,
        }
    }

    /// Top-level conjuncts: the filter itself, or the members of a top-level AND
    pub fn conjuncts(&self) -> Vec<&Filter> {
        match self {
            Filter::Empty => Vec::new(),
            Filter::And(filters) => filters.iter().flat_map(|f| f.conjuncts()).collect(),
            other => vec![other],
        }
    }

    /// Check if this filter is empty (matches all)
    pub fn is_empty(&self) -> bool {
        matches!(self, Filter::Empty)
    }
}

impl Default for Filter {
    fn default() -> Self {
        Filter::Empty
    }
}

/// Projection specification (fields to include/exclude)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Projection {
    /// Field paths with their inclusion flag
    pub fields: BTreeMap<String, ProjectionType>,
}

impl Projection {
    /// Create a new empty projection
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    /// Include a field
    pub fn include(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), ProjectionType::Include);
        self
    }

    /// Exclude a field
    pub fn exclude(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), ProjectionType::Exclude);
        self
    }

    /// Check if this is an inclusion projection
    ///
    /// `_id` alone does not decide the mode unless it is the only entry.
    pub fn is_inclusion(&self) -> bool {
        let non_id_include = self
            .fields
            .iter()
            .any(|(k, t)| k != ID_FIELD && *t == ProjectionType::Include);
        let non_id_exclude = self
            .fields
            .iter()
            .any(|(k, t)| k != ID_FIELD && *t == ProjectionType::Exclude);

        if non_id_include {
            true
        } else if non_id_exclude {
            false
        } else {
            self.fields.get(ID_FIELD) == Some(&ProjectionType::Include)
        }
    }

    /// Check if this is an exclusion projection
    pub fn is_exclusion(&self) -> bool {
        !self.is_inclusion()
    }

    /// Whether `_id` survives the projection
    pub fn includes_id(&self) -> bool {
        self.fields.get(ID_FIELD) != Some(&ProjectionType::Exclude)
    }

    /// Whether non-`_id` fields mix inclusion and exclusion
    pub fn is_mixed(&self) -> bool {
        let mut non_id = self.fields.iter().filter(|(k, _)| k.as_str() != ID_FIELD);
        match non_id.next() {
            Some((_, first)) => non_id.any(|(_, t)| t != first),
            None => false,
        }
    }

    /// Check if a top-level field should be included
    pub fn should_include(&self, field: &str) -> bool {
        if field == ID_FIELD {
            return self.includes_id();
        }
        if self.is_inclusion() {
            self.fields.get(field) == Some(&ProjectionType::Include)
        } else {
            self.fields.get(field) != Some(&ProjectionType::Exclude)
        }
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::new()
    }
}

/// Projection type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProjectionType {
    /// Include the field
    Include,
    /// Exclude the field
    Exclude,
}

/// Sort specification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sort {
    /// Fields to sort by with their order
    pub fields: Vec<(String, SortOrder)>,
}

impl Sort {
    /// Create a new empty sort
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Add a field to sort by
    pub fn add(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.fields.push((field.into(), order));
        self
    }

    /// Sort by field in ascending order
    pub fn asc(self, field: impl Into<String>) -> Self {
        self.add(field, SortOrder::Ascending)
    }

    /// Sort by field in descending order
    pub fn desc(self, field: impl Into<String>) -> Self {
        self.add(field, SortOrder::Descending)
    }

    /// Get the first sort field
    pub fn first_field(&self) -> Option<&str> {
        self.fields.first().map(|(f, _)| f.as_str())
    }

    /// Whether no sort keys were given
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Default for Sort {
    fn default() -> Self {
        Self::new()
    }
}

/// Sort order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending order (1)
    Ascending,
    /// Descending order (-1)
    Descending,
}

impl SortOrder {
    /// Numeric direction as written in key specs
    pub fn as_i32(self) -> i32 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_builder() {
        let query = Query::with_filter(Filter::eq("genre", "Fiction"))
            .projection(Projection::new().include("title").include("price"))
            .sort(Sort::new().asc("price"))
            .skip(5)
            .limit(5);

        assert!(!query.filter.is_empty());
        assert!(query.projection.is_some());
        assert!(query.sort.is_some());
        assert_eq!(query.skip, Some(5));
        assert_eq!(query.limit, Some(5));
    }

    #[test]
    fn test_filter_get_fields() {
        let filter = Filter::and(vec![
            Filter::eq("title", "Dune"),
            Filter::gt("published_year", 1960i32),
            Filter::or(vec![Filter::exists("price", true), Filter::eq("in_stock", true)]),
        ]);

        assert_eq!(
            filter.get_fields(),
            vec!["in_stock", "price", "published_year", "title"]
        );
    }

    #[test]
    fn test_conjuncts_flatten_nested_and() {
        let filter = Filter::and(vec![
            Filter::eq("author", "J.R.R. Tolkien"),
            Filter::and(vec![Filter::gte("published_year", 1950i32)]),
        ]);
        assert_eq!(filter.conjuncts().len(), 2);
        assert!(Filter::Empty.conjuncts().is_empty());

        let or = Filter::or(vec![Filter::eq("a", 1i32)]);
        assert_eq!(or.conjuncts().len(), 1);
    }

    #[test]
    fn test_projection_include() {
        let proj = Projection::new().include("title").include("author");
        assert!(proj.is_inclusion());
        assert!(proj.should_include("title"));
        assert!(proj.should_include("_id"));
        assert!(!proj.should_include("genre"));
    }

    #[test]
    fn test_projection_include_without_id() {
        let proj = Projection::new().include("title").exclude("_id");
        assert!(proj.is_inclusion());
        assert!(!proj.includes_id());
        assert!(!proj.should_include("_id"));
        assert!(!proj.is_mixed());
    }

    #[test]
    fn test_projection_exclude() {
        let proj = Projection::new().exclude("price");
        assert!(proj.is_exclusion());
        assert!(proj.should_include("title"));
        assert!(!proj.should_include("price"));
    }

    #[test]
    fn test_projection_mixed() {
        let proj = Projection::new().include("title").exclude("price");
        assert!(proj.is_mixed());
    }

    #[test]
    fn test_sort_creation() {
        let sort = Sort::new().asc("author").desc("published_year");
        assert_eq!(sort.fields.len(), 2);
        assert_eq!(sort.first_field(), Some("author"));
        assert_eq!(sort.fields[1].1.as_i32(), -1);
    }
}

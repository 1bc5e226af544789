//! Query executor for evaluating queries against candidate documents
//!
//! Executes queries with filtering, projection, sorting, skip, and limit.
//! Candidate selection (collection scan or index scan) is decided by the
//! planner; the executor only sees the documents it is handed.

use super::ast::{Filter, Projection, ProjectionType, Query, Sort, SortOrder};
use crate::document::{Document, Value, ID_FIELD};
use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;

/// Compiled patterns kept before the cache is reset
const MAX_CACHED_REGEXES: usize = 256;

/// Query executor
pub struct QueryExecutor {
    regex_cache: Mutex<HashMap<(String, String), Regex>>,
}

impl QueryExecutor {
    /// Create a new query executor
    pub fn new() -> Self {
        Self {
            regex_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Filter the candidates and apply sort, skip, limit and projection
    pub fn execute(
        &self,
        documents: Vec<Document>,
        query: &Query,
    ) -> Result<Vec<Document>, QueryExecutionError> {
        let mut results = Vec::new();

        for doc in documents {
            if self.matches_filter(&doc, &query.filter)? {
                results.push(doc);
            }
        }

        self.apply_post_processing(results, query)
    }

    /// Check if a document matches a filter
    pub fn matches_filter(
        &self,
        doc: &Document,
        filter: &Filter,
    ) -> Result<bool, QueryExecutionError> {
        match filter {
            Filter::Empty => Ok(true),

            Filter::Eq { field, value } => Ok(Self::matches_eq(doc.get_by_path(field), value)),

            Filter::Ne { field, value } => Ok(!Self::matches_eq(doc.get_by_path(field), value)),

            Filter::Gt { field, value } => Ok(Self::matches_cmp(doc.get_by_path(field), value, |o| {
                o == CmpOrdering::Greater
            })),

            Filter::Gte { field, value } => {
                Ok(Self::matches_cmp(doc.get_by_path(field), value, |o| {
                    o != CmpOrdering::Less
                }))
            }

            Filter::Lt { field, value } => Ok(Self::matches_cmp(doc.get_by_path(field), value, |o| {
                o == CmpOrdering::Less
            })),

            Filter::Lte { field, value } => {
                Ok(Self::matches_cmp(doc.get_by_path(field), value, |o| {
                    o != CmpOrdering::Greater
                }))
            }

            Filter::In { field, values } => {
                let doc_value = doc.get_by_path(field);
                Ok(values.iter().any(|v| Self::matches_eq(doc_value, v)))
            }

            Filter::Nin { field, values } => {
                let doc_value = doc.get_by_path(field);
                Ok(!values.iter().any(|v| Self::matches_eq(doc_value, v)))
            }

            Filter::Exists { field, exists } => Ok(doc.get_by_path(field).is_some() == *exists),

            Filter::Regex {
                field,
                pattern,
                options,
            } => {
                let regex = self.compile_regex(pattern, options.as_deref())?;
                let matched = match doc.get_by_path(field) {
                    Some(Value::String(s)) => regex.is_match(s),
                    Some(Value::Array(items)) => items
                        .iter()
                        .filter_map(Value::as_str)
                        .any(|s| regex.is_match(s)),
                    _ => false,
                };
                Ok(matched)
            }

            Filter::And(filters) => {
                for f in filters {
                    if !self.matches_filter(doc, f)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }

            Filter::Or(filters) => {
                for f in filters {
                    if self.matches_filter(doc, f)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }

            Filter::Nor(filters) => {
                for f in filters {
                    if self.matches_filter(doc, f)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }

            Filter::Not(filter) => Ok(!self.matches_filter(doc, filter)?),
        }
    }

    /// Equality, with array fields matching on any element and null matching missing
    fn matches_eq(doc_value: Option<&Value>, value: &Value) -> bool {
        match doc_value {
            None => value.is_null(),
            Some(v) if v.loose_eq(value) => true,
            Some(Value::Array(items)) => items.iter().any(|item| item.loose_eq(value)),
            Some(_) => false,
        }
    }

    /// Ordered comparison restricted to values of the same type bracket
    fn matches_cmp(
        doc_value: Option<&Value>,
        value: &Value,
        accept: impl Fn(CmpOrdering) -> bool,
    ) -> bool {
        let check = |v: &Value| v.same_bracket(value) && accept(v.cmp_canonical(value));

        match doc_value {
            // a missing field compares as null
            None => value.is_null() && accept(CmpOrdering::Equal),
            Some(v) if check(v) => true,
            Some(Value::Array(items)) => items.iter().any(check),
            Some(_) => false,
        }
    }

    fn compile_regex(
        &self,
        pattern: &str,
        options: Option<&str>,
    ) -> Result<Regex, QueryExecutionError> {
        let opts = options.unwrap_or("").to_string();
        let key = (pattern.to_string(), opts);

        let mut cache = self.regex_cache.lock();
        if let Some(regex) = cache.get(&key) {
            return Ok(regex.clone());
        }

        let regex = RegexBuilder::new(pattern)
            .case_insensitive(key.1.contains('i'))
            .multi_line(key.1.contains('m'))
            .dot_matches_new_line(key.1.contains('s'))
            .ignore_whitespace(key.1.contains('x'))
            .build()
            .map_err(|e| QueryExecutionError::InvalidRegex(e.to_string()))?;

        if cache.len() >= MAX_CACHED_REGEXES {
            cache.clear();
        }
        cache.insert(key, regex.clone());
        Ok(regex)
    }

    /// Apply post-processing (sort, skip, limit, projection)
    pub fn apply_post_processing(
        &self,
        mut documents: Vec<Document>,
        query: &Query,
    ) -> Result<Vec<Document>, QueryExecutionError> {
        if let Some(ref sort) = query.sort {
            Self::apply_sort(&mut documents, sort);
        }

        if let Some(skip) = query.skip {
            if skip > 0 {
                documents = documents.into_iter().skip(skip as usize).collect();
            }
        }

        if let Some(limit) = query.limit {
            // A limit of zero means "no limit"
            if limit > 0 {
                documents.truncate(limit as usize);
            }
        }

        if let Some(ref projection) = query.projection {
            documents = documents
                .iter()
                .map(|doc| Self::apply_projection(doc, projection))
                .collect::<Result<_, _>>()?;
        }

        Ok(documents)
    }

    /// Stable sort; missing fields order as null
    pub fn apply_sort(documents: &mut [Document], sort: &Sort) {
        documents.sort_by(|a, b| Self::compare_documents(a, b, sort));
    }

    /// Compare two documents under a sort specification
    pub fn compare_documents(a: &Document, b: &Document, sort: &Sort) -> CmpOrdering {
        for (field, order) in &sort.fields {
            let a_val = a.get_by_path(field).unwrap_or(&Value::Null);
            let b_val = b.get_by_path(field).unwrap_or(&Value::Null);

            let cmp = a_val.cmp_canonical(b_val);
            let cmp = match order {
                SortOrder::Ascending => cmp,
                SortOrder::Descending => cmp.reverse(),
            };

            if cmp != CmpOrdering::Equal {
                return cmp;
            }
        }
        CmpOrdering::Equal
    }

    /// Apply projection to a single document
    pub fn apply_projection(
        doc: &Document,
        projection: &Projection,
    ) -> Result<Document, QueryExecutionError> {
        if projection.is_inclusion() {
            let mut new_doc = Document::new();

            if projection.includes_id() {
                if let Some(id) = doc.get(ID_FIELD) {
                    new_doc.insert(ID_FIELD, id.clone());
                }
            }

            for (path, kind) in &projection.fields {
                if path == ID_FIELD || *kind != ProjectionType::Include {
                    continue;
                }
                if let Some(value) = doc.get_by_path(path) {
                    new_doc
                        .set_by_path(path, value.clone())
                        .map_err(|e| QueryExecutionError::ExecutionError(e.to_string()))?;
                }
            }

            Ok(new_doc)
        } else {
            let mut new_doc = doc.clone();
            for (path, kind) in &projection.fields {
                if *kind == ProjectionType::Exclude {
                    new_doc.remove_by_path(path);
                }
            }
            Ok(new_doc)
        }
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Query execution errors
#[derive(Debug, thiserror::Error)]
pub enum QueryExecutionError {
    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),
}

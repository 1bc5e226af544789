//! Index selector for choosing the best index for a query
//!
//! Only top-level conjuncts of the filter can drive an index. Each index is
//! scored by how long a prefix of its key fields the filter constrains.
//! `$or`, `$nor`, `$not`, `$ne`, `$nin`, `$exists` and `$regex` never drive
//! an index; they are applied to the fetched documents instead.

use super::ast::{Filter, Sort};
use crate::document::Value;
use crate::index::{FieldBounds, IndexDefinition, IndexKeySpec};
use std::collections::HashSet;
use std::ops::Bound;

/// Index chosen for a query, with the bounds to scan
#[derive(Debug, Clone, PartialEq)]
pub struct IndexChoice {
    pub name: String,
    pub key: IndexKeySpec,
    /// Bounds for the leading key fields
    pub bounds: Vec<FieldBounds>,
    pub score: f64,
}

/// Index selector for choosing optimal indexes
pub struct IndexSelector {
    available_indexes: Vec<IndexDefinition>,
    /// Names of indexes that hold at least one array-valued key
    multikey: HashSet<String>,
}

impl IndexSelector {
    /// Create a new index selector without indexes
    pub fn new() -> Self {
        Self {
            available_indexes: Vec::new(),
            multikey: HashSet::new(),
        }
    }

    /// Create index selector with available indexes
    pub fn with_indexes(indexes: Vec<IndexDefinition>) -> Self {
        Self {
            available_indexes: indexes,
            multikey: HashSet::new(),
        }
    }

    /// Mark indexes as multikey, restricting them to one-sided ranges
    pub fn with_multikey<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.multikey.extend(names.into_iter().map(Into::into));
        self
    }

    /// Select the best index for a filter, if any can be used
    pub fn select_index(&self, filter: &Filter, sort: Option<&Sort>) -> Option<IndexChoice> {
        let conjuncts = filter.conjuncts();
        if conjuncts.is_empty() {
            return None;
        }

        let mut best: Option<IndexChoice> = None;

        for definition in &self.available_indexes {
            let multikey = self.multikey.contains(&definition.name);
            let candidate = match Self::candidate(definition, &conjuncts, sort, multikey) {
                Some(c) => c,
                None => continue,
            };

            // earlier indexes win ties
            let better = match &best {
                Some(current) => candidate.score > current.score,
                None => true,
            };
            if better {
                best = Some(candidate);
            }
        }

        best
    }

    fn candidate(
        definition: &IndexDefinition,
        conjuncts: &[&Filter],
        sort: Option<&Sort>,
        multikey: bool,
    ) -> Option<IndexChoice> {
        let mut bounds = Vec::new();
        let mut equality_prefix = 0usize;

        for (field, _) in &definition.key.fields {
            match bounds_for_field(conjuncts, field, multikey) {
                Some(field_bounds) => {
                    if field_bounds.is_point() && equality_prefix == bounds.len() {
                        equality_prefix += 1;
                    }
                    bounds.push(field_bounds);
                }
                None => break,
            }
        }

        if bounds.is_empty() {
            return None;
        }

        let key_len = definition.key.fields.len();
        let mut score = bounds.len() as f64 * 10.0 + equality_prefix as f64 * 5.0;

        // a unique index fully pinned by equalities returns at most one document
        if definition.unique && equality_prefix == key_len {
            score += 10.0;
        }

        if let Some(sort) = sort {
            if sort.first_field() == definition.key.fields.first().map(|(f, _)| f.as_str()) {
                score += 1.0;
            }
        }

        // prefer narrower indexes when coverage is equal
        score -= (key_len - bounds.len()) as f64 * 0.1;

        Some(IndexChoice {
            name: definition.name.clone(),
            key: definition.key.clone(),
            bounds,
            score,
        })
    }
}

impl Default for IndexSelector {
    fn default() -> Self {
        Self::new()
    }
}

/// Index bounds implied by the conjuncts for one field.
///
/// Equality wins over `$in`, which wins over ranges. Any chosen bound is
/// implied by some conjunct, so the scan returns a superset of the matches.
///
/// On a multikey index two range conjuncts may be satisfied by different
/// array elements, so only one side of the range is used there.
pub fn bounds_for_field(conjuncts: &[&Filter], field: &str, multikey: bool) -> Option<FieldBounds> {
    for filter in on_field(conjuncts, field) {
        if let Filter::Eq { value, .. } = filter {
            if indexable(value) {
                return Some(FieldBounds::point(value.clone()));
            }
        }
    }

    for filter in on_field(conjuncts, field) {
        if let Filter::In { values, .. } = filter {
            if !values.is_empty() && values.iter().all(indexable) {
                return Some(FieldBounds::points(values.clone()));
            }
        }
    }

    let mut lower: Bound<Value> = Bound::Unbounded;
    let mut upper: Bound<Value> = Bound::Unbounded;

    for filter in on_field(conjuncts, field) {
        match filter {
            Filter::Gt { value, .. } if indexable(value) && matches!(lower, Bound::Unbounded) => {
                lower = Bound::Excluded(value.clone());
            }
            Filter::Gte { value, .. } if indexable(value) && matches!(lower, Bound::Unbounded) => {
                lower = Bound::Included(value.clone());
            }
            _ => {}
        }
    }

    let one_sided = multikey && !matches!(lower, Bound::Unbounded);

    for filter in on_field(conjuncts, field).filter(|_| !one_sided) {
        let candidate = match filter {
            Filter::Lt { value, .. } if indexable(value) => Bound::Excluded(value.clone()),
            Filter::Lte { value, .. } if indexable(value) => Bound::Included(value.clone()),
            _ => continue,
        };

        let compatible = match (&lower, &candidate) {
            (Bound::Included(l) | Bound::Excluded(l), Bound::Included(u) | Bound::Excluded(u)) => {
                l.same_bracket(u)
            }
            _ => true,
        };
        if compatible && matches!(upper, Bound::Unbounded) {
            upper = candidate;
        }
    }

    match (&lower, &upper) {
        (Bound::Unbounded, Bound::Unbounded) => None,
        _ => Some(FieldBounds::range(lower, upper)),
    }
}

fn on_field<'a>(
    conjuncts: &'a [&'a Filter],
    field: &'a str,
) -> impl Iterator<Item = &'a Filter> + 'a {
    conjuncts
        .iter()
        .copied()
        .filter(move |f| f.field() == Some(field))
}

/// Array operands match whole arrays, which a multikey index does not store
fn indexable(value: &Value) -> bool {
    !value.is_array()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::QueryParser;
    use serde_json::json;

    fn selector() -> IndexSelector {
        IndexSelector::with_indexes(vec![
            IndexDefinition::primary(),
            IndexDefinition::new(IndexKeySpec::new().asc("title")),
            IndexDefinition::new(IndexKeySpec::new().asc("author").desc("published_year")),
            IndexDefinition::new(IndexKeySpec::new().asc("author")),
        ])
    }

    fn select(filter: serde_json::Value) -> Option<IndexChoice> {
        let filter = QueryParser::parse_filter(&filter).unwrap();
        selector().select_index(&filter, None)
    }

    #[test]
    fn test_no_index_for_empty_filter() {
        assert!(select(json!({})).is_none());
    }

    #[test]
    fn test_equality_uses_single_field_index() {
        let choice = select(json!({"title": "1984"})).unwrap();
        assert_eq!(choice.name, "title_1");
        assert!(choice.bounds[0].is_point());
    }

    #[test]
    fn test_compound_prefix_preferred() {
        let filter = json!({"author": "J.R.R. Tolkien", "published_year": {"$gt": 1940}});
        let choice = select(filter).unwrap();
        assert_eq!(choice.name, "author_1_published_year_-1");
        assert_eq!(choice.bounds.len(), 2);
    }

    #[test]
    fn test_single_field_preferred_when_only_leading_field_constrained() {
        let choice = select(json!({"author": "George Orwell"})).unwrap();
        assert_eq!(choice.name, "author_1");
    }

    #[test]
    fn test_non_leading_field_cannot_drive_index() {
        assert!(select(json!({"published_year": {"$gt": 1950}})).is_none());
    }

    #[test]
    fn test_unsupported_operators_do_not_use_index() {
        assert!(select(json!({"title": {"$ne": "1984"}})).is_none());
        assert!(select(json!({"title": {"$regex": "^The"}})).is_none());
        assert!(select(json!({"title": {"$exists": true}})).is_none());
        assert!(select(json!({"$or": [{"title": "1984"}, {"title": "Dune"}]})).is_none());
    }

    #[test]
    fn test_in_produces_point_bounds() {
        let choice = select(json!({"title": {"$in": ["Dune", "1984"]}})).unwrap();
        assert_eq!(choice.name, "title_1");
        assert_eq!(choice.bounds[0].intervals.len(), 2);
    }

    #[test]
    fn test_range_bounds_combine() {
        let filter = json!({"published_year": {"$gte": 1900, "$lt": 2000}});
        let filter = QueryParser::parse_filter(&filter).unwrap();
        let conjuncts = filter.conjuncts();
        let bounds = bounds_for_field(&conjuncts, "published_year", false).unwrap();
        assert!(bounds.contains(&Value::Int32(1900)));
        assert!(bounds.contains(&Value::Int32(1999)));
        assert!(!bounds.contains(&Value::Int32(2000)));
        assert!(!bounds.contains(&Value::from("1950")));
    }

    #[test]
    fn test_multikey_range_uses_one_side() {
        // [70, 95] satisfies both conjuncts through different elements
        let filter = json!({"ratings": {"$gte": 80, "$lte": 90}});
        let filter = QueryParser::parse_filter(&filter).unwrap();
        let conjuncts = filter.conjuncts();
        let bounds = bounds_for_field(&conjuncts, "ratings", true).unwrap();
        assert!(bounds.contains(&Value::Int32(80)));
        assert!(bounds.contains(&Value::Int32(95)));
        assert!(!bounds.contains(&Value::Int32(70)));

        let upper_only = QueryParser::parse_filter(&json!({"ratings": {"$lt": 50}})).unwrap();
        let conjuncts = upper_only.conjuncts();
        let bounds = bounds_for_field(&conjuncts, "ratings", true).unwrap();
        assert!(bounds.contains(&Value::Int32(10)));
        assert!(!bounds.contains(&Value::Int32(50)));
    }

    #[test]
    fn test_multikey_index_still_selected() {
        let selector = IndexSelector::with_indexes(vec![IndexDefinition::new(
            IndexKeySpec::new().asc("ratings"),
        )])
        .with_multikey(["ratings_1"]);
        let filter = json!({"ratings": {"$gte": 80, "$lte": 90}});
        let filter = QueryParser::parse_filter(&filter).unwrap();

        let choice = selector.select_index(&filter, None).unwrap();
        assert_eq!(choice.name, "ratings_1");
        assert!(choice.bounds[0].contains(&Value::Int32(95)));
    }

    #[test]
    fn test_array_operand_not_indexable() {
        assert!(select(json!({"title": ["a", "b"]})).is_none());
    }
}

//! B-tree index implementation
//!
//! Keys are ordered with the canonical cross-type value order, so index range
//! scans agree with filter comparisons. Array values are indexed per element
//! (multikey).

use super::definition::IndexDefinition;
use crate::document::{Document, ObjectId, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::ops::Bound;

/// B-tree index for efficient document lookups
#[derive(Debug)]
pub struct BTreeIndex {
    definition: IndexDefinition,
    tree: BTreeMap<IndexKey, Vec<ObjectId>>,
    entry_count: usize,
    /// Set once any indexed field held an array; never cleared by removals
    multikey: bool,
}

impl BTreeIndex {
    /// Create a new, empty B-tree index
    pub fn new(definition: IndexDefinition) -> Self {
        Self {
            definition,
            tree: BTreeMap::new(),
            entry_count: 0,
            multikey: false,
        }
    }

    /// Get index name
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Get the index definition
    pub fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    /// Get indexed fields
    pub fn fields(&self) -> Vec<&str> {
        self.definition.key.field_names()
    }

    /// Check if index is unique
    pub fn is_unique(&self) -> bool {
        self.definition.unique
    }

    /// Whether some document stored an array under an indexed field
    pub fn is_multikey(&self) -> bool {
        self.multikey
    }

    /// Keys a document contributes to this index
    pub fn keys_for(&self, document: &Document) -> Vec<IndexKey> {
        let mut keys: Vec<Vec<KeyValue>> = vec![Vec::new()];

        for field in self.fields() {
            let components: Vec<Value> = match document.get_by_path(field) {
                None => vec![Value::Null],
                Some(Value::Array(items)) if !items.is_empty() => {
                    let mut unique: Vec<Value> = Vec::new();
                    for item in items {
                        if !unique.iter().any(|u| u.loose_eq(item)) {
                            unique.push(item.clone());
                        }
                    }
                    unique
                }
                Some(value) => vec![value.clone()],
            };

            keys = keys
                .into_iter()
                .flat_map(|prefix| {
                    components.iter().map(move |component| {
                        let mut key = prefix.clone();
                        key.push(KeyValue(component.clone()));
                        key
                    })
                })
                .collect();
        }

        keys.into_iter().map(IndexKey).collect()
    }

    /// Check that inserting the document would not violate uniqueness
    pub fn check_unique(&self, doc_id: ObjectId, document: &Document) -> Result<(), IndexError> {
        if !self.is_unique() {
            return Ok(());
        }

        for key in self.keys_for(document) {
            if let Some(existing) = self.tree.get(&key) {
                if existing.iter().any(|id| *id != doc_id) {
                    return Err(IndexError::DuplicateKey {
                        index: self.name().to_string(),
                        key: key.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Insert a document into the index
    pub fn insert(&mut self, doc_id: ObjectId, document: &Document) -> Result<(), IndexError> {
        self.check_unique(doc_id, document)?;

        if !self.multikey {
            self.multikey = self
                .fields()
                .iter()
                .any(|field| matches!(document.get_by_path(field), Some(Value::Array(_))));
        }

        for key in self.keys_for(document) {
            let ids = self.tree.entry(key).or_default();
            if !ids.contains(&doc_id) {
                ids.push(doc_id);
                self.entry_count += 1;
            }
        }

        Ok(())
    }

    /// Remove a document from the index
    pub fn remove(&mut self, doc_id: ObjectId, document: &Document) -> bool {
        let mut removed = false;

        for key in self.keys_for(document) {
            if let Some(ids) = self.tree.get_mut(&key) {
                if let Some(pos) = ids.iter().position(|id| *id == doc_id) {
                    ids.remove(pos);
                    self.entry_count -= 1;
                    removed = true;
                }
                if ids.is_empty() {
                    self.tree.remove(&key);
                }
            }
        }

        removed
    }

    /// Find documents by exact key match
    pub fn find_exact(&self, key: &IndexKey) -> Vec<ObjectId> {
        self.tree.get(key).cloned().unwrap_or_default()
    }

    /// Scan keys within per-field bounds.
    ///
    /// `bounds[i]` constrains the i-th key field; fields past `bounds.len()`
    /// are unconstrained. The leading field's intervals drive the B-tree walk.
    pub fn scan(&self, bounds: &[FieldBounds]) -> IndexScan {
        let mut scan = IndexScan::default();
        let mut seen = HashSet::new();

        let leading = match bounds.first() {
            Some(b) => b,
            None => return scan,
        };

        for interval in &leading.intervals {
            let start = match &interval.lower {
                Bound::Included(v) | Bound::Excluded(v) => {
                    Bound::Included(IndexKey(vec![KeyValue(v.clone())]))
                }
                Bound::Unbounded => Bound::Unbounded,
            };

            for (key, ids) in self.tree.range((start, Bound::Unbounded)) {
                let first = &key.0[0].0;
                if interval.past_end(first) {
                    break;
                }
                scan.keys_examined += 1;

                let in_bounds = key
                    .0
                    .iter()
                    .zip(bounds.iter())
                    .all(|(component, field_bounds)| field_bounds.contains(&component.0));

                if in_bounds {
                    for id in ids {
                        if seen.insert(*id) {
                            scan.ids.push(*id);
                        }
                    }
                }
            }
        }

        scan
    }

    /// Get the number of unique keys in the index
    pub fn key_count(&self) -> usize {
        self.tree.len()
    }

    /// Number of (key, document) entries
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Clear all entries from the index
    pub fn clear(&mut self) {
        self.tree.clear();
        self.entry_count = 0;
        self.multikey = false;
    }
}

/// Result of an index scan
#[derive(Debug, Clone, Default)]
pub struct IndexScan {
    /// Matching document ids, deduplicated, in key order
    pub ids: Vec<ObjectId>,
    /// Number of index keys visited
    pub keys_examined: usize,
}

/// Value wrapper ordered by the canonical value order
#[derive(Debug, Clone)]
pub struct KeyValue(pub Value);

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.cmp_canonical(&other.0) == Ordering::Equal
    }
}

impl Eq for KeyValue {}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp_canonical(&other.0)
    }
}

/// Index key for B-tree storage
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexKey(pub Vec<KeyValue>);

impl IndexKey {
    /// Create index key from values
    pub fn from_values(values: Vec<Value>) -> Self {
        Self(values.into_iter().map(KeyValue).collect())
    }

    /// Get values
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.iter().map(|k| &k.0)
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.values().map(|v| v.to_json().to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// One contiguous range of key values
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    pub lower: Bound<Value>,
    pub upper: Bound<Value>,
}

impl Interval {
    /// Single-value interval
    pub fn point(value: Value) -> Self {
        Self {
            lower: Bound::Included(value.clone()),
            upper: Bound::Included(value),
        }
    }

    /// Unbounded on both sides
    pub fn full() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Bracket that bounded sides restrict values to
    fn bracket(&self) -> Option<&Value> {
        match (&self.lower, &self.upper) {
            (Bound::Included(v) | Bound::Excluded(v), _) => Some(v),
            (_, Bound::Included(v) | Bound::Excluded(v)) => Some(v),
            _ => None,
        }
    }

    /// Whether a value lies within the interval (same type bracket only)
    pub fn contains(&self, value: &Value) -> bool {
        if let Some(b) = self.bracket() {
            if !value.same_bracket(b) {
                return false;
            }
        }

        let above_lower = match &self.lower {
            Bound::Included(l) => value.cmp_canonical(l) != Ordering::Less,
            Bound::Excluded(l) => value.cmp_canonical(l) == Ordering::Greater,
            Bound::Unbounded => true,
        };
        let below_upper = match &self.upper {
            Bound::Included(u) => value.cmp_canonical(u) != Ordering::Greater,
            Bound::Excluded(u) => value.cmp_canonical(u) == Ordering::Less,
            Bound::Unbounded => true,
        };

        above_lower && below_upper
    }

    /// Whether an ascending walk has moved beyond this interval
    pub fn past_end(&self, value: &Value) -> bool {
        match &self.upper {
            Bound::Included(u) => value.cmp_canonical(u) == Ordering::Greater,
            Bound::Excluded(u) => value.cmp_canonical(u) != Ordering::Less,
            Bound::Unbounded => match &self.lower {
                Bound::Included(l) | Bound::Excluded(l) => {
                    !value.same_bracket(l) && value.cmp_canonical(l) == Ordering::Greater
                }
                Bound::Unbounded => false,
            },
        }
    }
}

/// Union of intervals constraining one key field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldBounds {
    pub intervals: Vec<Interval>,
}

impl FieldBounds {
    /// Bounds matching exactly one value
    pub fn point(value: Value) -> Self {
        Self {
            intervals: vec![Interval::point(value)],
        }
    }

    /// Bounds matching any of the values
    pub fn points(values: Vec<Value>) -> Self {
        let mut sorted = values;
        sorted.sort_by(|a, b| a.cmp_canonical(b));
        sorted.dedup_by(|a, b| a.loose_eq(b));
        Self {
            intervals: sorted.into_iter().map(Interval::point).collect(),
        }
    }

    /// Single range
    pub fn range(lower: Bound<Value>, upper: Bound<Value>) -> Self {
        Self {
            intervals: vec![Interval { lower, upper }],
        }
    }

    /// Whether every interval is a single point
    pub fn is_point(&self) -> bool {
        self.intervals.iter().all(|i| match (&i.lower, &i.upper) {
            (Bound::Included(l), Bound::Included(u)) => l.loose_eq(u),
            _ => false,
        })
    }

    /// Whether any interval contains the value
    pub fn contains(&self, value: &Value) -> bool {
        self.intervals.iter().any(|i| i.contains(value))
    }
}

/// Index errors
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("E11000 duplicate key error in index '{index}' for key {key}")]
    DuplicateKey { index: String, key: String },

    #[error("Invalid index key spec: {0}")]
    InvalidKeySpec(String),

    #[error("An index named '{name}' already exists with a different key spec")]
    IndexOptionsConflict { name: String },

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Index operation failed: {0}")]
    OperationFailed(String),
}

//! Collection management
//!
//! A collection keeps its documents in natural (insertion) order and owns the
//! index manager that accelerates lookups. All state sits behind one
//! `RwLock`, so reads run concurrently and writes are serialized.

use crate::aggregation::{AggregationError, Pipeline};
use crate::document::{Document, DocumentError, ObjectId, Value, ID_FIELD};
use crate::index::{IndexDefinition, IndexDescriptor, IndexError, IndexManager};
use crate::monitoring::SlowQueryLogger;
use crate::query::{
    Filter, Query, QueryExecutionError, QueryExecutor, QueryParseError, QueryParser, QueryPlan,
    QueryPlanner, UpdateError, UpdateSpec, DEFAULT_MAX_LIMIT, DEFAULT_MAX_SKIP,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Per-collection query limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionOptions {
    pub max_skip: u64,
    pub max_limit: u64,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        Self {
            max_skip: DEFAULT_MAX_SKIP,
            max_limit: DEFAULT_MAX_LIMIT,
        }
    }
}

/// Result of `update_one`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpdateOutcome {
    pub matched_count: u64,
    pub modified_count: u64,
}

/// Execution statistics reported by `explain`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainStats {
    /// `COLLSCAN` or `IXSCAN { field: dir, ... }`
    pub plan_summary: String,
    pub index_name: Option<String>,
    pub keys_examined: u64,
    pub docs_examined: u64,
    pub docs_returned: u64,
    pub time_millis: u64,
}

struct CollectionState {
    /// Documents keyed by insertion sequence
    documents: BTreeMap<u64, Document>,
    positions: HashMap<ObjectId, u64>,
    next_seq: u64,
    indexes: IndexManager,
    updated_at: DateTime<Utc>,
}

/// Candidate documents for a filter, in natural order
struct Selection<'a> {
    plan: QueryPlan,
    keys_examined: u64,
    candidates: Vec<(u64, &'a Document)>,
}

/// Collection managing documents and indexes
pub struct Collection {
    name: String,
    state: RwLock<CollectionState>,
    executor: QueryExecutor,
    options: CollectionOptions,
    slow_queries: Arc<SlowQueryLogger>,
    created_at: DateTime<Utc>,
}

impl Collection {
    /// Create an empty collection with default options
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_options(
            name,
            CollectionOptions::default(),
            Arc::new(SlowQueryLogger::disabled()),
        )
    }

    /// Create an empty collection
    pub fn with_options(
        name: impl Into<String>,
        options: CollectionOptions,
        slow_queries: Arc<SlowQueryLogger>,
    ) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            state: RwLock::new(CollectionState {
                documents: BTreeMap::new(),
                positions: HashMap::new(),
                next_seq: 0,
                indexes: IndexManager::new(name.clone()),
                updated_at: now,
            }),
            name,
            executor: QueryExecutor::new(),
            options,
            slow_queries,
            created_at: now,
        }
    }

    /// Get collection name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get document count
    pub fn document_count(&self) -> u64 {
        self.state.read().documents.len() as u64
    }

    /// Insert a document, assigning an `_id` when absent
    pub fn insert_one(&self, mut doc: Document) -> Result<ObjectId, StorageError> {
        doc.validate()?;

        let id = match doc.get(ID_FIELD) {
            None => {
                let id = ObjectId::new();
                doc.insert(ID_FIELD, id);
                id
            }
            Some(Value::ObjectId(id)) => *id,
            Some(other) => {
                return Err(StorageError::InvalidDocument(format!(
                    "_id must be an ObjectId, found {}",
                    other.type_name()
                )))
            }
        };

        let mut state = self.state.write();
        state.indexes.insert_document(id, &doc)?;

        let seq = state.next_seq;
        state.next_seq += 1;
        state.documents.insert(seq, doc);
        state.positions.insert(id, seq);
        state.updated_at = Utc::now();

        debug!(collection = %self.name, id = %id, "Inserted document");
        Ok(id)
    }

    /// Insert documents in order, stopping at the first failure
    pub fn insert_many(&self, docs: Vec<Document>) -> Result<Vec<ObjectId>, StorageError> {
        let mut ids = Vec::with_capacity(docs.len());
        for doc in docs {
            ids.push(self.insert_one(doc)?);
        }
        debug!(collection = %self.name, count = ids.len(), "Inserted documents");
        Ok(ids)
    }

    /// Run a query: filter, sort, skip, limit, projection
    pub fn find(&self, query: &Query) -> Result<Vec<Document>, StorageError> {
        QueryParser::validate_with_limits(query, self.options.max_skip, self.options.max_limit)?;

        let tracker = self
            .slow_queries
            .start_query("find", format!("{:?}", query.filter), &self.name);

        let state = self.state.read();
        let selection = self.select(&state, query)?;
        let matched = self.filter_candidates(&selection, &query.filter)?;
        let matched_count = matched.len();
        let results = self.executor.apply_post_processing(matched, query)?;

        let elapsed = self.slow_queries.finish_query(tracker);
        debug!(
            collection = %self.name,
            plan = %selection.plan.summary(),
            examined = selection.candidates.len(),
            matched = matched_count,
            returned = results.len(),
            elapsed_us = elapsed.as_micros() as u64,
            "find"
        );

        Ok(results)
    }

    /// First matching document in natural order
    pub fn find_one(&self, filter: &Filter) -> Result<Option<Document>, StorageError> {
        let state = self.state.read();
        let selection = self.select(&state, &Query::with_filter(filter.clone()))?;

        for (_, doc) in &selection.candidates {
            if self.executor.matches_filter(doc, filter)? {
                return Ok(Some((*doc).clone()));
            }
        }
        Ok(None)
    }

    /// Number of matching documents
    pub fn count_documents(&self, filter: &Filter) -> Result<u64, StorageError> {
        let state = self.state.read();
        let selection = self.select(&state, &Query::with_filter(filter.clone()))?;

        let mut count = 0;
        for (_, doc) in &selection.candidates {
            if self.executor.matches_filter(doc, filter)? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Apply an update to the first matching document
    pub fn update_one(
        &self,
        filter: &Filter,
        update: &UpdateSpec,
    ) -> Result<UpdateOutcome, StorageError> {
        update.validate()?;

        let tracker = self
            .slow_queries
            .start_query("update", format!("{:?}", filter), &self.name);

        let mut state = self.state.write();
        let seq = match self.first_match(&state, filter)? {
            Some(seq) => seq,
            None => {
                self.slow_queries.finish_query(tracker);
                debug!(collection = %self.name, "update_one matched nothing");
                return Ok(UpdateOutcome::default());
            }
        };

        let old = state
            .documents
            .get(&seq)
            .cloned()
            .ok_or_else(|| StorageError::Internal(format!("missing document at {}", seq)))?;
        let new = update.apply(&old)?;

        if new == old {
            self.slow_queries.finish_query(tracker);
            return Ok(UpdateOutcome {
                matched_count: 1,
                modified_count: 0,
            });
        }

        let id = old
            .id()
            .ok_or_else(|| StorageError::Internal("stored document without _id".to_string()))?;
        state.indexes.update_document(id, &old, &new)?;
        state.documents.insert(seq, new);
        state.updated_at = Utc::now();

        self.slow_queries.finish_query(tracker);
        debug!(collection = %self.name, id = %id, "Updated document");

        Ok(UpdateOutcome {
            matched_count: 1,
            modified_count: 1,
        })
    }

    /// Delete the first matching document, returning the number deleted
    pub fn delete_one(&self, filter: &Filter) -> Result<u64, StorageError> {
        let mut state = self.state.write();
        let seq = match self.first_match(&state, filter)? {
            Some(seq) => seq,
            None => return Ok(0),
        };

        let doc = match state.documents.remove(&seq) {
            Some(doc) => doc,
            None => return Ok(0),
        };
        if let Some(id) = doc.id() {
            state.positions.remove(&id);
            state.indexes.remove_document(id, &doc);
        }
        state.updated_at = Utc::now();

        debug!(collection = %self.name, "Deleted document");
        Ok(1)
    }

    /// Run an aggregation pipeline over the collection.
    ///
    /// A leading `$match` is planned like a query, so it can use an index.
    pub fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<Document>, StorageError> {
        let tracker = self
            .slow_queries
            .start_query("aggregate", format!("{} stages", pipeline.stages.len()), &self.name);

        let state = self.state.read();
        let input: Vec<Document> = match pipeline.leading_match() {
            Some(filter) => {
                let selection = self.select(&state, &Query::with_filter(filter.clone()))?;
                selection
                    .candidates
                    .iter()
                    .map(|(_, doc)| (*doc).clone())
                    .collect()
            }
            None => state.documents.values().cloned().collect(),
        };
        drop(state);

        let results = pipeline.execute(input)?;
        self.slow_queries.finish_query(tracker);

        debug!(
            collection = %self.name,
            stages = pipeline.stages.len(),
            returned = results.len(),
            "aggregate"
        );
        Ok(results)
    }

    /// Create an index over the existing documents, returning its name
    pub fn create_index(&self, definition: IndexDefinition) -> Result<String, StorageError> {
        let mut state = self.state.write();
        let CollectionState {
            documents,
            positions,
            indexes,
            ..
        } = &mut *state;

        let docs = documents
            .values()
            .filter_map(|doc| doc.id().map(|id| (id, doc)));
        let created = indexes.create_index(definition, docs)?;

        if created.created {
            info!(
                collection = %self.name,
                index = %created.name,
                documents = positions.len(),
                "Index ready"
            );
        }
        Ok(created.name)
    }

    /// Drop a secondary index
    pub fn drop_index(&self, name: &str) -> Result<(), StorageError> {
        self.state.write().indexes.drop_index(name)?;
        Ok(())
    }

    /// Descriptors of all indexes, `_id_` first
    pub fn list_indexes(&self) -> Vec<IndexDescriptor> {
        self.state.read().indexes.list_indexes()
    }

    /// Plan and run a query, reporting execution statistics
    pub fn explain(&self, query: &Query) -> Result<ExplainStats, StorageError> {
        QueryParser::validate_with_limits(query, self.options.max_skip, self.options.max_limit)?;

        let tracker = self
            .slow_queries
            .start_query("explain", format!("{:?}", query.filter), &self.name);

        let state = self.state.read();
        let selection = self.select(&state, query)?;
        let matched = self.filter_candidates(&selection, &query.filter)?;
        let returned = self.executor.apply_post_processing(matched, query)?;

        let elapsed = self.slow_queries.finish_query(tracker);

        Ok(ExplainStats {
            plan_summary: selection.plan.summary(),
            index_name: selection.plan.index().map(|c| c.name.clone()),
            keys_examined: selection.keys_examined,
            docs_examined: selection.candidates.len() as u64,
            docs_returned: returned.len() as u64,
            time_millis: elapsed.as_millis() as u64,
        })
    }

    /// Get collection metadata
    pub fn metadata(&self) -> CollectionMetadata {
        let state = self.state.read();
        CollectionMetadata {
            name: self.name.clone(),
            document_count: state.documents.len() as u64,
            index_count: state.indexes.len(),
            created_at: self.created_at,
            updated_at: state.updated_at,
        }
    }

    /// Plan the query and fetch candidate documents
    fn select<'a>(
        &self,
        state: &'a CollectionState,
        query: &Query,
    ) -> Result<Selection<'a>, StorageError> {
        let planner = QueryPlanner::with_indexes(
            state.indexes.definitions().into_iter().cloned().collect(),
        )
        .with_multikey_indexes(state.indexes.multikey_indexes());
        let plan = planner.create_plan(query);

        let (candidates, keys_examined) = match plan.index() {
            Some(choice) => {
                let scan = state.indexes.scan(&choice.name, &choice.bounds)?;
                let mut seqs: Vec<u64> = scan
                    .ids
                    .iter()
                    .filter_map(|id| state.positions.get(id).copied())
                    .collect();
                seqs.sort_unstable();

                let candidates = seqs
                    .into_iter()
                    .filter_map(|seq| state.documents.get(&seq).map(|doc| (seq, doc)))
                    .collect();
                (candidates, scan.keys_examined as u64)
            }
            None => (
                state
                    .documents
                    .iter()
                    .map(|(seq, doc)| (*seq, doc))
                    .collect(),
                0,
            ),
        };

        Ok(Selection {
            plan,
            keys_examined,
            candidates,
        })
    }

    fn filter_candidates(
        &self,
        selection: &Selection<'_>,
        filter: &Filter,
    ) -> Result<Vec<Document>, StorageError> {
        let mut matched = Vec::new();
        for (_, doc) in &selection.candidates {
            if self.executor.matches_filter(doc, filter)? {
                matched.push((*doc).clone());
            }
        }
        Ok(matched)
    }

    fn first_match(
        &self,
        state: &CollectionState,
        filter: &Filter,
    ) -> Result<Option<u64>, StorageError> {
        let selection = self.select(state, &Query::with_filter(filter.clone()))?;
        for (seq, doc) in &selection.candidates {
            if self.executor.matches_filter(doc, filter)? {
                return Ok(Some(*seq));
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("documents", &self.document_count())
            .finish()
    }
}

/// Collection metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionMetadata {
    pub name: String,
    pub document_count: u64,
    pub index_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Parse(#[from] QueryParseError),

    #[error(transparent)]
    Execution(#[from] QueryExecutionError),

    #[error(transparent)]
    Update(#[from] UpdateError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("Internal storage error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexKeySpec;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        Document::from_json_value(&value).unwrap()
    }

    fn create_test_collection() -> Collection {
        let collection = Collection::new("books");
        collection
            .insert_many(vec![
                doc(json!({"title": "1984", "author": "George Orwell", "genre": "Dystopian", "published_year": 1949, "price": 8.99})),
                doc(json!({"title": "Animal Farm", "author": "George Orwell", "genre": "Political Satire", "published_year": 1945, "price": 7.5})),
                doc(json!({"title": "The Hobbit", "author": "J.R.R. Tolkien", "genre": "Fantasy", "published_year": 1937, "price": 11.0})),
                doc(json!({"title": "The Great Gatsby", "author": "F. Scott Fitzgerald", "genre": "Fiction", "published_year": 1925, "price": 10.99})),
            ])
            .unwrap();
        collection
    }

    fn filter(value: serde_json::Value) -> Filter {
        QueryParser::parse_filter(&value).unwrap()
    }

    #[test]
    fn test_insert_assigns_ids() {
        let collection = create_test_collection();
        assert_eq!(collection.document_count(), 4);

        let all = collection.find(&Query::new()).unwrap();
        assert!(all.iter().all(|d| d.id().is_some()));
        // natural order
        assert_eq!(all[0].get("title"), Some(&Value::from("1984")));
        assert_eq!(all[3].get("title"), Some(&Value::from("The Great Gatsby")));
    }

    #[test]
    fn test_insert_rejects_duplicate_id() {
        let collection = Collection::new("books");
        let id = collection.insert_one(doc(json!({"title": "A"}))).unwrap();

        let mut dup = doc(json!({"title": "B"}));
        dup.insert("_id", id);
        assert!(matches!(
            collection.insert_one(dup),
            Err(StorageError::Index(IndexError::DuplicateKey { .. }))
        ));
        assert_eq!(collection.document_count(), 1);
    }

    #[test]
    fn test_insert_rejects_non_object_id() {
        let collection = Collection::new("books");
        assert!(matches!(
            collection.insert_one(doc(json!({"_id": 5}))),
            Err(StorageError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_find_with_sort_and_projection() {
        let collection = create_test_collection();
        let query = QueryParser::parse_from_value(&json!({
            "filter": {"author": "George Orwell"},
            "projection": {"title": 1, "_id": 0},
            "sort": {"published_year": 1}
        }))
        .unwrap();

        let results = collection.find(&query).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].get("title"), Some(&Value::from("Animal Farm")));
        assert_eq!(results[0].len(), 1);
    }

    #[test]
    fn test_find_respects_configured_limits() {
        let collection = Collection::with_options(
            "books",
            CollectionOptions {
                max_skip: 10,
                max_limit: 10,
            },
            Arc::new(SlowQueryLogger::disabled()),
        );
        let query = Query::new().limit(11);
        assert!(matches!(collection.find(&query), Err(StorageError::Parse(_))));
    }

    #[test]
    fn test_update_one() {
        let collection = create_test_collection();
        let update = UpdateSpec::parse(&json!({"$set": {"price": 15.99}})).unwrap();

        let outcome = collection
            .update_one(&filter(json!({"title": "The Great Gatsby"})), &update)
            .unwrap();
        assert_eq!(outcome, UpdateOutcome { matched_count: 1, modified_count: 1 });

        let again = collection
            .update_one(&filter(json!({"title": "The Great Gatsby"})), &update)
            .unwrap();
        assert_eq!(again, UpdateOutcome { matched_count: 1, modified_count: 0 });

        let none = collection
            .update_one(&filter(json!({"title": "Missing"})), &update)
            .unwrap();
        assert_eq!(none, UpdateOutcome::default());

        let gatsby = collection
            .find_one(&filter(json!({"title": "The Great Gatsby"})))
            .unwrap()
            .unwrap();
        assert_eq!(gatsby.get("price"), Some(&Value::Float64(15.99)));
    }

    #[test]
    fn test_update_only_first_match() {
        let collection = create_test_collection();
        let update = UpdateSpec::parse(&json!({"$inc": {"price": 1}})).unwrap();
        collection
            .update_one(&filter(json!({"author": "George Orwell"})), &update)
            .unwrap();

        let orwell = collection
            .find(&Query::with_filter(filter(json!({"author": "George Orwell"}))))
            .unwrap();
        assert!((orwell[0].get("price").and_then(Value::as_f64).unwrap() - 9.99).abs() < 1e-9);
        assert_eq!(orwell[1].get("price"), Some(&Value::Float64(7.5)));
    }

    #[test]
    fn test_update_maintains_indexes() {
        let collection = create_test_collection();
        collection
            .create_index(IndexDefinition::new(IndexKeySpec::new().asc("published_year")))
            .unwrap();

        let update = UpdateSpec::parse(&json!({"$set": {"published_year": 2000}})).unwrap();
        collection
            .update_one(&filter(json!({"title": "1984"})), &update)
            .unwrap();

        let count = |year: i32| {
            collection
                .count_documents(&filter(json!({"published_year": year})))
                .unwrap()
        };
        assert_eq!(count(1949), 0);
        assert_eq!(count(2000), 1);
    }

    #[test]
    fn test_delete_one() {
        let collection = create_test_collection();
        collection
            .create_index(IndexDefinition::new(IndexKeySpec::new().asc("author")))
            .unwrap();

        assert_eq!(collection.delete_one(&filter(json!({"author": "George Orwell"}))).unwrap(), 1);
        assert_eq!(collection.delete_one(&filter(json!({"title": "Missing"}))).unwrap(), 0);

        let remaining = collection
            .find(&Query::with_filter(filter(json!({"author": "George Orwell"}))))
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].get("title"), Some(&Value::from("Animal Farm")));
        assert_eq!(collection.document_count(), 3);
    }

    #[test]
    fn test_explain_collscan_and_ixscan() {
        let collection = create_test_collection();

        let query = Query::with_filter(filter(json!({"title": "The Hobbit"})));
        let before = collection.explain(&query).unwrap();
        assert_eq!(before.plan_summary, "COLLSCAN");
        assert_eq!(before.docs_examined, 4);
        assert_eq!(before.docs_returned, 1);
        assert_eq!(before.index_name, None);

        let name = collection
            .create_index(IndexDefinition::new(IndexKeySpec::new().asc("title")))
            .unwrap();
        let after = collection.explain(&query).unwrap();
        assert_eq!(after.plan_summary, "IXSCAN { title: 1 }");
        assert_eq!(after.index_name, Some(name));
        assert_eq!(after.keys_examined, 1);
        assert_eq!(after.docs_examined, 1);
        assert_eq!(after.docs_returned, 1);
    }

    #[test]
    fn test_index_and_scan_agree() {
        let collection = create_test_collection();
        let query = QueryParser::parse_from_value(&json!({
            "filter": {"published_year": {"$gte": 1930, "$lt": 1950}},
            "sort": {"title": 1}
        }))
        .unwrap();

        let scanned = collection.find(&query).unwrap();
        collection
            .create_index(IndexDefinition::new(IndexKeySpec::new().desc("published_year")))
            .unwrap();
        let indexed = collection.find(&query).unwrap();

        assert_eq!(scanned, indexed);
        assert_eq!(indexed.len(), 3);
    }

    #[test]
    fn test_array_field_index_and_scan_agree() {
        let collection = Collection::new("books");
        collection
            .insert_many(vec![
                doc(json!({"title": "Split", "ratings": [70, 95]})),
                doc(json!({"title": "Scalar", "ratings": 85})),
                doc(json!({"title": "Low", "ratings": [60, 70]})),
                doc(json!({"title": "Single", "ratings": [88]})),
                doc(json!({"title": "High", "ratings": 100})),
                doc(json!({"title": "Unrated"})),
            ])
            .unwrap();

        let filters = [
            json!({"ratings": {"$gte": 80, "$lte": 90}}),
            json!({"ratings": {"$gt": 65, "$lt": 75}}),
            json!({"ratings": {"$lt": 65}}),
            json!({"ratings": {"$in": [95, 60]}}),
            json!({"ratings": 70}),
        ];
        let titles = |docs: Vec<Document>| -> Vec<String> {
            docs.iter()
                .filter_map(|d| d.get("title").and_then(|t| t.as_str()).map(String::from))
                .collect()
        };

        let scanned: Vec<Vec<String>> = filters
            .iter()
            .map(|f| titles(collection.find(&Query::with_filter(filter(f.clone()))).unwrap()))
            .collect();
        assert_eq!(scanned[0], vec!["Split", "Scalar", "Single"]);
        assert_eq!(scanned[1], vec!["Split", "Low"]);
        assert_eq!(scanned[3], vec!["Split", "Low"]);

        collection
            .create_index(IndexDefinition::new(IndexKeySpec::new().asc("ratings")))
            .unwrap();

        for (f, expected) in filters.iter().zip(scanned) {
            let query = Query::with_filter(filter(f.clone()));
            assert_eq!(collection.explain(&query).unwrap().plan_summary, "IXSCAN { ratings: 1 }");
            assert_eq!(titles(collection.find(&query).unwrap()), expected, "filter {}", f);
        }
    }

    #[test]
    fn test_create_index_idempotent() {
        let collection = create_test_collection();
        let spec = IndexKeySpec::new().asc("author").desc("published_year");
        let first = collection.create_index(IndexDefinition::new(spec.clone())).unwrap();
        let second = collection.create_index(IndexDefinition::new(spec)).unwrap();

        assert_eq!(first, "author_1_published_year_-1");
        assert_eq!(first, second);
        assert_eq!(collection.list_indexes().len(), 2);
        assert_eq!(collection.metadata().index_count, 2);
    }

    #[test]
    fn test_aggregate_uses_whole_collection() {
        let collection = create_test_collection();
        let pipeline = Pipeline::parse(&json!([
            {"$group": {"_id": "$author", "books": {"$sum": 1}}},
            {"$sort": {"books": -1}}
        ]))
        .unwrap();

        let results = collection.aggregate(&pipeline).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].get("_id"), Some(&Value::from("George Orwell")));
        assert_eq!(results[0].get("books"), Some(&Value::Int32(2)));
    }

    #[test]
    fn test_aggregate_with_leading_match_on_index() {
        let collection = create_test_collection();
        collection
            .create_index(IndexDefinition::new(IndexKeySpec::new().asc("genre")))
            .unwrap();
        let pipeline = Pipeline::parse(&json!([
            {"$match": {"genre": "Fantasy"}},
            {"$project": {"_id": 0, "title": 1}}
        ]))
        .unwrap();

        let results = collection.aggregate(&pipeline).unwrap();
        assert_eq!(results, vec![doc(json!({"title": "The Hobbit"}))]);
    }
}

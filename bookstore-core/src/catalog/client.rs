//! Catalog client and the store seam it talks through

use super::book::Book;
use super::cursor::Cursor;
use super::CatalogError;
use crate::aggregation::Pipeline;
use crate::document::{Document, ObjectId};
use crate::index::{IndexDefinition, IndexDescriptor, IndexKeySpec};
use crate::query::{Query, QueryParser, UpdateSpec};
use crate::storage::{Collection, ExplainStats};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Parameters of a `find` request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub filter: JsonValue,
    pub projection: Option<JsonValue>,
    pub sort: Option<JsonValue>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

impl FindOptions {
    pub fn new(filter: JsonValue) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    pub fn projection(mut self, projection: JsonValue) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn sort(mut self, sort: JsonValue) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Parse into an engine query. `null` filter means match all.
    pub fn to_query(&self) -> Result<Query, CatalogError> {
        let filter = match &self.filter {
            JsonValue::Null => crate::query::Filter::Empty,
            other => QueryParser::parse_filter(other)?,
        };

        let mut query = Query::with_filter(filter);
        if let Some(projection) = &self.projection {
            query = query.projection(QueryParser::parse_projection(projection)?);
        }
        if let Some(sort) = &self.sort {
            query = query.sort(QueryParser::parse_sort(sort)?);
        }
        query.skip = self.skip;
        query.limit = self.limit;
        Ok(query)
    }
}

/// Result of `update_one`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

/// Result of `delete_one`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// Document store primitives the catalog is built on.
///
/// Requests are JSON documents in the usual document-store syntax; the store
/// owns parsing, evaluation and all persisted state.
pub trait DocumentStore {
    fn find(&self, options: &FindOptions) -> Result<Vec<Document>, CatalogError>;

    fn find_one(&self, filter: &JsonValue) -> Result<Option<Document>, CatalogError>;

    fn count_documents(&self, filter: &JsonValue) -> Result<u64, CatalogError>;

    fn insert_one(&self, document: Document) -> Result<ObjectId, CatalogError>;

    fn insert_many(&self, documents: Vec<Document>) -> Result<Vec<ObjectId>, CatalogError>;

    fn update_one(&self, filter: &JsonValue, update: &JsonValue)
        -> Result<UpdateResult, CatalogError>;

    fn delete_one(&self, filter: &JsonValue) -> Result<DeleteResult, CatalogError>;

    fn aggregate(&self, pipeline: &JsonValue) -> Result<Vec<Document>, CatalogError>;

    fn create_index(&self, keys: &JsonValue) -> Result<String, CatalogError>;

    fn list_indexes(&self) -> Result<Vec<IndexDescriptor>, CatalogError>;

    fn explain(&self, filter: &JsonValue) -> Result<ExplainStats, CatalogError>;
}

impl DocumentStore for Collection {
    fn find(&self, options: &FindOptions) -> Result<Vec<Document>, CatalogError> {
        Ok(Collection::find(self, &options.to_query()?)?)
    }

    fn find_one(&self, filter: &JsonValue) -> Result<Option<Document>, CatalogError> {
        let filter = QueryParser::parse_filter(filter)?;
        Ok(Collection::find_one(self, &filter)?)
    }

    fn count_documents(&self, filter: &JsonValue) -> Result<u64, CatalogError> {
        let filter = QueryParser::parse_filter(filter)?;
        Ok(Collection::count_documents(self, &filter)?)
    }

    fn insert_one(&self, document: Document) -> Result<ObjectId, CatalogError> {
        Ok(Collection::insert_one(self, document)?)
    }

    fn insert_many(&self, documents: Vec<Document>) -> Result<Vec<ObjectId>, CatalogError> {
        Ok(Collection::insert_many(self, documents)?)
    }

    fn update_one(
        &self,
        filter: &JsonValue,
        update: &JsonValue,
    ) -> Result<UpdateResult, CatalogError> {
        let filter = QueryParser::parse_filter(filter)?;
        let update = UpdateSpec::parse(update)?;
        let outcome = Collection::update_one(self, &filter, &update)?;
        Ok(UpdateResult {
            matched_count: outcome.matched_count,
            modified_count: outcome.modified_count,
        })
    }

    fn delete_one(&self, filter: &JsonValue) -> Result<DeleteResult, CatalogError> {
        let filter = QueryParser::parse_filter(filter)?;
        Ok(DeleteResult {
            deleted_count: Collection::delete_one(self, &filter)?,
        })
    }

    fn aggregate(&self, pipeline: &JsonValue) -> Result<Vec<Document>, CatalogError> {
        let pipeline = Pipeline::parse(pipeline)?;
        Ok(Collection::aggregate(self, &pipeline)?)
    }

    fn create_index(&self, keys: &JsonValue) -> Result<String, CatalogError> {
        let key = IndexKeySpec::parse(keys)?;
        Ok(Collection::create_index(self, IndexDefinition::new(key))?)
    }

    fn list_indexes(&self) -> Result<Vec<IndexDescriptor>, CatalogError> {
        Ok(Collection::list_indexes(self))
    }

    fn explain(&self, filter: &JsonValue) -> Result<ExplainStats, CatalogError> {
        let filter = QueryParser::parse_filter(filter)?;
        Ok(Collection::explain(self, &Query::with_filter(filter))?)
    }
}

impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    fn find(&self, options: &FindOptions) -> Result<Vec<Document>, CatalogError> {
        (**self).find(options)
    }

    fn find_one(&self, filter: &JsonValue) -> Result<Option<Document>, CatalogError> {
        (**self).find_one(filter)
    }

    fn count_documents(&self, filter: &JsonValue) -> Result<u64, CatalogError> {
        (**self).count_documents(filter)
    }

    fn insert_one(&self, document: Document) -> Result<ObjectId, CatalogError> {
        (**self).insert_one(document)
    }

    fn insert_many(&self, documents: Vec<Document>) -> Result<Vec<ObjectId>, CatalogError> {
        (**self).insert_many(documents)
    }

    fn update_one(
        &self,
        filter: &JsonValue,
        update: &JsonValue,
    ) -> Result<UpdateResult, CatalogError> {
        (**self).update_one(filter, update)
    }

    fn delete_one(&self, filter: &JsonValue) -> Result<DeleteResult, CatalogError> {
        (**self).delete_one(filter)
    }

    fn aggregate(&self, pipeline: &JsonValue) -> Result<Vec<Document>, CatalogError> {
        (**self).aggregate(pipeline)
    }

    fn create_index(&self, keys: &JsonValue) -> Result<String, CatalogError> {
        (**self).create_index(keys)
    }

    fn list_indexes(&self) -> Result<Vec<IndexDescriptor>, CatalogError> {
        (**self).list_indexes()
    }

    fn explain(&self, filter: &JsonValue) -> Result<ExplainStats, CatalogError> {
        (**self).explain(filter)
    }
}

fn decode_book(document: Document) -> Result<Book, CatalogError> {
    Ok(document.into_typed()?)
}

fn keep_document(document: Document) -> Result<Document, CatalogError> {
    Ok(document)
}

/// Typed facade over the `books` collection.
///
/// Holds no state of its own; every call is one store primitive.
#[derive(Debug, Clone)]
pub struct CatalogClient<S> {
    store: S,
}

impl<S: DocumentStore> CatalogClient<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Matching books, decoded as the cursor is consumed
    pub fn find_by_filter(&self, options: &FindOptions) -> Result<Cursor<Book>, CatalogError> {
        Ok(Cursor::new(self.store.find(options)?, decode_book))
    }

    /// Matching raw documents, for projections that drop book fields
    pub fn find_documents(&self, options: &FindOptions) -> Result<Cursor<Document>, CatalogError> {
        Ok(Cursor::new(self.store.find(options)?, keep_document))
    }

    pub fn find_one(&self, filter: &JsonValue) -> Result<Option<Book>, CatalogError> {
        self.store.find_one(filter)?.map(decode_book).transpose()
    }

    pub fn count_documents(&self, filter: &JsonValue) -> Result<u64, CatalogError> {
        self.store.count_documents(filter)
    }

    pub fn insert_one(&self, book: &Book) -> Result<ObjectId, CatalogError> {
        self.store.insert_one(Document::from_typed(book)?)
    }

    pub fn insert_many(&self, books: &[Book]) -> Result<Vec<ObjectId>, CatalogError> {
        let documents = books
            .iter()
            .map(Document::from_typed)
            .collect::<Result<Vec<_>, _>>()?;
        self.store.insert_many(documents)
    }

    /// Update the first matching book. No match is zero counts, not an error.
    pub fn update_one(
        &self,
        filter: &JsonValue,
        patch: &JsonValue,
    ) -> Result<UpdateResult, CatalogError> {
        self.store.update_one(filter, patch)
    }

    /// Delete the first matching book. No match is a zero count, not an error.
    pub fn delete_one(&self, filter: &JsonValue) -> Result<DeleteResult, CatalogError> {
        self.store.delete_one(filter)
    }

    pub fn aggregate(&self, pipeline: &JsonValue) -> Result<Cursor<Document>, CatalogError> {
        Ok(Cursor::new(self.store.aggregate(pipeline)?, keep_document))
    }

    pub fn create_index(&self, keys: &JsonValue) -> Result<String, CatalogError> {
        self.store.create_index(keys)
    }

    pub fn list_indexes(&self) -> Result<Vec<IndexDescriptor>, CatalogError> {
        self.store.list_indexes()
    }

    pub fn explain(&self, filter: &JsonValue) -> Result<ExplainStats, CatalogError> {
        self.store.explain(filter)
    }
}

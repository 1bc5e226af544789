//! Index manager for coordinating index operations
//!
//! Manages the indexes of one collection. The implicit `_id_` index always
//! exists and cannot be replaced.

use super::btree::{BTreeIndex, FieldBounds, IndexError, IndexScan};
use super::definition::{IndexDefinition, IndexDescriptor, ID_INDEX_NAME};
use crate::document::{Document, ObjectId};
use tracing::{debug, info};

/// Outcome of `create_index`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedIndex {
    pub name: String,
    /// False when an index with the same key spec already existed
    pub created: bool,
}

/// Index manager for a collection
#[derive(Debug)]
pub struct IndexManager {
    collection_name: String,
    /// Indexes in creation order, `_id_` first
    indexes: Vec<BTreeIndex>,
}

impl IndexManager {
    /// Create a manager holding only the `_id_` index
    pub fn new(collection_name: impl Into<String>) -> Self {
        Self {
            collection_name: collection_name.into(),
            indexes: vec![BTreeIndex::new(IndexDefinition::primary())],
        }
    }

    /// Create an index and build it over the existing documents.
    ///
    /// Creating an index whose key spec already exists returns the existing
    /// name. Reusing a name with a different key spec is a conflict.
    pub fn create_index<'a>(
        &mut self,
        definition: IndexDefinition,
        documents: impl Iterator<Item = (ObjectId, &'a Document)>,
    ) -> Result<CreatedIndex, IndexError> {
        definition.key.validate()?;

        if let Some(existing) = self
            .indexes
            .iter()
            .find(|idx| idx.definition().key == definition.key)
        {
            if existing.name() == definition.name {
                debug!(
                    collection = %self.collection_name,
                    index = %definition.name,
                    "Index already exists"
                );
                return Ok(CreatedIndex {
                    name: existing.name().to_string(),
                    created: false,
                });
            }
        }

        if let Some(existing) = self.get(&definition.name) {
            if existing.definition().key != definition.key {
                return Err(IndexError::IndexOptionsConflict {
                    name: definition.name,
                });
            }
        }

        if let Some(existing) = self
            .indexes
            .iter()
            .find(|idx| idx.definition().key == definition.key)
        {
            return Err(IndexError::IndexOptionsConflict {
                name: existing.name().to_string(),
            });
        }

        let mut index = BTreeIndex::new(definition);
        let mut built = 0usize;
        for (id, doc) in documents {
            index.insert(id, doc)?;
            built += 1;
        }

        let name = index.name().to_string();
        info!(
            collection = %self.collection_name,
            index = %name,
            documents = built,
            keys = index.key_count(),
            "Created index"
        );
        self.indexes.push(index);

        Ok(CreatedIndex {
            name,
            created: true,
        })
    }

    /// Drop a secondary index
    pub fn drop_index(&mut self, name: &str) -> Result<(), IndexError> {
        if name == ID_INDEX_NAME {
            return Err(IndexError::OperationFailed(
                "cannot drop the _id_ index".to_string(),
            ));
        }

        let pos = self
            .indexes
            .iter()
            .position(|idx| idx.name() == name)
            .ok_or_else(|| IndexError::IndexNotFound(name.to_string()))?;
        self.indexes.remove(pos);

        info!(collection = %self.collection_name, index = %name, "Dropped index");
        Ok(())
    }

    /// Insert document into all indexes.
    ///
    /// Uniqueness is checked on every index before any is modified, so a
    /// failed insert leaves all indexes untouched.
    pub fn insert_document(
        &mut self,
        doc_id: ObjectId,
        document: &Document,
    ) -> Result<(), IndexError> {
        for index in &self.indexes {
            index.check_unique(doc_id, document)?;
        }
        for index in &mut self.indexes {
            index.insert(doc_id, document)?;
        }
        Ok(())
    }

    /// Replace a document's entries in all indexes
    pub fn update_document(
        &mut self,
        doc_id: ObjectId,
        old_document: &Document,
        new_document: &Document,
    ) -> Result<(), IndexError> {
        self.remove_document(doc_id, old_document);

        if let Err(e) = self.insert_document(doc_id, new_document) {
            // restore the previous entries
            self.insert_document(doc_id, old_document)?;
            return Err(e);
        }

        Ok(())
    }

    /// Remove document from all indexes
    pub fn remove_document(&mut self, doc_id: ObjectId, document: &Document) {
        for index in &mut self.indexes {
            index.remove(doc_id, document);
        }
    }

    /// Scan an index with per-field bounds
    pub fn scan(&self, name: &str, bounds: &[FieldBounds]) -> Result<IndexScan, IndexError> {
        let index = self
            .get(name)
            .ok_or_else(|| IndexError::IndexNotFound(name.to_string()))?;
        Ok(index.scan(bounds))
    }

    /// Get an index by name
    pub fn get(&self, name: &str) -> Option<&BTreeIndex> {
        self.indexes.iter().find(|idx| idx.name() == name)
    }

    /// Check if an index exists
    pub fn has_index(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Index definitions in creation order
    pub fn definitions(&self) -> Vec<&IndexDefinition> {
        self.indexes.iter().map(|idx| idx.definition()).collect()
    }

    /// Names of indexes that have stored an array-valued key
    pub fn multikey_indexes(&self) -> Vec<&str> {
        self.indexes
            .iter()
            .filter(|idx| idx.is_multikey())
            .map(|idx| idx.name())
            .collect()
    }

    /// Descriptors for all indexes, `_id_` first
    pub fn list_indexes(&self) -> Vec<IndexDescriptor> {
        self.indexes
            .iter()
            .map(|idx| idx.definition().descriptor())
            .collect()
    }

    /// Number of indexes including `_id_`
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    /// Always false: the `_id_` index is permanent
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// Remove all entries while keeping definitions
    pub fn clear(&mut self) {
        for index in &mut self.indexes {
            index.clear();
        }
    }
}

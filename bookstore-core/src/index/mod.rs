//! Secondary indexes for collections
//!
//! This module provides B-tree based indexing with support for:
//! - Single field and compound indexes
//! - Multikey entries for array fields
//! - Unique indexes (the implicit `_id_` index)

pub mod btree;
pub mod definition;
pub mod manager;

pub use btree::{BTreeIndex, FieldBounds, IndexError, IndexKey, IndexScan, Interval, KeyValue};
pub use definition::{IndexDefinition, IndexDescriptor, IndexKeySpec, ID_INDEX_NAME};
pub use manager::{CreatedIndex, IndexManager};

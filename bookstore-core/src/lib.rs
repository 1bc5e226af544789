//! Bookstore Core - document engine and catalog client
//!
//! This crate provides:
//! - Documents, values and extended-JSON conversion
//! - Filter, projection, sort and update evaluation
//! - Aggregation pipelines
//! - Multikey B-tree indexes with plan selection and explain
//! - The typed catalog client over the `books` collection

pub mod aggregation;
pub mod catalog;
pub mod config;
pub mod document;
pub mod index;
pub mod monitoring;
pub mod query;
pub mod storage;

pub use aggregation::*;
pub use catalog::{
    Book, CatalogClient, CatalogError, Cursor, DeleteResult, DocumentStore, FindOptions,
    UpdateResult,
};
pub use config::*;
pub use document::*;
pub use index::*;
pub use monitoring::*;
pub use query::*;
pub use storage::*;

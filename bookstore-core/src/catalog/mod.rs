//! Catalog client for the `books` collection
//!
//! A thin typed facade: every operation is one call on a [`DocumentStore`],
//! with results decoded into [`Book`] records where the shape allows.

pub mod book;
pub mod client;
pub mod cursor;

pub use book::Book;
pub use client::{CatalogClient, DeleteResult, DocumentStore, FindOptions, UpdateResult};
pub use cursor::Cursor;

use crate::aggregation::AggregationError;
use crate::document::DocumentError;
use crate::index::IndexError;
use crate::query::{QueryParseError, UpdateError};
use crate::storage::StorageError;

/// Catalog errors. Store failures pass through unchanged.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error(transparent)]
    Parse(#[from] QueryParseError),

    #[error(transparent)]
    Update(#[from] UpdateError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Failed to decode result: {0}")]
    Decode(String),
}

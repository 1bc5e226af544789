//! In-process document storage
//!
//! Collections keep documents in natural order and maintain their indexes;
//! a database is a registry of collections.

pub mod collection;
pub mod database;

pub use collection::*;
pub use database::*;

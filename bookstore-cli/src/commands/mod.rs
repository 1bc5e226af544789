pub mod config;
pub mod query;
pub mod report;

pub use config::*;
pub use query::*;
pub use report::*;

use anyhow::Result;
use bookstore_core::document::Document;
use serde::Serialize;

/// Print a serializable value as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print each document as pretty JSON
pub fn print_documents<I>(documents: I) -> Result<usize>
where
    I: IntoIterator<Item = Document>,
{
    let mut count = 0;
    for doc in documents {
        print_json(&doc.to_json_value())?;
        count += 1;
    }
    Ok(count)
}

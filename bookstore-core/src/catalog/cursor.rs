//! Lazily decoding result cursor

use super::CatalogError;
use crate::document::Document;
use std::vec;

/// Iterator over query results, decoding each document as it is consumed
pub struct Cursor<T> {
    documents: vec::IntoIter<Document>,
    decode: fn(Document) -> Result<T, CatalogError>,
}

impl<T> Cursor<T> {
    pub(crate) fn new(
        documents: Vec<Document>,
        decode: fn(Document) -> Result<T, CatalogError>,
    ) -> Self {
        Self {
            documents: documents.into_iter(),
            decode,
        }
    }

    /// Number of results not yet consumed
    pub fn remaining(&self) -> usize {
        self.documents.len()
    }

    /// Drain the cursor, stopping at the first decode failure
    pub fn try_collect(self) -> Result<Vec<T>, CatalogError> {
        self.collect()
    }
}

impl<T> Iterator for Cursor<T> {
    type Item = Result<T, CatalogError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.documents.next().map(self.decode)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.documents.size_hint()
    }
}

impl<T> ExactSizeIterator for Cursor<T> {}

impl<T> std::fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("remaining", &self.remaining())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Value;

    fn title(doc: Document) -> Result<String, CatalogError> {
        match doc.get("title") {
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Err(CatalogError::Decode("missing title".to_string())),
        }
    }

    #[test]
    fn test_cursor_decodes_lazily() {
        let mut good = Document::new();
        good.insert("title", "Beloved");
        let bad = Document::new();

        let mut cursor = Cursor::new(vec![good, bad], title);
        assert_eq!(cursor.remaining(), 2);
        assert_eq!(cursor.next().unwrap().unwrap(), "Beloved");
        assert!(cursor.next().unwrap().is_err());
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_try_collect_stops_on_error() {
        let cursor = Cursor::new(vec![Document::new()], title);
        assert!(cursor.try_collect().is_err());
    }
}

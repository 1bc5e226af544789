use anyhow::{anyhow, Context, Result};
use bookstore_core::catalog::CatalogClient;
use bookstore_core::config::CatalogConfig;
use bookstore_core::document::Document;
use bookstore_core::monitoring::SlowQueryLogger;
use bookstore_core::storage::{Collection, Database};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Catalog client over the configured collection, seeded from a JSON array file
pub fn open_catalog(
    config: &CatalogConfig,
    slow_queries: Arc<SlowQueryLogger>,
    seed: &Path,
) -> Result<CatalogClient<Arc<Collection>>> {
    let documents = load_seed(seed)?;

    let database = Database::from_config(config, slow_queries);
    let books = database.collection(&config.database.collection);
    let count = documents.len();
    books
        .insert_many(documents)
        .with_context(|| format!("Failed to seed {}", seed.display()))?;

    info!(
        "Seeded {}.{} with {} documents",
        database.name(),
        books.name(),
        count
    );
    Ok(CatalogClient::new(books))
}

/// Read a seed file holding a JSON array of documents
pub fn load_seed(path: &Path) -> Result<Vec<Document>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file: {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse seed file: {}", path.display()))?;

    let items = value
        .as_array()
        .ok_or_else(|| anyhow!("Seed file must contain a JSON array: {}", path.display()))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            Document::from_json_value(item)
                .with_context(|| format!("Invalid document at index {} in seed file", i))
        })
        .collect()
}

/// Parse a JSON command-line argument
pub fn parse_json_arg(name: &str, raw: &str) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("Invalid JSON for --{}: {}", name, raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_seed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("books.json");
        std::fs::write(&path, r#"[{"title": "Dune"}, {"title": "Emma"}]"#).unwrap();

        let docs = load_seed(&path).unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn test_load_seed_rejects_non_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("books.json");
        std::fs::write(&path, r#"{"title": "Dune"}"#).unwrap();
        assert!(load_seed(&path).is_err());

        std::fs::write(&path, r#"[{"title": "Dune"}, 3]"#).unwrap();
        assert!(load_seed(&path).is_err());
    }

    #[test]
    fn test_open_catalog_uses_configured_collection() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("books.json");
        std::fs::write(&path, r#"[{"title": "Dune"}]"#).unwrap();

        let mut config = CatalogConfig::default();
        config.database.collection = "archive".to_string();
        let client = open_catalog(&config, Arc::new(SlowQueryLogger::disabled()), &path).unwrap();

        assert_eq!(client.store().name(), "archive");
        assert_eq!(client.count_documents(&serde_json::json!({})).unwrap(), 1);
    }

    #[test]
    fn test_parse_json_arg() {
        assert!(parse_json_arg("filter", r#"{"genre": "Fiction"}"#).is_ok());
        assert!(parse_json_arg("filter", "{genre: Fiction}").is_err());
    }
}

//! Named database holding a set of collections

use super::collection::{Collection, CollectionOptions};
use crate::config::CatalogConfig;
use crate::monitoring::SlowQueryLogger;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Database: a registry of collections created on first use
pub struct Database {
    name: String,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
    options: CollectionOptions,
    slow_queries: Arc<SlowQueryLogger>,
}

impl Database {
    /// Create an empty database with default options
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_options(
            name,
            CollectionOptions::default(),
            Arc::new(SlowQueryLogger::disabled()),
        )
    }

    /// Create an empty database whose collections share these options
    pub fn with_options(
        name: impl Into<String>,
        options: CollectionOptions,
        slow_queries: Arc<SlowQueryLogger>,
    ) -> Self {
        Self {
            name: name.into(),
            collections: RwLock::new(HashMap::new()),
            options,
            slow_queries,
        }
    }

    /// Database configured from catalog settings
    pub fn from_config(config: &CatalogConfig, slow_queries: Arc<SlowQueryLogger>) -> Self {
        Self::with_options(
            config.database.name.clone(),
            CollectionOptions {
                max_skip: config.query.max_skip,
                max_limit: config.query.max_limit,
            },
            slow_queries,
        )
    }

    /// Get database name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a collection, creating it if it does not exist
    pub fn collection(&self, name: &str) -> Arc<Collection> {
        if let Some(existing) = self.collections.read().get(name) {
            return existing.clone();
        }

        let mut collections = self.collections.write();
        collections
            .entry(name.to_string())
            .or_insert_with(|| {
                info!(database = %self.name, collection = name, "Creating collection");
                Arc::new(Collection::with_options(
                    name,
                    self.options,
                    self.slow_queries.clone(),
                ))
            })
            .clone()
    }

    /// Remove a collection, returning whether it existed
    pub fn drop_collection(&self, name: &str) -> bool {
        self.collections.write().remove(name).is_some()
    }

    /// Names of all collections, sorted
    pub fn list_collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Shared slow query log
    pub fn slow_queries(&self) -> &Arc<SlowQueryLogger> {
        &self.slow_queries
    }
}

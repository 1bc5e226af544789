//! Configuration management for the catalog
//!
//! This module provides:
//! - TOML configuration with defaults for every setting
//! - Configuration validation
//! - Conversion into the logging and query settings used by the engine

use crate::monitoring::LoggingConfig;
use crate::query::{DEFAULT_MAX_LIMIT, DEFAULT_MAX_SKIP};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Catalog configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CatalogConfig {
    /// Database settings
    pub database: DatabaseSettings,
    /// Query settings
    pub query: QuerySettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Database name
    pub name: String,
    /// Collection holding the books
    pub collection: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Largest accepted `skip`
    pub max_skip: u64,
    /// Largest accepted `limit`
    pub max_limit: u64,
    /// Operations slower than this are logged as slow queries
    pub slow_query_threshold_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level
    pub level: LogLevel,
    /// Log format
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            name: "plp_bookstore".to_string(),
            collection: "books".to_string(),
        }
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            max_skip: DEFAULT_MAX_SKIP,
            max_limit: DEFAULT_MAX_LIMIT,
            slow_query_threshold_ms: 100,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Text,
        }
    }
}

impl CatalogConfig {
    /// Load configuration from a TOML file; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: CatalogConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory: {}", parent.display())
                })?;
            }
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.name.trim().is_empty() {
            return Err(anyhow::anyhow!("Database name cannot be empty"));
        }

        if self.database.collection.trim().is_empty() {
            return Err(anyhow::anyhow!("Collection name cannot be empty"));
        }

        if self.database.collection.starts_with('$')
            || self.database.name.contains(['/', '.', ' '])
        {
            return Err(anyhow::anyhow!(
                "Invalid database or collection name: {}.{}",
                self.database.name,
                self.database.collection
            ));
        }

        if self.query.max_limit == 0 {
            return Err(anyhow::anyhow!("Max limit cannot be 0"));
        }

        if self.query.max_skip == 0 {
            return Err(anyhow::anyhow!("Max skip cannot be 0"));
        }

        Ok(())
    }

    /// Logging configuration derived from these settings
    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.logging.level.as_str().to_uppercase(),
            json_format: self.logging.format == LogFormat::Json,
            slow_query_logging: true,
            slow_query_threshold_ms: self.query.slow_query_threshold_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = CatalogConfig::default();
        assert_eq!(config.database.name, "plp_bookstore");
        assert_eq!(config.database.collection, "books");
        assert_eq!(config.query.max_skip, 1_000_000);
        assert_eq!(config.query.max_limit, 100_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = CatalogConfig::default();
        config.database.collection = String::new();
        assert!(config.validate().is_err());

        let mut config = CatalogConfig::default();
        config.query.max_limit = 0;
        assert!(config.validate().is_err());

        let mut config = CatalogConfig::default();
        config.database.name = "plp.bookstore".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = CatalogConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, CatalogConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("catalog.toml");

        let mut config = CatalogConfig::default();
        config.database.collection = "books_archive".to_string();
        config.logging.format = LogFormat::Json;
        config.save(&path).unwrap();

        assert_eq!(CatalogConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.toml");
        std::fs::write(&path, "[query]\nmax_limit = 50\n\n[logging]\nlevel = \"debug\"\n").unwrap();

        let config = CatalogConfig::load(&path).unwrap();
        assert_eq!(config.query.max_limit, 50);
        assert_eq!(config.query.max_skip, 1_000_000);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.database.collection, "books");
    }

    #[test]
    fn test_unknown_level_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.toml");
        std::fs::write(&path, "[logging]\nlevel = \"loud\"\n").unwrap();
        assert!(CatalogConfig::load(&path).is_err());
    }

    #[test]
    fn test_logging_config_conversion() {
        let mut config = CatalogConfig::default();
        config.logging.level = LogLevel::Warn;
        config.query.slow_query_threshold_ms = 250;

        let logging = config.logging_config();
        assert_eq!(logging.level, "WARN");
        assert!(!logging.json_format);
        assert_eq!(logging.slow_query_threshold_ms, 250);
    }
}

//! Structured logging system with tracing
//!
//! Provides configurable logging with JSON output and slow query logging

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

/// Maximum number of slow queries kept in memory
const MAX_SLOW_QUERIES: usize = 1000;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub level: String,

    /// Enable JSON format output
    pub json_format: bool,

    /// Enable slow query logging
    pub slow_query_logging: bool,

    /// Slow query threshold in milliseconds
    pub slow_query_threshold_ms: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            json_format: false,
            slow_query_logging: true,
            slow_query_threshold_ms: 100,
        }
    }
}

impl LoggingConfig {
    /// Parse log level from string
    pub fn parse_level(&self) -> Level {
        match self.level.to_uppercase().as_str() {
            "ERROR" => Level::ERROR,
            "WARN" => Level::WARN,
            "INFO" => Level::INFO,
            "DEBUG" => Level::DEBUG,
            "TRACE" => Level::TRACE,
            _ => Level::INFO,
        }
    }

    /// Slow query logger matching this configuration
    pub fn slow_query_logger(&self) -> SlowQueryLogger {
        SlowQueryLogger::new(
            Duration::from_millis(self.slow_query_threshold_ms),
            self.slow_query_logging,
        )
    }
}

/// Initialize the logging system.
///
/// `RUST_LOG` takes precedence over the configured level. Fails if a global
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<SlowQueryLogger> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.parse_level().as_str().to_lowercase()));

    let subscriber = Registry::default().with(env_filter);

    if config.json_format {
        let json_layer = fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true)
            .with_writer(std::io::stderr);

        subscriber
            .with(json_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))?;
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(std::io::stderr)
            .compact();

        subscriber
            .with(fmt_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))?;
    }

    tracing::info!(
        "Logging initialized: level={}, json={}, slow_queries={}",
        config.level,
        config.json_format,
        config.slow_query_logging
    );

    Ok(config.slow_query_logger())
}

/// Slow query logger
#[derive(Debug)]
pub struct SlowQueryLogger {
    threshold: Duration,
    enabled: bool,
    queries: RwLock<Vec<SlowQuery>>,
}

/// Slow query record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlowQuery {
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub operation: String,
    pub query: String,
    pub collection: String,
}

/// Query execution tracker
#[derive(Debug)]
pub struct QueryTracker {
    start_time: Instant,
    operation: &'static str,
    query: String,
    collection: String,
}

impl QueryTracker {
    /// Time since the query started
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl SlowQueryLogger {
    /// Create a new slow query logger
    pub fn new(threshold: Duration, enabled: bool) -> Self {
        Self {
            threshold,
            enabled,
            queries: RwLock::new(Vec::new()),
        }
    }

    /// Logger that never records anything
    pub fn disabled() -> Self {
        Self::new(Duration::MAX, false)
    }

    /// Slow query threshold
    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Start tracking a query
    pub fn start_query(
        &self,
        operation: &'static str,
        query: impl Into<String>,
        collection: impl Into<String>,
    ) -> QueryTracker {
        QueryTracker {
            start_time: Instant::now(),
            operation,
            query: query.into(),
            collection: collection.into(),
        }
    }

    /// Finish tracking a query, recording it if slow. Returns the elapsed time.
    pub fn finish_query(&self, tracker: QueryTracker) -> Duration {
        let duration = tracker.start_time.elapsed();

        if !self.enabled || duration < self.threshold {
            return duration;
        }

        let slow_query = SlowQuery {
            timestamp: Utc::now(),
            duration_ms: duration.as_millis() as u64,
            operation: tracker.operation.to_string(),
            query: tracker.query,
            collection: tracker.collection,
        };

        tracing::warn!(
            target: "slow_query",
            duration_ms = slow_query.duration_ms,
            operation = %slow_query.operation,
            query = %slow_query.query,
            collection = %slow_query.collection,
            "Slow query detected"
        );

        let mut queries = self.queries.write();
        queries.push(slow_query);

        if queries.len() > MAX_SLOW_QUERIES {
            let len = queries.len();
            queries.drain(0..len - MAX_SLOW_QUERIES);
        }

        duration
    }

    /// Get recent slow queries, newest first
    pub fn get_slow_queries(&self, limit: usize) -> Vec<SlowQuery> {
        let queries = self.queries.read();
        queries.iter().rev().take(limit).cloned().collect()
    }

    /// Get slow query statistics
    pub fn get_stats(&self) -> SlowQueryStats {
        let queries = self.queries.read();
        let threshold_ms = self.threshold.as_millis().min(u64::MAX as u128) as u64;

        if queries.is_empty() {
            return SlowQueryStats {
                threshold_ms,
                ..Default::default()
            };
        }

        let total_count = queries.len();
        let total_duration: u64 = queries.iter().map(|q| q.duration_ms).sum();
        let max_duration = queries.iter().map(|q| q.duration_ms).max().unwrap_or(0);

        SlowQueryStats {
            total_count,
            avg_duration_ms: total_duration / total_count as u64,
            max_duration_ms: max_duration,
            threshold_ms,
        }
    }
}

/// Slow query statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlowQueryStats {
    pub total_count: usize,
    pub avg_duration_ms: u64,
    pub max_duration_ms: u64,
    pub threshold_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "INFO");
        assert_eq!(config.parse_level(), Level::INFO);

        let config = LoggingConfig {
            level: "debug".to_string(),
            ..Default::default()
        };
        assert_eq!(config.parse_level(), Level::DEBUG);
    }

    #[test]
    fn test_slow_query_logger() {
        let logger = SlowQueryLogger::new(Duration::from_millis(100), true);

        let tracker = logger.start_query("find", r#"{"genre":"Fiction"}"#, "books");
        logger.finish_query(tracker);
        assert!(logger.get_slow_queries(10).is_empty());

        let mut tracker = logger.start_query("aggregate", "[]", "books");
        // simulate a slow query by moving the start time back
        tracker.start_time = Instant::now() - Duration::from_millis(200);
        logger.finish_query(tracker);

        let slow_queries = logger.get_slow_queries(10);
        assert_eq!(slow_queries.len(), 1);
        assert!(slow_queries[0].duration_ms >= 200);
        assert_eq!(slow_queries[0].operation, "aggregate");

        let stats = logger.get_stats();
        assert_eq!(stats.total_count, 1);
        assert_eq!(stats.threshold_ms, 100);
    }

    #[test]
    fn test_disabled_logger_records_nothing() {
        let logger = SlowQueryLogger::disabled();
        let mut tracker = logger.start_query("find", "{}", "books");
        tracker.start_time = Instant::now() - Duration::from_secs(5);
        logger.finish_query(tracker);
        assert!(logger.get_slow_queries(10).is_empty());
    }

    #[test]
    fn test_query_tracker() {
        let logger = SlowQueryLogger::new(Duration::from_millis(50), true);
        let tracker = logger.start_query("count", "{}", "books");
        assert_eq!(tracker.collection, "books");
        assert!(tracker.elapsed() < Duration::from_secs(1));
    }
}

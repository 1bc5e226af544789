//! Monitoring for the catalog engine
//!
//! Structured logging with tracing and slow query reporting

pub mod logging;

pub use logging::*;

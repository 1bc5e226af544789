//! Query engine
//!
//! This module provides document-store style query parsing, planning,
//! execution and update operators

pub mod ast;
pub mod executor;
pub mod index_selector;
pub mod parser;
pub mod planner;
pub mod update;

pub use ast::{Filter, Projection, ProjectionType, Query, Sort, SortOrder};
pub use executor::{QueryExecutionError, QueryExecutor};
pub use index_selector::{IndexChoice, IndexSelector};
pub use parser::{QueryParseError, QueryParser, DEFAULT_MAX_LIMIT, DEFAULT_MAX_SKIP};
pub use planner::{ExecutionStrategy, QueryPlan, QueryPlanner};
pub use update::{UpdateError, UpdateOp, UpdateSpec};

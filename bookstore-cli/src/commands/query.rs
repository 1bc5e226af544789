use super::{print_documents, print_json};
use crate::client::{open_catalog, parse_json_arg};
use anyhow::Result;
use bookstore_core::catalog::FindOptions;
use bookstore_core::config::CatalogConfig;
use bookstore_core::monitoring::SlowQueryLogger;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

#[derive(Args)]
pub struct FindArgs {
    /// Seed file (JSON array of books)
    #[arg(long)]
    pub seed: PathBuf,

    /// Filter document
    #[arg(long, default_value = "{}")]
    pub filter: String,

    /// Projection document
    #[arg(long)]
    pub projection: Option<String>,

    /// Sort document, e.g. '{"price": -1}'
    #[arg(long)]
    pub sort: Option<String>,

    /// Number of documents to skip
    #[arg(long)]
    pub skip: Option<u64>,

    /// Maximum number of documents to return
    #[arg(long)]
    pub limit: Option<u64>,
}

impl FindArgs {
    fn options(&self) -> Result<FindOptions> {
        let mut options = FindOptions::new(parse_json_arg("filter", &self.filter)?);
        if let Some(projection) = &self.projection {
            options = options.projection(parse_json_arg("projection", projection)?);
        }
        if let Some(sort) = &self.sort {
            options = options.sort(parse_json_arg("sort", sort)?);
        }
        options.skip = self.skip;
        options.limit = self.limit;
        Ok(options)
    }
}

#[derive(Args)]
pub struct AggregateArgs {
    /// Seed file (JSON array of books)
    #[arg(long)]
    pub seed: PathBuf,

    /// Pipeline as a JSON array of stages
    #[arg(long)]
    pub pipeline: String,
}

#[derive(Args)]
pub struct ExplainArgs {
    /// Seed file (JSON array of books)
    #[arg(long)]
    pub seed: PathBuf,

    /// Filter document
    #[arg(long)]
    pub filter: String,

    /// Index key spec to create first; may be repeated
    #[arg(long = "index")]
    pub indexes: Vec<String>,
}

pub fn execute_find(
    config: &CatalogConfig,
    slow_queries: Arc<SlowQueryLogger>,
    args: FindArgs,
) -> Result<()> {
    let options = args.options()?;
    let catalog = open_catalog(config, slow_queries, &args.seed)?;

    let documents = catalog.find_documents(&options)?.try_collect()?;
    let count = print_documents(documents)?;
    debug!("find returned {} documents", count);
    Ok(())
}

pub fn execute_aggregate(
    config: &CatalogConfig,
    slow_queries: Arc<SlowQueryLogger>,
    args: AggregateArgs,
) -> Result<()> {
    let pipeline = parse_json_arg("pipeline", &args.pipeline)?;
    let catalog = open_catalog(config, slow_queries, &args.seed)?;

    let results = catalog.aggregate(&pipeline)?.try_collect()?;
    let count = print_documents(results)?;
    debug!("aggregate returned {} documents", count);
    Ok(())
}

pub fn execute_explain(
    config: &CatalogConfig,
    slow_queries: Arc<SlowQueryLogger>,
    args: ExplainArgs,
) -> Result<()> {
    let filter = parse_json_arg("filter", &args.filter)?;
    let catalog = open_catalog(config, slow_queries, &args.seed)?;

    for raw in &args.indexes {
        let name = catalog.create_index(&parse_json_arg("index", raw)?)?;
        debug!("Created index {}", name);
    }

    print_json(&catalog.explain(&filter)?)
}

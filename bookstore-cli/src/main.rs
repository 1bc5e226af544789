use anyhow::Result;
use bookstore_core::config::{CatalogConfig, LogLevel};
use bookstore_core::monitoring::init_logging;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

mod client;
mod commands;

use commands::*;

#[derive(Parser)]
#[command(name = "bookstore")]
#[command(about = "Bookstore catalog query tool")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "BOOKSTORE_CONFIG", default_value = "bookstore.toml", global = true)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full catalog report against a seed file
    Report(ReportArgs),
    /// Find books matching a filter
    Find(FindArgs),
    /// Run an aggregation pipeline
    Aggregate(AggregateArgs),
    /// Explain how a filter is executed
    Explain(ExplainArgs),
    /// Configuration management commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = CatalogConfig::load(&cli.config)?;
    if cli.verbose {
        config.logging.level = LogLevel::Debug;
    }

    let slow_queries = Arc::new(init_logging(&config.logging_config())?);
    info!("Bookstore CLI v{} starting", env!("CARGO_PKG_VERSION"));

    let result = match cli.command {
        Commands::Report(args) => execute_report(&config, slow_queries, args),
        Commands::Find(args) => execute_find(&config, slow_queries, args),
        Commands::Aggregate(args) => execute_aggregate(&config, slow_queries, args),
        Commands::Explain(args) => execute_explain(&config, slow_queries, args),
        Commands::Config { action } => execute_config_command(&config, &cli.config, action),
    };

    match result {
        Ok(_) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            Err(e)
        }
    }
}

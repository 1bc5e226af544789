use anyhow::{anyhow, Result};
use bookstore_core::config::CatalogConfig;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration as TOML
    Show,
    /// Write the default configuration to the config path
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Validate the configuration file
    Validate,
}

pub fn execute_config_command(
    config: &CatalogConfig,
    path: &Path,
    command: ConfigCommands,
) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            println!("# {}", path.display());
            print!("{}", toml::to_string_pretty(config)?);
        }
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                return Err(anyhow!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                ));
            }
            CatalogConfig::default().save(path)?;
            println!("Wrote default configuration to {}", path.display());
        }
        ConfigCommands::Validate => {
            config.validate()?;
            println!("Configuration is valid");
        }
    }
    Ok(())
}

//! CLI command definitions and dispatch.

pub mod config;
pub mod counter;
pub mod engines;
pub mod entry;
pub mod flush;

use clap::{Parser, Subcommand};

use cachehub_cache::CacheHub;
use cachehub_core::config::HubConfig;
use cachehub_core::error::CacheError;

use crate::output::OutputFormat;

/// CacheHub: operate on configured cache storages
#[derive(Debug, Parser)]
#[command(name = "cachehub", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/cachehub.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Storage to operate on (defaults to the configured default storage)
    #[arg(short, long, global = true)]
    pub storage: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Read a value
    Get(entry::GetArgs),
    /// Write a value
    Set(entry::SetArgs),
    /// Check whether a key holds a live entry
    Has(entry::KeyArgs),
    /// Delete a key
    Remove(entry::KeyArgs),
    /// Increment a counter
    Incr(counter::CounterArgs),
    /// Decrement a counter
    Decr(counter::CounterArgs),
    /// Flush one storage, or all of them
    Flush(flush::FlushArgs),
    /// List configured storages
    Engines,
    /// Configuration management
    Config(config::ConfigArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self, config: &HubConfig) -> Result<(), CacheError> {
        let storage = self.storage.as_deref();
        match &self.command {
            Commands::Config(args) => config::execute(args, config, &self.config, self.format).await,
            command => {
                let hub = CacheHub::from_config(config).await?;
                match command {
                    Commands::Get(args) => entry::get(&hub, args, storage, self.format).await,
                    Commands::Set(args) => entry::set(&hub, args, storage).await,
                    Commands::Has(args) => entry::has(&hub, args, storage).await,
                    Commands::Remove(args) => entry::remove(&hub, args, storage).await,
                    Commands::Incr(args) => counter::execute(&hub, args, 1, storage).await,
                    Commands::Decr(args) => counter::execute(&hub, args, -1, storage).await,
                    Commands::Flush(args) => flush::execute(&hub, args, storage).await,
                    Commands::Engines => engines::execute(&hub, self.format).await,
                    Commands::Config(_) => Ok(()),
                }
            }
        }
    }
}

/// Helper: load configuration from file and environment
pub fn load_config(config_path: &str) -> Result<HubConfig, CacheError> {
    HubConfig::load(config_path)
}

//! Configuration management CLI commands.

use std::collections::BTreeMap;

use clap::{Args, Subcommand};

use cachehub_core::config::HubConfig;
use cachehub_core::config::engine::EngineConfig;
use cachehub_core::error::CacheError;

use crate::output::{self, OutputFormat, Status};

/// Arguments for config commands
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,
    /// Validate configuration
    Validate,
    /// Generate a sample configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config/generated.toml")]
        output: String,
    },
}

/// Execute config commands
pub async fn execute(
    args: &ConfigArgs,
    config: &HubConfig,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), CacheError> {
    match &args.command {
        ConfigCommand::Show => {
            output::print_document(&masked(config), format);
        }
        ConfigCommand::Validate => {
            if !config.storages.contains_key(&config.default_storage) {
                let err = CacheError::configuration(format!(
                    "Default storage '{}' is not configured",
                    config.default_storage
                ));
                output::status(Status::Failed, &format!("Configuration invalid: {err}"));
                return Err(err);
            }
            output::status(Status::Done, &format!("Configuration '{config_path}' is valid"));
            let storages: BTreeMap<&str, &str> = config
                .storages
                .iter()
                .map(|(name, engine)| (name.as_str(), engine.kind()))
                .collect();
            output::print_document(&storages, format);
        }
        ConfigCommand::Generate { output: out_path } => {
            let sample = include_str!("../../../../config/cachehub.toml");

            if let Some(parent) = std::path::Path::new(out_path).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(out_path, sample).await?;

            output::status(Status::Done, &format!("Sample config written to '{out_path}'"));
        }
    }

    Ok(())
}

/// Copy of `config` with secrets replaced for display.
fn masked(config: &HubConfig) -> HubConfig {
    let mut config = config.clone();
    for engine in config.storages.values_mut() {
        match engine {
            EngineConfig::Redis(redis) => {
                if redis.password.is_some() {
                    redis.password = Some("****".to_string());
                }
            }
            EngineConfig::Apc(opcode) | EngineConfig::Wincache(opcode) | EngineConfig::Xcache(opcode) => {
                if let Some(credentials) = opcode.credentials.as_mut() {
                    credentials.password = "****".to_string();
                }
            }
            _ => {}
        }
    }
    config
}

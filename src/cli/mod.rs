pub mod get_data;

use clap::{Parser, Subcommand};

use crate::config::Settings;
use crate::parsers::{decode, encode};
use crate::services::ResponseCacheService;
use crate::types::CostrollError;
use get_data::GetDataArgs;

/// Dimension-aware cost roll-up across multi-account billing plugins
#[derive(Parser)]
#[command(name = "costroll")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect and aggregate billing data
    GetData(GetDataArgs),

    /// Encode or decode resource keys
    Key {
        #[command(subcommand)]
        command: KeyCommand,
    },

    /// Manage the response cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Subcommand)]
enum KeyCommand {
    /// Print a key's base type and dimensions as JSON
    Decode { key: String },

    /// Build a key from a base type and dimensions
    Encode {
        base: String,

        /// Dimension as name=value (repeatable, order kept)
        #[arg(long = "dim", value_name = "NAME=VALUE", value_parser = parse_dimension)]
        dims: Vec<(String, String)>,
    },
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Remove every cached response
    Clear,
}

fn parse_dimension(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(n, v)| (n.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected name=value, got '{}'", s))
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        match self.command {
            Commands::GetData(args) => {
                args.run()?;
                Ok(())
            }
            Commands::Key {
                command: KeyCommand::Decode { key },
            } => {
                let decoded = decode(&key)?;
                let json = serde_json::to_string_pretty(&decoded)
                    .map_err(|e| CostrollError::Parse(e.to_string()))?;
                println!("{}", json);
                Ok(())
            }
            Commands::Key {
                command: KeyCommand::Encode { base, dims },
            } => {
                println!("{}", encode(&base, &dims));
                Ok(())
            }
            Commands::Cache {
                command: CacheCommand::Clear,
            } => {
                let cache = ResponseCacheService::new(&Settings::load()?)?;
                let removed = cache.clear()?;
                println!("Removed {} cached responses", removed);
                Ok(())
            }
        }
    }
}

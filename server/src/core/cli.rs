use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::config::StorageBackend;
use super::constants::{ENV_CONFIG, ENV_DB_PATH, ENV_HOST, ENV_PORT, ENV_STORAGE};

#[derive(Parser)]
#[command(name = "relaymq")]
#[command(version, about = "Append-only topic broker with server-sent streaming", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Server host address
    #[arg(long, short = 'H', global = true, env = ENV_HOST)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, short = 'p', global = true, env = ENV_PORT)]
    pub port: Option<u16>,

    /// Storage backend (memory or sqlite)
    #[arg(long, global = true, env = ENV_STORAGE, value_parser = parse_storage_backend)]
    pub storage: Option<StorageBackend>,

    /// SQLite database path (used with the sqlite backend)
    #[arg(long, global = true, env = ENV_DB_PATH)]
    pub db_path: Option<PathBuf>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,
}

/// Parse storage backend from CLI/env string
fn parse_storage_backend(s: &str) -> Result<StorageBackend, String> {
    match s.to_lowercase().as_str() {
        "memory" => Ok(StorageBackend::Memory),
        "sqlite" => Ok(StorageBackend::Sqlite),
        _ => Err(format!(
            "Invalid storage backend '{}'. Valid options: memory, sqlite",
            s
        )),
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Start the broker (default command)
    Start,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub storage: Option<StorageBackend>,
    pub db_path: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let config = CliConfig {
        host: cli.host,
        port: cli.port,
        storage: cli.storage,
        db_path: cli.db_path,
        config: cli.config,
    };
    (config, cli.command)
}

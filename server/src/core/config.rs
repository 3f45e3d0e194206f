//! Application configuration
//!
//! Settings come from three layers with rising precedence: built-in
//! defaults, an optional JSON config file, then CLI arguments (which clap
//! also fills from environment variables).

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::cli::CliConfig;
use super::constants::{CONFIG_FILE_NAME, DEFAULT_DB_PATH, DEFAULT_HOST, DEFAULT_PORT};

// =============================================================================
// Storage Backend Enum
// =============================================================================

/// Record-log storage backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Memory => write!(f, "memory"),
            StorageBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

// =============================================================================
// Resolved configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub db_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
}

// =============================================================================
// Config file shape
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    server: ServerFileConfig,
    storage: StorageFileConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct StorageFileConfig {
    backend: Option<StorageBackend>,
    db_path: Option<PathBuf>,
}

impl FileConfig {
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }
}

impl AppConfig {
    /// Resolve the effective configuration for this run.
    ///
    /// A config file named by `--config` must exist; the local
    /// `relaymq.json` is only picked up when present.
    pub fn load(cli: &CliConfig) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                FileConfig::load_from_file(path)?
            }
            None => {
                let local = PathBuf::from(CONFIG_FILE_NAME);
                if local.exists() {
                    FileConfig::load_from_file(&local)?
                } else {
                    FileConfig::default()
                }
            }
        };

        let config = Self {
            server: ServerConfig {
                host: cli
                    .host
                    .clone()
                    .or(file.server.host)
                    .unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port: cli.port.or(file.server.port).unwrap_or(DEFAULT_PORT),
            },
            storage: StorageConfig {
                backend: cli.storage.or(file.storage.backend).unwrap_or_default(),
                db_path: cli
                    .db_path
                    .clone()
                    .or(file.storage.db_path)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            },
        };
        tracing::trace!(config = ?config, "Resolved configuration");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file_or_cli() {
        let config = AppConfig::load(&CliConfig::default()).unwrap();
        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.db_path, PathBuf::from(DEFAULT_DB_PATH));
    }

    #[test]
    fn test_file_values_apply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relaymq.json");
        let mut f = fs::File::create(&path).unwrap();
        write!(
            f,
            r#"{{"server": {{"host": "0.0.0.0", "port": 9000}}, "storage": {{"backend": "sqlite", "db_path": "/tmp/broker.db"}}}}"#
        )
        .unwrap();

        let cli = CliConfig {
            config: Some(path),
            ..Default::default()
        };
        let config = AppConfig::load(&cli).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.storage.db_path, PathBuf::from("/tmp/broker.db"));
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relaymq.json");
        let mut f = fs::File::create(&path).unwrap();
        write!(f, r#"{{"server": {{"port": 9000}}}}"#).unwrap();

        let cli = CliConfig {
            config: Some(path),
            port: Some(8001),
            storage: Some(StorageBackend::Sqlite),
            ..Default::default()
        };
        let config = AppConfig::load(&cli).unwrap();
        assert_eq!(config.server.port, 8001);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
    }

    #[test]
    fn test_missing_explicit_config_file_fails() {
        let cli = CliConfig {
            config: Some(PathBuf::from("/definitely/not/here.json")),
            ..Default::default()
        };
        assert!(AppConfig::load(&cli).is_err());
    }

    #[test]
    fn test_storage_backend_display() {
        assert_eq!(StorageBackend::Memory.to_string(), "memory");
        assert_eq!(StorageBackend::Sqlite.to_string(), "sqlite");
    }
}

//! Application configuration structures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::{DEFAULT_TABLE, Label, StoreLayout};

use super::validation::{self, ConfigError, expand_env_vars};

// =============================================================================
// Constants
// =============================================================================

/// Default connection pool size.
pub const DEFAULT_POOL_SIZE: u32 = 4;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_024;

fn default_pool_size() -> u32 {
    DEFAULT_POOL_SIZE
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_init_schema() -> bool {
    true
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Web server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 9201).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 9201,
        }
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path, or `:memory:`.
    pub path: String,

    /// Table layout (default: token_array).
    #[serde(default)]
    pub layout: StoreLayout,

    /// Sample table identifier (default: "samples").
    #[serde(default = "default_table")]
    pub table: String,

    /// Connection pool size for read operations (default: 4).
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// MPSC channel capacity for write operations (default: 1024).
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Deadline for each read or write call, e.g. "30s" (default: none).
    #[serde(default, with = "humantime_serde")]
    pub statement_timeout: Option<Duration>,

    /// Create the schema and table at startup (default: true).
    #[serde(default = "default_init_schema")]
    pub init_schema: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "promduck.duckdb".to_string(),
            layout: StoreLayout::default(),
            table: default_table(),
            pool_size: DEFAULT_POOL_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            statement_timeout: None,
            init_schema: true,
        }
    }
}

// =============================================================================
// Read Configuration
// =============================================================================

/// Read path configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadConfig {
    /// `name=value` label added by the writing side (e.g. an external label)
    /// that must not constrain reads.
    pub ignore_label: Option<String>,
}

impl ReadConfig {
    /// Parsed ignore label, if configured.
    ///
    /// Assumes [`AppConfig::validate`] passed; a malformed token parses leniently.
    pub fn ignore_label(&self) -> Option<Label> {
        self.ignore_label.as_deref().map(Label::from_token)
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Web server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Read path configuration.
    #[serde(default)]
    pub read: ReadConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` and `${VAR:-default}` are expanded before parsing.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(&expand_env_vars(content))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` naming the first unusable setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::bind_address(&self.server.bind)?;
        validation::port(self.server.port)?;

        let db = &self.database;
        validation::database_path(&db.path)?;
        validation::at_least_one("database.pool_size", u64::from(db.pool_size))?;
        validation::at_least_one("database.channel_capacity", db.channel_capacity as u64)?;
        validation::table_for_layout(db.layout, &db.table)?;
        validation::statement_timeout(db.statement_timeout)?;

        if let Some(token) = &self.read.ignore_label {
            validation::ignore_label(token)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.port, 9201);
    }

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.path, "promduck.duckdb");
        assert_eq!(config.layout, StoreLayout::TokenArray);
        assert_eq!(config.table, "samples");
        assert_eq!(config.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert!(config.statement_timeout.is_none());
        assert!(config.init_schema);
    }

    #[test]
    fn test_from_yaml_full() {
        let config = AppConfig::from_yaml(
            r#"
server:
  bind: 127.0.0.1
  port: 9300
database:
  path: ":memory:"
  layout: label_map
  table: memory.main.samples
  pool_size: 2
  statement_timeout: 1m 30s
read:
  ignore_label: replica=r1
"#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9300);
        assert_eq!(config.database.layout, StoreLayout::LabelMap);
        assert_eq!(config.database.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(
            config.database.statement_timeout,
            Some(Duration::from_secs(90))
        );
        assert_eq!(config.read.ignore_label(), Some(Label::new("replica", "r1")));
    }

    #[test]
    fn test_from_yaml_expands_env_defaults() {
        let config = AppConfig::from_yaml(
            r#"
database:
  path: ${PROMDUCK_TEST_UNSET_PATH_12345:-/tmp/promduck.duckdb}
"#,
        )
        .unwrap();
        assert_eq!(config.database.path, "/tmp/promduck.duckdb");
    }

    #[test]
    fn test_invalid_statement_timeout() {
        let result = AppConfig::from_yaml(
            r#"
database:
  path: a.duckdb
  statement_timeout: soon
"#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_validation_invalid_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_bind_address() {
        let mut config = AppConfig::default();
        config.server.bind = "not-an-ip".to_string();

        let result = config.validate();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("invalid server.bind")
        );
    }

    #[test]
    fn test_config_validation_table_follows_layout() {
        let mut config = AppConfig::default();
        config.database.table = "metrics;DROP TABLE x".to_string();
        assert!(config.validate().is_err());

        config.database.table = "samples".to_string();
        config.database.layout = StoreLayout::LabelMap;
        assert!(config.validate().is_err());

        config.database.table = "db.schema.samples".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_names_path() {
        let err = AppConfig::load("/nonexistent/promduck.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/promduck.yaml"));
    }

    #[test]
    fn test_config_validation_zero_timeout_and_capacity() {
        let mut config = AppConfig::default();
        config.database.statement_timeout = Some(Duration::ZERO);
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.database.channel_capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("database.channel_capacity"));
    }

    #[test]
    fn test_config_validation_ignore_label() {
        let mut config = AppConfig::default();
        config.read.ignore_label = Some("replica".to_string());
        assert!(config.validate().is_err());

        config.read.ignore_label = Some("=r1".to_string());
        assert!(config.validate().is_err());

        config.read.ignore_label = Some("replica=".to_string());
        assert!(config.validate().is_ok());
    }
}

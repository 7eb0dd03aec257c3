//! Configuration module for the promduck server.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (port, bind address)
//! - Database settings (path, layout, table, pool size, channel capacity, timeout)
//! - Read settings (ignored label)

mod app;
mod validation;

pub use app::{AppConfig, DatabaseConfig, ReadConfig, ServerConfig};
pub use validation::{ConfigError, expand_env_vars, parse_duration};

// Re-export constants
pub use app::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_POOL_SIZE};

//! Field validators and text helpers for promduck configuration.
//!
//! Each validator checks one setting and names it in the error, so a bad
//! config file or CLI override points straight at the offending key.

use std::net::IpAddr;
use std::sync::OnceLock;
use std::time::Duration;

use regex::{Captures, Regex};
use thiserror::Error;

use crate::storage::{Label, MEMORY_PATH, StoreLayout};

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Config text is not valid YAML for [`super::AppConfig`].
    #[error("failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A setting has an unusable value.
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// `server.bind` must be a literal IP address.
pub fn bind_address(bind: &str) -> Result<IpAddr, ConfigError> {
    bind.parse()
        .map_err(|_| invalid("server.bind", format!("'{bind}' is not an IP address")))
}

/// `server.port` must be non-zero.
pub fn port(port: u16) -> Result<(), ConfigError> {
    if port == 0 {
        return Err(invalid("server.port", "must be non-zero"));
    }
    Ok(())
}

/// `database.path` must name a file or be `:memory:`.
pub fn database_path(path: &str) -> Result<(), ConfigError> {
    if path.trim().is_empty() {
        return Err(invalid("database.path", "must not be empty"));
    }
    if path != MEMORY_PATH && path.ends_with(['/', '\\']) {
        return Err(invalid(
            "database.path",
            format!("'{path}' names a directory, not a database file"),
        ));
    }
    Ok(())
}

/// Counts such as pool size and queue capacity must be at least one.
pub fn at_least_one(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(invalid(field, "must be at least 1"));
    }
    Ok(())
}

/// `database.table` must satisfy the identifier rule of the chosen layout.
pub fn table_for_layout(layout: StoreLayout, table: &str) -> Result<(), ConfigError> {
    layout
        .validate_table(table)
        .map_err(|e| invalid("database.table", format!("{e} (layout {layout})")))
}

/// A configured timeout of zero would fail every call.
pub fn statement_timeout(timeout: Option<Duration>) -> Result<(), ConfigError> {
    match timeout {
        Some(limit) if limit.is_zero() => {
            Err(invalid("database.statement_timeout", "must be greater than zero"))
        }
        _ => Ok(()),
    }
}

/// `read.ignore_label` is a `name=value` token with a non-empty name.
pub fn ignore_label(token: &str) -> Result<Label, ConfigError> {
    match token.split_once('=') {
        Some((name, _)) if !name.is_empty() => Ok(Label::from_token(token)),
        _ => Err(invalid(
            "read.ignore_label",
            format!("expected 'name=value', got '{token}'"),
        )),
    }
}

/// Parse a human-readable duration such as `30s`, `1m30s` or `250ms`.
///
/// Used for CLI overrides; config files go through `humantime_serde`.
///
/// # Examples
///
/// ```
/// use promduck::config::parse_duration;
///
/// assert_eq!(parse_duration("1m30s").unwrap().as_secs(), 90);
/// assert_eq!(parse_duration("250ms").unwrap().as_millis(), 250);
/// assert!(parse_duration("0s").is_err());
/// ```
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("empty duration".to_string());
    }
    let duration = humantime::parse_duration(text).map_err(|e| format!("'{text}': {e}"))?;
    if duration.is_zero() {
        return Err(format!("'{text}': duration must be greater than zero"));
    }
    Ok(duration)
}

/// Substitute `${VAR}` and `${VAR:-fallback}` references from the environment.
///
/// An unset variable without a fallback becomes the empty string.
pub fn expand_env_vars(text: &str) -> String {
    static REFERENCE: OnceLock<Regex> = OnceLock::new();
    let reference = REFERENCE.get_or_init(|| {
        Regex::new(r"\$\{(?P<name>[A-Za-z_][A-Za-z0-9_]*)(?::-(?P<fallback>[^}]*))?\}")
            .expect("failed to compile env reference regex")
    });

    reference
        .replace_all(text, |caps: &Captures<'_>| {
            std::env::var(&caps["name"]).unwrap_or_else(|_| {
                caps.name("fallback")
                    .map_or_else(String::new, |m| m.as_str().to_string())
            })
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address() {
        assert!(bind_address("127.0.0.1").is_ok());
        assert!(bind_address("::").is_ok());
        let err = bind_address("localhost").unwrap_err();
        assert!(err.to_string().starts_with("invalid server.bind"));
    }

    #[test]
    fn test_database_path() {
        assert!(database_path(":memory:").is_ok());
        assert!(database_path("data/promduck.duckdb").is_ok());
        assert!(database_path("  ").is_err());
        assert!(matches!(
            database_path("data/"),
            Err(ConfigError::Invalid {
                field: "database.path",
                ..
            })
        ));
    }

    #[test]
    fn test_counts_and_port() {
        assert!(port(9201).is_ok());
        assert!(port(0).is_err());
        assert!(at_least_one("database.pool_size", 1).is_ok());
        let err = at_least_one("database.channel_capacity", 0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid database.channel_capacity: must be at least 1"
        );
    }

    #[test]
    fn test_table_for_layout() {
        assert!(table_for_layout(StoreLayout::TokenArray, "metrics.samples").is_ok());
        assert!(table_for_layout(StoreLayout::LabelMap, "db.prom.samples").is_ok());

        let err = table_for_layout(StoreLayout::LabelMap, "samples").unwrap_err();
        assert!(err.to_string().contains("label_map"));
        assert!(table_for_layout(StoreLayout::TokenArray, "x; DROP TABLE y").is_err());
    }

    #[test]
    fn test_statement_timeout() {
        assert!(statement_timeout(None).is_ok());
        assert!(statement_timeout(Some(Duration::from_secs(5))).is_ok());
        assert!(statement_timeout(Some(Duration::ZERO)).is_err());
    }

    #[test]
    fn test_ignore_label() {
        assert_eq!(ignore_label("replica=r1").unwrap(), Label::new("replica", "r1"));
        assert_eq!(ignore_label("replica=").unwrap(), Label::new("replica", ""));
        assert_eq!(ignore_label("k=a=b").unwrap(), Label::new("k", "a=b"));
        assert!(ignore_label("replica").is_err());
        assert!(ignore_label("=r1").is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration(" 45s ").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("2m 5s").unwrap(), Duration::from_secs(125));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("45").is_err());
        assert!(parse_duration("0ms").is_err());
    }

    #[test]
    fn test_expand_env_vars_fallbacks() {
        assert_eq!(expand_env_vars("table: samples"), "table: samples");
        assert_eq!(
            expand_env_vars("path: ${PROMDUCK_UNSET_VAR_98765:-:memory:}"),
            "path: :memory:"
        );
        assert_eq!(expand_env_vars("[${PROMDUCK_UNSET_VAR_98765}]"), "[]");
    }

    #[test]
    fn test_expand_env_vars_from_env() {
        // SAFETY: the variable name is unique to this test.
        unsafe {
            std::env::set_var("PROMDUCK_TEST_TABLE_VAR", "prom.samples");
        }
        assert_eq!(
            expand_env_vars("table: ${PROMDUCK_TEST_TABLE_VAR:-samples}"),
            "table: prom.samples"
        );
        // SAFETY: the variable name is unique to this test.
        unsafe {
            std::env::remove_var("PROMDUCK_TEST_TABLE_VAR");
        }
    }
}

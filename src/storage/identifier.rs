//! Table identifier validation.
//!
//! The table name is spliced into statement text and cannot be bound as a
//! parameter, so it must be a plain unquoted identifier.

use std::sync::OnceLock;

use regex::Regex;

use crate::storage::StorageError;

fn identifier_regex() -> &'static Regex {
    static IDENTIFIER_REGEX: OnceLock<Regex> = OnceLock::new();
    IDENTIFIER_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][0-9A-Za-z_.]*$").expect("failed to compile identifier regex")
    })
}

fn invalid(identifier: &str, reason: impl Into<String>) -> StorageError {
    StorageError::InvalidIdentifier {
        identifier: identifier.to_string(),
        reason: reason.into(),
    }
}

/// Validate a single-segment identifier (dots allowed after the first char).
pub fn validate_identifier(identifier: &str) -> Result<(), StorageError> {
    if identifier_regex().is_match(identifier) {
        Ok(())
    } else {
        Err(invalid(identifier, "use a non-quoted identifier"))
    }
}

/// Validate a `catalog.schema.table` identifier.
pub fn validate_namespaced_identifier(identifier: &str) -> Result<(), StorageError> {
    let parts: Vec<&str> = identifier.split('.').collect();
    if parts.len() != 3 {
        return Err(invalid(
            identifier,
            "expected 'catalog.schema.table'",
        ));
    }
    for part in parts {
        if !identifier_regex().is_match(part) {
            return Err(invalid(
                identifier,
                format!("invalid part {part:?}: use non-quoted identifiers"),
            ));
        }
    }
    Ok(())
}

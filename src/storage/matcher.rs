//! Label matcher compilation.
//!
//! Compiles a read query's time range and label matchers into predicate
//! fragments. Regex matchers are full-match: patterns are anchored here
//! because DuckDB's `regexp_matches` matches substrings.

use duckdb::types::Value;
use regex::Regex;

use crate::storage::StorageError;
use crate::storage::layout::StoreLayout;
use crate::storage::predicate::{PredicateBuilder, quote_literal};
use crate::storage::types::{METRIC_NAME_LABEL, MatchExpression, MatchKind, Query, encode_token};

/// Compiles queries for one table layout.
#[derive(Debug, Clone)]
pub struct MatcherTranslator {
    layout: StoreLayout,
    /// `name=value` token whose EQ matcher is dropped from reads.
    ignored_token: Option<String>,
}

impl MatcherTranslator {
    pub fn new(layout: StoreLayout, ignored_token: Option<String>) -> Self {
        Self {
            layout,
            ignored_token,
        }
    }

    /// Compile a whole query: time bounds first, then matchers in order.
    pub fn compile_query(&self, query: &Query) -> Result<PredicateBuilder, StorageError> {
        let mut pb = PredicateBuilder::new();
        pb.clause(
            "updated_at >= epoch_ms(?::BIGINT)",
            [Value::BigInt(query.start_ms)],
        );
        if query.end_ms > 0 {
            pb.clause(
                "updated_at <= epoch_ms(?::BIGINT)",
                [Value::BigInt(query.end_ms)],
            );
        }
        self.compile_matchers(&query.matchers, &mut pb)?;
        Ok(pb)
    }

    /// Append one fragment per matcher (none for the ignored token).
    ///
    /// On error `pb` may hold a partial clause list; callers discard it.
    pub fn compile_matchers(
        &self,
        matchers: &[MatchExpression],
        pb: &mut PredicateBuilder,
    ) -> Result<(), StorageError> {
        for m in matchers {
            if m.name == METRIC_NAME_LABEL {
                self.metric_name_clause(m, pb)?;
            } else {
                self.label_clause(m, pb)?;
            }
        }
        Ok(())
    }

    fn metric_name_clause(
        &self,
        m: &MatchExpression,
        pb: &mut PredicateBuilder,
    ) -> Result<(), StorageError> {
        match m.kind {
            MatchKind::Eq => pb.clause("metric_name = ?", [Value::Text(m.value.clone())]),
            // Cannot use the sort key the way equality does.
            MatchKind::Neq => pb.clause("metric_name != ?", [Value::Text(m.value.clone())]),
            MatchKind::Re => {
                let pattern = anchored_value_pattern(&m.name, &m.value)?;
                pb.clause("regexp_matches(metric_name, ?::VARCHAR)", [Value::Text(pattern)]);
            }
            MatchKind::Nre => {
                let pattern = anchored_value_pattern(&m.name, &m.value)?;
                pb.clause(
                    "NOT regexp_matches(metric_name, ?::VARCHAR)",
                    [Value::Text(pattern)],
                );
            }
        }
        Ok(())
    }

    fn label_clause(&self, m: &MatchExpression, pb: &mut PredicateBuilder) -> Result<(), StorageError> {
        let tokens = self.layout.label_tokens_expr();
        match m.kind {
            MatchKind::Eq => {
                let token = encode_token(&m.name, &m.value);
                if self.ignored_token.as_deref() == Some(token.as_str()) {
                    return Ok(());
                }
                pb.clause(
                    format!("list_contains({tokens}, ?::VARCHAR)"),
                    [Value::Text(token)],
                );
            }
            MatchKind::Neq => {
                let token = encode_token(&m.name, &m.value);
                pb.clause(
                    format!("NOT list_contains({tokens}, ?::VARCHAR)"),
                    [Value::Text(token)],
                );
            }
            // Lambdas take no bound parameters, so the pattern is a quoted literal.
            MatchKind::Re => {
                let pattern = quote_literal(&anchored_token_pattern(&m.name, &m.value)?);
                pb.clause(
                    format!("len(list_filter({tokens}, x -> regexp_matches(x, {pattern}))) > 0"),
                    std::iter::empty(),
                );
            }
            MatchKind::Nre => {
                let pattern = quote_literal(&anchored_token_pattern(&m.name, &m.value)?);
                pb.clause(
                    format!("len(list_filter({tokens}, x -> regexp_matches(x, {pattern}))) = 0"),
                    std::iter::empty(),
                );
            }
        }
        Ok(())
    }
}

/// Anchor a value pattern: `^(?:V)$`.
fn anchored_value_pattern(label: &str, value: &str) -> Result<String, StorageError> {
    checked(label, format!("^(?:{value})$"))
}

/// Anchor a token pattern with the literal label name: `^N=(?:V)$`.
fn anchored_token_pattern(label: &str, value: &str) -> Result<String, StorageError> {
    checked(label, format!("^{}=(?:{value})$", regex::escape(label)))
}

fn checked(label: &str, pattern: String) -> Result<String, StorageError> {
    Regex::new(&pattern).map_err(|source| StorageError::InvalidRegex {
        label: label.to_string(),
        source,
    })?;
    Ok(pattern)
}

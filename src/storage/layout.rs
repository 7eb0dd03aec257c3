//! Table layouts and the statement text each one uses.
//!
//! Both layouts store `(updated_at, metric_name, labels, value)`. They differ
//! in how labels are held and in the row ordering the read query can rely on:
//!
//! | Layout       | `labels` column       | Read ordering                      | Grouping         |
//! |--------------|-----------------------|------------------------------------|------------------|
//! | `token_array`| `VARCHAR[]` of tokens | metric name, sorted labels, time   | streaming merge  |
//! | `label_map`  | `MAP(VARCHAR,VARCHAR)`| time only                          | hash grouping    |

use duckdb::types::Value;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::storage::StorageError;
use crate::storage::identifier::{validate_identifier, validate_namespaced_identifier};
use crate::storage::reconstruct::SeriesGrouper;
use crate::storage::types::FlatRow;

/// Token expression over a `MAP(VARCHAR, VARCHAR)` labels column.
const MAP_TOKENS_EXPR: &str = "list_transform(map_entries(labels), e -> e.key || '=' || e.value)";

/// Physical table layout, selected once at construction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum StoreLayout {
    /// Sorted token list; the store groups each series contiguously.
    #[default]
    TokenArray,
    /// Label map; rows arrive in time order only and are grouped client-side.
    LabelMap,
}

impl StoreLayout {
    /// Validate the table identifier under this layout's naming rule.
    pub fn validate_table(&self, table: &str) -> Result<(), StorageError> {
        match self {
            Self::TokenArray => validate_identifier(table),
            Self::LabelMap => validate_namespaced_identifier(table),
        }
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for `table`.
    pub fn table_ddl(&self, table: &str) -> String {
        let labels_type = match self {
            Self::TokenArray => "VARCHAR[]",
            Self::LabelMap => "MAP(VARCHAR, VARCHAR)",
        };
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (
    updated_at  TIMESTAMP NOT NULL,
    metric_name VARCHAR NOT NULL,
    labels      {labels_type},
    value       DOUBLE NOT NULL
);"
        )
    }

    /// Expression yielding the row's labels as `name=value` tokens.
    pub fn label_tokens_expr(&self) -> &'static str {
        match self {
            Self::TokenArray => "labels",
            Self::LabelMap => MAP_TOKENS_EXPR,
        }
    }

    /// Single-row `INSERT` for a row carrying `label_count` labels.
    pub fn insert_sql(&self, table: &str, label_count: usize) -> String {
        let labels_expr = match self {
            Self::TokenArray => varchar_list(label_count),
            Self::LabelMap => format!(
                "MAP({}, {})",
                varchar_list(label_count),
                varchar_list(label_count)
            ),
        };
        format!(
            "INSERT INTO {table} (updated_at, metric_name, labels, value) \
             VALUES (epoch_ms(?::BIGINT), ?, {labels_expr}, ?)"
        )
    }

    /// Positional arguments matching [`Self::insert_sql`].
    pub fn insert_args(&self, row: &FlatRow) -> Vec<Value> {
        let mut args = Vec::with_capacity(3 + row.labels.len() * 2);
        args.push(Value::BigInt(row.updated_at.timestamp_millis()));
        args.push(Value::Text(row.metric_name.clone()));
        match self {
            Self::TokenArray => {
                args.extend(row.labels.iter().cloned().map(Value::Text));
            }
            Self::LabelMap => {
                let (names, values): (Vec<_>, Vec<_>) = row
                    .labels
                    .iter()
                    .map(|token| token.split_once('=').unwrap_or((token.as_str(), "")))
                    .map(|(n, v)| (Value::Text(n.to_string()), Value::Text(v.to_string())))
                    .unzip();
                args.extend(names);
                args.extend(values);
            }
        }
        args.push(Value::Double(row.value));
        args
    }

    /// Projection query over `table` filtered by `where_clause`.
    ///
    /// Columns: metric name, labels (one list for tokens, or keys and values
    /// for maps), epoch milliseconds, value. A NULL token list sorts as `[]`.
    pub fn select_sql(&self, table: &str, where_clause: &str) -> String {
        match self {
            Self::TokenArray => format!(
                "SELECT metric_name, coalesce(list_sort(labels), []::VARCHAR[]) AS slb, \
                 epoch_ms(updated_at), value \
                 FROM {table} WHERE {where_clause} \
                 ORDER BY metric_name, slb, updated_at"
            ),
            Self::LabelMap => format!(
                "SELECT metric_name, map_keys(labels), map_values(labels), epoch_ms(updated_at), value \
                 FROM {table} WHERE {where_clause} \
                 ORDER BY updated_at"
            ),
        }
    }

    /// Fresh grouping state matching this layout's ordering guarantee.
    pub fn grouper(&self) -> SeriesGrouper {
        match self {
            Self::TokenArray => SeriesGrouper::streaming(),
            Self::LabelMap => SeriesGrouper::hashed(),
        }
    }
}

fn varchar_list(n: usize) -> String {
    if n == 0 {
        return "[]::VARCHAR[]".to_string();
    }
    let items = vec!["?::VARCHAR"; n].join(", ");
    format!("[{items}]")
}

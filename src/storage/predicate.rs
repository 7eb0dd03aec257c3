//! WHERE clause accumulator.
//!
//! Fragments use `?` placeholders; their arguments are appended to one
//! positional list in call order.

use duckdb::types::Value;

/// Accumulates filter fragments and their bound arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredicateBuilder {
    clauses: Vec<String>,
    args: Vec<Value>,
}

impl PredicateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and its arguments.
    ///
    /// # Panics
    /// Panics if the number of placeholders outside quoted literals differs
    /// from the number of arguments.
    pub fn clause<I>(&mut self, fragment: impl Into<String>, args: I)
    where
        I: IntoIterator<Item = Value>,
    {
        let fragment = fragment.into();
        let before = self.args.len();
        self.args.extend(args);
        assert_eq!(
            count_placeholders(&fragment),
            self.args.len() - before,
            "placeholder count mismatch in fragment {fragment:?}"
        );
        self.clauses.push(fragment);
    }

    /// Fragments joined with `AND`.
    pub fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            "TRUE".to_string()
        } else {
            self.clauses.join(" AND ")
        }
    }

    /// Positional arguments in fragment order.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

/// Quote a string literal for functions that cannot take bound parameters.
pub fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Count `?` placeholders that are not inside single-quoted literals.
fn count_placeholders(fragment: &str) -> usize {
    let mut in_literal = false;
    let mut count = 0;
    for c in fragment.chars() {
        match c {
            // A doubled quote toggles twice and stays inside the literal.
            '\'' => in_literal = !in_literal,
            '?' if !in_literal => count += 1,
            _ => {}
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clauses_join_in_order() {
        let mut pb = PredicateBuilder::new();
        pb.clause("a >= ?", [Value::BigInt(1)]);
        pb.clause("b = ? AND c = ?", [Value::Text("x".into()), Value::Text("y".into())]);
        pb.clause("d IS NOT NULL", std::iter::empty());

        assert_eq!(pb.where_clause(), "a >= ? AND b = ? AND c = ? AND d IS NOT NULL");
        assert_eq!(
            pb.args(),
            &[
                Value::BigInt(1),
                Value::Text("x".into()),
                Value::Text("y".into())
            ]
        );
        assert_eq!(pb.len(), 3);
    }

    #[test]
    fn test_empty_builder_matches_everything() {
        let pb = PredicateBuilder::new();
        assert!(pb.is_empty());
        assert_eq!(pb.where_clause(), "TRUE");
        assert!(pb.args().is_empty());
    }

    #[test]
    #[should_panic(expected = "placeholder count mismatch")]
    fn test_placeholder_mismatch_panics() {
        let mut pb = PredicateBuilder::new();
        pb.clause("a = ? AND b = ?", [Value::BigInt(1)]);
    }

    #[test]
    fn test_quote_literal_doubles_quotes() {
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(quote_literal("'; DROP TABLE x; --"), "'''; DROP TABLE x; --'");
    }

    #[test]
    fn test_placeholders_inside_literals_are_ignored() {
        assert_eq!(count_placeholders("f(x, 'a?b') = ?"), 1);
        assert_eq!(count_placeholders(&format!("g({})", quote_literal("it's?"))), 0);
        assert_eq!(count_placeholders("x = ? OR y = ?"), 2);
    }
}

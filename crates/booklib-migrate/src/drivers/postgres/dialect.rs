//! PostgreSQL SQL dialect.
//!
//! Builds the statements the reader and writer send. Identifiers are always
//! quoted; values are always bound as parameters.

use crate::config::TargetMode;
use crate::entity::{SourceTable, TargetTable};

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }

    /// Quote an identifier, doubling embedded quotes.
    pub fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Qualify a table name with schema.
    pub fn qualify(&self, schema: &str, table: &str) -> String {
        format!("{}.{}", self.quote_ident(schema), self.quote_ident(table))
    }

    /// Build the keyset page query.
    ///
    /// With a cursor the statement takes `$1` = last seen id and `$2` = limit;
    /// without one it takes only `$1` = limit. Rows at the cursor itself are
    /// excluded (`>` rather than `>=`).
    pub fn build_page_query(&self, table: &SourceTable, with_cursor: bool) -> String {
        let pk = self.quote_ident(&table.id_column);
        let cols = std::iter::once(&table.id_column)
            .chain(table.columns.iter())
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "SELECT {} FROM {}",
            cols,
            self.qualify(&table.schema, &table.table)
        );

        if with_cursor {
            sql.push_str(&format!(" WHERE {} > $1 ORDER BY {} LIMIT $2", pk, pk));
        } else {
            sql.push_str(&format!(" ORDER BY {} LIMIT $1", pk));
        }

        sql
    }

    /// Build a multi-row INSERT for `rows` records, with the conflict clause
    /// that implements `mode`.
    ///
    /// Parameters are laid out row by row: id first, then `table.columns`.
    pub fn build_insert_query(&self, table: &TargetTable, rows: usize, mode: TargetMode) -> String {
        let width = table.columns.len() + 1;
        let pk = self.quote_ident(&table.id_column);
        let cols = std::iter::once(pk.clone())
            .chain(table.columns.iter().map(|c| self.quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");

        let values = (0..rows)
            .map(|row| {
                let placeholders = (1..=width)
                    .map(|col| format!("${}", row * width + col))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({})", placeholders)
            })
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.qualify(&table.schema, &table.table),
            cols,
            values
        );

        match mode {
            TargetMode::Insert | TargetMode::Truncate => {}
            TargetMode::SkipExisting => {
                sql.push_str(&format!(" ON CONFLICT ({}) DO NOTHING", pk));
            }
            TargetMode::Upsert if table.columns.is_empty() => {
                // Nothing but the key: an overwrite is the same as keeping the row
                sql.push_str(&format!(" ON CONFLICT ({}) DO NOTHING", pk));
            }
            TargetMode::Upsert => {
                let update_set = table
                    .columns
                    .iter()
                    .map(|c| format!("{} = EXCLUDED.{}", self.quote_ident(c), self.quote_ident(c)))
                    .collect::<Vec<_>>()
                    .join(", ");
                sql.push_str(&format!(" ON CONFLICT ({}) DO UPDATE SET {}", pk, update_set));
            }
        }

        sql
    }

    /// Build a row count query.
    pub fn build_count_query(&self, schema: &str, table: &str) -> String {
        format!("SELECT COUNT(*)::int8 FROM {}", self.qualify(schema, table))
    }

    /// Build a statement removing every row of a table.
    pub fn build_truncate_query(&self, schema: &str, table: &str) -> String {
        format!("TRUNCATE TABLE {}", self.qualify(schema, table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author() -> SourceTable {
        SourceTable {
            schema: "public".into(),
            table: "author".into(),
            id_column: "id".into(),
            columns: vec!["f_name".into()],
        }
    }

    fn person() -> TargetTable {
        TargetTable {
            schema: "public".into(),
            table: "person".into(),
            id_column: "id".into(),
            columns: vec!["f_name".into()],
        }
    }

    #[test]
    fn test_quote_ident() {
        let d = PostgresDialect::new();
        assert_eq!(d.quote_ident("f_name"), "\"f_name\"");
        assert_eq!(d.quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_first_page_query() {
        let sql = PostgresDialect::new().build_page_query(&author(), false);
        assert_eq!(
            sql,
            "SELECT \"id\", \"f_name\" FROM \"public\".\"author\" ORDER BY \"id\" LIMIT $1"
        );
    }

    #[test]
    fn test_next_page_query_uses_strict_greater_than() {
        let sql = PostgresDialect::new().build_page_query(&author(), true);
        assert_eq!(
            sql,
            "SELECT \"id\", \"f_name\" FROM \"public\".\"author\" \
             WHERE \"id\" > $1 ORDER BY \"id\" LIMIT $2"
        );
    }

    #[test]
    fn test_insert_query_plain() {
        let sql = PostgresDialect::new().build_insert_query(&person(), 2, TargetMode::Insert);
        assert_eq!(
            sql,
            "INSERT INTO \"public\".\"person\" (\"id\", \"f_name\") VALUES ($1, $2), ($3, $4)"
        );
    }

    #[test]
    fn test_insert_query_truncate_mode_has_no_conflict_clause() {
        let sql = PostgresDialect::new().build_insert_query(&person(), 1, TargetMode::Truncate);
        assert!(!sql.contains("ON CONFLICT"));
    }

    #[test]
    fn test_insert_query_skip_existing() {
        let sql = PostgresDialect::new().build_insert_query(&person(), 1, TargetMode::SkipExisting);
        assert!(sql.ends_with("VALUES ($1, $2) ON CONFLICT (\"id\") DO NOTHING"));
    }

    #[test]
    fn test_insert_query_upsert() {
        let sql = PostgresDialect::new().build_insert_query(&person(), 1, TargetMode::Upsert);
        assert!(sql.ends_with("ON CONFLICT (\"id\") DO UPDATE SET \"f_name\" = EXCLUDED.\"f_name\""));
    }

    #[test]
    fn test_upsert_without_columns_does_nothing() {
        let mut table = person();
        table.columns.clear();
        let sql = PostgresDialect::new().build_insert_query(&table, 1, TargetMode::Upsert);
        assert!(sql.ends_with("ON CONFLICT (\"id\") DO NOTHING"));
    }

    #[test]
    fn test_count_and_truncate() {
        let d = PostgresDialect::new();
        assert_eq!(
            d.build_count_query("public", "genre"),
            "SELECT COUNT(*)::int8 FROM \"public\".\"genre\""
        );
        assert_eq!(
            d.build_truncate_query("public", "genre"),
            "TRUNCATE TABLE \"public\".\"genre\""
        );
    }
}

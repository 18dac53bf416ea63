//! PostgreSQL page reader.
//!
//! Implements [`PageReader`] over one [`PgSession`]. Every fetch is a single
//! keyset query; nothing is written to the source.

use async_trait::async_trait;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::Row;
use tracing::debug;

use super::dialect::PostgresDialect;
use super::session::{PgSession, SessionRole};
use crate::config::DatabaseConfig;
use crate::core::traits::PageReader;
use crate::core::{Cursor, Page, Record, SqlValue};
use crate::entity::SourceTable;
use crate::error::{MigrateError, Result};

/// PostgreSQL source reader implementation.
pub struct PostgresReader {
    session: PgSession,
    dialect: PostgresDialect,
}

impl PostgresReader {
    /// Open a read session against the legacy database.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let session = PgSession::connect(config, SessionRole::Source).await?;
        Ok(Self::new(session))
    }

    /// Wrap an already open session.
    pub fn new(session: PgSession) -> Self {
        Self {
            session,
            dialect: PostgresDialect::new(),
        }
    }
}

#[async_trait]
impl PageReader for PostgresReader {
    async fn fetch_page(&self, table: &SourceTable, cursor: Cursor, limit: usize) -> Result<Page> {
        let table_name = table.full_name();
        let limit_param = SqlValue::I64(i64::try_from(limit).unwrap_or(i64::MAX));
        let cursor_param = cursor.last_seen_id.map(SqlValue::I64);

        let sql = self.dialect.build_page_query(table, cursor_param.is_some());
        let params: Vec<&(dyn ToSql + Sync)> = match &cursor_param {
            Some(after) => vec![after, &limit_param],
            None => vec![&limit_param],
        };

        debug!(
            "Fetching {} after {:?} (limit {})",
            table_name, cursor.last_seen_id, limit
        );

        let rows = self
            .session
            .client()
            .query(sql.as_str(), &params)
            .await
            .map_err(|e| MigrateError::source_unavailable(&table_name, e))?;

        rows.iter()
            .map(|row| row_to_record(&table_name, table, row))
            .collect::<Result<Vec<_>>>()
            .map(Page::new)
    }

    async fn row_count(&self, table: &SourceTable) -> Result<i64> {
        let sql = self.dialect.build_count_query(&table.schema, &table.table);
        let row = self
            .session
            .client()
            .query_one(sql.as_str(), &[])
            .await
            .map_err(|e| MigrateError::source_unavailable(table.full_name(), e))?;
        row.try_get(0)
            .map_err(|e| MigrateError::source_unavailable(table.full_name(), e))
    }

    async fn ping(&self) -> Result<()> {
        self.session
            .client()
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::source_unavailable("health check", e))?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "postgres"
    }
}

/// Convert a result row laid out as `id, columns...` into a [`Record`].
fn row_to_record(table_name: &str, table: &SourceTable, row: &Row) -> Result<Record> {
    let id = match column_value(table_name, None, row, 0)? {
        SqlValue::I64(id) => id,
        other => {
            return Err(MigrateError::malformed(
                table_name,
                None,
                format!("primary key '{}' is {}", table.id_column, other.kind()),
            ))
        }
    };

    let mut record = Record::new(id);
    for (idx, name) in table.columns.iter().enumerate() {
        let value = column_value(table_name, Some(id), row, idx + 1)?;
        record.fields.insert(name.clone(), value);
    }
    Ok(record)
}

fn column_value(table_name: &str, id: Option<i64>, row: &Row, idx: usize) -> Result<SqlValue> {
    let column = &row.columns()[idx];
    let ty = column.type_();
    let bad = |e: tokio_postgres::Error| {
        MigrateError::malformed(table_name, id, format!("column '{}': {}", column.name(), e))
    };

    let value: SqlValue = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx).map_err(bad)?.into(),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)
            .map_err(bad)?
            .map(i64::from)
            .into(),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)
            .map_err(bad)?
            .map(i64::from)
            .into(),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx).map_err(bad)?.into(),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)
            .map_err(bad)?
            .map(f64::from)
            .into(),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx).map_err(bad)?.into(),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            row.try_get::<_, Option<String>>(idx).map_err(bad)?.into()
        }
        _ => {
            return Err(MigrateError::malformed(
                table_name,
                id,
                format!("column '{}' has unsupported type {}", column.name(), ty),
            ))
        }
    };

    Ok(value)
}

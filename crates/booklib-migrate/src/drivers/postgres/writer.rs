//! PostgreSQL batch writer.
//!
//! Implements [`BatchWriter`] over one [`PgSession`]. Each page is written
//! inside its own transaction with multi-row parameterized INSERTs, so a page
//! is either fully committed or not at all.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tracing::debug;

use super::dialect::PostgresDialect;
use super::session::{PgSession, SessionRole};
use crate::config::{DatabaseConfig, TargetMode};
use crate::core::traits::BatchWriter;
use crate::core::{Page, SqlValue};
use crate::entity::TargetTable;
use crate::error::{MigrateError, Result};

/// Bind parameter ceiling of the PostgreSQL wire protocol.
const MAX_BIND_PARAMS: usize = 65_535;

/// PostgreSQL target writer implementation.
pub struct PostgresWriter {
    session: Mutex<PgSession>,
    dialect: PostgresDialect,
}

impl PostgresWriter {
    /// Open a write session against the new database.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let session = PgSession::connect(config, SessionRole::Target).await?;
        Ok(Self::new(session))
    }

    /// Wrap an already open session.
    pub fn new(session: PgSession) -> Self {
        Self {
            session: Mutex::new(session),
            dialect: PostgresDialect::new(),
        }
    }
}

#[async_trait]
impl BatchWriter for PostgresWriter {
    async fn write_batch(&self, table: &TargetTable, page: &Page, mode: TargetMode) -> Result<u64> {
        if page.is_empty() {
            return Ok(0);
        }

        let table_name = table.full_name();
        let width = table.columns.len() + 1;
        let rows_per_stmt = (MAX_BIND_PARAMS / width).max(1);

        let mut session = self.session.lock().await;
        let tx = session
            .client_mut()
            .transaction()
            .await
            .map_err(|e| classify_write_error(&table_name, e))?;

        let mut affected = 0u64;
        for chunk in page.records.chunks(rows_per_stmt) {
            let sql = self.dialect.build_insert_query(table, chunk.len(), mode);

            let values: Vec<SqlValue> = chunk
                .iter()
                .flat_map(|record| {
                    std::iter::once(SqlValue::I64(record.id)).chain(
                        table
                            .columns
                            .iter()
                            .map(|col| record.get(col).cloned().unwrap_or(SqlValue::Null)),
                    )
                })
                .collect();
            let params: Vec<&(dyn ToSql + Sync)> =
                values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();

            // An error here drops `tx`, which rolls the whole page back
            affected += tx
                .execute(sql.as_str(), &params)
                .await
                .map_err(|e| classify_write_error(&table_name, e))?;
        }

        tx.commit()
            .await
            .map_err(|e| classify_write_error(&table_name, e))?;

        debug!("Committed {} rows to {} ({} affected)", page.len(), table_name, affected);
        Ok(affected)
    }

    async fn truncate(&self, table: &TargetTable) -> Result<()> {
        let sql = self.dialect.build_truncate_query(&table.schema, &table.table);
        let session = self.session.lock().await;
        session
            .client()
            .batch_execute(&sql)
            .await
            .map_err(|e| MigrateError::write_rejected(table.full_name(), e))?;
        debug!("Truncated {}", table.full_name());
        Ok(())
    }

    async fn row_count(&self, table: &TargetTable) -> Result<i64> {
        let sql = self.dialect.build_count_query(&table.schema, &table.table);
        let session = self.session.lock().await;
        let row = session
            .client()
            .query_one(sql.as_str(), &[])
            .await
            .map_err(|e| MigrateError::write_rejected(table.full_name(), e))?;
        row.try_get(0)
            .map_err(|e| MigrateError::write_rejected(table.full_name(), e))
    }

    async fn ping(&self) -> Result<()> {
        let session = self.session.lock().await;
        session
            .client()
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::write_rejected("health check", e))?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "postgres"
    }
}

/// Map a driver error to `DuplicateKey` for unique violations, `WriteRejected` otherwise.
fn classify_write_error(table: &str, err: tokio_postgres::Error) -> MigrateError {
    if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        let detail = err.as_db_error().and_then(|db| db.detail()).unwrap_or_default();
        return MigrateError::DuplicateKey {
            table: table.to_string(),
            id: parse_conflicting_id(detail),
            message: err
                .as_db_error()
                .map(|db| db.message().to_string())
                .unwrap_or_else(|| err.to_string()),
        };
    }
    MigrateError::write_rejected(table, err)
}

/// Extract the key from a detail line such as `Key (id)=(5) already exists.`
fn parse_conflicting_id(detail: &str) -> Option<i64> {
    let rest = &detail[detail.find(")=(")? + 3..];
    rest[..rest.find(')')?].trim().parse().ok()
}

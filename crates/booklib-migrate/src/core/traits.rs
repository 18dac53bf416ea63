//! Core traits for the paginated copy.
//!
//! - [`PageReader`]: one bounded, ordered fetch from the source
//! - [`BatchWriter`]: one atomic bulk write into the destination
//! - [`ProgressReporter`]: where the orchestrator reports what it did
//!
//! The orchestrator only ever talks to these traits, so the PostgreSQL driver
//! and the in-memory driver are interchangeable.

use async_trait::async_trait;
use tracing::{error, info};

use super::record::{Cursor, Page};
use crate::config::TargetMode;
use crate::entity::{SourceTable, TargetTable};
use crate::error::{MigrateError, Result};
use crate::orchestrator::{EntityReport, MigrationRun};

/// Read pages of records from a source database.
#[async_trait]
pub trait PageReader: Send + Sync {
    /// Fetch at most `limit` records whose id is strictly greater than the
    /// cursor (or from the start when the cursor is absent), ascending by id.
    ///
    /// Must not modify the source; fetching twice with the same cursor
    /// returns the same page. Read failures surface as
    /// [`MigrateError::SourceUnavailable`] and are not retried.
    async fn fetch_page(&self, table: &SourceTable, cursor: Cursor, limit: usize) -> Result<Page>;

    /// Count the rows of a source table.
    async fn row_count(&self, table: &SourceTable) -> Result<i64>;

    /// Check that the source answers.
    async fn ping(&self) -> Result<()>;

    /// Get the database type identifier (e.g., "postgres", "memory").
    fn db_type(&self) -> &str;
}

/// Write pages of records to a destination database.
#[async_trait]
pub trait BatchWriter: Send + Sync {
    /// Write every record of `page` as one atomic unit.
    ///
    /// Either all rows are committed or none are. Under
    /// [`TargetMode::Insert`] and [`TargetMode::Truncate`] an existing
    /// primary key fails the batch with [`MigrateError::DuplicateKey`].
    /// Returns the number of rows handed to the destination.
    async fn write_batch(&self, table: &TargetTable, page: &Page, mode: TargetMode) -> Result<u64>;

    /// Remove every row from a destination table.
    async fn truncate(&self, table: &TargetTable) -> Result<()>;

    /// Count the rows of a destination table.
    async fn row_count(&self, table: &TargetTable) -> Result<i64>;

    /// Check that the destination answers.
    async fn ping(&self) -> Result<()>;

    /// Get the database type identifier (e.g., "postgres", "memory").
    fn db_type(&self) -> &str;
}

/// Observer for migration progress.
pub trait ProgressReporter: Send + Sync {
    /// A page was committed to the destination.
    fn batch_written(&self, entity: &str, batch_rows: usize, total_copied: u64, last_id: Option<i64>);

    /// An entity finished.
    fn entity_completed(&self, report: &EntityReport);

    /// An entity failed; the run stops after this call.
    fn entity_failed(&self, run: &MigrationRun, error: &MigrateError);
}

/// Default reporter: one human-readable log line per batch and per entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn batch_written(&self, entity: &str, batch_rows: usize, total_copied: u64, last_id: Option<i64>) {
        info!(
            "{}: wrote {} rows ({} total, cursor at {})",
            entity,
            batch_rows,
            total_copied,
            last_id.map_or_else(|| "start".to_string(), |id| id.to_string())
        );
    }

    fn entity_completed(&self, report: &EntityReport) {
        info!(
            "{}: completed ({} rows in {} pages, {:.2}s)",
            report.entity, report.rows_copied, report.pages_fetched, report.duration_seconds
        );
    }

    fn entity_failed(&self, run: &MigrationRun, error: &MigrateError) {
        error!(
            "{}: failed after {} rows (last committed id: {}) - {}",
            run.entity,
            run.total_copied,
            run.cursor
                .last_seen_id
                .map_or_else(|| "none".to_string(), |id| id.to_string()),
            error
        );
    }
}

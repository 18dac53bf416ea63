//! # booklib-migrate
//!
//! Paginated copy of the booklib reference tables from the legacy schema
//! into the new one.
//!
//! Each entity (`author` -> `person`, `genre` -> `genre`) is read in pages
//! ordered by primary key, renamed field by field, and written one page per
//! transaction. The loop stops on the first page shorter than the page size.
//!
//! - **Keyset pagination** with a strictly increasing cursor
//! - **Batch atomicity**: a page is committed whole or not at all
//! - **Explicit conflict policy**: insert, truncate, skip existing or upsert
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use booklib_migrate::{Config, EntityMigrationSpec, Orchestrator, PostgresReader, PostgresWriter};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> booklib_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let specs = EntityMigrationSpec::from_config(&config)?;
//!     let reader = PostgresReader::connect(&config.source).await?;
//!     let writer = PostgresWriter::connect(&config.target).await?;
//!
//!     let orchestrator = Orchestrator::new(
//!         Arc::new(reader),
//!         Arc::new(writer),
//!         specs,
//!         config.migration.target_mode,
//!     )?;
//!     let result = orchestrator.run().await?;
//!     println!("Migrated {} rows", result.rows_transferred);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod entity;
pub mod error;
pub mod orchestrator;

// Re-exports for convenient access
pub use config::{Config, DatabaseConfig, MigrationConfig, TargetMode};
pub use crate::core::{BatchWriter, Cursor, LogProgress, Page, PageReader, ProgressReporter, Record, SqlValue};
pub use drivers::{MemorySource, MemoryTarget, PostgresReader, PostgresWriter};
pub use entity::{EntityMigrationSpec, FieldMapping, RowMapper, SourceTable, TargetTable, UnmappedFields};
pub use error::{MigrateError, Result};
pub use orchestrator::{
    CountCheck, EntityReport, HealthCheckResult, MigrationResult, MigrationRun, Orchestrator, RunState,
};

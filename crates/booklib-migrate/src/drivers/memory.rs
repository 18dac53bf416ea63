//! In-memory driver.
//!
//! [`MemorySource`] and [`MemoryTarget`] implement the reader and writer
//! traits over `BTreeMap` tables keyed by `schema.table`. They keep a log of
//! every call and can be told to fail, so the orchestrator can be exercised
//! without a database.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::config::TargetMode;
use crate::core::traits::{BatchWriter, PageReader};
use crate::core::{Cursor, Page, Record};
use crate::entity::{SourceTable, TargetTable};
use crate::error::{MigrateError, Result};

type Table = BTreeMap<i64, Record>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One recorded `fetch_page` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub table: String,
    pub cursor: Cursor,
    pub limit: usize,
    pub returned: usize,
}

#[derive(Debug, Default)]
struct SourceState {
    tables: BTreeMap<String, Table>,
    fetches: Vec<FetchCall>,
}

/// Deterministic in-memory source.
#[derive(Debug, Default)]
pub struct MemorySource {
    state: Mutex<SourceState>,
    fail_on_fetch: Option<usize>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table (builder style). `name` is `schema.table`.
    pub fn with_table(self, name: impl Into<String>, records: impl IntoIterator<Item = Record>) -> Self {
        lock(&self.state)
            .tables
            .insert(name.into(), records.into_iter().map(|r| (r.id, r)).collect());
        self
    }

    /// Fail the `n`th fetch call (1-based) with `SourceUnavailable`.
    pub fn with_fail_on_fetch(mut self, n: usize) -> Self {
        self.fail_on_fetch = Some(n);
        self
    }

    /// Every fetch made so far, in call order.
    pub fn fetch_calls(&self) -> Vec<FetchCall> {
        lock(&self.state).fetches.clone()
    }

    /// Number of fetches made against one table.
    pub fn fetch_count(&self, table: &str) -> usize {
        lock(&self.state)
            .fetches
            .iter()
            .filter(|call| call.table == table)
            .count()
    }
}

#[async_trait]
impl PageReader for MemorySource {
    async fn fetch_page(&self, table: &SourceTable, cursor: Cursor, limit: usize) -> Result<Page> {
        let name = table.full_name();
        let mut state = lock(&self.state);

        if self.fail_on_fetch == Some(state.fetches.len() + 1) {
            state.fetches.push(FetchCall {
                table: name.clone(),
                cursor,
                limit,
                returned: 0,
            });
            return Err(MigrateError::source_unavailable(name, "injected read failure"));
        }

        let rows = state
            .tables
            .get(&name)
            .ok_or_else(|| MigrateError::source_unavailable(&name, "relation does not exist"))?;

        let lower = match cursor.last_seen_id {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };
        let records: Vec<Record> = rows
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(_, record)| project(record, &table.columns))
            .collect();

        state.fetches.push(FetchCall {
            table: name,
            cursor,
            limit,
            returned: records.len(),
        });
        Ok(Page::new(records))
    }

    async fn row_count(&self, table: &SourceTable) -> Result<i64> {
        let name = table.full_name();
        lock(&self.state)
            .tables
            .get(&name)
            .map(|rows| rows.len() as i64)
            .ok_or_else(|| MigrateError::source_unavailable(name, "relation does not exist"))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "memory"
    }
}

/// Keep only the requested columns, like a `SELECT` list would.
fn project(record: &Record, columns: &[String]) -> Record {
    let mut projected = Record::new(record.id);
    for column in columns {
        if let Some(value) = record.get(column) {
            projected.fields.insert(column.clone(), value.clone());
        }
    }
    projected
}

#[derive(Debug, Default)]
struct TargetState {
    tables: BTreeMap<String, Table>,
    writes: Vec<(String, i64)>,
    batches: usize,
    truncates: Vec<String>,
}

/// Deterministic in-memory destination.
///
/// A batch is applied to a copy of the table and swapped in only when every
/// row succeeded, mirroring a rolled back transaction on failure.
#[derive(Debug, Default)]
pub struct MemoryTarget {
    state: Mutex<TargetState>,
    fail_on_batch: Option<usize>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a table (builder style). `name` is `schema.table`.
    pub fn with_table(self, name: impl Into<String>, records: impl IntoIterator<Item = Record>) -> Self {
        lock(&self.state)
            .tables
            .insert(name.into(), records.into_iter().map(|r| (r.id, r)).collect());
        self
    }

    /// Reject the `n`th `write_batch` call (1-based) with `WriteRejected`.
    pub fn with_fail_on_batch(mut self, n: usize) -> Self {
        self.fail_on_batch = Some(n);
        self
    }

    /// Committed rows of a table, ascending by id.
    pub fn rows(&self, table: &str) -> Vec<Record> {
        lock(&self.state)
            .tables
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Ids of a table in the order they were committed.
    pub fn write_order(&self, table: &str) -> Vec<i64> {
        lock(&self.state)
            .writes
            .iter()
            .filter(|(name, _)| name == table)
            .map(|(_, id)| *id)
            .collect()
    }

    /// Number of `write_batch` calls made, including failed ones.
    pub fn batch_count(&self) -> usize {
        lock(&self.state).batches
    }

    /// Tables truncated so far, in call order.
    pub fn truncated(&self) -> Vec<String> {
        lock(&self.state).truncates.clone()
    }
}

#[async_trait]
impl BatchWriter for MemoryTarget {
    async fn write_batch(&self, table: &TargetTable, page: &Page, mode: TargetMode) -> Result<u64> {
        let name = table.full_name();
        let mut state = lock(&self.state);
        state.batches += 1;

        if self.fail_on_batch == Some(state.batches) {
            return Err(MigrateError::write_rejected(name, "injected write failure"));
        }

        let mut staged = state.tables.get(&name).cloned().unwrap_or_default();
        let mut written = Vec::with_capacity(page.len());

        for record in &page.records {
            let exists = staged.contains_key(&record.id);
            match mode {
                TargetMode::Insert | TargetMode::Truncate if exists => {
                    return Err(MigrateError::DuplicateKey {
                        table: name.clone(),
                        id: Some(record.id),
                        message: format!("Key ({})=({}) already exists.", table.id_column, record.id),
                    });
                }
                TargetMode::SkipExisting if exists => continue,
                _ => {
                    staged.insert(record.id, record.clone());
                    written.push(record.id);
                }
            }
        }

        let affected = written.len() as u64;
        state.tables.insert(name.clone(), staged);
        state
            .writes
            .extend(written.into_iter().map(|id| (name.clone(), id)));
        Ok(affected)
    }

    async fn truncate(&self, table: &TargetTable) -> Result<()> {
        let name = table.full_name();
        let mut state = lock(&self.state);
        state.tables.insert(name.clone(), Table::new());
        state.truncates.push(name);
        Ok(())
    }

    async fn row_count(&self, table: &TargetTable) -> Result<i64> {
        Ok(lock(&self.state)
            .tables
            .get(&table.full_name())
            .map_or(0, |rows| rows.len() as i64))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "memory"
    }
}

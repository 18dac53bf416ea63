//! Records, cursors and pages: the units the migration loop moves around.

use std::collections::BTreeMap;

use serde::Serialize;

use super::value::SqlValue;
use crate::error::{MigrateError, Result};

/// One row of an entity table: an integer primary key plus named scalar fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Primary key, assigned by the source and unique within the table.
    pub id: i64,

    /// Non-key fields by column name.
    pub fields: BTreeMap<String, SqlValue>,
}

impl Record {
    /// Create a record with no fields.
    pub fn new(id: i64) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
        }
    }

    /// Add a field (builder style).
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Look up a field value.
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.fields.get(name)
    }
}

/// Position in a source table: the last primary key already handed out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Cursor {
    /// `None` means the start of the table.
    pub last_seen_id: Option<i64>,
}

impl Cursor {
    /// Cursor positioned before the first row.
    pub fn start() -> Self {
        Self { last_seen_id: None }
    }

    /// Cursor positioned after `id`.
    pub fn after(id: i64) -> Self {
        Self {
            last_seen_id: Some(id),
        }
    }

    /// Whether this cursor has not been advanced yet.
    pub fn is_start(&self) -> bool {
        self.last_seen_id.is_none()
    }

    /// Whether a row with this id lies beyond the cursor.
    pub fn admits(&self, id: i64) -> bool {
        self.last_seen_id.map_or(true, |last| id > last)
    }

    /// Move the cursor to `id`, which must lie strictly beyond the current position.
    pub fn advance(&mut self, id: i64, table: &str) -> Result<()> {
        if !self.admits(id) {
            return Err(MigrateError::malformed(
                table,
                Some(id),
                format!(
                    "cursor cannot move backwards from {} to {}",
                    self.last_seen_id.unwrap_or_default(),
                    id
                ),
            ));
        }
        self.last_seen_id = Some(id);
        Ok(())
    }
}

/// An ordered batch of records produced by one fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Records in ascending primary-key order.
    pub records: Vec<Record>,
}

impl Page {
    /// Create a page from records.
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Number of records in this page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the page is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Primary key of the last record.
    pub fn last_id(&self) -> Option<i64> {
        self.records.last().map(|r| r.id)
    }

    /// A page shorter than the requested size means the source is exhausted.
    pub fn is_short(&self, page_size: usize) -> bool {
        self.records.len() < page_size
    }

    /// Check that the page is a legal answer to a fetch at `cursor` with `limit`.
    ///
    /// Ids must be strictly ascending and all beyond the cursor, and the page
    /// may not exceed the limit.
    pub fn check_order(&self, cursor: Cursor, limit: usize, table: &str) -> Result<()> {
        if self.records.len() > limit {
            return Err(MigrateError::malformed(
                table,
                None,
                format!(
                    "reader returned {} rows for a page of {}",
                    self.records.len(),
                    limit
                ),
            ));
        }

        let mut position = cursor;
        for record in &self.records {
            if !position.admits(record.id) {
                return Err(MigrateError::malformed(
                    table,
                    Some(record.id),
                    format!(
                        "rows out of order: id {} does not follow {}",
                        record.id,
                        position.last_seen_id.unwrap_or_default()
                    ),
                ));
            }
            position = Cursor::after(record.id);
        }
        Ok(())
    }
}

impl From<Vec<Record>> for Page {
    fn from(records: Vec<Record>) -> Self {
        Self::new(records)
    }
}

//! Entity migration specs: which table is copied where, and how fields are renamed.
//!
//! Every spec is built once at startup from the configuration and never
//! changes afterwards. The built-in catalog covers the booklib reference
//! tables:
//!
//! | entity    | source            | destination       |
//! |-----------|-------------------|-------------------|
//! | `authors` | `author(id, f_name)` | `person(id, f_name)` |
//! | `genres`  | `genre(id, code)`    | `genre(id, code)`    |

use serde::Serialize;

use crate::config::Config;
use crate::core::{Page, Record, SqlValue};
use crate::error::{MigrateError, Result};

/// Names of the built-in entities, in default migration order.
pub const BUILTIN_ENTITIES: &[&str] = &["authors", "genres"];

/// Source side of an entity: the table read page by page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceTable {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Integer primary key column used as the pagination cursor.
    pub id_column: String,
    /// Non-key columns to read.
    pub columns: Vec<String>,
}

impl SourceTable {
    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

/// Destination side of an entity: the table pages are appended to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetTable {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Primary key column receiving the source id.
    pub id_column: String,
    /// Non-key columns to write, in insert order.
    pub columns: Vec<String>,
}

impl TargetTable {
    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

/// Schema, table and key column naming one side of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Integer primary key column.
    pub id_column: String,
}

impl TableRef {
    /// A table keyed by an `id` column.
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            id_column: "id".to_string(),
        }
    }
}

/// One renamed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMapping {
    /// Source column name.
    pub source: String,
    /// Destination column name.
    pub target: String,
    /// Whether a NULL or missing value makes the record malformed.
    pub required: bool,
}

impl FieldMapping {
    /// A field that may be NULL.
    pub fn optional(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            required: false,
        }
    }

    /// A field that must carry a value.
    pub fn required(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            required: true,
        }
    }
}

/// What happens to source fields the mapping does not mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedFields {
    /// Leave them out of the destination record.
    Drop,
    /// Treat the record as malformed.
    Reject,
}

/// Stateless per-entity field renaming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowMapper {
    fields: Vec<FieldMapping>,
    unmapped: UnmappedFields,
}

impl RowMapper {
    /// Create a mapper with an explicit policy for unmapped fields.
    pub fn new(fields: Vec<FieldMapping>, unmapped: UnmappedFields) -> Self {
        Self { fields, unmapped }
    }

    /// Declared field mappings.
    pub fn fields(&self) -> &[FieldMapping] {
        &self.fields
    }

    /// Declared policy for unmapped fields.
    pub fn unmapped(&self) -> UnmappedFields {
        self.unmapped
    }

    /// Source column names, in mapping order.
    pub fn source_columns(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.source.clone()).collect()
    }

    /// Destination column names, in mapping order.
    pub fn target_columns(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.target.clone()).collect()
    }

    /// Map one source record to the destination shape. The id is kept as is.
    pub fn map(&self, table: &str, record: &Record) -> Result<Record> {
        if self.unmapped == UnmappedFields::Reject {
            if let Some(name) = record
                .fields
                .keys()
                .find(|name| !self.fields.iter().any(|f| &f.source == *name))
            {
                return Err(MigrateError::malformed(
                    table,
                    Some(record.id),
                    format!("field '{}' has no mapping", name),
                ));
            }
        }

        let mut mapped = Record::new(record.id);
        for field in &self.fields {
            let value = record.get(&field.source).cloned().unwrap_or(SqlValue::Null);
            if field.required && value.is_null() {
                return Err(MigrateError::malformed(
                    table,
                    Some(record.id),
                    format!("required field '{}' is NULL", field.source),
                ));
            }
            mapped.fields.insert(field.target.clone(), value);
        }
        Ok(mapped)
    }

    /// Map every record of a page, preserving order.
    pub fn map_page(&self, table: &str, page: &Page) -> Result<Page> {
        page.records
            .iter()
            .map(|record| self.map(table, record))
            .collect::<Result<Vec<_>>>()
            .map(Page::new)
    }
}

/// Declarative description of one table-to-table copy job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityMigrationSpec {
    name: String,
    source: SourceTable,
    target: TargetTable,
    mapper: RowMapper,
    page_size: usize,
}

impl EntityMigrationSpec {
    /// Create a spec. Source and destination column lists are derived from the mapper.
    pub fn new(
        name: impl Into<String>,
        source: TableRef,
        target: TableRef,
        mapper: RowMapper,
        page_size: usize,
    ) -> Result<Self> {
        let name = name.into();
        if page_size == 0 {
            return Err(MigrateError::Config(format!(
                "{}: page size must be a positive integer",
                name
            )));
        }
        let source = SourceTable {
            schema: source.schema,
            table: source.table,
            id_column: source.id_column,
            columns: mapper.source_columns(),
        };
        let target = TargetTable {
            schema: target.schema,
            table: target.table,
            id_column: target.id_column,
            columns: mapper.target_columns(),
        };
        Ok(Self {
            name,
            source,
            target,
            mapper,
            page_size,
        })
    }

    /// Entity name used in logs and errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table read from.
    pub fn source(&self) -> &SourceTable {
        &self.source
    }

    /// Table written to.
    pub fn target(&self) -> &TargetTable {
        &self.target
    }

    /// Field renaming.
    pub fn mapper(&self) -> &RowMapper {
        &self.mapper
    }

    /// Rows per page.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Legacy `author` rows become `person` rows.
    pub fn authors(source_schema: &str, target_schema: &str, page_size: usize) -> Result<Self> {
        Self::new(
            "authors",
            TableRef::new(source_schema, "author"),
            TableRef::new(target_schema, "person"),
            RowMapper::new(
                vec![FieldMapping::optional("f_name", "f_name")],
                UnmappedFields::Drop,
            ),
            page_size,
        )
    }

    /// Legacy `genre` rows are copied to the new `genre` table.
    pub fn genres(source_schema: &str, target_schema: &str, page_size: usize) -> Result<Self> {
        Self::new(
            "genres",
            TableRef::new(source_schema, "genre"),
            TableRef::new(target_schema, "genre"),
            RowMapper::new(
                vec![FieldMapping::required("code", "code")],
                UnmappedFields::Drop,
            ),
            page_size,
        )
    }

    /// Build a built-in spec by name.
    pub fn builtin(
        name: &str,
        source_schema: &str,
        target_schema: &str,
        page_size: usize,
    ) -> Result<Self> {
        match name {
            "authors" => Self::authors(source_schema, target_schema, page_size),
            "genres" => Self::genres(source_schema, target_schema, page_size),
            other => Err(MigrateError::Config(format!(
                "unknown entity '{}' (known: {})",
                other,
                BUILTIN_ENTITIES.join(", ")
            ))),
        }
    }

    /// Build the specs selected by the configuration, in migration order.
    pub fn from_config(config: &Config) -> Result<Vec<Self>> {
        let names: Vec<&str> = if config.migration.entities.is_empty() {
            BUILTIN_ENTITIES.to_vec()
        } else {
            config.migration.entities.iter().map(String::as_str).collect()
        };

        names
            .into_iter()
            .map(|name| {
                Self::builtin(
                    name,
                    &config.source.schema,
                    &config.target.schema,
                    config.migration.page_size,
                )
            })
            .collect()
    }
}

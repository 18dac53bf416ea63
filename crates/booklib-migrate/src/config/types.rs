//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Legacy database the reference tables are read from.
    pub source: DatabaseConfig,

    /// New database the reference tables are written to.
    pub target: DatabaseConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// PostgreSQL connection parameters for one side of the migration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Schema holding the tables (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode (default: "require").
    #[serde(default = "default_require")]
    pub ssl_mode: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows fetched and written per page (default: 128).
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Policy for destination rows that already exist (default: insert).
    #[serde(default)]
    pub target_mode: TargetMode,

    /// Entities to migrate, in order. Empty means every built-in entity.
    #[serde(default)]
    pub entities: Vec<String>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            target_mode: TargetMode::default(),
            entities: Vec::new(),
        }
    }
}

/// Conflict policy applied uniformly to every entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMode {
    /// Plain INSERT; an existing primary key fails the batch with DuplicateKey.
    #[default]
    Insert,

    /// Clear each destination table before its first page, then INSERT.
    Truncate,

    /// INSERT, leaving rows whose primary key already exists untouched.
    SkipExisting,

    /// INSERT new rows, overwrite existing rows with the source values.
    Upsert,
}

impl TargetMode {
    /// Parse a target mode from its configuration spelling.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "insert" => Some(TargetMode::Insert),
            "truncate" => Some(TargetMode::Truncate),
            "skip_existing" => Some(TargetMode::SkipExisting),
            "upsert" => Some(TargetMode::Upsert),
            _ => None,
        }
    }
}

impl fmt::Display for TargetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetMode::Insert => "insert",
            TargetMode::Truncate => "truncate",
            TargetMode::SkipExisting => "skip_existing",
            TargetMode::Upsert => "upsert",
        };
        f.write_str(name)
    }
}

// Default value functions for serde
fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_require() -> String {
    "require".to_string()
}

fn default_page_size() -> usize {
    128
}

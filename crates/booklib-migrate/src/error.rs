//! Error types for the migration library.

use thiserror::Error;

/// Exit code for configuration problems (missing, unparsable or invalid).
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for source read failures.
pub const EXIT_SOURCE_ERROR: u8 = 2;
/// Exit code for destination write failures.
pub const EXIT_WRITE_ERROR: u8 = 3;
/// Exit code for records that cannot be mapped.
pub const EXIT_MALFORMED_RECORD: u8 = 4;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML values, bad page size, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No configuration location was supplied.
    #[error("Configuration missing: {0}")]
    ConfigMissing(String),

    /// A database session could not be opened.
    #[error("Cannot connect to {side} database: {message}")]
    Connection { side: String, message: String },

    /// The source could not be read.
    #[error("Source unavailable while reading {table}: {message}")]
    SourceUnavailable { table: String, message: String },

    /// A destination row with the same primary key already exists.
    #[error("Duplicate key in {table}{}: {message}", fmt_id(.id))]
    DuplicateKey {
        table: String,
        id: Option<i64>,
        message: String,
    },

    /// The destination refused the batch for any other reason.
    #[error("Write rejected for {table}: {message}")]
    WriteRejected { table: String, message: String },

    /// A source record could not be mapped to the destination shape.
    #[error("Malformed record in {table}{}: {message}", fmt_id(.id))]
    MalformedRecord {
        table: String,
        id: Option<i64>,
        message: String,
    },

    /// An entity run failed; carries the context needed for a manual resume decision.
    #[error(
        "Migration of {entity} failed after {rows_copied} rows (last committed id: {}): {source}",
        fmt_cursor(.last_id)
    )]
    EntityFailed {
        entity: String,
        last_id: Option<i64>,
        rows_copied: u64,
        #[source]
        source: Box<MigrateError>,
    },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn fmt_id(id: &Option<i64>) -> String {
    id.map(|id| format!(" (id {})", id)).unwrap_or_default()
}

fn fmt_cursor(id: &Option<i64>) -> String {
    id.map(|id| id.to_string())
        .unwrap_or_else(|| "none".to_string())
}

impl MigrateError {
    /// Create a SourceUnavailable error
    pub fn source_unavailable(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::SourceUnavailable {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a WriteRejected error
    pub fn write_rejected(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::WriteRejected {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a MalformedRecord error
    pub fn malformed(table: impl Into<String>, id: Option<i64>, message: impl Into<String>) -> Self {
        MigrateError::MalformedRecord {
            table: table.into(),
            id,
            message: message.into(),
        }
    }

    /// The innermost error, looking through `EntityFailed` wrappers.
    pub fn root_cause(&self) -> &MigrateError {
        match self {
            MigrateError::EntityFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self.root_cause() {
            MigrateError::Config(_)
            | MigrateError::ConfigMissing(_)
            | MigrateError::Yaml(_)
            | MigrateError::Json(_) => EXIT_CONFIG_ERROR,
            MigrateError::SourceUnavailable { .. } => EXIT_SOURCE_ERROR,
            MigrateError::Connection { side, .. } if side == "source" => EXIT_SOURCE_ERROR,
            MigrateError::Connection { .. } => EXIT_WRITE_ERROR,
            MigrateError::DuplicateKey { .. } | MigrateError::WriteRejected { .. } => {
                EXIT_WRITE_ERROR
            }
            MigrateError::MalformedRecord { .. } => EXIT_MALFORMED_RECORD,
            MigrateError::Io(_) => EXIT_IO_ERROR,
            MigrateError::EntityFailed { .. } => EXIT_WRITE_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_failed_message_carries_context() {
        let err = MigrateError::EntityFailed {
            entity: "authors".into(),
            last_id: Some(128),
            rows_copied: 128,
            source: Box::new(MigrateError::write_rejected("public.person", "disk full")),
        };
        let msg = err.to_string();
        assert!(msg.contains("authors"));
        assert!(msg.contains("128 rows"));
        assert!(msg.contains("last committed id: 128"));
    }

    #[test]
    fn test_entity_failed_without_cursor() {
        let err = MigrateError::EntityFailed {
            entity: "genres".into(),
            last_id: None,
            rows_copied: 0,
            source: Box::new(MigrateError::source_unavailable("public.genre", "connection reset")),
        };
        assert!(err.to_string().contains("last committed id: none"));
        assert_eq!(err.exit_code(), EXIT_SOURCE_ERROR);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            MigrateError::ConfigMissing("no path".into()).exit_code(),
            EXIT_CONFIG_ERROR
        );
        assert_eq!(
            MigrateError::DuplicateKey {
                table: "public.person".into(),
                id: Some(1),
                message: "exists".into()
            }
            .exit_code(),
            EXIT_WRITE_ERROR
        );
        assert_eq!(
            MigrateError::malformed("public.genre", Some(3), "code is NULL").exit_code(),
            EXIT_MALFORMED_RECORD
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(MigrateError::from(io).exit_code(), EXIT_IO_ERROR);
    }

    #[test]
    fn test_format_detailed_includes_cause_chain() {
        let err = MigrateError::EntityFailed {
            entity: "authors".into(),
            last_id: Some(5),
            rows_copied: 5,
            source: Box::new(MigrateError::DuplicateKey {
                table: "public.person".into(),
                id: Some(6),
                message: "already present".into(),
            }),
        };
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: Migration of authors failed"));
        assert!(detailed.contains("Caused by:\n  1: Duplicate key in public.person (id 6)"));
    }
}

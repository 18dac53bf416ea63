//! Configuration validation.

use std::collections::HashSet;

use super::{Config, DatabaseConfig};
use crate::drivers::common::SslMode;
use crate::entity::BUILTIN_ENTITIES;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_database("source", &config.source)?;
    validate_database("target", &config.target)?;

    // Cannot migrate into the database we read from
    if config.source.host == config.target.host
        && config.source.port == config.target.port
        && config.source.database == config.target.database
    {
        return Err(MigrateError::Config(
            "source and target cannot be the same database".into(),
        ));
    }

    if config.migration.page_size == 0 {
        return Err(MigrateError::Config(
            "migration.page_size must be at least 1".into(),
        ));
    }

    let mut seen = HashSet::new();
    for name in &config.migration.entities {
        if !BUILTIN_ENTITIES.contains(&name.as_str()) {
            return Err(MigrateError::Config(format!(
                "migration.entities: unknown entity '{}' (known: {})",
                name,
                BUILTIN_ENTITIES.join(", ")
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(MigrateError::Config(format!(
                "migration.entities: '{}' listed more than once",
                name
            )));
        }
    }

    Ok(())
}

fn validate_database(side: &str, db: &DatabaseConfig) -> Result<()> {
    if db.host.is_empty() {
        return Err(MigrateError::Config(format!("{}.host is required", side)));
    }
    if db.database.is_empty() {
        return Err(MigrateError::Config(format!("{}.database is required", side)));
    }
    if db.user.is_empty() {
        return Err(MigrateError::Config(format!("{}.user is required", side)));
    }
    if db.schema.is_empty() {
        return Err(MigrateError::Config(format!("{}.schema is required", side)));
    }
    SslMode::parse(&db.ssl_mode)
        .map_err(|e| MigrateError::Config(format!("{}.ssl_mode: {}", side, e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MigrationConfig, TargetMode};

    fn valid_config() -> Config {
        Config {
            source: DatabaseConfig {
                host: "localhost".to_string(),
                port: 5432,
                database: "booklib_old".to_string(),
                user: "postgres".to_string(),
                password: "password".to_string(),
                schema: "public".to_string(),
                ssl_mode: "disable".to_string(),
            },
            target: DatabaseConfig {
                host: "localhost".to_string(),
                port: 5432,
                database: "booklib".to_string(),
                user: "postgres".to_string(),
                password: "password".to_string(),
                schema: "public".to_string(),
                ssl_mode: "disable".to_string(),
            },
            migration: MigrationConfig {
                page_size: 128,
                target_mode: TargetMode::Insert,
                entities: Vec::new(),
            },
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_source_host() {
        let mut config = valid_config();
        config.source.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_target_user() {
        let mut config = valid_config();
        config.target.user = "".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("target.user"));
    }

    #[test]
    fn test_same_database_rejected() {
        let mut config = valid_config();
        config.target.database = config.source.database.clone();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_ssl_mode() {
        let mut config = valid_config();
        config.source.ssl_mode = "sometimes".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("source.ssl_mode"));
    }

    #[test]
    fn test_zero_page_size() {
        let mut config = valid_config();
        config.migration.page_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unknown_entity() {
        let mut config = valid_config();
        config.migration.entities = vec!["publishers".to_string()];
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("publishers"));
    }

    #[test]
    fn test_duplicate_entity() {
        let mut config = valid_config();
        config.migration.entities = vec!["genres".to_string(), "genres".to_string()];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_source_config_debug_redacts_password() {
        let mut config = valid_config();
        config.source.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.source);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }

    #[test]
    fn test_target_config_debug_redacts_password() {
        let mut config = valid_config();
        config.target.password = "super_secret_password_456".to_string();
        let debug_output = format!("{:?}", config.target);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_456"));
    }
}

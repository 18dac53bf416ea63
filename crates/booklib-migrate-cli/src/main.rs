//! booklib-migrate CLI - copy the booklib reference tables into the new schema.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use booklib_migrate::entity::BUILTIN_ENTITIES;
use booklib_migrate::{
    Config, EntityMigrationSpec, MigrateError, MigrationConfig, Orchestrator, PostgresReader,
    PostgresWriter, TargetMode,
};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "booklib-migrate")]
#[command(about = "Copy booklib reference tables from the legacy schema into the new one")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, env = "BOOKLIB_MIGRATE_CONFIG")]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy every configured entity, page by page
    Run {
        /// Override rows per page
        #[arg(long)]
        page_size: Option<usize>,

        /// Override conflict policy: insert, truncate, skip-existing, upsert
        #[arg(long, value_parser = parse_target_mode)]
        target_mode: Option<TargetMode>,

        /// Migrate only this entity (repeatable; order is kept)
        #[arg(long = "entity", value_name = "NAME")]
        entities: Vec<String>,
    },

    /// Validate row counts between source and target
    Validate,

    /// Test database connections
    HealthCheck,

    /// List the built-in entities
    Entities,
}

fn parse_target_mode(s: &str) -> Result<TargetMode, String> {
    TargetMode::parse(s).ok_or_else(|| {
        format!(
            "invalid target mode '{}' (expected insert, truncate, skip-existing or upsert)",
            s
        )
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    // Listing entities needs neither logging nor a configuration
    if let Commands::Entities = cli.command {
        return list_entities(cli.output_json);
    }

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load_from(cli.config.as_ref())?;
    info!("Loaded configuration from {:?}", cli.config.as_ref());

    match cli.command {
        Commands::Entities => unreachable!(), // Handled above
        Commands::Run {
            page_size,
            target_mode,
            entities,
        } => {
            // Apply overrides
            if let Some(size) = page_size {
                config.migration.page_size = size;
            }
            if let Some(mode) = target_mode {
                config.migration.target_mode = mode;
            }
            if !entities.is_empty() {
                config.migration.entities = entities;
            }
            config.validate()?;

            let orchestrator = connect(&config).await?;
            let result = orchestrator.run().await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("\nMigration completed!");
                println!("  Run ID: {}", result.run_id);
                println!("  Duration: {:.2}s", result.duration_seconds);
                for entity in &result.entities {
                    println!(
                        "  {}: {} rows in {} pages (last id: {})",
                        entity.entity,
                        entity.rows_copied,
                        entity.pages_fetched,
                        entity
                            .last_id
                            .map_or_else(|| "none".to_string(), |id| id.to_string())
                    );
                }
                println!("  Rows: {}", result.rows_transferred);
                println!("  Throughput: {} rows/sec", result.rows_per_second);
            }
        }

        Commands::Validate => {
            let orchestrator = connect(&config).await?;
            let checks = orchestrator.validate().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&checks)?);
            } else {
                println!("Row counts:");
                for check in &checks {
                    println!(
                        "  {}: source={} target={} {}",
                        check.entity,
                        check.source_rows,
                        check.target_rows,
                        if check.matches { "OK" } else { "MISMATCH" }
                    );
                }
            }

            let mismatched = checks.iter().filter(|c| !c.matches).count();
            if mismatched > 0 {
                return Err(MigrateError::Config(format!(
                    "Validation failed: {} of {} entities differ",
                    mismatched,
                    checks.len()
                )));
            }
        }

        Commands::HealthCheck => {
            let orchestrator = connect(&config).await?;
            let result = orchestrator.health_check().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source: {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target: {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::Config("Health check failed".to_string()));
            }
        }
    }

    Ok(())
}

/// Open one session per store and wire them into an orchestrator.
///
/// Sessions are owned by the reader and writer and close when the
/// orchestrator is dropped.
async fn connect(config: &Config) -> Result<Orchestrator, MigrateError> {
    let specs = EntityMigrationSpec::from_config(config)?;
    let reader = PostgresReader::connect(&config.source).await?;
    let writer = PostgresWriter::connect(&config.target).await?;

    Orchestrator::new(
        Arc::new(reader),
        Arc::new(writer),
        specs,
        config.migration.target_mode,
    )
}

fn list_entities(output_json: bool) -> Result<(), MigrateError> {
    let page_size = MigrationConfig::default().page_size;
    let specs = BUILTIN_ENTITIES
        .iter()
        .map(|name| EntityMigrationSpec::builtin(name, "public", "public", page_size))
        .collect::<Result<Vec<_>, _>>()?;

    if output_json {
        println!("{}", serde_json::to_string_pretty(&specs)?);
        return Ok(());
    }

    for spec in &specs {
        let fields = spec
            .mapper()
            .fields()
            .iter()
            .map(|f| {
                format!(
                    "{} -> {}{}",
                    f.source,
                    f.target,
                    if f.required { " (required)" } else { "" }
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{}: {} -> {} [{}]",
            spec.name(),
            spec.source().table,
            spec.target().table,
            fields
        );
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

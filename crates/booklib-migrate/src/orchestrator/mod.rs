//! Migration orchestrator - main workflow coordinator.
//!
//! Drives each [`EntityMigrationSpec`] through the keyset loop
//! `Fetching -> Mapping -> Writing -> (Fetching | Completed | Failed)`,
//! one entity after another. The first failure aborts the whole run.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::TargetMode;
use crate::core::traits::{BatchWriter, LogProgress, PageReader, ProgressReporter};
use crate::core::Cursor;
use crate::entity::EntityMigrationSpec;
use crate::error::{MigrateError, Result};

/// Where an entity's loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Fetching,
    Mapping,
    Writing,
    Completed,
    Failed,
}

/// Per-entity counters, live only while that entity is being copied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRun {
    /// Entity name.
    pub entity: String,

    /// Last id committed to the destination.
    pub cursor: Cursor,

    /// Rows committed so far.
    pub total_copied: u64,

    /// Fetch calls made so far, including a terminal empty one.
    pub pages_fetched: u64,

    /// Current state.
    pub state: RunState,
}

impl MigrationRun {
    fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            cursor: Cursor::start(),
            total_copied: 0,
            pages_fetched: 0,
            state: RunState::Idle,
        }
    }
}

/// Summary of one completed entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityReport {
    pub entity: String,
    pub rows_copied: u64,
    pub pages_fetched: u64,
    pub last_id: Option<i64>,
    pub duration_seconds: f64,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: String,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// One report per entity, in migration order.
    pub entities: Vec<EntityReport>,

    /// Total rows transferred.
    pub rows_transferred: u64,

    /// Average throughput (rows/second).
    pub rows_per_second: u64,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Source and destination row counts for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountCheck {
    pub entity: String,
    pub source_rows: i64,
    pub target_rows: i64,
    pub matches: bool,
}

/// Connectivity of both stores.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
    pub healthy: bool,
}

/// Migration orchestrator.
pub struct Orchestrator {
    reader: Arc<dyn PageReader>,
    writer: Arc<dyn BatchWriter>,
    specs: Vec<EntityMigrationSpec>,
    mode: TargetMode,
    progress: Arc<dyn ProgressReporter>,
}

impl Orchestrator {
    /// Create a new orchestrator over the given stores and entity specs.
    ///
    /// Entities are migrated in the order given.
    pub fn new(
        reader: Arc<dyn PageReader>,
        writer: Arc<dyn BatchWriter>,
        specs: Vec<EntityMigrationSpec>,
        mode: TargetMode,
    ) -> Result<Self> {
        if specs.is_empty() {
            return Err(MigrateError::Config(
                "at least one entity must be migrated".to_string(),
            ));
        }

        Ok(Self {
            reader,
            writer,
            specs,
            mode,
            progress: Arc::new(LogProgress),
        })
    }

    /// Replace the progress reporter.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Entity specs, in migration order.
    pub fn specs(&self) -> &[EntityMigrationSpec] {
        &self.specs
    }

    /// Run the migration.
    pub async fn run(&self) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        info!(
            "Starting migration run: {} ({} entities, target mode {}, {} -> {})",
            run_id,
            self.specs.len(),
            self.mode,
            self.reader.db_type(),
            self.writer.db_type()
        );

        let mut entities = Vec::with_capacity(self.specs.len());
        for spec in &self.specs {
            let report = self.migrate_entity(spec).await?;
            entities.push(report);
        }

        let duration = start.elapsed().as_secs_f64();
        let rows_transferred: u64 = entities.iter().map(|e| e.rows_copied).sum();
        let rows_per_second = if duration > 0.0 {
            (rows_transferred as f64 / duration) as u64
        } else {
            0
        };

        info!(
            "Migration run {} completed: {} rows in {:.2}s ({} rows/sec)",
            run_id, rows_transferred, duration, rows_per_second
        );

        Ok(MigrationResult {
            run_id,
            status: "completed".to_string(),
            started_at,
            completed_at: Utc::now(),
            duration_seconds: duration,
            entities,
            rows_transferred,
            rows_per_second,
        })
    }

    /// Copy one entity, page by page.
    async fn migrate_entity(&self, spec: &EntityMigrationSpec) -> Result<EntityReport> {
        let start = Instant::now();
        let entity = spec.name();
        let page_size = spec.page_size();
        let source_name = spec.source().full_name();
        let mut run = MigrationRun::new(entity);

        info!(
            "{}: copying {} -> {} (page size {})",
            entity,
            spec.source().full_name(),
            spec.target().full_name(),
            page_size
        );

        if self.mode == TargetMode::Truncate {
            self.writer
                .truncate(spec.target())
                .await
                .map_err(|e| self.fail(&mut run, e))?;
        }

        loop {
            run.state = RunState::Fetching;
            let page = self
                .reader
                .fetch_page(spec.source(), run.cursor, page_size)
                .await
                .map_err(|e| self.fail(&mut run, e))?;
            run.pages_fetched += 1;

            page.check_order(run.cursor, page_size, &source_name)
                .map_err(|e| self.fail(&mut run, e))?;

            // Empty source, or the confirming fetch after an exactly full last page
            let Some(last_id) = page.last_id() else {
                break;
            };

            run.state = RunState::Mapping;
            let mapped = spec
                .mapper()
                .map_page(&source_name, &page)
                .map_err(|e| self.fail(&mut run, e))?;

            run.state = RunState::Writing;
            let affected = self
                .writer
                .write_batch(spec.target(), &mapped, self.mode)
                .await
                .map_err(|e| self.fail(&mut run, e))?;
            if affected != mapped.len() as u64 {
                debug!(
                    "{}: {} of {} rows changed the destination",
                    entity,
                    affected,
                    mapped.len()
                );
            }

            run.cursor
                .advance(last_id, &source_name)
                .map_err(|e| self.fail(&mut run, e))?;
            run.total_copied += page.len() as u64;
            self.progress
                .batch_written(entity, page.len(), run.total_copied, run.cursor.last_seen_id);

            if page.is_short(page_size) {
                break;
            }
        }

        run.state = RunState::Completed;
        let report = EntityReport {
            entity: run.entity,
            rows_copied: run.total_copied,
            pages_fetched: run.pages_fetched,
            last_id: run.cursor.last_seen_id,
            duration_seconds: start.elapsed().as_secs_f64(),
        };
        self.progress.entity_completed(&report);
        Ok(report)
    }

    /// Mark the run failed and wrap the cause with its resume context.
    fn fail(&self, run: &mut MigrationRun, error: MigrateError) -> MigrateError {
        run.state = RunState::Failed;
        self.progress.entity_failed(run, &error);
        MigrateError::EntityFailed {
            entity: run.entity.clone(),
            last_id: run.cursor.last_seen_id,
            rows_copied: run.total_copied,
            source: Box::new(error),
        }
    }

    /// Compare source and destination row counts per entity.
    pub async fn validate(&self) -> Result<Vec<CountCheck>> {
        let mut results = Vec::with_capacity(self.specs.len());

        for spec in &self.specs {
            let source_rows = self.reader.row_count(spec.source()).await?;
            let target_rows = self.writer.row_count(spec.target()).await?;
            let matches = source_rows == target_rows;

            if matches {
                info!("{}: {} rows (match)", spec.name(), source_rows);
            } else {
                warn!(
                    "{}: source={} target={} (MISMATCH)",
                    spec.name(),
                    source_rows,
                    target_rows
                );
            }

            results.push(CountCheck {
                entity: spec.name().to_string(),
                source_rows,
                target_rows,
                matches,
            });
        }

        Ok(results)
    }

    /// Ping both stores and time the round trips.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let start = Instant::now();
        let source = self.reader.ping().await;
        let source_latency_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let target = self.writer.ping().await;
        let target_latency_ms = start.elapsed().as_millis() as u64;

        let source_error = source.err().map(|e| e.to_string());
        let target_error = target.err().map(|e| e.to_string());

        Ok(HealthCheckResult {
            source_connected: source_error.is_none(),
            source_latency_ms,
            target_connected: target_error.is_none(),
            target_latency_ms,
            healthy: source_error.is_none() && target_error.is_none(),
            source_error,
            target_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::core::{Page, Record, SqlValue};
    use crate::drivers::memory::{MemorySource, MemoryTarget};
    use crate::entity::SourceTable;
    use crate::error::{EXIT_MALFORMED_RECORD, EXIT_SOURCE_ERROR, EXIT_WRITE_ERROR};

    fn authors(ids: impl IntoIterator<Item = i64>) -> Vec<Record> {
        ids.into_iter()
            .map(|id| Record::new(id).with_field("f_name", format!("author {}", id)))
            .collect()
    }

    fn genres(ids: impl IntoIterator<Item = i64>) -> Vec<Record> {
        ids.into_iter()
            .map(|id| Record::new(id).with_field("code", format!("G{:03}", id)))
            .collect()
    }

    fn authors_spec(page_size: usize) -> EntityMigrationSpec {
        EntityMigrationSpec::authors("public", "public", page_size).unwrap()
    }

    fn genres_spec(page_size: usize) -> EntityMigrationSpec {
        EntityMigrationSpec::genres("public", "public", page_size).unwrap()
    }

    fn orchestrator(
        source: &Arc<MemorySource>,
        target: &Arc<MemoryTarget>,
        specs: Vec<EntityMigrationSpec>,
        mode: TargetMode,
    ) -> Orchestrator {
        Orchestrator::new(source.clone(), target.clone(), specs, mode).unwrap()
    }

    fn ids(records: &[Record]) -> Vec<i64> {
        records.iter().map(|r| r.id).collect()
    }

    #[derive(Default)]
    struct RecordingProgress {
        batches: Mutex<Vec<(String, usize, u64, Option<i64>)>>,
        completed: Mutex<Vec<String>>,
        failed: Mutex<Vec<(String, RunState)>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn batch_written(&self, entity: &str, batch_rows: usize, total_copied: u64, last_id: Option<i64>) {
            self.batches
                .lock()
                .unwrap()
                .push((entity.to_string(), batch_rows, total_copied, last_id));
        }

        fn entity_completed(&self, report: &EntityReport) {
            self.completed.lock().unwrap().push(report.entity.clone());
        }

        fn entity_failed(&self, run: &MigrationRun, _error: &MigrateError) {
            self.failed
                .lock()
                .unwrap()
                .push((run.entity.clone(), run.state));
        }
    }

    /// Returns the same descending page for every fetch.
    struct DescendingReader;

    #[async_trait]
    impl PageReader for DescendingReader {
        async fn fetch_page(&self, _table: &SourceTable, _cursor: Cursor, _limit: usize) -> Result<Page> {
            Ok(Page::new(vec![
                Record::new(2).with_field("f_name", "b"),
                Record::new(1).with_field("f_name", "a"),
            ]))
        }

        async fn row_count(&self, _table: &SourceTable) -> Result<i64> {
            Ok(2)
        }

        async fn ping(&self) -> Result<()> {
            Err(MigrateError::source_unavailable("health check", "connection refused"))
        }

        fn db_type(&self) -> &str {
            "test"
        }
    }

    #[tokio::test]
    async fn test_empty_source_completes_after_one_fetch() {
        let source = Arc::new(MemorySource::new().with_table("public.author", vec![]));
        let target = Arc::new(MemoryTarget::new());

        let result = orchestrator(&source, &target, vec![authors_spec(128)], TargetMode::Insert)
            .run()
            .await
            .unwrap();

        assert_eq!(source.fetch_count("public.author"), 1);
        assert_eq!(result.rows_transferred, 0);
        assert_eq!(result.entities[0].rows_copied, 0);
        assert_eq!(result.entities[0].last_id, None);
        assert_eq!(target.batch_count(), 0);
    }

    #[tokio::test]
    async fn test_short_last_page_ends_loop() {
        let source = Arc::new(MemorySource::new().with_table("public.author", authors(1..=130)));
        let target = Arc::new(MemoryTarget::new());

        let result = orchestrator(&source, &target, vec![authors_spec(128)], TargetMode::Insert)
            .run()
            .await
            .unwrap();

        let calls = source.fetch_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].cursor, Cursor::start());
        assert_eq!(calls[0].returned, 128);
        assert_eq!(calls[1].cursor, Cursor::after(128));
        assert_eq!(calls[1].returned, 2);

        assert_eq!(target.rows("public.person").len(), 130);
        assert_eq!(result.entities[0].rows_copied, 130);
        assert_eq!(result.entities[0].pages_fetched, 2);
        assert_eq!(result.entities[0].last_id, Some(130));
    }

    #[tokio::test]
    async fn test_exactly_full_table_needs_confirming_fetch() {
        let source = Arc::new(MemorySource::new().with_table("public.genre", genres(1..=128)));
        let target = Arc::new(MemoryTarget::new());

        orchestrator(&source, &target, vec![genres_spec(128)], TargetMode::Insert)
            .run()
            .await
            .unwrap();

        let calls = source.fetch_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].returned, 0);
        assert_eq!(target.rows("public.genre").len(), 128);
        assert_eq!(target.batch_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_count_matches_page_arithmetic() {
        for (rows, page_size) in [(0i64, 3usize), (1, 3), (3, 3), (7, 3), (9, 3), (10, 1), (5, 100)] {
            let source = Arc::new(MemorySource::new().with_table("public.author", authors(1..=rows)));
            let target = Arc::new(MemoryTarget::new());

            orchestrator(&source, &target, vec![authors_spec(page_size)], TargetMode::Insert)
                .run()
                .await
                .unwrap();

            let n = rows as usize;
            let expected = n.div_ceil(page_size) + usize::from(n % page_size == 0);
            assert_eq!(
                source.fetch_count("public.author"),
                expected,
                "rows={} page_size={}",
                rows,
                page_size
            );
            assert_eq!(target.rows("public.person").len(), n);
        }
    }

    #[tokio::test]
    async fn test_rows_written_in_ascending_order() {
        // Sparse, non-contiguous ids
        let ids_in: Vec<i64> = vec![3, 10, 11, 40, 41, 42, 97, 200];
        let source = Arc::new(MemorySource::new().with_table("public.author", authors(ids_in.clone())));
        let target = Arc::new(MemoryTarget::new());

        orchestrator(&source, &target, vec![authors_spec(3)], TargetMode::Insert)
            .run()
            .await
            .unwrap();

        assert_eq!(target.write_order("public.person"), ids_in);
    }

    #[tokio::test]
    async fn test_write_failure_keeps_earlier_batches_and_stops_run() {
        let source = Arc::new(
            MemorySource::new()
                .with_table("public.author", authors(1..=300))
                .with_table("public.genre", genres(1..=5)),
        );
        let target = Arc::new(MemoryTarget::new().with_fail_on_batch(2));
        let progress = Arc::new(RecordingProgress::default());

        let err = orchestrator(
            &source,
            &target,
            vec![authors_spec(128), genres_spec(128)],
            TargetMode::Insert,
        )
        .with_progress(progress.clone())
        .run()
        .await
        .unwrap_err();

        match &err {
            MigrateError::EntityFailed {
                entity,
                last_id,
                rows_copied,
                source,
            } => {
                assert_eq!(entity, "authors");
                assert_eq!(*last_id, Some(128));
                assert_eq!(*rows_copied, 128);
                assert!(matches!(**source, MigrateError::WriteRejected { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.exit_code(), EXIT_WRITE_ERROR);

        assert_eq!(ids(&target.rows("public.person")), (1..=128).collect::<Vec<_>>());
        assert!(target.rows("public.genre").is_empty());
        assert_eq!(source.fetch_count("public.genre"), 0);

        let failed = progress.failed.lock().unwrap().clone();
        assert_eq!(failed, vec![("authors".to_string(), RunState::Failed)]);
        assert!(progress.completed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rerun_with_insert_fails_on_first_colliding_row() {
        let source = Arc::new(MemorySource::new().with_table("public.author", authors(1..=10)));
        let target = Arc::new(MemoryTarget::new());
        let orch = orchestrator(&source, &target, vec![authors_spec(4)], TargetMode::Insert);

        orch.run().await.unwrap();
        let err = orch.run().await.unwrap_err();

        match &err {
            MigrateError::EntityFailed { entity, .. } => assert_eq!(entity, "authors"),
            other => panic!("unexpected error: {other:?}"),
        }
        match err.root_cause() {
            MigrateError::DuplicateKey { table, id, .. } => {
                assert_eq!(table, "public.person");
                assert_eq!(*id, Some(1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.exit_code(), EXIT_WRITE_ERROR);
        assert_eq!(target.rows("public.person").len(), 10);
    }

    #[tokio::test]
    async fn test_duplicate_mid_page_rolls_back_whole_page() {
        let source = Arc::new(
            MemorySource::new()
                .with_table("public.author", authors(1..=300))
                .with_table("public.genre", genres(1..=5)),
        );
        let target = Arc::new(MemoryTarget::new().with_table("public.person", authors([200])));

        let err = orchestrator(
            &source,
            &target,
            vec![authors_spec(128), genres_spec(128)],
            TargetMode::Insert,
        )
        .run()
        .await
        .unwrap_err();

        match &err {
            MigrateError::EntityFailed {
                entity,
                last_id,
                rows_copied,
                ..
            } => {
                assert_eq!(entity, "authors");
                assert_eq!(*last_id, Some(128));
                assert_eq!(*rows_copied, 128);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(
            err.root_cause(),
            MigrateError::DuplicateKey { id: Some(200), .. }
        ));

        // Page two (129..=256) collided at 200 and left nothing behind
        let mut expected: Vec<i64> = (1..=128).collect();
        expected.push(200);
        let copied = ids(&target.rows("public.person"));
        assert_eq!(copied, expected);
        assert!(!copied.iter().any(|id| (129..=199).contains(id)));

        assert_eq!(source.fetch_count("public.genre"), 0);
        assert!(target.rows("public.genre").is_empty());
    }

    #[tokio::test]
    async fn test_rerun_with_skip_existing_is_noop() {
        let source = Arc::new(MemorySource::new().with_table("public.genre", genres(1..=10)));
        let target = Arc::new(
            MemoryTarget::new().with_table(
                "public.genre",
                vec![Record::new(1).with_field("code", "KEEP")],
            ),
        );

        orchestrator(&source, &target, vec![genres_spec(4)], TargetMode::SkipExisting)
            .run()
            .await
            .unwrap();

        let rows = target.rows("public.genre");
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0].get("code"), Some(&SqlValue::from("KEEP")));
    }

    #[tokio::test]
    async fn test_rerun_with_upsert_overwrites() {
        let source = Arc::new(MemorySource::new().with_table("public.genre", genres(1..=10)));
        let target = Arc::new(
            MemoryTarget::new().with_table(
                "public.genre",
                vec![Record::new(1).with_field("code", "STALE")],
            ),
        );

        orchestrator(&source, &target, vec![genres_spec(4)], TargetMode::Upsert)
            .run()
            .await
            .unwrap();

        let rows = target.rows("public.genre");
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0].get("code"), Some(&SqlValue::from("G001")));
    }

    #[tokio::test]
    async fn test_truncate_mode_clears_each_target_first() {
        let source = Arc::new(
            MemorySource::new()
                .with_table("public.author", authors(1..=3))
                .with_table("public.genre", genres(1..=2)),
        );
        let target = Arc::new(MemoryTarget::new().with_table("public.person", authors(1..=50)));

        orchestrator(
            &source,
            &target,
            vec![authors_spec(128), genres_spec(128)],
            TargetMode::Truncate,
        )
        .run()
        .await
        .unwrap();

        assert_eq!(
            target.truncated(),
            vec!["public.person".to_string(), "public.genre".to_string()]
        );
        assert_eq!(ids(&target.rows("public.person")), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_out_of_order_page_is_rejected_before_write() {
        let target = Arc::new(MemoryTarget::new());
        let err = Orchestrator::new(
            Arc::new(DescendingReader),
            target.clone(),
            vec![authors_spec(10)],
            TargetMode::Insert,
        )
        .unwrap()
        .run()
        .await
        .unwrap_err();

        assert!(matches!(err.root_cause(), MigrateError::MalformedRecord { .. }));
        assert_eq!(err.exit_code(), EXIT_MALFORMED_RECORD);
        assert_eq!(target.batch_count(), 0);
    }

    #[tokio::test]
    async fn test_null_required_field_is_malformed() {
        let mut rows = genres(1..=3);
        rows[1].fields.insert("code".into(), SqlValue::Null);
        let source = Arc::new(MemorySource::new().with_table("public.genre", rows));
        let target = Arc::new(MemoryTarget::new());

        let err = orchestrator(&source, &target, vec![genres_spec(2)], TargetMode::Insert)
            .run()
            .await
            .unwrap_err();

        match &err {
            MigrateError::EntityFailed { entity, .. } => assert_eq!(entity, "genres"),
            other => panic!("unexpected error: {other:?}"),
        }
        match err.root_cause() {
            MigrateError::MalformedRecord { table, id, .. } => {
                assert_eq!(table, "public.genre");
                assert_eq!(*id, Some(2));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(target.rows("public.genre").is_empty());
    }

    #[tokio::test]
    async fn test_source_failure_reports_last_cursor() {
        let source = Arc::new(
            MemorySource::new()
                .with_table("public.author", authors(1..=10))
                .with_fail_on_fetch(3),
        );
        let target = Arc::new(MemoryTarget::new());

        let err = orchestrator(&source, &target, vec![authors_spec(3)], TargetMode::Insert)
            .run()
            .await
            .unwrap_err();

        match &err {
            MigrateError::EntityFailed {
                last_id, rows_copied, ..
            } => {
                assert_eq!(*last_id, Some(6));
                assert_eq!(*rows_copied, 6);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.exit_code(), EXIT_SOURCE_ERROR);
        assert_eq!(target.rows("public.person").len(), 6);
    }

    #[tokio::test]
    async fn test_progress_reports_cumulative_counts() {
        let source = Arc::new(MemorySource::new().with_table("public.author", authors(1..=5)));
        let target = Arc::new(MemoryTarget::new());
        let progress = Arc::new(RecordingProgress::default());

        orchestrator(&source, &target, vec![authors_spec(2)], TargetMode::Insert)
            .with_progress(progress.clone())
            .run()
            .await
            .unwrap();

        let batches = progress.batches.lock().unwrap().clone();
        let totals: Vec<(usize, u64, Option<i64>)> =
            batches.iter().map(|(_, n, total, last)| (*n, *total, *last)).collect();
        assert_eq!(totals, vec![(2, 2, Some(2)), (2, 4, Some(4)), (1, 5, Some(5))]);
        assert_eq!(*progress.completed.lock().unwrap(), vec!["authors".to_string()]);
    }

    #[tokio::test]
    async fn test_entities_run_in_given_order() {
        let source = Arc::new(
            MemorySource::new()
                .with_table("public.author", authors(1..=2))
                .with_table("public.genre", genres(1..=2)),
        );
        let target = Arc::new(MemoryTarget::new());

        let result = orchestrator(
            &source,
            &target,
            vec![genres_spec(10), authors_spec(10)],
            TargetMode::Insert,
        )
        .run()
        .await
        .unwrap();

        let tables: Vec<String> = source.fetch_calls().into_iter().map(|c| c.table).collect();
        assert_eq!(tables, vec!["public.genre", "public.author"]);
        assert_eq!(result.rows_transferred, 4);
        assert_eq!(result.status, "completed");
    }

    #[test]
    fn test_empty_spec_list_is_config_error() {
        let result = Orchestrator::new(
            Arc::new(MemorySource::new()),
            Arc::new(MemoryTarget::new()),
            vec![],
            TargetMode::Insert,
        );
        assert!(matches!(result, Err(MigrateError::Config(_))));
    }

    #[tokio::test]
    async fn test_validate_reports_mismatch() {
        let source = Arc::new(
            MemorySource::new()
                .with_table("public.author", authors(1..=4))
                .with_table("public.genre", genres(1..=2)),
        );
        let target = Arc::new(MemoryTarget::new().with_table("public.person", authors(1..=4)));

        let checks = orchestrator(
            &source,
            &target,
            vec![authors_spec(10), genres_spec(10)],
            TargetMode::Insert,
        )
        .validate()
        .await
        .unwrap();

        assert_eq!(
            checks,
            vec![
                CountCheck {
                    entity: "authors".into(),
                    source_rows: 4,
                    target_rows: 4,
                    matches: true,
                },
                CountCheck {
                    entity: "genres".into(),
                    source_rows: 2,
                    target_rows: 0,
                    matches: false,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_health_check() {
        let target = Arc::new(MemoryTarget::new());
        let healthy = orchestrator(
            &Arc::new(MemorySource::new()),
            &target,
            vec![authors_spec(10)],
            TargetMode::Insert,
        )
        .health_check()
        .await
        .unwrap();
        assert!(healthy.healthy);

        let unhealthy = Orchestrator::new(
            Arc::new(DescendingReader),
            target,
            vec![authors_spec(10)],
            TargetMode::Insert,
        )
        .unwrap()
        .health_check()
        .await
        .unwrap();
        assert!(!unhealthy.healthy);
        assert!(!unhealthy.source_connected);
        assert!(unhealthy.target_connected);
        assert!(unhealthy.source_error.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_result_json() {
        let source = Arc::new(MemorySource::new().with_table("public.author", authors(1..=3)));
        let target = Arc::new(MemoryTarget::new());

        let result = orchestrator(&source, &target, vec![authors_spec(10)], TargetMode::Insert)
            .run()
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();

        assert_eq!(json["rows_transferred"], 3);
        assert_eq!(json["entities"][0]["entity"], "authors");
        assert_eq!(json["entities"][0]["last_id"], 3);
        assert!(json["run_id"].as_str().is_some());
    }
}

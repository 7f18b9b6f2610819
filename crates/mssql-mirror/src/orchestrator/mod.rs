//! Migration orchestrator - main workflow coordinator.
//!
//! A run moves through the phases of [`MigrationPhase`] strictly in order:
//!
//! ```text
//! Idle -> ValidatingConnections -> ReadingCatalog -> DisablingConstraints
//!      -> CopyingTables(1..n) -> EnablingConstraints -> Validating -> Done
//! ```
//!
//! Any fatal error jumps to `Aborted`. Errors never escape [`Migrator::migrate`];
//! they end up in the returned [`MigrationResult`].

mod progress;

pub use progress::{LogProgress, ProgressSink};

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backup;
use crate::catalog;
use crate::config::{ConnectionConfig, MigrationOptions};
use crate::copier;
use crate::core::identifier::TableName;
use crate::core::traits::ConnectionProvider;
use crate::error::{MigrateError, Result};
use crate::verify::{self, TableParity};

/// Where a run is, or where it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    Idle,
    ValidatingConnections,
    ReadingCatalog,
    DisablingConstraints,
    /// Copying table `index` (1-based) of `total`.
    CopyingTables { index: usize, total: usize },
    EnablingConstraints,
    Validating,
    Done,
    Aborted,
}

/// Rows copied for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub name: String,
    pub rows: u64,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Whether every fatal step succeeded. Warnings do not affect this.
    pub success: bool,

    /// Summary, or the error that aborted the run.
    pub message: String,

    /// Tables found in the source catalog.
    pub tables_count: usize,

    /// Rows inserted into the target across all tables.
    pub rows_migrated: u64,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Non-fatal problems, in the order they were found.
    pub warnings: Vec<String>,

    /// Tables copied before the run ended, in copy order.
    pub tables: Vec<TableStats>,

    /// The table whose copy aborted the run.
    pub failed_table: Option<String>,

    /// `Done` or `Aborted`.
    pub final_phase: MigrationPhase,

    /// Process exit code for this outcome (0 on success).
    pub exit_code: u8,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Connectivity of both endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
    pub healthy: bool,
}

/// Runs migrations over a [`ConnectionProvider`].
pub struct Migrator {
    provider: Arc<dyn ConnectionProvider>,
    options: MigrationOptions,
    cancel: CancellationToken,
}

/// Mutable bookkeeping for one run.
struct Run<'a> {
    progress: Option<&'a mut dyn ProgressSink>,
    phase: MigrationPhase,
    tables_count: usize,
    tables: Vec<TableStats>,
    rows_migrated: u64,
    warnings: Vec<String>,
    failed_table: Option<String>,
    constraints_disabled: bool,
}

impl<'a> Run<'a> {
    fn new(progress: Option<&'a mut dyn ProgressSink>) -> Self {
        Self {
            progress,
            phase: MigrationPhase::Idle,
            tables_count: 0,
            tables: Vec::new(),
            rows_migrated: 0,
            warnings: Vec::new(),
            failed_table: None,
            constraints_disabled: false,
        }
    }

    fn emit(&mut self, message: &str) {
        if let Some(sink) = self.progress.as_mut() {
            sink.report(message);
        }
    }

    fn enter(&mut self, phase: MigrationPhase, message: &str) {
        self.phase = phase;
        self.emit(message);
    }
}

impl Migrator {
    /// Create a migrator with default options.
    pub fn new(provider: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            provider,
            options: MigrationOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the migration options.
    pub fn with_options(mut self, options: MigrationOptions) -> Self {
        self.options = options;
        self
    }

    /// Stop the run at the next phase or table boundary once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Copy every catalog table of `source` into `target`.
    ///
    /// Progress messages go to `progress`, one per phase and one per table.
    pub async fn migrate(
        &self,
        source: &ConnectionConfig,
        target: &ConnectionConfig,
        progress: Option<&mut dyn ProgressSink>,
    ) -> MigrationResult {
        let started_at = Utc::now();
        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let mut run = Run::new(progress);

        info!(
            "Starting migration run: {} ({} -> {}, provider: {})",
            run_id,
            source.endpoint(),
            target.endpoint(),
            self.provider.name()
        );

        let outcome = self.execute(source, target, &mut run).await;

        let (success, message, exit_code) = match outcome {
            Ok(message) => {
                run.phase = MigrationPhase::Done;
                (true, message, 0)
            }
            Err(e) => {
                error!("Migration aborted during {:?}: {}", run.phase, e);
                self.recover(target, &mut run).await;
                let message = e.to_string();
                run.enter(MigrationPhase::Aborted, &format!("Migration aborted: {}", message));
                (false, message, e.exit_code())
            }
        };

        let result = MigrationResult {
            run_id,
            success,
            message,
            tables_count: run.tables_count,
            rows_migrated: run.rows_migrated,
            duration_seconds: start.elapsed().as_secs_f64(),
            started_at,
            completed_at: Utc::now(),
            warnings: run.warnings,
            tables: run.tables,
            failed_table: run.failed_table,
            final_phase: run.phase,
            exit_code,
        };

        info!(
            "Migration {}: {} tables, {} rows in {:.1}s ({} warnings)",
            if result.success { "completed" } else { "failed" },
            result.tables_count,
            result.rows_migrated,
            result.duration_seconds,
            result.warnings.len()
        );

        result
    }

    async fn execute(
        &self,
        source: &ConnectionConfig,
        target: &ConnectionConfig,
        run: &mut Run<'_>,
    ) -> Result<String> {
        let provider = self.provider.as_ref();

        // Phase 1: Validate connections
        self.check_cancelled()?;
        info!("Phase 1: Validating connections");
        run.enter(MigrationPhase::ValidatingConnections, "Validating connections...");
        for conn in [source, target] {
            if !catalog::probe(provider, conn).await {
                return Err(MigrateError::ConnectionUnreachable {
                    endpoint: conn.endpoint(),
                });
            }
        }

        // Phase 2: Read catalog
        self.check_cancelled()?;
        info!("Phase 2: Reading table catalog from source");
        run.enter(MigrationPhase::ReadingCatalog, "Reading table catalog...");
        let tables = catalog::list_tables(provider, source, &self.options).await?;
        run.tables_count = tables.len();
        info!("Found {} tables to migrate", tables.len());

        if tables.is_empty() {
            run.emit("No tables found in source database");
            return Ok("No tables to migrate".to_string());
        }
        run.emit(&format!("Found {} tables", tables.len()));

        // Phase 3: Disable constraints
        self.check_cancelled()?;
        info!("Phase 3: Disabling constraints on target");
        run.enter(
            MigrationPhase::DisablingConstraints,
            "Disabling constraints on target...",
        );
        catalog::disable_all(provider, target).await?;
        run.constraints_disabled = true;

        // Phase 4: Copy tables
        info!("Phase 4: Copying {} tables", tables.len());
        self.copy_tables(source, target, &tables, run).await?;

        // Phase 5: Enable constraints
        self.check_cancelled()?;
        info!("Phase 5: Enabling constraints on target");
        run.enter(
            MigrationPhase::EnablingConstraints,
            "Re-enabling constraints on target...",
        );
        // This is the one enable attempt; a failure here is not retried by recovery.
        run.constraints_disabled = false;
        catalog::enable_all(provider, target).await?;

        // Phase 6: Validate
        if self.options.validate_row_counts {
            self.check_cancelled()?;
            info!("Phase 6: Validating row counts");
            run.enter(MigrationPhase::Validating, "Validating row counts...");
            let warnings = verify::validate(provider, source, target, &tables).await;
            run.warnings.extend(warnings);
        }

        let message = format!(
            "Migration completed: {} tables, {} rows",
            run.tables_count, run.rows_migrated
        );
        run.emit(&message);
        Ok(message)
    }

    async fn copy_tables(
        &self,
        source: &ConnectionConfig,
        target: &ConnectionConfig,
        tables: &[TableName],
        run: &mut Run<'_>,
    ) -> Result<()> {
        let total = tables.len();

        for (i, table) in tables.iter().enumerate() {
            self.check_cancelled()?;
            run.phase = MigrationPhase::CopyingTables { index: i + 1, total };

            let rows = copier::copy_table(self.provider.as_ref(), source, target, table)
                .await
                .map_err(|e| {
                    run.failed_table = Some(table.to_string());
                    e
                })?;

            run.rows_migrated += rows;
            run.tables.push(TableStats {
                name: table.to_string(),
                rows,
            });
            run.emit(&format!("[{}/{}] Copied {}: {} rows", i + 1, total, table, rows));
        }

        Ok(())
    }

    /// Best-effort cleanup after an abort.
    async fn recover(&self, target: &ConnectionConfig, run: &mut Run<'_>) {
        if !run.constraints_disabled {
            return;
        }
        if !self.options.reenable_constraints_on_abort {
            let msg = "Constraints left disabled on target after abort".to_string();
            warn!("{}", msg);
            run.warnings.push(msg);
            return;
        }

        run.emit("Re-enabling constraints on target after abort...");
        match catalog::enable_all(self.provider.as_ref(), target).await {
            Ok(()) => {
                run.constraints_disabled = false;
                info!("Constraints re-enabled after abort");
            }
            Err(e) => {
                let msg = format!("Failed to re-enable constraints after abort: {}", e);
                warn!("{}", msg);
                run.warnings.push(msg);
            }
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            info!("Cancellation requested, stopping migration");
            return Err(MigrateError::Cancelled);
        }
        Ok(())
    }

    /// Probe both endpoints, timing each connection.
    pub async fn health_check(
        &self,
        source: &ConnectionConfig,
        target: &ConnectionConfig,
    ) -> HealthCheckResult {
        let provider = self.provider.as_ref();
        let (source_connected, source_latency_ms, source_error) =
            match catalog::ping(provider, source).await {
                Ok(elapsed) => (true, elapsed.as_millis() as u64, None),
                Err(e) => (false, 0, Some(e.to_string())),
            };
        let (target_connected, target_latency_ms, target_error) =
            match catalog::ping(provider, target).await {
                Ok(elapsed) => (true, elapsed.as_millis() as u64, None),
                Err(e) => (false, 0, Some(e.to_string())),
            };

        HealthCheckResult {
            source_connected,
            source_latency_ms,
            source_error,
            target_connected,
            target_latency_ms,
            target_error,
            healthy: source_connected && target_connected,
        }
    }

    /// Row counts of every source catalog table on both endpoints.
    pub async fn validate(
        &self,
        source: &ConnectionConfig,
        target: &ConnectionConfig,
    ) -> Result<Vec<TableParity>> {
        let tables = catalog::list_tables(self.provider.as_ref(), source, &self.options).await?;
        verify::count_all(self.provider.as_ref(), source, target, &tables).await
    }

    /// Backup script of `conn`'s current contents.
    pub async fn backup(&self, conn: &ConnectionConfig) -> String {
        backup::generate_backup_script(self.provider.as_ref(), conn, &self.options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::memory::{FailOp, MemoryDatabase, MemoryProvider};

    fn source() -> ConnectionConfig {
        ConnectionConfig::new("memory", "source", "sa", "")
    }

    fn target() -> ConnectionConfig {
        ConnectionConfig::new("memory", "target", "sa", "")
    }

    fn setup(src: MemoryDatabase, dst: MemoryDatabase) -> MemoryProvider {
        let provider = MemoryProvider::new();
        provider.add_database(&source(), src).unwrap();
        provider.add_database(&target(), dst).unwrap();
        provider
    }

    fn two_tables() -> MemoryDatabase {
        MemoryDatabase::default()
            .with_table("Racks", &["Id"], vec![vec![1.into()], vec![2.into()]])
            .with_table("Sites", &["Id"], vec![vec![1.into()]])
    }

    fn empty_two_tables() -> MemoryDatabase {
        MemoryDatabase::default()
            .with_table("Racks", &["Id"], vec![])
            .with_table("Sites", &["Id"], vec![])
    }

    #[tokio::test]
    async fn test_progress_sequence() {
        let provider = setup(two_tables(), empty_two_tables());
        let migrator = Migrator::new(Arc::new(provider));
        let mut events: Vec<String> = Vec::new();
        let mut sink = |m: &str| events.push(m.to_string());

        let result = migrator.migrate(&source(), &target(), Some(&mut sink)).await;
        assert!(result.success, "{}", result.message);
        assert_eq!(result.final_phase, MigrationPhase::Done);
        assert_eq!(
            events,
            vec![
                "Validating connections...",
                "Reading table catalog...",
                "Found 2 tables",
                "Disabling constraints on target...",
                "[1/2] Copied dbo.Racks: 2 rows",
                "[2/2] Copied dbo.Sites: 1 rows",
                "Re-enabling constraints on target...",
                "Validating row counts...",
                "Migration completed: 2 tables, 3 rows",
            ]
        );
        assert_eq!(result.tables.len(), 2);
        assert_eq!(result.rows_migrated, 3);
    }

    #[tokio::test]
    async fn test_unreachable_target_aborts_before_catalog() {
        let provider = MemoryProvider::new();
        provider.add_database(&source(), two_tables()).unwrap();
        let migrator = Migrator::new(Arc::new(provider.clone()));

        let result = migrator.migrate(&source(), &target(), None).await;
        assert!(!result.success);
        assert_eq!(result.final_phase, MigrationPhase::Aborted);
        assert!(result.message.contains("memory:1433/target"));
        assert_eq!(result.tables_count, 0);
        assert_eq!(provider.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_abort_reenables_constraints() {
        let dst = empty_two_tables().fail_on(FailOp::Insert("Sites".into()));
        let provider = setup(two_tables(), dst);
        let migrator = Migrator::new(Arc::new(provider.clone()));

        let result = migrator.migrate(&source(), &target(), None).await;
        assert!(!result.success);
        assert_eq!(result.failed_table.as_deref(), Some("dbo.Sites"));
        assert!(result.message.contains("dbo.Sites"));
        assert!(result.warnings.is_empty());

        let dst = provider.database(&target()).unwrap();
        assert!(dst.constraints_enabled());
        assert_eq!(dst.rows("Racks").len(), 2);
    }

    #[tokio::test]
    async fn test_abort_without_reenable_leaves_constraints_disabled() {
        let dst = empty_two_tables().fail_on(FailOp::Insert("Racks".into()));
        let provider = setup(two_tables(), dst);
        let options = MigrationOptions {
            reenable_constraints_on_abort: false,
            ..MigrationOptions::default()
        };
        let migrator = Migrator::new(Arc::new(provider.clone())).with_options(options);

        let result = migrator.migrate(&source(), &target(), None).await;
        assert!(!result.success);
        assert_eq!(result.warnings.len(), 1);
        assert!(!provider.database(&target()).unwrap().constraints_enabled());
    }

    #[tokio::test]
    async fn test_failed_reenable_is_a_warning() {
        let dst = empty_two_tables()
            .fail_on(FailOp::Insert("Racks".into()))
            .fail_on(FailOp::EnableConstraints);
        let provider = setup(two_tables(), dst);
        let migrator = Migrator::new(Arc::new(provider));

        let result = migrator.migrate(&source(), &target(), None).await;
        assert!(!result.success);
        assert!(result.message.contains("dbo.Racks"));
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].starts_with("Failed to re-enable constraints"));
    }

    #[tokio::test]
    async fn test_enable_failure_is_attempted_once() {
        let dst = empty_two_tables().fail_on(FailOp::EnableConstraints);
        let provider = setup(two_tables(), dst);
        let migrator = Migrator::new(Arc::new(provider.clone()));
        let mut events: Vec<String> = Vec::new();
        let mut sink = |m: &str| events.push(m.to_string());

        let result = migrator.migrate(&source(), &target(), Some(&mut sink)).await;
        assert!(!result.success);
        assert_eq!(result.final_phase, MigrationPhase::Aborted);
        assert!(result.message.contains("Failed to toggle constraints"));
        assert_eq!(result.exit_code, crate::error::EXIT_CONSTRAINT_ERROR);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        assert!(result.failed_table.is_none());
        assert_eq!(result.tables.len(), 2);
        assert!(!events.iter().any(|e| e.contains("after abort")));

        let dst = provider.database(&target()).unwrap();
        assert!(!dst.constraints_enabled());
        assert_eq!(dst.rows("Racks").len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_after_last_table_reenables_constraints() {
        let provider = setup(two_tables(), empty_two_tables());
        let cancel = CancellationToken::new();
        let migrator =
            Migrator::new(Arc::new(provider.clone())).with_cancellation(cancel.clone());

        let mut sink = |m: &str| {
            if m.starts_with("[2/2]") {
                cancel.cancel();
            }
        };
        let result = migrator.migrate(&source(), &target(), Some(&mut sink)).await;
        assert!(!result.success);
        assert_eq!(result.message, "Migration cancelled");
        assert_eq!(result.exit_code, crate::error::EXIT_CANCELLED);
        assert_eq!(result.final_phase, MigrationPhase::Aborted);
        assert_eq!(result.tables.len(), 2);
        assert_eq!(result.rows_migrated, 3);
        assert!(result.warnings.is_empty());

        let dst = provider.database(&target()).unwrap();
        assert!(dst.constraints_enabled());
        assert_eq!(dst.rows("Sites").len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let provider = setup(two_tables(), empty_two_tables());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let migrator = Migrator::new(Arc::new(provider.clone())).with_cancellation(cancel);

        let result = migrator.migrate(&source(), &target(), None).await;
        assert!(!result.success);
        assert_eq!(result.message, "Migration cancelled");
        assert_eq!(result.exit_code, crate::error::EXIT_CANCELLED);
        assert_eq!(provider.opened_total(), 0);
    }

    #[tokio::test]
    async fn test_cancel_between_tables() {
        let provider = setup(two_tables(), empty_two_tables());
        let cancel = CancellationToken::new();
        let migrator =
            Migrator::new(Arc::new(provider.clone())).with_cancellation(cancel.clone());

        let mut sink = |m: &str| {
            if m.starts_with("[1/2]") {
                cancel.cancel();
            }
        };
        let result = migrator.migrate(&source(), &target(), Some(&mut sink)).await;
        assert!(!result.success);
        assert_eq!(result.tables.len(), 1);
        assert!(result.failed_table.is_none());

        let dst = provider.database(&target()).unwrap();
        assert_eq!(dst.rows("Racks").len(), 2);
        assert!(dst.rows("Sites").is_empty());
        assert!(dst.constraints_enabled());
    }

    #[tokio::test]
    async fn test_validation_can_be_skipped() {
        let provider = setup(two_tables(), empty_two_tables());
        let options = MigrationOptions {
            validate_row_counts: false,
            ..MigrationOptions::default()
        };
        let migrator = Migrator::new(Arc::new(provider.clone())).with_options(options);
        let mut events: Vec<String> = Vec::new();
        let mut sink = |m: &str| events.push(m.to_string());

        let result = migrator.migrate(&source(), &target(), Some(&mut sink)).await;
        assert!(result.success);
        assert!(!events.iter().any(|e| e.starts_with("Validating row counts")));
    }

    #[tokio::test]
    async fn test_health_check() {
        let provider = MemoryProvider::new();
        provider.add_database(&source(), two_tables()).unwrap();
        let migrator = Migrator::new(Arc::new(provider));

        let health = migrator.health_check(&source(), &target()).await;
        assert!(health.source_connected);
        assert!(!health.target_connected);
        assert!(health.target_error.is_some());
        assert!(!health.healthy);
    }

    #[tokio::test]
    async fn test_result_json() {
        let provider = setup(two_tables(), empty_two_tables());
        let migrator = Migrator::new(Arc::new(provider));
        let result = migrator.migrate(&source(), &target(), None).await;

        let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["tables_count"], 2);
        assert_eq!(json["final_phase"], "done");
        assert_eq!(json["tables"][0]["name"], "dbo.Racks");
    }
}

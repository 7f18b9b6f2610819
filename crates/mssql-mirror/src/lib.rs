//! # mssql-mirror
//!
//! SQL Server to SQL Server table mirroring library.
//!
//! Given two live endpoints, the engine:
//!
//! - **Discovers** the user base tables of the source schema
//! - **Suspends** every FK and check constraint on the target, so tables can
//!   be written in any order
//! - **Copies** each table in full (delete, then insert row by row)
//! - **Restores** constraints and reports row-count parity as warnings
//!
//! A separate entry point produces a replayable DELETE + INSERT backup script.
//!
//! All database access goes through [`ConnectionProvider`]; [`MssqlProvider`]
//! talks TDS, [`MemoryProvider`] keeps databases in memory for tests.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mssql_mirror::{Config, LogProgress, Migrator, MssqlProvider};
//!
//! #[tokio::main]
//! async fn main() -> mssql_mirror::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let migrator = Migrator::new(Arc::new(MssqlProvider::new()))
//!         .with_options(config.migration.clone());
//!
//!     let mut progress = LogProgress;
//!     let result = migrator
//!         .migrate(&config.source, &config.target, Some(&mut progress))
//!         .await;
//!     println!("{}: {} rows", result.message, result.rows_migrated);
//!     Ok(())
//! }
//! ```

pub mod backup;
pub mod catalog;
pub mod config;
pub mod copier;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod verify;

// Re-exports for convenient access
pub use backup::{format_literal, generate_backup_script};
pub use config::{Config, ConnectionConfig, MigrationOptions};
pub use crate::core::{ConnectionProvider, RowSnapshot, Session, SqlNullType, SqlValue, TableName};
pub use drivers::{MemoryProvider, MssqlProvider};
pub use error::{MigrateError, Result};
pub use orchestrator::{
    HealthCheckResult, LogProgress, MigrationPhase, MigrationResult, Migrator, ProgressSink,
    TableStats,
};
pub use verify::TableParity;

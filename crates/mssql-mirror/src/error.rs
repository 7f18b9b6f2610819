//! Error types for the migration library.

use thiserror::Error;

/// Process exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Process exit code when an endpoint cannot be reached.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Process exit code when the table catalog cannot be read.
pub const EXIT_CATALOG_ERROR: u8 = 3;
/// Process exit code when constraints cannot be toggled.
pub const EXIT_CONSTRAINT_ERROR: u8 = 4;
/// Process exit code when a table copy fails.
pub const EXIT_COPY_ERROR: u8 = 5;
/// Process exit code for a cancelled migration.
pub const EXIT_CANCELLED: u8 = 6;
/// Process exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;
/// Process exit code for anything else.
pub const EXIT_OTHER_ERROR: u8 = 8;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// An endpoint failed its connection probe.
    #[error("Connection unreachable: {endpoint}")]
    ConnectionUnreachable { endpoint: String },

    /// The user table list could not be read.
    #[error("Failed to read table catalog: {0}")]
    CatalogRead(String),

    /// Constraints could not be disabled or re-enabled on the target.
    #[error("Failed to toggle constraints: {0}")]
    ConstraintToggle(String),

    /// Data copy failed for a specific table
    #[error("Copy failed for table {table}: {message}")]
    TableCopy { table: String, message: String },

    /// Row counts differ between source and target after the copy.
    #[error("Row count mismatch for table {table}: source={source_count}, target={target_count}")]
    ValidationMismatch {
        table: String,
        source_count: i64,
        target_count: i64,
    },

    /// Backup script generation failed part way through.
    #[error("Backup generation failed: {0}")]
    BackupGeneration(String),

    /// SQL Server connection or query error
    #[error("Database error: {0}")]
    Database(#[from] tiberius::error::Error),

    /// Error raised by a non-TDS session implementation.
    #[error("Backend error: {0}")]
    Backend(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled between tables.
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a TableCopy error
    pub fn table_copy(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        MigrateError::TableCopy {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a Backend error
    pub fn backend(message: impl Into<String>) -> Self {
        MigrateError::Backend(message.into())
    }

    /// Exit code for the command-line front end.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => EXIT_CONFIG_ERROR,
            MigrateError::ConnectionUnreachable { .. } => EXIT_CONNECTION_ERROR,
            MigrateError::CatalogRead(_) => EXIT_CATALOG_ERROR,
            MigrateError::ConstraintToggle(_) => EXIT_CONSTRAINT_ERROR,
            MigrateError::TableCopy { .. } => EXIT_COPY_ERROR,
            MigrateError::Cancelled => EXIT_CANCELLED,
            MigrateError::Io(_) => EXIT_IO_ERROR,
            _ => EXIT_OTHER_ERROR,
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

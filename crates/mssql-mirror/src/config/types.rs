//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database connection.
    pub source: ConnectionConfig,

    /// Target database connection.
    pub target: ConnectionConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationOptions,
}

/// How to reach one SQL Server database.
///
/// Immutable once built; every engine operation receives it by reference and
/// nothing in the engine persists it.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Schema holding the user tables (default: "dbo").
    #[serde(default = "default_dbo_schema")]
    pub schema: String,

    /// Encrypt connection (default: "true").
    #[serde(default = "default_true_string")]
    pub encrypt: String,

    /// Trust server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,

    /// Seconds to wait for the TCP connect and login (default: 15).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl ConnectionConfig {
    /// Create a descriptor with default port, schema and encryption.
    pub fn new(
        host: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: default_mssql_port(),
            database: database.into(),
            user: user.into(),
            password: password.into(),
            schema: default_dbo_schema(),
            encrypt: default_true_string(),
            trust_server_cert: false,
            connect_timeout_secs: default_connect_timeout(),
        }
    }

    /// Endpoint label safe for logs and error messages (no credentials).
    pub fn endpoint(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }

    /// Whether the connection should be encrypted.
    pub fn encryption_enabled(&self) -> bool {
        !matches!(
            self.encrypt.to_lowercase().as_str(),
            "false" | "no" | "0" | "disable"
        )
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationOptions {
    /// Re-enable target constraints when a run aborts after disabling them (default: true).
    #[serde(default = "default_true")]
    pub reenable_constraints_on_abort: bool,

    /// Compare per-table row counts after the copy (default: true).
    #[serde(default = "default_true")]
    pub validate_row_counts: bool,

    /// Table names never migrated, compared case-insensitively.
    #[serde(default = "default_exclude_tables")]
    pub exclude_tables: Vec<String>,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            reenable_constraints_on_abort: true,
            validate_row_counts: true,
            exclude_tables: default_exclude_tables(),
        }
    }
}

impl MigrationOptions {
    /// Whether a catalog table is excluded from migration.
    pub fn is_excluded(&self, table: &str) -> bool {
        self.exclude_tables
            .iter()
            .any(|t| t.eq_ignore_ascii_case(table))
    }
}

// Default value functions for serde
fn default_mssql_port() -> u16 {
    1433
}

fn default_dbo_schema() -> String {
    "dbo".to_string()
}

fn default_true_string() -> String {
    "true".to_string()
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_true() -> bool {
    true
}

fn default_exclude_tables() -> Vec<String> {
    vec!["sysdiagrams".to_string(), "__EFMigrationsHistory".to_string()]
}

//! Connection-provider abstraction used by every engine component.
//!
//! - [`ConnectionProvider`]: opens a [`Session`] for a [`ConnectionConfig`]
//! - [`Session`]: the handful of database operations the engine needs
//!
//! Components never hold a session longer than one operation: they open it,
//! do their work and close it on every exit path. Swapping the provider is how
//! tests run the engine against in-memory databases.

use async_trait::async_trait;

use crate::config::ConnectionConfig;
use crate::error::Result;

use super::identifier::TableName;
use super::value::{RowSnapshot, SqlValue};

/// Opens database sessions.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Open a connection to the described endpoint.
    async fn open(&self, conn: &ConnectionConfig) -> Result<Box<dyn Session>>;

    /// Provider identifier for logging (e.g., "mssql", "memory").
    fn name(&self) -> &str;
}

/// One open connection to a database.
#[async_trait]
pub trait Session: Send {
    /// Names of the user base tables in `schema`.
    ///
    /// System and metadata tables are excluded. Order is unspecified; the
    /// catalog reader sorts.
    async fn list_base_tables(&mut self, schema: &str) -> Result<Vec<String>>;

    /// Read every row and column of a table.
    async fn select_all(&mut self, table: &TableName) -> Result<RowSnapshot>;

    /// Delete every row of a table, returning the number removed.
    async fn delete_all(&mut self, table: &TableName) -> Result<u64>;

    /// Insert rows positionally, one parameterized statement per row.
    ///
    /// Only `table` and `columns` are interpolated into statement text; row
    /// values are always bound as parameters.
    async fn insert_rows(
        &mut self,
        table: &TableName,
        columns: &[String],
        rows: &[Vec<SqlValue>],
    ) -> Result<u64>;

    /// Exact row count of a table.
    async fn count_rows(&mut self, table: &TableName) -> Result<i64>;

    /// Suspend (`false`) or restore (`true`) foreign-key and check-constraint
    /// enforcement for every table in the database with one statement.
    ///
    /// Restoring does not re-validate existing rows.
    async fn set_constraints_enabled(&mut self, enabled: bool) -> Result<()>;

    /// Close the connection. Safe to call more than once.
    async fn close(&mut self) -> Result<()>;
}

/// Close a session, logging instead of failing.
///
/// Used on every exit path once the operation's own result is known, so a
/// close error never masks the error that ended the operation.
pub(crate) async fn close_session(mut session: Box<dyn Session>, endpoint: &str) {
    if let Err(e) = session.close().await {
        tracing::debug!("Failed to close connection to {}: {}", endpoint, e);
    }
}

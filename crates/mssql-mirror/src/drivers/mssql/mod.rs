//! Microsoft SQL Server driver backed by tiberius.
//!
//! Each [`MssqlSession`] owns one TDS connection. There is no pool: the
//! engine opens a connection per operation and closes it when the operation
//! ends.
//!
//! Table reads return only the columns an INSERT may name: computed and
//! rowversion columns are left out, so the server regenerates them on the
//! target.

mod convert;
pub mod dialect;

pub use convert::{from_column_data, to_sql_param};

use std::time::Duration;

use async_trait::async_trait;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Query, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, warn};

use crate::config::ConnectionConfig;
use crate::core::identifier::TableName;
use crate::core::traits::{ConnectionProvider, Session};
use crate::core::value::{RowSnapshot, SqlValue};
use crate::error::{MigrateError, Result};

type TdsClient = Client<Compat<TcpStream>>;

/// Opens tiberius connections to SQL Server.
#[derive(Debug, Clone, Default)]
pub struct MssqlProvider;

impl MssqlProvider {
    /// Create a new provider.
    pub fn new() -> Self {
        Self
    }

    fn build_config(conn: &ConnectionConfig) -> Config {
        let mut config = Config::new();
        config.host(&conn.host);
        config.port(conn.port);
        config.database(&conn.database);
        config.authentication(AuthMethod::sql_server(&conn.user, &conn.password));

        if conn.encryption_enabled() {
            if conn.trust_server_cert {
                config.trust_cert();
            }
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        config
    }

    async fn connect(conn: &ConnectionConfig) -> Result<TdsClient> {
        let config = Self::build_config(conn);
        let tcp = TcpStream::connect(config.get_addr()).await?;
        tcp.set_nodelay(true).ok();
        Ok(Client::connect(config, tcp.compat_write()).await?)
    }
}

#[async_trait]
impl ConnectionProvider for MssqlProvider {
    async fn open(&self, conn: &ConnectionConfig) -> Result<Box<dyn Session>> {
        let timeout = Duration::from_secs(conn.connect_timeout_secs.max(1));
        let client = tokio::time::timeout(timeout, Self::connect(conn))
            .await
            .map_err(|_| MigrateError::ConnectionUnreachable {
                endpoint: format!("{} (timed out after {}s)", conn.endpoint(), timeout.as_secs()),
            })??;

        debug!("Connected to SQL Server: {}", conn.endpoint());
        Ok(Box::new(MssqlSession {
            client: Some(client),
            endpoint: conn.endpoint(),
        }))
    }

    fn name(&self) -> &str {
        "mssql"
    }
}

/// One open SQL Server connection.
pub struct MssqlSession {
    client: Option<TdsClient>,
    endpoint: String,
}

impl MssqlSession {
    fn client(&mut self) -> Result<&mut TdsClient> {
        self.client
            .as_mut()
            .ok_or_else(|| MigrateError::backend(format!("session to {} is closed", self.endpoint)))
    }

    async fn has_identity(&mut self, table: &TableName) -> Result<bool> {
        let mut query = Query::new(dialect::TABLE_HAS_IDENTITY);
        query.bind(table.quoted());

        let row = query.query(self.client()?).await?.into_row().await?;
        Ok(row.and_then(|r| r.get::<i32, _>(0)).unwrap_or(0) == 1)
    }

    async fn insertable_columns(&mut self, table: &TableName) -> Result<Vec<String>> {
        let mut query = Query::new(dialect::INSERTABLE_COLUMNS);
        query.bind(table.quoted());

        let rows = query
            .query(self.client()?)
            .await?
            .into_first_result()
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| row.get::<&str, _>(0).map(String::from))
            .collect())
    }

    async fn insert_each(&mut self, sql: &str, rows: &[Vec<SqlValue>]) -> Result<u64> {
        let client = self.client()?;
        let mut inserted = 0u64;

        for row in rows {
            let params: Vec<Box<dyn ToSql>> = row.iter().map(to_sql_param).collect();
            let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
            client.execute(sql, &param_refs).await?;
            inserted += 1;
        }

        Ok(inserted)
    }
}

#[async_trait]
impl Session for MssqlSession {
    async fn list_base_tables(&mut self, schema: &str) -> Result<Vec<String>> {
        let mut query = Query::new(dialect::LIST_BASE_TABLES);
        query.bind(schema);

        let rows = query
            .query(self.client()?)
            .await?
            .into_first_result()
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| row.get::<&str, _>(0).map(String::from))
            .collect())
    }

    async fn select_all(&mut self, table: &TableName) -> Result<RowSnapshot> {
        let insertable = self.insertable_columns(table).await?;
        let sql = dialect::select_columns(table, &insertable)?;
        let mut stream = self.client()?.simple_query(sql).await?;

        let columns: Vec<String> = stream
            .columns()
            .await?
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let rows = stream
            .into_first_result()
            .await?
            .into_iter()
            .map(|row| row.into_iter().map(from_column_data).collect::<Result<Vec<_>>>())
            .collect::<Result<Vec<_>>>()?;

        debug!("Read {} rows from {}", rows.len(), table);
        Ok(RowSnapshot::new(columns, rows))
    }

    async fn delete_all(&mut self, table: &TableName) -> Result<u64> {
        let sql = dialect::delete_all(table);
        let result = self.client()?.execute(sql, &[]).await?;
        Ok(result.total())
    }

    async fn insert_rows(
        &mut self,
        table: &TableName,
        columns: &[String],
        rows: &[Vec<SqlValue>],
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let sql = dialect::insert_row(table, columns)?;
        let identity = self.has_identity(table).await?;

        if identity {
            self.client()?
                .simple_query(dialect::identity_insert(table, true))
                .await?
                .into_results()
                .await?;
        }

        let result = self.insert_each(&sql, rows).await;

        if identity {
            // Must run even when an insert failed.
            let off = dialect::identity_insert(table, false);
            match self.client()?.simple_query(off).await {
                Ok(stream) => {
                    if let Err(e) = stream.into_results().await {
                        warn!("{}: failed to reset IDENTITY_INSERT: {}", table, e);
                    }
                }
                Err(e) => warn!("{}: failed to reset IDENTITY_INSERT: {}", table, e),
            }
        }

        result
    }

    async fn count_rows(&mut self, table: &TableName) -> Result<i64> {
        let sql = dialect::count_rows(table);
        let row = self.client()?.simple_query(sql).await?.into_row().await?;
        Ok(row.and_then(|r| r.get::<i64, _>(0)).unwrap_or(0))
    }

    async fn set_constraints_enabled(&mut self, enabled: bool) -> Result<()> {
        self.client()?
            .simple_query(dialect::set_constraints(enabled))
            .await?
            .into_results()
            .await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client.close().await?;
            debug!("Closed connection to {}", self.endpoint);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_config_address() {
        let conn = ConnectionConfig::new("db01", "inventory", "sa", "pw");
        let config = MssqlProvider::build_config(&conn);
        assert_eq!(config.get_addr(), "db01:1433");
    }

    #[tokio::test]
    async fn test_open_unreachable_endpoint_fails() {
        let mut conn = ConnectionConfig::new("127.0.0.1", "inventory", "sa", "pw");
        conn.port = 1;
        conn.connect_timeout_secs = 2;
        assert!(MssqlProvider::new().open(&conn).await.is_err());
    }
}

//! Connection probing, table discovery and constraint toggling.
//!
//! Each operation opens its own session and closes it before returning,
//! whether it succeeded or not.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::{ConnectionConfig, MigrationOptions};
use crate::core::identifier::TableName;
use crate::core::traits::{close_session, ConnectionProvider};
use crate::error::{MigrateError, Result};

/// Open and close a connection, returning how long that took.
pub async fn ping(provider: &dyn ConnectionProvider, conn: &ConnectionConfig) -> Result<Duration> {
    let start = Instant::now();
    let mut session = provider.open(conn).await?;
    session.close().await?;
    Ok(start.elapsed())
}

/// Whether the endpoint accepts connections.
///
/// Every failure (network, login, bad descriptor) counts as unreachable.
pub async fn probe(provider: &dyn ConnectionProvider, conn: &ConnectionConfig) -> bool {
    match ping(provider, conn).await {
        Ok(elapsed) => {
            debug!("{} reachable in {}ms", conn.endpoint(), elapsed.as_millis());
            true
        }
        Err(e) => {
            debug!("{} unreachable: {}", conn.endpoint(), e);
            false
        }
    }
}

/// User base tables of the connection's schema, sorted by name.
///
/// Names listed in `options.exclude_tables` are dropped.
pub async fn list_tables(
    provider: &dyn ConnectionProvider,
    conn: &ConnectionConfig,
    options: &MigrationOptions,
) -> Result<Vec<TableName>> {
    let endpoint = conn.endpoint();
    let mut session = provider.open(conn).await.map_err(catalog_error)?;
    let result = session.list_base_tables(&conn.schema).await;
    close_session(session, &endpoint).await;

    let mut tables = Vec::new();
    for name in result.map_err(catalog_error)? {
        if options.is_excluded(&name) {
            debug!("Skipping excluded table {}", name);
            continue;
        }
        tables.push(TableName::from_catalog(&conn.schema, &name).map_err(catalog_error)?);
    }
    tables.sort();
    tables.dedup();

    Ok(tables)
}

/// Suspend every FK and check constraint in the target database.
pub async fn disable_all(provider: &dyn ConnectionProvider, conn: &ConnectionConfig) -> Result<()> {
    set_constraints(provider, conn, false).await
}

/// Restore every FK and check constraint in the target database.
///
/// Rows written while constraints were suspended are not re-validated.
pub async fn enable_all(provider: &dyn ConnectionProvider, conn: &ConnectionConfig) -> Result<()> {
    set_constraints(provider, conn, true).await
}

async fn set_constraints(
    provider: &dyn ConnectionProvider,
    conn: &ConnectionConfig,
    enabled: bool,
) -> Result<()> {
    let endpoint = conn.endpoint();
    let mut session = provider.open(conn).await.map_err(constraint_error)?;
    let result = session.set_constraints_enabled(enabled).await;
    close_session(session, &endpoint).await;

    result.map_err(constraint_error)?;
    info!(
        "Constraints {} on {}",
        if enabled { "enabled" } else { "disabled" },
        endpoint
    );
    Ok(())
}

fn catalog_error(e: MigrateError) -> MigrateError {
    match e {
        e @ (MigrateError::ConnectionUnreachable { .. } | MigrateError::CatalogRead(_)) => e,
        other => MigrateError::CatalogRead(other.to_string()),
    }
}

fn constraint_error(e: MigrateError) -> MigrateError {
    match e {
        e @ (MigrateError::ConnectionUnreachable { .. } | MigrateError::ConstraintToggle(_)) => e,
        other => MigrateError::ConstraintToggle(other.to_string()),
    }
}

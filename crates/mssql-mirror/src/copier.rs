//! Full-table copy from source to target.

use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::core::identifier::TableName;
use crate::core::traits::{close_session, ConnectionProvider};
use crate::core::value::RowSnapshot;
use crate::error::{MigrateError, Result};

/// Replace the contents of `table` on the target with the source rows.
///
/// The source table is read fully into memory first. An empty source table
/// leaves the target untouched and returns 0. Otherwise every target row is
/// deleted and each source row is inserted positionally. Any failure is
/// reported as [`MigrateError::TableCopy`] naming the table.
pub async fn copy_table(
    provider: &dyn ConnectionProvider,
    source: &ConnectionConfig,
    target: &ConnectionConfig,
    table: &TableName,
) -> Result<u64> {
    let snapshot = read_snapshot(provider, source, table)
        .await
        .map_err(|e| MigrateError::table_copy(table.to_string(), e))?;

    if snapshot.is_empty() {
        info!("{}: source is empty, target left as is", table);
        return Ok(0);
    }

    let rows = write_snapshot(provider, target, table, &snapshot)
        .await
        .map_err(|e| MigrateError::table_copy(table.to_string(), e))?;

    info!("{}: completed ({} rows)", table, rows);
    Ok(rows)
}

async fn read_snapshot(
    provider: &dyn ConnectionProvider,
    source: &ConnectionConfig,
    table: &TableName,
) -> Result<RowSnapshot> {
    let endpoint = source.endpoint();
    let mut session = provider.open(source).await?;
    let result = session.select_all(table).await;
    close_session(session, &endpoint).await;

    let snapshot = result?;
    debug!(
        "{}: read {} rows x {} columns",
        table,
        snapshot.len(),
        snapshot.columns.len()
    );
    Ok(snapshot)
}

async fn write_snapshot(
    provider: &dyn ConnectionProvider,
    target: &ConnectionConfig,
    table: &TableName,
    snapshot: &RowSnapshot,
) -> Result<u64> {
    let target_table = table.in_schema(&target.schema)?;
    let endpoint = target.endpoint();
    let mut session = provider.open(target).await?;

    let result = async {
        let deleted = session.delete_all(&target_table).await?;
        debug!("{}: deleted {} existing rows", target_table, deleted);
        session
            .insert_rows(&target_table, &snapshot.columns, &snapshot.rows)
            .await
    }
    .await;

    close_session(session, &endpoint).await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::{SqlNullType, SqlValue};
    use crate::drivers::memory::{FailOp, MemoryDatabase, MemoryProvider};

    fn source() -> ConnectionConfig {
        ConnectionConfig::new("memory", "source", "sa", "")
    }

    fn target() -> ConnectionConfig {
        ConnectionConfig::new("memory", "target", "sa", "")
    }

    fn devices() -> TableName {
        TableName::from_catalog("dbo", "Devices").unwrap()
    }

    fn setup(src: MemoryDatabase, dst: MemoryDatabase) -> MemoryProvider {
        let provider = MemoryProvider::new();
        provider.add_database(&source(), src).unwrap();
        provider.add_database(&target(), dst).unwrap();
        provider
    }

    #[tokio::test]
    async fn test_copy_replaces_target_rows() {
        let src = MemoryDatabase::default().with_table(
            "Devices",
            &["Id", "Name"],
            vec![
                vec![1.into(), "router".into()],
                vec![2.into(), SqlValue::Null(SqlNullType::String)],
            ],
        );
        let dst = MemoryDatabase::default().with_table(
            "Devices",
            &["Id", "Name"],
            vec![vec![9.into(), "stale".into()]],
        );
        let provider = setup(src.clone(), dst);

        let rows = copy_table(&provider, &source(), &target(), &devices()).await.unwrap();
        assert_eq!(rows, 2);
        assert_eq!(
            provider.database(&target()).unwrap().rows("Devices"),
            src.rows("Devices")
        );
        assert_eq!(provider.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_empty_source_does_not_touch_target() {
        let src = MemoryDatabase::default().with_table("Devices", &["Id"], vec![]);
        let dst = MemoryDatabase::default().with_table("Devices", &["Id"], vec![vec![5.into()]]);
        let provider = setup(src, dst);

        let rows = copy_table(&provider, &source(), &target(), &devices()).await.unwrap();
        assert_eq!(rows, 0);

        let dst = provider.database(&target()).unwrap();
        assert_eq!(dst.rows("Devices").len(), 1);
        assert_eq!(dst.writes(), 0);
        assert_eq!(provider.opened_total(), 1);
    }

    #[tokio::test]
    async fn test_insert_failure_names_table() {
        let src = MemoryDatabase::default().with_table("Devices", &["Id"], vec![vec![1.into()]]);
        let dst = MemoryDatabase::default()
            .with_table("Devices", &["Id"], vec![])
            .fail_on(FailOp::Insert("Devices".into()));
        let provider = setup(src, dst);

        let err = copy_table(&provider, &source(), &target(), &devices())
            .await
            .unwrap_err();
        match err {
            MigrateError::TableCopy { table, .. } => assert_eq!(table, "dbo.Devices"),
            other => panic!("expected TableCopy, got {:?}", other),
        }
        assert_eq!(provider.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_missing_target_table_fails() {
        let src = MemoryDatabase::default().with_table("Devices", &["Id"], vec![vec![1.into()]]);
        let provider = setup(src, MemoryDatabase::default());

        let err = copy_table(&provider, &source(), &target(), &devices())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Copy failed for table dbo.Devices"));
    }
}

//! Post-copy row parity check.

use tracing::{info, warn};

use crate::config::ConnectionConfig;
use crate::core::identifier::TableName;
use crate::core::traits::{close_session, ConnectionProvider, Session};
use crate::error::{MigrateError, Result};

/// Row counts of one table on both endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableParity {
    pub table: TableName,
    pub source_count: i64,
    pub target_count: i64,
}

impl TableParity {
    pub fn matches(&self) -> bool {
        self.source_count == self.target_count
    }

    /// The mismatch as an error value, if the counts differ.
    pub fn mismatch(&self) -> Option<MigrateError> {
        (!self.matches()).then(|| MigrateError::ValidationMismatch {
            table: self.table.to_string(),
            source_count: self.source_count,
            target_count: self.target_count,
        })
    }
}

/// Compare row counts of `tables` between source and target.
///
/// Never fails: each mismatching table yields one warning naming the table and
/// both counts. If a count query itself fails, a single warning describing the
/// failure is added and the remaining tables are skipped.
pub async fn validate(
    provider: &dyn ConnectionProvider,
    source: &ConnectionConfig,
    target: &ConnectionConfig,
    tables: &[TableName],
) -> Vec<String> {
    match count_all(provider, source, target, tables).await {
        Ok(parity) => parity
            .iter()
            .filter_map(TableParity::mismatch)
            .map(|e| e.to_string())
            .collect(),
        Err(e) => {
            warn!("Validation failed: {}", e);
            vec![format!("Validation failed: {}", e)]
        }
    }
}

/// Row counts of every table on both endpoints, in the order given.
pub async fn count_all(
    provider: &dyn ConnectionProvider,
    source: &ConnectionConfig,
    target: &ConnectionConfig,
    tables: &[TableName],
) -> Result<Vec<TableParity>> {
    if tables.is_empty() {
        return Ok(Vec::new());
    }

    let source_endpoint = source.endpoint();
    let target_endpoint = target.endpoint();

    let mut source_session = provider.open(source).await?;
    let mut target_session = match provider.open(target).await {
        Ok(s) => s,
        Err(e) => {
            close_session(source_session, &source_endpoint).await;
            return Err(e);
        }
    };

    let result = compare(
        source_session.as_mut(),
        target_session.as_mut(),
        &target.schema,
        tables,
    )
    .await;

    close_session(source_session, &source_endpoint).await;
    close_session(target_session, &target_endpoint).await;
    result
}

async fn compare(
    source: &mut dyn Session,
    target: &mut dyn Session,
    target_schema: &str,
    tables: &[TableName],
) -> Result<Vec<TableParity>> {
    let mut parity = Vec::with_capacity(tables.len());

    for table in tables {
        let source_count = source.count_rows(table).await?;
        let target_count = target.count_rows(&table.in_schema(target_schema)?).await?;

        let entry = TableParity {
            table: table.clone(),
            source_count,
            target_count,
        };
        if entry.matches() {
            info!("{}: {} rows (match)", table, source_count);
        } else {
            warn!(
                "{}: source={} target={} (MISMATCH)",
                table, source_count, target_count
            );
        }
        parity.push(entry);
    }

    Ok(parity)
}

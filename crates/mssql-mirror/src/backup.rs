//! Replayable DELETE + INSERT snapshot of a database.
//!
//! The script is text, not executed statements, so values are written as
//! literals. Quoting rules:
//!
//! | Value | Literal |
//! |---|---|
//! | NULL | `NULL` |
//! | text, xml | `'...'` with `'` doubled |
//! | datetime, date, datetimeoffset | `'YYYY-MM-DD HH:MM:SS'` |
//! | bit | `1` / `0` |
//! | numbers | decimal text |
//! | uniqueidentifier, time | quoted text |
//! | binary | `0x` + uppercase hex |

use std::fmt::Write as _;

use tracing::{info, warn};

use crate::catalog;
use crate::config::{ConnectionConfig, MigrationOptions};
use crate::core::identifier::{quote_mssql, TableName};
use crate::core::traits::{close_session, ConnectionProvider, Session};
use crate::core::value::{RowSnapshot, SqlValue};
use crate::error::{MigrateError, Result};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Build a backup script for every catalog table of `conn`.
///
/// Tables appear in catalog order, each as one `DELETE` followed by one
/// `INSERT` per row. This never fails: if anything goes wrong part way, the
/// text generated so far is returned with a trailing
/// `-- Backup generation failed: ...` comment.
pub async fn generate_backup_script(
    provider: &dyn ConnectionProvider,
    conn: &ConnectionConfig,
    options: &MigrationOptions,
) -> String {
    let mut script = String::new();

    if let Err(e) = write_script(provider, conn, options, &mut script).await {
        let e = MigrateError::BackupGeneration(e.to_string());
        warn!("{}", e);
        let _ = writeln!(script, "-- {}", e.to_string().replace(['\r', '\n'], " "));
    }

    script
}

async fn write_script(
    provider: &dyn ConnectionProvider,
    conn: &ConnectionConfig,
    options: &MigrationOptions,
    script: &mut String,
) -> Result<()> {
    let tables = catalog::list_tables(provider, conn, options).await?;
    if tables.is_empty() {
        return Ok(());
    }

    let endpoint = conn.endpoint();
    let mut session = provider.open(conn).await?;
    let result = write_tables(session.as_mut(), &tables, script).await;
    close_session(session, &endpoint).await;
    result?;

    info!("Backup script covers {} tables of {}", tables.len(), endpoint);
    Ok(())
}

async fn write_tables(
    session: &mut dyn Session,
    tables: &[TableName],
    script: &mut String,
) -> Result<()> {
    for (i, table) in tables.iter().enumerate() {
        if i > 0 {
            script.push('\n');
        }
        let snapshot = session.select_all(table).await?;
        write_table(table, &snapshot, script)?;
    }
    Ok(())
}

fn write_table(table: &TableName, snapshot: &RowSnapshot, script: &mut String) -> Result<()> {
    let _ = writeln!(script, "DELETE FROM {};", table.quoted());
    if snapshot.is_empty() {
        return Ok(());
    }

    let columns = snapshot
        .columns
        .iter()
        .map(|c| quote_mssql(c))
        .collect::<Result<Vec<_>>>()?
        .join(", ");

    for row in &snapshot.rows {
        let values: Vec<String> = row.iter().map(format_literal).collect();
        let _ = writeln!(
            script,
            "INSERT INTO {} ({}) VALUES ({});",
            table.quoted(),
            columns,
            values.join(", ")
        );
    }
    Ok(())
}

/// Render one value as a T-SQL literal.
pub fn format_literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null(_) => "NULL".to_string(),
        SqlValue::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
        SqlValue::U8(v) => v.to_string(),
        SqlValue::I16(v) => v.to_string(),
        SqlValue::I32(v) => v.to_string(),
        SqlValue::I64(v) => v.to_string(),
        // SQL Server has no NaN/Infinity
        SqlValue::F32(f) if !f.is_finite() => "NULL".to_string(),
        SqlValue::F64(f) if !f.is_finite() => "NULL".to_string(),
        SqlValue::F32(f) => f.to_string(),
        SqlValue::F64(f) => f.to_string(),
        SqlValue::Decimal(d) => d.to_string(),
        SqlValue::String(s) => quote_text(s),
        SqlValue::Uuid(u) => quote_text(&u.to_string()),
        SqlValue::Time(t) => quote_text(&t.to_string()),
        SqlValue::DateTime(dt) => quote_text(&dt.format(TIMESTAMP_FORMAT).to_string()),
        SqlValue::DateTimeOffset(dto) => quote_text(&dto.format(TIMESTAMP_FORMAT).to_string()),
        SqlValue::Date(d) => quote_text(&d.format("%Y-%m-%d 00:00:00").to_string()),
        SqlValue::Bytes(b) => {
            let mut hex = String::with_capacity(2 + b.len() * 2);
            hex.push_str("0x");
            for byte in b {
                let _ = write!(hex, "{:02X}", byte);
            }
            hex
        }
    }
}

fn quote_text(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::SqlNullType;
    use crate::drivers::memory::{FailOp, MemoryDatabase, MemoryProvider};
    use chrono::{FixedOffset, NaiveDate, NaiveTime, TimeZone};
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use uuid::Uuid;

    fn conn() -> ConnectionConfig {
        ConnectionConfig::new("memory", "inventory", "sa", "")
    }

    fn seeded(db: MemoryDatabase) -> MemoryProvider {
        let provider = MemoryProvider::new();
        provider.add_database(&conn(), db).unwrap();
        provider
    }

    #[test]
    fn test_text_quotes_are_doubled() {
        assert_eq!(format_literal(&"O'Brien".into()), "'O''Brien'");
        assert_eq!(format_literal(&"''".into()), "''''''");
    }

    #[test]
    fn test_null_is_unquoted() {
        assert_eq!(format_literal(&SqlValue::Null(SqlNullType::String)), "NULL");
        assert_eq!(format_literal(&SqlValue::Null(SqlNullType::DateTime)), "NULL");
    }

    #[test]
    fn test_temporal_literals() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_milli_opt(7, 5, 1, 250)
            .unwrap();
        assert_eq!(format_literal(&dt.into()), "'2024-03-09 07:05:01'");

        let d = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        assert_eq!(format_literal(&d.into()), "'2024-12-31 00:00:00'");

        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let dto = offset.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            format_literal(&SqlValue::DateTimeOffset(dto)),
            "'2024-01-02 03:04:05'"
        );

        let t = NaiveTime::from_hms_opt(13, 30, 0).unwrap();
        assert_eq!(format_literal(&SqlValue::Time(t)), "'13:30:00'");
    }

    #[test]
    fn test_native_literals() {
        assert_eq!(format_literal(&true.into()), "1");
        assert_eq!(format_literal(&SqlValue::Bool(false)), "0");
        assert_eq!(format_literal(&SqlValue::I64(-42)), "-42");
        assert_eq!(format_literal(&SqlValue::F64(2.5)), "2.5");
        assert_eq!(format_literal(&SqlValue::F64(f64::NAN)), "NULL");
        assert_eq!(
            format_literal(&Decimal::from_str("12.340").unwrap().into()),
            "12.340"
        );
        assert_eq!(format_literal(&vec![0x0au8, 0xff].into()), "0x0AFF");

        let id = Uuid::parse_str("6f9619ff-8b86-d011-b42d-00c04fc964ff").unwrap();
        assert_eq!(
            format_literal(&id.into()),
            "'6f9619ff-8b86-d011-b42d-00c04fc964ff'"
        );
    }

    #[tokio::test]
    async fn test_script_layout() {
        let db = MemoryDatabase::default()
            .with_table(
                "Owners",
                &["Id", "Name"],
                vec![
                    vec![1.into(), "O'Brien".into()],
                    vec![2.into(), SqlValue::Null(SqlNullType::String)],
                ],
            )
            .with_table("Empty", &["Id"], vec![]);
        let provider = seeded(db);

        let script = generate_backup_script(&provider, &conn(), &MigrationOptions::default()).await;
        let expected = "DELETE FROM [dbo].[Empty];\n\
                        \n\
                        DELETE FROM [dbo].[Owners];\n\
                        INSERT INTO [dbo].[Owners] ([Id], [Name]) VALUES (1, 'O''Brien');\n\
                        INSERT INTO [dbo].[Owners] ([Id], [Name]) VALUES (2, NULL);\n";
        assert_eq!(script, expected);
        assert_eq!(provider.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_failure_returns_partial_script() {
        let db = MemoryDatabase::default()
            .with_table("Accounts", &["Id"], vec![vec![1.into()]])
            .with_table("Sites", &["Id"], vec![vec![1.into()]])
            .fail_on(FailOp::Select("Sites".into()));
        let provider = seeded(db);

        let script = generate_backup_script(&provider, &conn(), &MigrationOptions::default()).await;
        assert!(script.starts_with("DELETE FROM [dbo].[Accounts];\n"));
        assert!(script.contains("VALUES (1);"));
        let last = script.lines().last().unwrap();
        assert!(last.starts_with("-- Backup generation failed:"));
        assert_eq!(provider.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_database_yields_comment_only() {
        let provider = MemoryProvider::new();
        let script = generate_backup_script(&provider, &conn(), &MigrationOptions::default()).await;
        assert!(script.starts_with("-- Backup generation failed:"));
    }
}

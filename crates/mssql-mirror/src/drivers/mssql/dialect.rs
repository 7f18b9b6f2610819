//! SQL Server statement text.
//!
//! Every builder here interpolates identifiers only; values go through
//! `@Pn` parameters.

use crate::core::identifier::{quote_mssql, TableName};
use crate::error::Result;

/// User base tables of one schema, excluding Microsoft-shipped objects.
pub const LIST_BASE_TABLES: &str = r#"
    SELECT t.TABLE_NAME
    FROM INFORMATION_SCHEMA.TABLES t
    WHERE t.TABLE_TYPE = 'BASE TABLE'
      AND t.TABLE_SCHEMA = @P1
      AND OBJECTPROPERTY(
            OBJECT_ID(QUOTENAME(t.TABLE_SCHEMA) + '.' + QUOTENAME(t.TABLE_NAME)),
            'IsMSShipped') = 0
    ORDER BY t.TABLE_NAME
"#;

/// Whether the table named by `@P1` has an IDENTITY column.
pub const TABLE_HAS_IDENTITY: &str =
    "SELECT CAST(ISNULL(OBJECTPROPERTY(OBJECT_ID(@P1), 'TableHasIdentity'), 0) AS INT)";

/// Columns of the table named by `@P1` that accept inserted values, in
/// column order. Computed and rowversion columns are generated by the server.
pub const INSERTABLE_COLUMNS: &str = r#"
    SELECT c.name
    FROM sys.columns c
    WHERE c.object_id = OBJECT_ID(@P1)
      AND c.is_computed = 0
      AND TYPE_NAME(c.system_type_id) <> 'timestamp'
    ORDER BY c.column_id
"#;

/// Suspends every FK and check constraint in the database.
pub const DISABLE_ALL_CONSTRAINTS: &str =
    "EXEC sp_MSforeachtable 'ALTER TABLE ? NOCHECK CONSTRAINT ALL'";

/// Restores every FK and check constraint without re-validating existing rows.
pub const ENABLE_ALL_CONSTRAINTS: &str =
    "EXEC sp_MSforeachtable 'ALTER TABLE ? CHECK CONSTRAINT ALL'";

/// Statement toggling constraint enforcement.
pub fn set_constraints(enabled: bool) -> &'static str {
    if enabled {
        ENABLE_ALL_CONSTRAINTS
    } else {
        DISABLE_ALL_CONSTRAINTS
    }
}

/// `SELECT *` over the whole table.
pub fn select_all(table: &TableName) -> String {
    format!("SELECT * FROM {}", table.quoted())
}

/// Whole-table select of the listed columns, or `SELECT *` when `columns` is empty.
pub fn select_columns(table: &TableName, columns: &[String]) -> Result<String> {
    if columns.is_empty() {
        return Ok(select_all(table));
    }
    let cols = columns
        .iter()
        .map(|c| quote_mssql(c))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("SELECT {} FROM {}", cols.join(", "), table.quoted()))
}

/// Full delete (not TRUNCATE, which fails on FK-referenced tables).
pub fn delete_all(table: &TableName) -> String {
    format!("DELETE FROM {}", table.quoted())
}

/// Exact row count.
pub fn count_rows(table: &TableName) -> String {
    format!("SELECT COUNT_BIG(*) FROM {}", table.quoted())
}

/// Single-row parameterized insert: `INSERT INTO t ([a], [b]) VALUES (@P1, @P2)`.
pub fn insert_row(table: &TableName, columns: &[String]) -> Result<String> {
    let cols = columns
        .iter()
        .map(|c| quote_mssql(c))
        .collect::<Result<Vec<_>>>()?;
    let params: Vec<String> = (1..=columns.len()).map(|i| format!("@P{}", i)).collect();

    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.quoted(),
        cols.join(", "),
        params.join(", ")
    ))
}

/// `SET IDENTITY_INSERT t ON|OFF`.
pub fn identity_insert(table: &TableName, on: bool) -> String {
    format!(
        "SET IDENTITY_INSERT {} {}",
        table.quoted(),
        if on { "ON" } else { "OFF" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices() -> TableName {
        TableName::from_catalog("dbo", "Devices").unwrap()
    }

    #[test]
    fn test_insert_row_binds_every_value() {
        let sql = insert_row(&devices(), &["Id".into(), "Serial No".into(), "x]y".into()]).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO [dbo].[Devices] ([Id], [Serial No], [x]]y]) VALUES (@P1, @P2, @P3)"
        );
    }

    #[test]
    fn test_insert_row_rejects_bad_column() {
        assert!(insert_row(&devices(), &["".into()]).is_err());
    }

    #[test]
    fn test_table_statements() {
        assert_eq!(select_all(&devices()), "SELECT * FROM [dbo].[Devices]");
        assert_eq!(delete_all(&devices()), "DELETE FROM [dbo].[Devices]");
        assert_eq!(
            count_rows(&devices()),
            "SELECT COUNT_BIG(*) FROM [dbo].[Devices]"
        );
        assert_eq!(
            identity_insert(&devices(), true),
            "SET IDENTITY_INSERT [dbo].[Devices] ON"
        );
    }

    #[test]
    fn test_select_columns_lists_columns() {
        let sql = select_columns(&devices(), &["Id".into(), "Serial No".into()]).unwrap();
        assert_eq!(sql, "SELECT [Id], [Serial No] FROM [dbo].[Devices]");
        assert_eq!(
            select_columns(&devices(), &[]).unwrap(),
            "SELECT * FROM [dbo].[Devices]"
        );
    }

    #[test]
    fn test_insertable_columns_excludes_generated() {
        assert!(INSERTABLE_COLUMNS.contains("is_computed = 0"));
        assert!(INSERTABLE_COLUMNS.contains("'timestamp'"));
        assert!(INSERTABLE_COLUMNS.contains("ORDER BY c.column_id"));
    }

    #[test]
    fn test_constraint_statements() {
        assert!(set_constraints(false).contains("NOCHECK CONSTRAINT ALL"));
        let enable = set_constraints(true);
        assert!(enable.contains("CHECK CONSTRAINT ALL"));
        assert!(!enable.contains("NOCHECK"));
        // Re-enabling must not re-validate existing rows.
        assert!(!enable.contains("WITH CHECK"));
    }

    #[test]
    fn test_catalog_query_filters_base_tables() {
        assert!(LIST_BASE_TABLES.contains("'BASE TABLE'"));
        assert!(LIST_BASE_TABLES.contains("IsMSShipped"));
        assert!(LIST_BASE_TABLES.contains("@P1"));
    }
}

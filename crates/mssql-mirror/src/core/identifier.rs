//! Identifier validation and quoting for generated SQL.
//!
//! Identifiers cannot be bound as query parameters, so table and column
//! names end up interpolated into statement text. Two rules keep that safe:
//!
//! 1. Table names only enter the engine as [`TableName`] values, and a
//!    [`TableName`] can only be built from a catalog row read from the same
//!    connection it is later used with.
//! 2. Every identifier is validated and bracket-quoted before interpolation.

use std::fmt;

use serde::Serialize;

use crate::error::{MigrateError, Result};

/// SQL Server identifier limit (sysname is nvarchar(128)).
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes and
/// identifiers longer than 128 characters.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} characters: {:?}",
            MAX_IDENTIFIER_LENGTH, name
        )));
    }

    Ok(())
}

/// Quote a SQL Server identifier using brackets.
///
/// Escapes closing brackets by doubling them and wraps in brackets.
pub fn quote_mssql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("[{}]", name.replace(']', "]]")))
}

/// A user table discovered by the catalog reader.
///
/// There is no public constructor: callers obtain one from
/// [`crate::catalog::list_tables`], so free-form external input never reaches
/// statement text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TableName {
    schema: String,
    name: String,
}

impl TableName {
    /// Build from a catalog row. Validates both parts.
    pub(crate) fn from_catalog(schema: &str, name: &str) -> Result<Self> {
        validate_identifier(schema)?;
        validate_identifier(name)?;
        Ok(Self {
            schema: schema.to_string(),
            name: name.to_string(),
        })
    }

    /// The same table name in another schema of the counterpart database.
    pub(crate) fn in_schema(&self, schema: &str) -> Result<Self> {
        Self::from_catalog(schema, &self.name)
    }

    /// Schema the table lives in.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Bare table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bracket-quoted `[schema].[table]`.
    pub fn quoted(&self) -> String {
        // Both parts were validated at construction.
        format!(
            "[{}].[{}]",
            self.schema.replace(']', "]]"),
            self.name.replace(']', "]]")
        )
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

//! Configuration validation.

use super::{Config, ConnectionConfig};
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_connection("source", &config.source)?;
    validate_connection("target", &config.target)?;

    // Cannot migrate to the same database
    if config.source.host.eq_ignore_ascii_case(&config.target.host)
        && config.source.port == config.target.port
        && config.source.database.eq_ignore_ascii_case(&config.target.database)
    {
        return Err(MigrateError::Config(
            "source and target cannot be the same database".into(),
        ));
    }

    Ok(())
}

/// Validate one connection descriptor.
pub fn validate_connection(side: &str, conn: &ConnectionConfig) -> Result<()> {
    if conn.host.is_empty() {
        return Err(MigrateError::Config(format!("{}.host is required", side)));
    }
    if conn.database.is_empty() {
        return Err(MigrateError::Config(format!("{}.database is required", side)));
    }
    if conn.user.is_empty() {
        return Err(MigrateError::Config(format!("{}.user is required", side)));
    }
    if conn.schema.is_empty() {
        return Err(MigrateError::Config(format!("{}.schema cannot be empty", side)));
    }
    if conn.port == 0 {
        return Err(MigrateError::Config(format!("{}.port must be non-zero", side)));
    }
    Ok(())
}

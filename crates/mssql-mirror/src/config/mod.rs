//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;
pub use validation::validate_connection;

use crate::error::{MigrateError, Result};
use connection_string::AdoNetString;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl ConnectionConfig {
    /// Build an ADO-style connection string.
    ///
    /// Values that need it are quoted, so the output parses back with
    /// [`ConnectionConfig::from_connection_string`]. The result contains the
    /// password; never log it.
    pub fn connection_string(&self) -> String {
        format!(
            "Server=tcp:{},{};Database={};User Id={};Password={};Encrypt={};TrustServerCertificate={};Connect Timeout={}",
            ado_quote(&self.host),
            self.port,
            ado_quote(&self.database),
            ado_quote(&self.user),
            ado_quote(&self.password),
            self.encryption_enabled(),
            self.trust_server_cert,
            self.connect_timeout_secs
        )
    }

    /// Parse an ADO-style connection string such as
    /// `Server=tcp:db01,1433;Database=inventory;User Id=sa;Password='a;b'`.
    ///
    /// Unknown keys are ignored. The schema defaults to `dbo`.
    pub fn from_connection_string(s: &str) -> Result<Self> {
        let ado: AdoNetString = s
            .parse()
            .map_err(|e| MigrateError::Config(format!("malformed connection string: {}", e)))?;
        let mut conn = ConnectionConfig::new("", "", "", "");

        for (key, raw) in ado.iter() {
            let value = raw.trim();
            match key.trim().to_lowercase().as_str() {
                "server" | "data source" | "address" | "addr" => {
                    let server = value.strip_prefix("tcp:").unwrap_or(value);
                    match server.rsplit_once(',') {
                        Some((host, port)) => {
                            conn.host = host.trim().to_string();
                            conn.port = port.trim().parse().map_err(|_| {
                                MigrateError::Config(format!("invalid port in connection string: {:?}", port))
                            })?;
                        }
                        None => conn.host = server.to_string(),
                    }
                }
                "database" | "initial catalog" => conn.database = value.to_string(),
                "user id" | "uid" | "user" => conn.user = value.to_string(),
                "password" | "pwd" => conn.password = raw.clone(),
                "encrypt" => conn.encrypt = value.to_lowercase(),
                "trustservercertificate" | "trust server certificate" => {
                    conn.trust_server_cert = parse_bool(value);
                }
                "connect timeout" | "connection timeout" | "timeout" => {
                    conn.connect_timeout_secs = value.parse().map_err(|_| {
                        MigrateError::Config(format!("invalid timeout in connection string: {:?}", value))
                    })?;
                }
                _ => {}
            }
        }

        validate_connection("connection", &conn)?;
        Ok(conn)
    }
}

/// Quote an ADO value that holds a separator, a quote or edge whitespace.
fn ado_quote(value: &str) -> String {
    let needs_quotes = value.contains([';', '=', '\'', '"'])
        || value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace);
    if !needs_quotes {
        value.to_string()
    } else if !value.contains('"') {
        format!("\"{}\"", value)
    } else if !value.contains('\'') {
        format!("'{}'", value)
    } else {
        format!("\"{}\"", value.replace('"', "\"\""))
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "yes" | "1")
}

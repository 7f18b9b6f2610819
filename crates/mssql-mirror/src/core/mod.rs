//! Core abstractions shared by the engine components and the drivers.
//!
//! - [`identifier`]: identifier validation, quoting and [`TableName`]
//! - [`value`]: SQL values and the per-table [`RowSnapshot`]
//! - [`traits`]: the [`ConnectionProvider`] / [`Session`] seam

pub mod identifier;
pub mod traits;
pub mod value;

pub use identifier::{quote_mssql, validate_identifier, TableName};
pub use traits::{ConnectionProvider, Session};
pub use value::{RowSnapshot, SqlNullType, SqlValue};

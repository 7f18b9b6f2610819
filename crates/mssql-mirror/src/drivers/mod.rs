//! Connection providers.
//!
//! - [`mssql`]: Microsoft SQL Server over TDS (tiberius)
//! - [`memory`]: in-memory databases for tests and dry runs
//!
//! # Adding a backend
//!
//! Implement [`ConnectionProvider`](crate::core::ConnectionProvider) and
//! [`Session`](crate::core::Session). The target engine must offer a single
//! statement that suspends every FK and check constraint in the database;
//! the copier relies on it to write tables in any order.

pub mod memory;
pub mod mssql;

pub use memory::{FailOp, MemoryDatabase, MemoryProvider};
pub use mssql::MssqlProvider;

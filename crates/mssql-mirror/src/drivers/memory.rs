//! In-memory database provider.
//!
//! Implements the [`Session`] contract over plain vectors so the engine can be
//! exercised without a server. It models the behavior the engine relies on:
//!
//! - foreign keys are enforced on insert and delete while constraints are enabled
//! - missing tables and unknown columns are errors
//! - endpoints that were never registered are unreachable
//!
//! Failures can be injected per operation with [`MemoryDatabase::fail_on`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::config::ConnectionConfig;
use crate::core::identifier::TableName;
use crate::core::traits::{ConnectionProvider, Session};
use crate::core::value::{RowSnapshot, SqlNullType, SqlValue};
use crate::error::{MigrateError, Result};

/// An operation that can be made to fail.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FailOp {
    /// Listing base tables.
    ListTables,
    /// Reading the named table.
    Select(String),
    /// Deleting from the named table.
    Delete(String),
    /// Inserting into the named table.
    Insert(String),
    /// Counting the named table.
    Count(String),
    /// Disabling constraints.
    DisableConstraints,
    /// Enabling constraints.
    EnableConstraints,
}

/// One table: column names and positional rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTable {
    /// Column names.
    pub columns: Vec<String>,
    /// Rows in insertion order.
    pub rows: Vec<Vec<SqlValue>>,
    /// Hidden from the table list, like Microsoft-shipped objects.
    pub system: bool,
}

/// A single-column foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryForeignKey {
    /// Referencing table (bare name).
    pub table: String,
    /// Referencing column.
    pub column: String,
    /// Referenced table (bare name).
    pub ref_table: String,
    /// Referenced column.
    pub ref_column: String,
}

/// One in-memory database with a single schema.
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    schema: String,
    tables: BTreeMap<String, MemoryTable>,
    foreign_keys: Vec<MemoryForeignKey>,
    constraints_enabled: bool,
    failures: HashSet<FailOp>,
    writes: usize,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new("dbo")
    }
}

impl MemoryDatabase {
    /// Create an empty database whose tables live in `schema`.
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            tables: BTreeMap::new(),
            foreign_keys: Vec::new(),
            constraints_enabled: true,
            failures: HashSet::new(),
            writes: 0,
        }
    }

    /// Add a user table.
    pub fn with_table(mut self, name: &str, columns: &[&str], rows: Vec<Vec<SqlValue>>) -> Self {
        self.tables.insert(
            name.to_string(),
            MemoryTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
                system: false,
            },
        );
        self
    }

    /// Add a table that the catalog must not list.
    pub fn with_system_table(mut self, name: &str, columns: &[&str]) -> Self {
        self.tables.insert(
            name.to_string(),
            MemoryTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows: Vec::new(),
                system: true,
            },
        );
        self
    }

    /// Add a foreign key `table.column -> ref_table.ref_column`.
    pub fn with_foreign_key(mut self, table: &str, column: &str, ref_table: &str, ref_column: &str) -> Self {
        self.foreign_keys.push(MemoryForeignKey {
            table: table.to_string(),
            column: column.to_string(),
            ref_table: ref_table.to_string(),
            ref_column: ref_column.to_string(),
        });
        self
    }

    /// Make an operation fail.
    pub fn fail_on(mut self, op: FailOp) -> Self {
        self.failures.insert(op);
        self
    }

    /// Mutable table by bare name.
    pub fn table_mut(&mut self, name: &str) -> Option<&mut MemoryTable> {
        self.tables.get_mut(name)
    }

    /// Rows of a table, empty if the table does not exist.
    pub fn rows(&self, name: &str) -> Vec<Vec<SqlValue>> {
        self.tables.get(name).map(|t| t.rows.clone()).unwrap_or_default()
    }

    /// Whether constraints are currently enforced.
    pub fn constraints_enabled(&self) -> bool {
        self.constraints_enabled
    }

    /// Number of write operations (deletes, inserts, constraint toggles) applied.
    pub fn writes(&self) -> usize {
        self.writes
    }

    fn check(&self, op: FailOp) -> Result<()> {
        if self.failures.contains(&op) {
            return Err(MigrateError::backend(format!("injected failure: {:?}", op)));
        }
        Ok(())
    }

    fn resolve(&self, table: &TableName) -> Result<&MemoryTable> {
        if table.schema() != self.schema {
            return Err(invalid_object(table));
        }
        self.tables.get(table.name()).ok_or_else(|| invalid_object(table))
    }

    fn column_value<'a>(&'a self, table: &str, row: &'a [SqlValue], column: &str) -> Option<&'a SqlValue> {
        let idx = self.tables.get(table)?.columns.iter().position(|c| c == column)?;
        row.get(idx)
    }

    fn parent_has(&self, fk: &MemoryForeignKey, value: &SqlValue) -> bool {
        self.tables
            .get(&fk.ref_table)
            .map(|parent| {
                parent
                    .rows
                    .iter()
                    .any(|r| self.column_value(&fk.ref_table, r, &fk.ref_column) == Some(value))
            })
            .unwrap_or(false)
    }

    fn check_insert(&self, table: &str, row: &[SqlValue]) -> Result<()> {
        if !self.constraints_enabled {
            return Ok(());
        }
        for fk in self.foreign_keys.iter().filter(|fk| fk.table == table) {
            match self.column_value(table, row, &fk.column) {
                Some(value) if !value.is_null() && !self.parent_has(fk, value) => {
                    return Err(MigrateError::backend(format!(
                        "The INSERT statement conflicted with the FOREIGN KEY constraint on {}.{} referencing {}.{}",
                        fk.table, fk.column, fk.ref_table, fk.ref_column
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn check_delete(&self, table: &str) -> Result<()> {
        if !self.constraints_enabled {
            return Ok(());
        }
        for fk in self.foreign_keys.iter().filter(|fk| fk.ref_table == table) {
            let referenced = self.tables.get(&fk.table).map_or(false, |child| {
                child.rows.iter().any(|r| {
                    self.column_value(&fk.table, r, &fk.column)
                        .map_or(false, |v| !v.is_null())
                })
            });
            if referenced {
                return Err(MigrateError::backend(format!(
                    "The DELETE statement conflicted with the REFERENCE constraint on {}.{}",
                    fk.table, fk.column
                )));
            }
        }
        Ok(())
    }
}

fn invalid_object(table: &TableName) -> MigrateError {
    MigrateError::backend(format!("Invalid object name '{}'", table))
}

type Registry = Arc<Mutex<HashMap<String, MemoryDatabase>>>;

fn lock(registry: &Registry) -> Result<MutexGuard<'_, HashMap<String, MemoryDatabase>>> {
    registry
        .lock()
        .map_err(|_| MigrateError::backend("memory registry lock poisoned"))
}

/// Provider serving [`MemoryDatabase`]s keyed by connection endpoint.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    databases: Registry,
    open_sessions: Arc<AtomicUsize>,
    opened_total: Arc<AtomicUsize>,
}

impl MemoryProvider {
    /// Create a provider with no databases.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a database reachable through `conn`.
    pub fn add_database(&self, conn: &ConnectionConfig, db: MemoryDatabase) -> Result<()> {
        lock(&self.databases)?.insert(conn.endpoint(), db);
        Ok(())
    }

    /// Copy of the database behind `conn`.
    pub fn database(&self, conn: &ConnectionConfig) -> Option<MemoryDatabase> {
        lock(&self.databases).ok()?.get(&conn.endpoint()).cloned()
    }

    /// Mutate the database behind `conn` in place.
    pub fn with_database<T>(
        &self,
        conn: &ConnectionConfig,
        f: impl FnOnce(&mut MemoryDatabase) -> T,
    ) -> Result<T> {
        let mut dbs = lock(&self.databases)?;
        let db = dbs.get_mut(&conn.endpoint()).ok_or_else(|| MigrateError::ConnectionUnreachable {
            endpoint: conn.endpoint(),
        })?;
        Ok(f(db))
    }

    /// Sessions opened and not yet closed or dropped.
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    /// Sessions opened over the provider's lifetime.
    pub fn opened_total(&self) -> usize {
        self.opened_total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionProvider for MemoryProvider {
    async fn open(&self, conn: &ConnectionConfig) -> Result<Box<dyn Session>> {
        let key = conn.endpoint();
        if !lock(&self.databases)?.contains_key(&key) {
            return Err(MigrateError::ConnectionUnreachable { endpoint: key });
        }

        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        self.opened_total.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            databases: self.databases.clone(),
            open_sessions: self.open_sessions.clone(),
            key,
            closed: false,
        }))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// A session against one [`MemoryDatabase`].
pub struct MemorySession {
    databases: Registry,
    open_sessions: Arc<AtomicUsize>,
    key: String,
    closed: bool,
}

impl MemorySession {
    fn with_db<T>(&self, f: impl FnOnce(&mut MemoryDatabase) -> Result<T>) -> Result<T> {
        if self.closed {
            return Err(MigrateError::backend(format!("session to {} is closed", self.key)));
        }
        let mut dbs = lock(&self.databases)?;
        let db = dbs
            .get_mut(&self.key)
            .ok_or_else(|| MigrateError::backend(format!("database {} was removed", self.key)))?;
        f(db)
    }

    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn list_base_tables(&mut self, schema: &str) -> Result<Vec<String>> {
        self.with_db(|db| {
            db.check(FailOp::ListTables)?;
            if schema != db.schema {
                return Ok(Vec::new());
            }
            Ok(db
                .tables
                .iter()
                .filter(|(_, t)| !t.system)
                .map(|(name, _)| name.clone())
                .collect())
        })
    }

    async fn select_all(&mut self, table: &TableName) -> Result<RowSnapshot> {
        self.with_db(|db| {
            db.check(FailOp::Select(table.name().to_string()))?;
            let t = db.resolve(table)?;
            Ok(RowSnapshot::new(t.columns.clone(), t.rows.clone()))
        })
    }

    async fn delete_all(&mut self, table: &TableName) -> Result<u64> {
        self.with_db(|db| {
            db.check(FailOp::Delete(table.name().to_string()))?;
            db.resolve(table)?;
            db.check_delete(table.name())?;
            db.writes += 1;
            let t = db.tables.get_mut(table.name()).ok_or_else(|| invalid_object(table))?;
            let removed = t.rows.len() as u64;
            t.rows.clear();
            Ok(removed)
        })
    }

    async fn insert_rows(
        &mut self,
        table: &TableName,
        columns: &[String],
        rows: &[Vec<SqlValue>],
    ) -> Result<u64> {
        self.with_db(|db| {
            db.check(FailOp::Insert(table.name().to_string()))?;
            let target_columns = db.resolve(table)?.columns.clone();

            let positions = columns
                .iter()
                .map(|c| {
                    target_columns.iter().position(|t| t == c).ok_or_else(|| {
                        MigrateError::backend(format!("Invalid column name '{}' in {}", c, table))
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let mut inserted = 0u64;
            for row in rows {
                if row.len() != columns.len() {
                    return Err(MigrateError::backend(format!(
                        "{} values supplied for {} columns in {}",
                        row.len(),
                        columns.len(),
                        table
                    )));
                }
                let mut full = vec![SqlValue::Null(SqlNullType::String); target_columns.len()];
                for (value, &pos) in row.iter().zip(&positions) {
                    full[pos] = value.clone();
                }
                db.check_insert(table.name(), &full)?;
                db.writes += 1;
                if let Some(t) = db.tables.get_mut(table.name()) {
                    t.rows.push(full);
                }
                inserted += 1;
            }
            Ok(inserted)
        })
    }

    async fn count_rows(&mut self, table: &TableName) -> Result<i64> {
        self.with_db(|db| {
            db.check(FailOp::Count(table.name().to_string()))?;
            Ok(db.resolve(table)?.rows.len() as i64)
        })
    }

    async fn set_constraints_enabled(&mut self, enabled: bool) -> Result<()> {
        self.with_db(|db| {
            db.check(if enabled {
                FailOp::EnableConstraints
            } else {
                FailOp::DisableConstraints
            })?;
            db.writes += 1;
            db.constraints_enabled = enabled;
            Ok(())
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.release();
        Ok(())
    }
}

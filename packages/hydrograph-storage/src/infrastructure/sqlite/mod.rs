//! SQLite adapter for [`StatementExecutor`]
//!
//! One `SqliteDatabase` wraps one connection (one session). Transactions
//! nest: the outermost `begin` issues `BEGIN IMMEDIATE` so concurrent
//! sessions on the same file serialise their writers up front, inner ones
//! become savepoints.

pub mod schema;

use crate::domain::{Row, SqlValue, StatementExecutor};
use crate::error::{Result, StorageError};
use parking_lot::Mutex;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Default time a session waits on a locked database before failing
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

struct Inner {
    conn: Connection,
    /// Open transaction depth (0 = autocommit)
    depth: usize,
}

/// SQLite-backed statement executor
pub struct SqliteDatabase {
    inner: Mutex<Inner>,
}

impl SqliteDatabase {
    /// Open (or create) a database file and apply the reference schema
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_with_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            StorageError::new(
                crate::error::ErrorKind::Config,
                format!("cannot open {}: {}", path.display(), e),
            )
            .with_source(e)
        })?;
        conn.busy_timeout(busy_timeout)?;
        let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "opened sqlite database");
        Self::from_connection(conn)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        schema::apply(&conn)?;
        Ok(Self {
            inner: Mutex::new(Inner { conn, depth: 0 }),
        })
    }

    /// Shared handle, the form the dependency core consumes
    pub fn into_shared(self) -> Arc<dyn StatementExecutor> {
        Arc::new(self)
    }

    /// Current transaction nesting depth
    pub fn transaction_depth(&self) -> usize {
        self.inner.lock().depth
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            SqlValue::Integer(v) => ToSqlOutput::Borrowed(ValueRef::Integer(*v)),
            SqlValue::Real(v) => ToSqlOutput::Borrowed(ValueRef::Real(*v)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

fn value_from_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Integer(v),
        ValueRef::Real(v) => SqlValue::Real(v),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            SqlValue::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

impl StatementExecutor for SqliteDatabase {
    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let inner = self.inner.lock();
        let mut stmt = inner.conn.prepare_cached(sql)?;
        let columns: Arc<[String]> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let width = columns.len();

        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(value_from_ref(row.get_ref(idx)?));
            }
            out.push(Row::new(Arc::clone(&columns), values));
        }
        Ok(out)
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<usize> {
        let inner = self.inner.lock();
        let mut stmt = inner.conn.prepare_cached(sql)?;
        Ok(stmt.execute(params_from_iter(params.iter()))?)
    }

    fn begin(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.depth == 0 {
            inner.conn.execute_batch("BEGIN IMMEDIATE")?;
        } else {
            let sql = format!("SAVEPOINT sp_{}", inner.depth);
            inner.conn.execute_batch(&sql)?;
        }
        inner.depth += 1;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.depth {
            0 => Err(StorageError::transaction("commit without an open transaction")),
            1 => {
                inner.conn.execute_batch("COMMIT")?;
                inner.depth = 0;
                Ok(())
            }
            depth => {
                let sql = format!("RELEASE SAVEPOINT sp_{}", depth - 1);
                inner.conn.execute_batch(&sql)?;
                inner.depth -= 1;
                Ok(())
            }
        }
    }

    fn rollback(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.depth {
            0 => Err(StorageError::transaction("rollback without an open transaction")),
            1 => {
                inner.depth = 0;
                inner.conn.execute_batch("ROLLBACK")?;
                Ok(())
            }
            depth => {
                let name = format!("sp_{}", depth - 1);
                inner.depth -= 1;
                inner
                    .conn
                    .execute_batch(&format!("ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name}"))?;
                Ok(())
            }
        }
    }
}

impl Drop for SqliteDatabase {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.depth > 0 {
            tracing::warn!(depth = inner.depth, "dropping sqlite session with open transaction; rolling back");
            if let Err(e) = inner.conn.execute_batch("ROLLBACK") {
                tracing::error!(error = %e, "rollback on drop failed");
            }
        }
    }
}

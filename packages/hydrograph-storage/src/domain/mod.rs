//! Domain layer - the backing-store contract
//!
//! The dependency core never talks to a database driver directly. Everything
//! it needs from the relational store fits through [`StatementExecutor`]:
//!
//! - `query`    : run a statement that yields rows
//! - `execute`  : run a statement, get the affected row count
//! - `begin` / `commit` / `rollback` : transaction control (nestable)
//!
//! Values cross the boundary as [`SqlValue`] and rows come back as [`Row`],
//! a column-name indexed record with typed getters. Dialect details (paging,
//! `RETURNING`, pragma tuning) stay inside the adapter.

use crate::error::{Result, StorageError};
use std::fmt;
use std::sync::Arc;

// ═══════════════════════════════════════════════════════════════════════════
// Values
// ═══════════════════════════════════════════════════════════════════════════

/// A single bound parameter or column value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(v) => Some(*v),
            SqlValue::Real(v) if v.fract() == 0.0 => Some(*v as i64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Integer(v) => write!(f, "{}", v),
            SqlValue::Real(v) => write!(f, "{}", v),
            SqlValue::Text(s) => write!(f, "'{}'", s),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Integer(v as i64)
    }
}

impl From<usize> for SqlValue {
    fn from(v: usize) -> Self {
        SqlValue::Integer(v as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Integer(if v { 1 } else { 0 })
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&String> for SqlValue {
    fn from(v: &String) -> Self {
        SqlValue::Text(v.clone())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => SqlValue::Null,
        }
    }
}

/// Build a parameter array: `db.query(sql, &sql_params![id, name])`
#[macro_export]
macro_rules! sql_params {
    () => {{
        let empty: [$crate::SqlValue; 0] = [];
        empty
    }};
    ($($value:expr),+ $(,)?) => {
        [$($crate::SqlValue::from($value)),+]
    };
}

// ═══════════════════════════════════════════════════════════════════════════
// Rows
// ═══════════════════════════════════════════════════════════════════════════

/// One result row. Column names are shared by every row of a result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Column lookup is case-insensitive, like the engines we target
    pub fn get(&self, column: &str) -> Result<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|idx| self.values.get(idx))
            .ok_or_else(|| StorageError::column(column, "column of this result set"))
    }

    pub fn get_i64(&self, column: &str) -> Result<i64> {
        self.get(column)?
            .as_i64()
            .ok_or_else(|| StorageError::column(column, "integer"))
    }

    pub fn get_opt_i64(&self, column: &str) -> Result<Option<i64>> {
        let value = self.get(column)?;
        if value.is_null() {
            return Ok(None);
        }
        value
            .as_i64()
            .map(Some)
            .ok_or_else(|| StorageError::column(column, "integer"))
    }

    pub fn get_string(&self, column: &str) -> Result<String> {
        match self.get(column)? {
            SqlValue::Text(s) => Ok(s.clone()),
            SqlValue::Integer(v) => Ok(v.to_string()),
            SqlValue::Real(v) => Ok(v.to_string()),
            SqlValue::Null => Err(StorageError::column(column, "non-null text")),
        }
    }

    /// NULL reads as empty string
    pub fn get_string_or_empty(&self, column: &str) -> Result<String> {
        Ok(self.get_opt_string(column)?.unwrap_or_default())
    }

    pub fn get_opt_string(&self, column: &str) -> Result<Option<String>> {
        match self.get(column)? {
            SqlValue::Null => Ok(None),
            _ => self.get_string(column).map(Some),
        }
    }

    /// Integers are true when non-zero; text accepts `Y`/`N` and `true`/`false`
    pub fn get_bool(&self, column: &str) -> Result<bool> {
        match self.get(column)? {
            SqlValue::Integer(v) => Ok(*v != 0),
            SqlValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "y" | "yes" | "true" | "1" => Ok(true),
                "n" | "no" | "false" | "0" | "" => Ok(false),
                _ => Err(StorageError::column(column, "boolean")),
            },
            SqlValue::Null => Ok(false),
            SqlValue::Real(_) => Err(StorageError::column(column, "boolean")),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Executor port
// ═══════════════════════════════════════════════════════════════════════════

/// Narrow statement interface over a relational store.
///
/// Implementations hold exactly one session (connection). `begin` may be
/// called while a transaction is already open; the adapter must nest it
/// (savepoints) so that an inner `rollback` only undoes the inner unit.
pub trait StatementExecutor: Send + Sync {
    /// Run a statement that produces rows
    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>>;

    /// Run a statement and return the number of affected rows
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<usize>;

    fn begin(&self) -> Result<()>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;

    /// First row of a result set, if any
    fn query_one(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }
}

impl<E: StatementExecutor + ?Sized> StatementExecutor for Arc<E> {
    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        (**self).query(sql, params)
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<usize> {
        (**self).execute(sql, params)
    }

    fn begin(&self) -> Result<()> {
        (**self).begin()
    }

    fn commit(&self) -> Result<()> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<()> {
        (**self).rollback()
    }
}

/// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
///
/// The error type is the caller's, so domain errors raised inside `f` roll
/// the unit back the same way storage errors do.
pub fn in_transaction<E, T, Err, F>(db: &E, f: F) -> std::result::Result<T, Err>
where
    E: StatementExecutor + ?Sized,
    F: FnOnce(&E) -> std::result::Result<T, Err>,
    Err: From<StorageError>,
{
    db.begin()?;
    match f(db) {
        Ok(value) => {
            db.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = db.rollback() {
                tracing::error!(error = %rollback_err, "rollback failed after aborted unit of work");
            }
            Err(err)
        }
    }
}

//! Executor wrapper that counts backing-store round trips

use hydrograph_storage::{Result, Row, SqlValue, SqliteDatabase, StatementExecutor};
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct CountingExecutor {
    inner: SqliteDatabase,
    queries: AtomicUsize,
    executes: AtomicUsize,
}

impl CountingExecutor {
    pub fn in_memory() -> Self {
        Self {
            inner: SqliteDatabase::in_memory().expect("in-memory database"),
            queries: AtomicUsize::new(0),
            executes: AtomicUsize::new(0),
        }
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn executes(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }

    /// Queries plus executes
    pub fn round_trips(&self) -> usize {
        self.queries() + self.executes()
    }
}

impl StatementExecutor for CountingExecutor {
    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(sql, params)
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<usize> {
        self.executes.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(sql, params)
    }

    fn begin(&self) -> Result<()> {
        self.inner.begin()
    }

    fn commit(&self) -> Result<()> {
        self.inner.commit()
    }

    fn rollback(&self) -> Result<()> {
        self.inner.rollback()
    }
}

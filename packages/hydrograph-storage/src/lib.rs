//! hydrograph-storage - the backing-store contract of the dependency core
//!
//! > The core needs a relational store, not a particular one.
//!
//! ## Layers
//!
//! - **domain**: [`StatementExecutor`] (query / execute / begin / commit /
//!   rollback), [`SqlValue`], [`Row`] and the [`in_transaction`] helper
//! - **infrastructure**: the SQLite reference adapter (feature `sqlite`,
//!   on by default) and the reference schema
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hydrograph_storage::{in_transaction, sql_params, SqliteDatabase, StatementExecutor};
//!
//! let db = SqliteDatabase::open("deps.db")?;
//! in_transaction(&db, |db| {
//!     db.execute(
//!         "DELETE FROM cp_comp_depends WHERE computation_id = ?1",
//!         &sql_params![42i64],
//!     )?;
//!     Ok::<_, hydrograph_storage::StorageError>(())
//! })?;
//! ```

pub mod domain;
pub mod error;

#[cfg(feature = "sqlite")]
pub mod infrastructure;

pub use error::{ErrorKind, Result, StorageError};

pub use domain::{in_transaction, Row, SqlValue, StatementExecutor};

#[cfg(feature = "sqlite")]
pub use infrastructure::SqliteDatabase;

//! Convenience helpers over a SQL connection pool.
//!
//! [`Essentials`] wraps any [`Driver`] and offers a small set of operations:
//! exec (plain, returning the generated id, or the affected row count), select
//! a single row, select with an existence flag, and select a range of rows
//! through a per-row callback. Each comes in a pool form backed by a shared
//! [`StmtCache`] and a transaction form whose prepared statement is closed on
//! every exit path. [`Essentials::tx`] runs a handler inside a transaction and
//! commits or rolls back depending on its outcome.
//!
//! A rusqlite driver ships behind the default `sqlite` feature:
//!
//! ```rust,no_run
//! use sql_essentials::prelude::*;
//!
//! # async fn run() -> Result<(), SqlEssentialsError> {
//! let pool = SqliteOptionsBuilder::new("app.db".into()).build().await?;
//! let db = Essentials::new(pool);
//! let ctx = Context::background();
//!
//! db.exec(&ctx, "CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, name TEXT)", &[])
//!     .await?;
//! let id = db
//!     .exec_id(&ctx, "INSERT INTO users (name) VALUES (?1)", &[RowValues::Text("ada".into())])
//!     .await?;
//!
//! let mut name = (String::new(),);
//! let found = db
//!     .select_exists(&ctx, "SELECT name FROM users WHERE id = ?1", &[RowValues::Int(id)], &mut name)
//!     .await?;
//! assert!(found);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod context;
pub mod driver;
pub mod error;
pub mod essentials;
pub mod mapping;
pub mod prelude;
pub mod scan;
pub mod stmt_cache;
pub mod types;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use builder::{QueryAndParams, SqlSource};
pub use context::Context;
pub use driver::{Driver, Preparer, Rows, Statement, Transaction};
pub use error::{MultiError, SqlEssentialsError};
pub use essentials::Essentials;
pub use scan::{Destination, FromValue, ScanValue};
pub use stmt_cache::{EvictErrors, StmtCache};
pub use types::{ExecResult, IsolationLevel, RowValues, TxOptions};

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteOptions, SqliteOptionsBuilder, SqlitePool, SqliteTx};

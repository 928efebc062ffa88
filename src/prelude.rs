//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and traits
//! to make it easier to get started with the library.

pub use crate::builder::{QueryAndParams, SqlSource};
pub use crate::context::Context;
pub use crate::dests;
pub use crate::driver::{Driver, Preparer, Rows, Statement, Transaction};
pub use crate::error::{MultiError, SqlEssentialsError};
pub use crate::essentials::Essentials;
pub use crate::scan::{Destination, FromValue, ScanValue};
pub use crate::stmt_cache::{EvictErrors, StmtCache};
pub use crate::types::{ExecResult, IsolationLevel, RowValues, TxOptions};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteOptions, SqliteOptionsBuilder, SqlitePool, SqliteTx};

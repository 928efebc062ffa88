// SQLite driver - a rusqlite backend for the execution helpers
//
// This module is split into several sub-modules:
// - config: pool options and the bb8 connection manager
// - connection: the pool itself and blocking execution
// - params: parameter conversion from RowValues to SQLite values
// - prepared: statement handles
// - query: value extraction and streamed rows
// - transaction: transaction handles

pub mod config;
mod connection;
pub mod params;
mod prepared;
pub mod query;
mod transaction;

pub use config::{SharedSqliteConnection, SqliteManager, SqliteOptions, SqliteOptionsBuilder};
pub use connection::SqlitePool;
pub use params::Params as SqliteParams;
pub use prepared::SqliteStatement;
pub use query::SqliteRows;
pub use transaction::SqliteTx;

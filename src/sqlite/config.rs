use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bb8::ManageConnection;
use tokio::sync::Mutex;

use crate::error::SqlEssentialsError;

use super::connection::{SqlitePool, run_blocking};

/// A rusqlite connection shared between the pool and the blocking threads
/// that run statements on it.
pub type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

const DEFAULT_POOL_SIZE: u32 = 10;
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Options for configuring a `SQLite` pool.
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    pub db_path: String,
    pub pool_size: u32,
    pub wal: bool,
    pub busy_timeout: Option<Duration>,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            db_path,
            pool_size: DEFAULT_POOL_SIZE,
            wal: true,
            busy_timeout: Some(DEFAULT_BUSY_TIMEOUT),
        }
    }

    #[must_use]
    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }

    #[must_use]
    pub fn with_wal(mut self, wal: bool) -> Self {
        self.wal = wal;
        self
    }

    #[must_use]
    pub fn with_busy_timeout(mut self, busy_timeout: Option<Duration>) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }
}

/// Fluent builder for `SQLite` options.
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            opts: SqliteOptions::new(db_path),
        }
    }

    #[must_use]
    pub fn pool_size(mut self, pool_size: u32) -> Self {
        self.opts.pool_size = pool_size;
        self
    }

    #[must_use]
    pub fn wal(mut self, wal: bool) -> Self {
        self.opts.wal = wal;
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.opts.busy_timeout = Some(busy_timeout);
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }

    /// Build the pool.
    ///
    /// # Errors
    ///
    /// Returns `SqlEssentialsError` if pool creation or the initial smoke test fails.
    pub async fn build(self) -> Result<SqlitePool, SqlEssentialsError> {
        SqlitePool::new(self.finish()).await
    }
}

/// bb8 manager for rusqlite connections.
pub struct SqliteManager {
    opts: Arc<SqliteOptions>,
}

impl SqliteManager {
    #[must_use]
    pub fn new(opts: SqliteOptions) -> Self {
        Self {
            opts: Arc::new(opts),
        }
    }

    #[must_use]
    pub fn options(&self) -> &SqliteOptions {
        &self.opts
    }
}

impl ManageConnection for SqliteManager {
    type Connection = SharedSqliteConnection;
    type Error = SqlEssentialsError;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let opts = Arc::clone(&self.opts);
        async move {
            let conn = tokio::task::spawn_blocking(move || open_connection(&opts))
                .await
                .map_err(|e| {
                    SqlEssentialsError::ConnectionError(format!(
                        "sqlite spawn_blocking join error: {e}"
                    ))
                })??;
            Ok(Arc::new(Mutex::new(conn)))
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let handle = Arc::clone(conn);
        async move {
            run_blocking(handle, |conn| {
                conn.execute_batch("SELECT 1")
                    .map_err(SqlEssentialsError::SqliteError)
            })
            .await
        }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        // A connection still inside a transaction must not be handed out again.
        conn.try_lock().is_ok_and(|guard| !guard.is_autocommit())
    }
}

fn open_connection(opts: &SqliteOptions) -> Result<rusqlite::Connection, SqlEssentialsError> {
    let conn = rusqlite::Connection::open(&opts.db_path)?;
    if let Some(timeout) = opts.busy_timeout {
        conn.busy_timeout(timeout)?;
    }
    if opts.wal {
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    }
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let opts = SqliteOptionsBuilder::new("app.db".into())
            .pool_size(2)
            .wal(false)
            .busy_timeout(Duration::from_millis(250))
            .finish();
        assert_eq!(opts.db_path, "app.db");
        assert_eq!(opts.pool_size, 2);
        assert!(!opts.wal);
        assert_eq!(opts.busy_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn options_default_to_wal_with_busy_timeout() {
        let opts = SqliteOptions::new("app.db".into());
        assert!(opts.wal);
        assert_eq!(opts.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(opts.busy_timeout, Some(DEFAULT_BUSY_TIMEOUT));
    }
}

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use tracing::info;

use crate::context::Context;
use crate::driver::{Driver, Preparer};
use crate::error::SqlEssentialsError;
use crate::types::TxOptions;

use super::config::{SharedSqliteConnection, SqliteManager, SqliteOptions};
use super::prepared::SqliteStatement;
use super::transaction::{SqliteTx, begin_transaction};

pub(crate) type SqlitePooledConnection = PooledConnection<'static, SqliteManager>;

/// bb8 pool of rusqlite connections, usable as a [`Driver`].
///
/// Every statement runs on a blocking thread with the connection locked, so
/// the async runtime is never blocked by `SQLite`.
#[derive(Clone)]
pub struct SqlitePool {
    pool: Pool<SqliteManager>,
}

impl SqlitePool {
    /// Create the pool and run a smoke test on one connection.
    ///
    /// # Errors
    /// Returns `SqlEssentialsError::ConnectionError` if pool creation or connection test fails.
    pub async fn new(opts: SqliteOptions) -> Result<Self, SqlEssentialsError> {
        let db_path = opts.db_path.clone();
        let pool_size = opts.pool_size;
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(SqliteManager::new(opts))
            .await
            .map_err(|e| {
                SqlEssentialsError::ConnectionError(format!("Failed to create SQLite pool: {e}"))
            })?;

        {
            let conn = pool.get().await?;
            run_blocking(Arc::clone(&*conn), |conn| {
                conn.execute_batch("SELECT 1")
                    .map_err(SqlEssentialsError::SqliteError)
            })
            .await?;
        }

        info!(db_path, pool_size, "SQLite pool ready");
        Ok(Self { pool })
    }

    #[must_use]
    pub fn inner(&self) -> &Pool<SqliteManager> {
        &self.pool
    }

    pub(crate) async fn checkout(
        &self,
        ctx: &Context,
    ) -> Result<SqlitePooledConnection, SqlEssentialsError> {
        checkout(ctx, &self.pool).await
    }
}

impl fmt::Debug for SqlitePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlitePool")
            .field("state", &self.pool.state())
            .finish()
    }
}

#[async_trait]
impl Preparer for SqlitePool {
    type Statement = SqliteStatement;

    async fn prepare(
        &self,
        ctx: &Context,
        query: &str,
    ) -> Result<SqliteStatement, SqlEssentialsError> {
        let conn = self.checkout(ctx).await?;
        let sql: Arc<str> = Arc::from(query);
        compile_statement(ctx, Arc::clone(&*conn), Arc::clone(&sql)).await?;
        Ok(SqliteStatement::pooled(self.pool.clone(), sql))
    }
}

#[async_trait]
impl Driver for SqlitePool {
    type Tx = SqliteTx;

    async fn begin(&self, ctx: &Context, opts: &TxOptions) -> Result<SqliteTx, SqlEssentialsError> {
        begin_transaction(self, ctx, opts).await
    }
}

pub(crate) async fn checkout(
    ctx: &Context,
    pool: &Pool<SqliteManager>,
) -> Result<SqlitePooledConnection, SqlEssentialsError> {
    ctx.run(async { pool.get_owned().await.map_err(SqlEssentialsError::from) })
        .await
}

/// Compile `sql` into the connection's statement cache so syntax errors
/// surface at prepare time.
pub(crate) async fn compile_statement(
    ctx: &Context,
    conn: SharedSqliteConnection,
    sql: Arc<str>,
) -> Result<(), SqlEssentialsError> {
    ctx.run(run_blocking(conn, move |conn| {
        conn.prepare_cached(&sql)
            .map(|_| ())
            .map_err(SqlEssentialsError::SqliteError)
    }))
    .await
}

pub(crate) async fn run_blocking<F, R>(
    conn: SharedSqliteConnection,
    func: F,
) -> Result<R, SqlEssentialsError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, SqlEssentialsError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await
    .map_err(|e| SqlEssentialsError::ExecutionError(format!("sqlite spawn_blocking join error: {e}")))?
}

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bb8::Pool;

use crate::context::Context;
use crate::driver::Statement;
use crate::error::SqlEssentialsError;
use crate::types::{ExecResult, RowValues};

use super::config::{SharedSqliteConnection, SqliteManager};
use super::connection::{SqlitePooledConnection, checkout, run_blocking};
use super::params::Params;
use super::query::SqliteRows;
use super::transaction::TxInner;

enum Target {
    /// Runs on whichever pooled connection is free.
    Pool(Pool<SqliteManager>),
    /// Pinned to the transaction's connection.
    Tx(Arc<TxInner>),
}

/// Prepared statement handle for `SQLite`.
///
/// The compiled statement lives in rusqlite's per-connection cache
/// (`prepare_cached`); this handle carries the SQL text and where to run it.
/// Closing marks the handle unusable.
pub struct SqliteStatement {
    sql: Arc<str>,
    target: Target,
    closed: AtomicBool,
}

impl SqliteStatement {
    pub(crate) fn pooled(pool: Pool<SqliteManager>, sql: Arc<str>) -> Self {
        Self {
            sql,
            target: Target::Pool(pool),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn in_tx(tx: Arc<TxInner>, sql: Arc<str>) -> Self {
        Self {
            sql,
            target: Target::Tx(tx),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), SqlEssentialsError> {
        if self.is_closed() {
            Err(SqlEssentialsError::StatementClosed)
        } else {
            Ok(())
        }
    }

    /// The connection to run on, plus the pool checkout keeping it reserved.
    async fn connection(
        &self,
        ctx: &Context,
    ) -> Result<(SharedSqliteConnection, Option<SqlitePooledConnection>), SqlEssentialsError> {
        match &self.target {
            Target::Pool(pool) => {
                let conn = checkout(ctx, pool).await?;
                Ok((Arc::clone(&*conn), Some(conn)))
            }
            Target::Tx(tx) => Ok((tx.handle()?, None)),
        }
    }
}

impl fmt::Debug for SqliteStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match self.target {
            Target::Pool(_) => "pool",
            Target::Tx(_) => "tx",
        };
        f.debug_struct("SqliteStatement")
            .field("sql", &self.sql)
            .field("target", &target)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl Statement for SqliteStatement {
    type Rows = SqliteRows;

    fn sql(&self) -> &str {
        &self.sql
    }

    async fn execute(
        &self,
        ctx: &Context,
        args: &[RowValues],
    ) -> Result<ExecResult, SqlEssentialsError> {
        self.ensure_open()?;
        let params = Params::convert(args);
        let (conn, checkout) = self.connection(ctx).await?;
        let sql = Arc::clone(&self.sql);
        let result = ctx
            .run(run_blocking(conn, move |conn| {
                let mut stmt = conn.prepare_cached(&sql)?;
                let affected = stmt.execute(params.as_params())?;
                drop(stmt);
                Ok(ExecResult::new(conn.last_insert_rowid(), affected as u64))
            }))
            .await;
        drop(checkout);
        result
    }

    async fn query(
        &self,
        ctx: &Context,
        args: &[RowValues],
    ) -> Result<SqliteRows, SqlEssentialsError> {
        self.ensure_open()?;
        let params = Params::convert(args);
        let (conn, checkout) = self.connection(ctx).await?;
        SqliteRows::start(ctx, conn, checkout, Arc::clone(&self.sql), params).await
    }

    async fn close(&self) -> Result<(), SqlEssentialsError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::context::Context;
use crate::driver::{Preparer, Transaction};
use crate::error::{SqlEssentialsError, with_cleanup};
use crate::types::{IsolationLevel, TxOptions};

use super::config::SharedSqliteConnection;
use super::connection::{SqlitePool, SqlitePooledConnection, compile_statement, run_blocking};
use super::prepared::SqliteStatement;

const ROLLBACK_BUSY_RETRIES: &[Duration] = &[
    Duration::from_millis(10),
    Duration::from_millis(25),
    Duration::from_millis(50),
];

/// State shared by every clone of a [`SqliteTx`] and the statements prepared
/// on it. The pooled connection is held until commit or rollback.
pub(crate) struct TxInner {
    conn: Mutex<Option<SqlitePooledConnection>>,
    handle: SharedSqliteConnection,
    read_only: bool,
}

impl TxInner {
    /// The transaction's connection, as long as it is still open.
    pub(crate) fn handle(&self) -> Result<SharedSqliteConnection, SqlEssentialsError> {
        let guard = self.conn.lock().map_err(|_| poisoned())?;
        if guard.is_some() {
            Ok(Arc::clone(&self.handle))
        } else {
            Err(SqlEssentialsError::TransactionDone)
        }
    }

    fn take(&self) -> Result<SqlitePooledConnection, SqlEssentialsError> {
        self.conn
            .lock()
            .map_err(|_| poisoned())?
            .take()
            .ok_or(SqlEssentialsError::TransactionDone)
    }
}

impl Drop for TxInner {
    fn drop(&mut self) {
        let conn = match self.conn.get_mut() {
            Ok(conn) => conn.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(conn) = conn
            && let Ok(runtime) = tokio::runtime::Handle::try_current()
        {
            let handle = Arc::clone(&self.handle);
            let read_only = self.read_only;
            runtime.spawn(async move {
                let result = run_blocking(handle, move |guard| {
                    finish_blocking(guard, Finish::Rollback, read_only)
                })
                .await;
                if let Err(err) = result {
                    warn!(error = %err, "rollback of abandoned SQLite transaction failed");
                }
                drop(conn);
            });
        }
    }
}

fn poisoned() -> SqlEssentialsError {
    SqlEssentialsError::ExecutionError("SQLite transaction state poisoned".into())
}

/// Transaction handle bound to one pooled `SQLite` connection.
///
/// Clones share the transaction. Dropping the last clone without finishing it
/// spawns a best-effort rollback on the current tokio runtime.
#[derive(Clone)]
pub struct SqliteTx {
    inner: Arc<TxInner>,
}

impl fmt::Debug for SqliteTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteTx")
            .field("read_only", &self.inner.read_only)
            .field("open", &self.inner.handle().is_ok())
            .finish()
    }
}

/// Start a transaction on a connection checked out of `pool`.
///
/// `SQLite` transactions are serializable. `Default` opens a deferred
/// transaction and `Serializable` an immediate one that takes the write lock
/// up front; weaker levels are rejected. A read-only transaction sets
/// `PRAGMA query_only` for its lifetime.
///
/// # Errors
/// Returns `Unimplemented` for an unsupported isolation level, otherwise the
/// pool or `SQLite` error.
pub(crate) async fn begin_transaction(
    pool: &SqlitePool,
    ctx: &Context,
    opts: &TxOptions,
) -> Result<SqliteTx, SqlEssentialsError> {
    let begin_sql = match opts.isolation {
        IsolationLevel::Default => "BEGIN DEFERRED",
        IsolationLevel::Serializable => "BEGIN IMMEDIATE",
        other => {
            return Err(SqlEssentialsError::Unimplemented(format!(
                "SQLite does not support isolation level {other:?}"
            )));
        }
    };
    let read_only = opts.read_only;

    let conn = pool.checkout(ctx).await?;
    let handle = Arc::clone(&*conn);
    // BEGIN runs to completion once started so the connection never goes
    // back to the pool half-way into a transaction.
    ctx.check()?;
    run_blocking(Arc::clone(&handle), move |guard| {
        guard.execute_batch(begin_sql)?;
        if read_only && let Err(err) = guard.execute_batch("PRAGMA query_only = ON") {
            let _ = guard.execute_batch("ROLLBACK");
            return Err(err.into());
        }
        Ok(())
    })
    .await?;

    debug!(begin_sql, read_only, "SQLite transaction started");
    Ok(SqliteTx {
        inner: Arc::new(TxInner {
            conn: Mutex::new(Some(conn)),
            handle,
            read_only,
        }),
    })
}

#[derive(Debug, Clone, Copy)]
enum Finish {
    Commit,
    Rollback,
}

impl SqliteTx {
    async fn finish(&self, how: Finish) -> Result<(), SqlEssentialsError> {
        let conn = self.inner.take()?;
        let read_only = self.inner.read_only;
        let result = run_blocking(Arc::clone(&self.inner.handle), move |guard| {
            finish_blocking(guard, how, read_only)
        })
        .await;
        drop(conn);
        debug!(?how, ok = result.is_ok(), "SQLite transaction finished");
        result
    }
}

fn finish_blocking(
    guard: &mut rusqlite::Connection,
    how: Finish,
    read_only: bool,
) -> Result<(), SqlEssentialsError> {
    let outcome = match how {
        Finish::Commit => {
            let committed = guard
                .execute_batch("COMMIT")
                .map_err(SqlEssentialsError::SqliteError);
            // A failed COMMIT can leave the transaction open; it is over either way.
            if committed.is_err() && !guard.is_autocommit() {
                let _ = rollback_with_busy_retries(guard);
            }
            committed
        }
        Finish::Rollback => rollback_with_busy_retries(guard),
    };
    let reset = if read_only {
        guard
            .execute_batch("PRAGMA query_only = OFF")
            .map_err(SqlEssentialsError::SqliteError)
    } else {
        Ok(())
    };
    with_cleanup(outcome, reset)
}

fn rollback_with_busy_retries(guard: &mut rusqlite::Connection) -> Result<(), SqlEssentialsError> {
    for (idx, delay) in ROLLBACK_BUSY_RETRIES.iter().copied().enumerate() {
        match guard.execute_batch("ROLLBACK") {
            Ok(()) => return Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::DatabaseBusy
                    && idx + 1 < ROLLBACK_BUSY_RETRIES.len() =>
            {
                thread::sleep(delay);
            }
            Err(err) => return Err(SqlEssentialsError::SqliteError(err)),
        }
    }

    Err(SqlEssentialsError::ExecutionError(
        "rollback retries exhausted".into(),
    ))
}

#[async_trait]
impl Preparer for SqliteTx {
    type Statement = SqliteStatement;

    async fn prepare(
        &self,
        ctx: &Context,
        query: &str,
    ) -> Result<SqliteStatement, SqlEssentialsError> {
        let handle = self.inner.handle()?;
        let sql: Arc<str> = Arc::from(query);
        compile_statement(ctx, handle, Arc::clone(&sql)).await?;
        Ok(SqliteStatement::in_tx(Arc::clone(&self.inner), sql))
    }
}

#[async_trait]
impl Transaction for SqliteTx {
    async fn commit(&self) -> Result<(), SqlEssentialsError> {
        self.finish(Finish::Commit).await
    }

    async fn rollback(&self) -> Result<(), SqlEssentialsError> {
        self.finish(Finish::Rollback).await
    }
}

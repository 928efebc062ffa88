use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::types::Value;
use tokio::sync::{mpsc, oneshot};

use crate::context::Context;
use crate::driver::Rows;
use crate::error::SqlEssentialsError;
use crate::types::RowValues;

use super::config::SharedSqliteConnection;
use super::connection::SqlitePooledConnection;
use super::params::Params;

const ROW_BUFFER: usize = 64;

type RowResult = Result<Vec<RowValues>, SqlEssentialsError>;

/// Extract a `RowValues` from a `SQLite` row.
///
/// # Errors
///
/// Returns `SqlEssentialsError` if the value cannot be read.
pub fn sqlite_extract_value_sync(
    row: &rusqlite::Row,
    idx: usize,
) -> Result<RowValues, SqlEssentialsError> {
    let value: Value = row.get(idx).map_err(SqlEssentialsError::SqliteError)?;
    match value {
        Value::Null => Ok(RowValues::Null),
        Value::Integer(i) => Ok(RowValues::Int(i)),
        Value::Real(f) => Ok(RowValues::Float(f)),
        Value::Text(s) => Ok(RowValues::Text(s)),
        Value::Blob(b) => Ok(RowValues::Blob(b)),
    }
}

/// Rows streamed from a blocking thread that holds the connection lock
/// until the cursor is exhausted or dropped.
pub struct SqliteRows {
    columns: Vec<String>,
    rx: mpsc::Receiver<RowResult>,
    ctx: Context,
}

impl SqliteRows {
    pub(crate) async fn start(
        ctx: &Context,
        conn: SharedSqliteConnection,
        checkout: Option<SqlitePooledConnection>,
        sql: Arc<str>,
        params: Params,
    ) -> Result<Self, SqlEssentialsError> {
        let (columns_tx, columns_rx) = oneshot::channel();
        let (rows_tx, rows_rx) = mpsc::channel(ROW_BUFFER);
        let producer_ctx = ctx.clone();

        tokio::task::spawn_blocking(move || {
            let guard = conn.blocking_lock();
            produce_rows(&guard, &sql, &params, &producer_ctx, columns_tx, &rows_tx);
            drop(guard);
            // The pooled connection goes back only after the lock is released.
            drop(checkout);
        });

        let columns = ctx
            .run(async {
                match columns_rx.await {
                    Ok(columns) => columns,
                    Err(_) => Err(SqlEssentialsError::ExecutionError(
                        "sqlite row producer stopped before reporting columns".into(),
                    )),
                }
            })
            .await?;

        Ok(Self {
            columns,
            rx: rows_rx,
            ctx: ctx.clone(),
        })
    }
}

#[async_trait]
impl Rows for SqliteRows {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn next(&mut self) -> Result<Option<Vec<RowValues>>, SqlEssentialsError> {
        let rx = &mut self.rx;
        match self.ctx.run(async { Ok(rx.recv().await) }).await? {
            Some(row) => row.map(Some),
            None => Ok(None),
        }
    }
}

fn produce_rows(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &Params,
    ctx: &Context,
    columns_tx: oneshot::Sender<Result<Vec<String>, SqlEssentialsError>>,
    rows_tx: &mpsc::Sender<RowResult>,
) {
    let mut stmt = match conn.prepare_cached(sql) {
        Ok(stmt) => stmt,
        Err(err) => {
            let _ = columns_tx.send(Err(err.into()));
            return;
        }
    };
    let columns: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let width = columns.len();

    let mut rows = match stmt.query(params.as_params()) {
        Ok(rows) => rows,
        Err(err) => {
            let _ = columns_tx.send(Err(err.into()));
            return;
        }
    };
    if columns_tx.send(Ok(columns)).is_err() {
        return;
    }

    loop {
        if let Some(err) = ctx.err() {
            let _ = rows_tx.blocking_send(Err(err));
            return;
        }
        let item = match rows.next() {
            Ok(Some(row)) => (0..width)
                .map(|idx| sqlite_extract_value_sync(row, idx))
                .collect::<Result<Vec<_>, _>>(),
            Ok(None) => return,
            Err(err) => Err(err.into()),
        };
        let failed = item.is_err();
        // A closed channel means the reader dropped the cursor.
        if rows_tx.blocking_send(item).is_err() || failed {
            return;
        }
    }
}

use std::future::Future;

use tracing::warn;

use crate::context::Context;
use crate::driver::{Driver, Transaction};
use crate::error::{MultiError, SqlEssentialsError};
use crate::types::TxOptions;

use super::Essentials;

impl<D: Driver> Essentials<D> {
    /// Run `handler` inside a transaction with default options.
    ///
    /// See [`tx_opts`](Self::tx_opts).
    ///
    /// # Errors
    /// As for [`tx_opts`](Self::tx_opts).
    pub async fn tx<T, F, Fut>(&self, ctx: &Context, handler: F) -> Result<T, SqlEssentialsError>
    where
        F: FnOnce(D::Tx) -> Fut,
        Fut: Future<Output = Result<T, SqlEssentialsError>>,
    {
        self.tx_opts(ctx, &TxOptions::default(), handler).await
    }

    /// Begin a transaction, run `handler` with it once, then commit on success
    /// or roll back on failure.
    ///
    /// ```rust,no_run
    /// # use sql_essentials::prelude::*;
    /// # async fn run<D: Driver>(db: &Essentials<D>, ctx: &Context) -> Result<(), SqlEssentialsError> {
    /// let id = db
    ///     .tx(ctx, |tx| async move {
    ///         db.exec_tx(ctx, &tx, "UPDATE counters SET n = n + 1", &[]).await?;
    ///         db.exec_id_tx(ctx, &tx, "INSERT INTO log (msg) VALUES (?)", &[RowValues::Text("bump".into())])
    ///             .await
    ///     })
    ///     .await?;
    /// # let _ = id;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// - the begin error, if the transaction cannot be started;
    /// - the handler's error after a successful rollback, or a
    ///   [`MultiError`] holding the handler's error followed by the rollback
    ///   error when the rollback fails too;
    /// - the commit error when the handler succeeded but the commit did not.
    pub async fn tx_opts<T, F, Fut>(
        &self,
        ctx: &Context,
        opts: &TxOptions,
        handler: F,
    ) -> Result<T, SqlEssentialsError>
    where
        F: FnOnce(D::Tx) -> Fut,
        Fut: Future<Output = Result<T, SqlEssentialsError>>,
    {
        let tx = self.driver.begin(ctx, opts).await?;

        match handler(tx.clone()).await {
            Ok(value) => {
                if let Err(err) = tx.commit().await {
                    warn!(error = %err, "transaction commit failed");
                    return Err(err);
                }
                Ok(value)
            }
            Err(err) => match tx.rollback().await {
                Ok(()) => Err(err),
                Err(rollback_err) => {
                    warn!(error = %rollback_err, "transaction rollback failed");
                    Err(MultiError::append(err, rollback_err))
                }
            },
        }
    }
}

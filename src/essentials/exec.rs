use crate::context::Context;
use crate::driver::{Driver, Preparer, Statement};
use crate::error::SqlEssentialsError;
use crate::types::{ExecResult, RowValues};

use super::{Essentials, release};

impl<D: Driver> Essentials<D> {
    /// Execute a statement that returns no rows.
    ///
    /// # Errors
    /// Returns the driver's error from preparing or executing `query`.
    pub async fn exec(
        &self,
        ctx: &Context,
        query: &str,
        args: &[RowValues],
    ) -> Result<(), SqlEssentialsError> {
        self.exec_res(ctx, query, args).await.map(|_| ())
    }

    /// Same as [`exec`](Self::exec) inside `tx`.
    ///
    /// # Errors
    /// Returns the driver's error; a failure to release the statement is merged
    /// into it.
    pub async fn exec_tx(
        &self,
        ctx: &Context,
        tx: &D::Tx,
        query: &str,
        args: &[RowValues],
    ) -> Result<(), SqlEssentialsError> {
        self.exec_res_tx(ctx, tx, query, args).await.map(|_| ())
    }

    /// Execute a statement and return the id generated by it.
    ///
    /// # Errors
    /// Returns the driver's error from preparing or executing `query`.
    pub async fn exec_id(
        &self,
        ctx: &Context,
        query: &str,
        args: &[RowValues],
    ) -> Result<i64, SqlEssentialsError> {
        let res = self.exec_res(ctx, query, args).await?;
        Ok(res.last_insert_id())
    }

    /// # Errors
    /// Returns the driver's error; a failure to release the statement is merged
    /// into it.
    pub async fn exec_id_tx(
        &self,
        ctx: &Context,
        tx: &D::Tx,
        query: &str,
        args: &[RowValues],
    ) -> Result<i64, SqlEssentialsError> {
        let res = self.exec_res_tx(ctx, tx, query, args).await?;
        Ok(res.last_insert_id())
    }

    /// Execute a statement and return the number of affected rows.
    ///
    /// # Errors
    /// Returns the driver's error from preparing or executing `query`.
    pub async fn exec_affected(
        &self,
        ctx: &Context,
        query: &str,
        args: &[RowValues],
    ) -> Result<u64, SqlEssentialsError> {
        let res = self.exec_res(ctx, query, args).await?;
        Ok(res.rows_affected())
    }

    /// # Errors
    /// Returns the driver's error; a failure to release the statement is merged
    /// into it.
    pub async fn exec_affected_tx(
        &self,
        ctx: &Context,
        tx: &D::Tx,
        query: &str,
        args: &[RowValues],
    ) -> Result<u64, SqlEssentialsError> {
        let res = self.exec_res_tx(ctx, tx, query, args).await?;
        Ok(res.rows_affected())
    }

    /// Execute a statement with a cached prepared statement and return the
    /// driver's result as is.
    ///
    /// # Errors
    /// Returns the driver's error from preparing or executing `query`.
    pub async fn exec_res(
        &self,
        ctx: &Context,
        query: &str,
        args: &[RowValues],
    ) -> Result<ExecResult, SqlEssentialsError> {
        let stmt = self.cache.get_or_prepare(ctx, query).await?;
        stmt.execute(ctx, args).await
    }

    /// # Errors
    /// Returns the driver's error; a failure to release the statement is merged
    /// into it.
    pub async fn exec_res_tx(
        &self,
        ctx: &Context,
        tx: &D::Tx,
        query: &str,
        args: &[RowValues],
    ) -> Result<ExecResult, SqlEssentialsError> {
        exec_once(ctx, tx, query, args).await
    }

    /// Execute `statements` one after another without arguments, stopping at
    /// the first failure. The statements bypass the cache.
    ///
    /// This is NOT safe against SQL injection. The statements are sent as
    /// written, so never build them from untrusted input.
    ///
    /// # Errors
    /// Returns the first statement's error; later statements are not run.
    pub async fn unsafe_exec_batch<S: AsRef<str> + Sync>(
        &self,
        ctx: &Context,
        statements: &[S],
    ) -> Result<(), SqlEssentialsError> {
        for statement in statements {
            exec_once(ctx, self.driver.as_ref(), statement.as_ref(), &[]).await?;
        }
        Ok(())
    }

    /// Same as [`unsafe_exec_batch`](Self::unsafe_exec_batch) inside `tx`.
    ///
    /// This is NOT safe against SQL injection.
    ///
    /// # Errors
    /// Returns the first statement's error; later statements are not run.
    pub async fn unsafe_exec_batch_tx<S: AsRef<str> + Sync>(
        &self,
        ctx: &Context,
        tx: &D::Tx,
        statements: &[S],
    ) -> Result<(), SqlEssentialsError> {
        for statement in statements {
            exec_once(ctx, tx, statement.as_ref(), &[]).await?;
        }
        Ok(())
    }
}

/// Prepare `query` outside the cache, execute it once and release it.
async fn exec_once<P: Preparer>(
    ctx: &Context,
    prep: &P,
    query: &str,
    args: &[RowValues],
) -> Result<ExecResult, SqlEssentialsError> {
    let stmt = prep.prepare(ctx, query).await?;
    let result = stmt.execute(ctx, args).await;
    release(stmt, result).await
}

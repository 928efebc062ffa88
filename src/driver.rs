//! Capabilities the execution helpers need from a database driver.
//!
//! The helpers never branch on a concrete backend. Anything that can prepare a
//! statement is a [`Preparer`]: the pool ([`Driver`]), a live [`Transaction`] and
//! the [`StmtCache`](crate::StmtCache) all are.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::SqlEssentialsError;
use crate::types::{ExecResult, RowValues, TxOptions};

/// Forward-only cursor over the rows of one query.
#[async_trait]
pub trait Rows: Send {
    /// Column names in result order.
    fn columns(&self) -> &[String];

    /// Fetch the next row. `Ok(None)` ends the iteration; an `Err` is an
    /// iteration failure and no further rows follow.
    async fn next(&mut self) -> Result<Option<Vec<RowValues>>, SqlEssentialsError>;
}

/// A prepared statement handle owned by the driver.
///
/// Handles are released with [`close`](Statement::close). Closing twice is not
/// an error; using a closed handle fails with
/// [`SqlEssentialsError::StatementClosed`].
#[async_trait]
pub trait Statement: Send + Sync + 'static {
    type Rows: Rows;

    /// Query text this handle was prepared from.
    fn sql(&self) -> &str;

    async fn execute(
        &self,
        ctx: &Context,
        args: &[RowValues],
    ) -> Result<ExecResult, SqlEssentialsError>;

    async fn query(&self, ctx: &Context, args: &[RowValues])
    -> Result<Self::Rows, SqlEssentialsError>;

    async fn close(&self) -> Result<(), SqlEssentialsError>;
}

/// Turns query text into a reusable prepared statement.
#[async_trait]
pub trait Preparer: Send + Sync {
    type Statement: Statement;

    async fn prepare(
        &self,
        ctx: &Context,
        query: &str,
    ) -> Result<Self::Statement, SqlEssentialsError>;
}

/// An open transaction. Its statements are bound to the transaction's
/// connection and must never outlive it in a cache.
///
/// Clones share one underlying transaction, the way every holder of a
/// transaction pointer does. Exactly one of [`commit`](Transaction::commit) and
/// [`rollback`](Transaction::rollback) succeeds in finishing it; any later call
/// fails with [`SqlEssentialsError::TransactionDone`].
#[async_trait]
pub trait Transaction: Preparer + Clone + 'static {
    async fn commit(&self) -> Result<(), SqlEssentialsError>;

    async fn rollback(&self) -> Result<(), SqlEssentialsError>;
}

/// The shared connection pool.
#[async_trait]
pub trait Driver: Preparer + 'static {
    type Tx: Transaction;

    async fn begin(&self, ctx: &Context, opts: &TxOptions) -> Result<Self::Tx, SqlEssentialsError>;
}

#[async_trait]
impl<S: Statement> Statement for Arc<S> {
    type Rows = S::Rows;

    fn sql(&self) -> &str {
        S::sql(self)
    }

    async fn execute(
        &self,
        ctx: &Context,
        args: &[RowValues],
    ) -> Result<ExecResult, SqlEssentialsError> {
        S::execute(self, ctx, args).await
    }

    async fn query(
        &self,
        ctx: &Context,
        args: &[RowValues],
    ) -> Result<Self::Rows, SqlEssentialsError> {
        S::query(self, ctx, args).await
    }

    async fn close(&self) -> Result<(), SqlEssentialsError> {
        S::close(self).await
    }
}

#[async_trait]
impl<P: Preparer> Preparer for Arc<P> {
    type Statement = P::Statement;

    async fn prepare(
        &self,
        ctx: &Context,
        query: &str,
    ) -> Result<Self::Statement, SqlEssentialsError> {
        P::prepare(self, ctx, query).await
    }
}

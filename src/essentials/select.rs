use crate::builder::SqlSource;
use crate::context::Context;
use crate::driver::{Driver, Preparer, Rows, Statement};
use crate::error::SqlEssentialsError;
use crate::scan::Destination;
use crate::types::RowValues;

use super::{Essentials, ensure_destination, release};

impl<D: Driver> Essentials<D> {
    /// Select a single row into `dest`.
    ///
    /// `args` are the positional arguments of `query`; `dest` receives the
    /// columns of the first row. A query that returns no rows is not an error
    /// and leaves `dest` untouched. Use [`select_exists`](Self::select_exists)
    /// to tell the two apart.
    ///
    /// # Errors
    /// Returns `NoDestination` for an empty destination (before touching the
    /// database), otherwise the driver or scan error.
    pub async fn select<Dst: Destination + ?Sized>(
        &self,
        ctx: &Context,
        query: &str,
        args: &[RowValues],
        dest: &mut Dst,
    ) -> Result<(), SqlEssentialsError> {
        self.select_exists(ctx, query, args, dest).await.map(|_| ())
    }

    /// Same as [`select`](Self::select) but reports whether a row was found.
    ///
    /// # Errors
    /// Returns `NoDestination` for an empty destination (before touching the
    /// database), otherwise the driver or scan error.
    pub async fn select_exists<Dst: Destination + ?Sized>(
        &self,
        ctx: &Context,
        query: &str,
        args: &[RowValues],
        dest: &mut Dst,
    ) -> Result<bool, SqlEssentialsError> {
        ensure_destination(dest)?;
        let stmt = self.cache.get_or_prepare(ctx, query).await?;
        query_exists(ctx, &stmt, args, dest).await
    }

    /// Select every row of `query`, scanning each into `dest` and then calling
    /// `handle_row` with it.
    ///
    /// `dest` is overwritten by the next row as soon as `handle_row` returns, so
    /// copy out whatever has to be kept. Every call runs the query afresh.
    ///
    /// ```rust,no_run
    /// # use sql_essentials::prelude::*;
    /// # async fn run<D: Driver>(db: &Essentials<D>, ctx: &Context) -> Result<(), SqlEssentialsError> {
    /// let mut total = 0_i64;
    /// let mut row = (0_i64, String::new());
    /// db.select_range(ctx, "SELECT amount, label FROM items", &[], &mut row, |(amount, _label)| {
    ///     total += amount;
    /// })
    /// .await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns `NoDestination` for an empty destination (before touching the
    /// database), otherwise the first driver, iteration or scan error.
    pub async fn select_range<Dst, F>(
        &self,
        ctx: &Context,
        query: &str,
        args: &[RowValues],
        dest: &mut Dst,
        handle_row: F,
    ) -> Result<(), SqlEssentialsError>
    where
        Dst: Destination + ?Sized,
        F: FnMut(&Dst),
    {
        ensure_destination(dest)?;
        let stmt = self.cache.get_or_prepare(ctx, query).await?;
        query_range(ctx, &stmt, args, dest, handle_row).await
    }

    /// Same as [`select`](Self::select) inside `tx`.
    ///
    /// # Errors
    /// As for [`select`](Self::select); a failure to release the statement is
    /// merged into any error in flight.
    pub async fn select_tx<Dst: Destination + ?Sized>(
        &self,
        ctx: &Context,
        tx: &D::Tx,
        query: &str,
        args: &[RowValues],
        dest: &mut Dst,
    ) -> Result<(), SqlEssentialsError> {
        self.select_exists_tx(ctx, tx, query, args, dest)
            .await
            .map(|_| ())
    }

    /// Same as [`select_exists`](Self::select_exists) inside `tx`.
    ///
    /// # Errors
    /// As for [`select_exists`](Self::select_exists); a failure to release the
    /// statement is merged into any error in flight.
    pub async fn select_exists_tx<Dst: Destination + ?Sized>(
        &self,
        ctx: &Context,
        tx: &D::Tx,
        query: &str,
        args: &[RowValues],
        dest: &mut Dst,
    ) -> Result<bool, SqlEssentialsError> {
        ensure_destination(dest)?;
        let stmt = tx.prepare(ctx, query).await?;
        let result = query_exists(ctx, &stmt, args, dest).await;
        release(stmt, result).await
    }

    /// Same as [`select_range`](Self::select_range) inside `tx`.
    ///
    /// # Errors
    /// As for [`select_range`](Self::select_range); a failure to release the
    /// statement is merged into any error in flight.
    pub async fn select_range_tx<Dst, F>(
        &self,
        ctx: &Context,
        tx: &D::Tx,
        query: &str,
        args: &[RowValues],
        dest: &mut Dst,
        handle_row: F,
    ) -> Result<(), SqlEssentialsError>
    where
        Dst: Destination + ?Sized,
        F: FnMut(&Dst),
    {
        ensure_destination(dest)?;
        let stmt = tx.prepare(ctx, query).await?;
        let result = query_range(ctx, &stmt, args, dest, handle_row).await;
        release(stmt, result).await
    }

    /// [`select`](Self::select) with query and arguments taken from `sb`.
    ///
    /// # Errors
    /// Returns the builder's error before touching the database, otherwise as
    /// for [`select`](Self::select).
    pub async fn select_sb<Q, Dst>(
        &self,
        ctx: &Context,
        sb: &Q,
        dest: &mut Dst,
    ) -> Result<(), SqlEssentialsError>
    where
        Q: SqlSource + ?Sized,
        Dst: Destination + ?Sized,
    {
        self.select_exists_sb(ctx, sb, dest).await.map(|_| ())
    }

    /// [`select_exists`](Self::select_exists) with query and arguments taken
    /// from `sb`.
    ///
    /// # Errors
    /// Returns the builder's error before touching the database, otherwise as
    /// for [`select_exists`](Self::select_exists).
    pub async fn select_exists_sb<Q, Dst>(
        &self,
        ctx: &Context,
        sb: &Q,
        dest: &mut Dst,
    ) -> Result<bool, SqlEssentialsError>
    where
        Q: SqlSource + ?Sized,
        Dst: Destination + ?Sized,
    {
        let (query, args) = sb.to_sql()?;
        self.select_exists(ctx, &query, &args, dest).await
    }

    /// [`select_range`](Self::select_range) with query and arguments taken from
    /// `sb`.
    ///
    /// # Errors
    /// Returns the builder's error before touching the database, otherwise as
    /// for [`select_range`](Self::select_range).
    pub async fn select_range_sb<Q, Dst, F>(
        &self,
        ctx: &Context,
        sb: &Q,
        dest: &mut Dst,
        handle_row: F,
    ) -> Result<(), SqlEssentialsError>
    where
        Q: SqlSource + ?Sized,
        Dst: Destination + ?Sized,
        F: FnMut(&Dst),
    {
        let (query, args) = sb.to_sql()?;
        self.select_range(ctx, &query, &args, dest, handle_row).await
    }

    /// # Errors
    /// Returns the builder's error before touching the database, otherwise as
    /// for [`select_tx`](Self::select_tx).
    pub async fn select_sb_tx<Q, Dst>(
        &self,
        ctx: &Context,
        tx: &D::Tx,
        sb: &Q,
        dest: &mut Dst,
    ) -> Result<(), SqlEssentialsError>
    where
        Q: SqlSource + ?Sized,
        Dst: Destination + ?Sized,
    {
        self.select_exists_sb_tx(ctx, tx, sb, dest).await.map(|_| ())
    }

    /// # Errors
    /// Returns the builder's error before touching the database, otherwise as
    /// for [`select_exists_tx`](Self::select_exists_tx).
    pub async fn select_exists_sb_tx<Q, Dst>(
        &self,
        ctx: &Context,
        tx: &D::Tx,
        sb: &Q,
        dest: &mut Dst,
    ) -> Result<bool, SqlEssentialsError>
    where
        Q: SqlSource + ?Sized,
        Dst: Destination + ?Sized,
    {
        let (query, args) = sb.to_sql()?;
        self.select_exists_tx(ctx, tx, &query, &args, dest).await
    }

    /// # Errors
    /// Returns the builder's error before touching the database, otherwise as
    /// for [`select_range_tx`](Self::select_range_tx).
    pub async fn select_range_sb_tx<Q, Dst, F>(
        &self,
        ctx: &Context,
        tx: &D::Tx,
        sb: &Q,
        dest: &mut Dst,
        handle_row: F,
    ) -> Result<(), SqlEssentialsError>
    where
        Q: SqlSource + ?Sized,
        Dst: Destination + ?Sized,
        F: FnMut(&Dst),
    {
        let (query, args) = sb.to_sql()?;
        self.select_range_tx(ctx, tx, &query, &args, dest, handle_row)
            .await
    }
}

/// Run `stmt` and scan the first row, if any, into `dest`.
async fn query_exists<S, Dst>(
    ctx: &Context,
    stmt: &S,
    args: &[RowValues],
    dest: &mut Dst,
) -> Result<bool, SqlEssentialsError>
where
    S: Statement,
    Dst: Destination + ?Sized,
{
    let mut rows = match stmt.query(ctx, args).await {
        Ok(rows) => rows,
        Err(err) if err.is_no_rows() => return Ok(false),
        Err(err) => return Err(err),
    };
    match rows.next().await {
        Ok(Some(row)) => {
            dest.scan_row(&row)?;
            Ok(true)
        }
        Ok(None) => Ok(false),
        Err(err) if err.is_no_rows() => Ok(false),
        Err(err) => Err(err),
    }
}

/// Run `stmt` and feed every row through `dest` to `handle_row`.
async fn query_range<S, Dst, F>(
    ctx: &Context,
    stmt: &S,
    args: &[RowValues],
    dest: &mut Dst,
    mut handle_row: F,
) -> Result<(), SqlEssentialsError>
where
    S: Statement,
    Dst: Destination + ?Sized,
    F: FnMut(&Dst),
{
    let mut rows = stmt.query(ctx, args).await?;
    while let Some(row) = rows.next().await? {
        dest.scan_row(&row)?;
        handle_row(&*dest);
    }
    Ok(())
}

use serde::de::DeserializeOwned;

use crate::builder::SqlSource;
use crate::context::Context;
use crate::driver::{Driver, Preparer, Rows, Statement};
use crate::error::SqlEssentialsError;
use crate::mapping::map_row;
use crate::types::RowValues;

use super::{Essentials, release};

// Struct-scanning flavour of the select helpers: columns are matched to the
// fields of `T` by name instead of by position.
impl<D: Driver> Essentials<D> {
    /// Select a single row into the struct `dest`, matching columns to fields
    /// by name. No row leaves `dest` untouched and is not an error.
    ///
    /// # Errors
    /// Returns the driver error or a `MappingError`.
    pub async fn select_scan<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        query: &str,
        args: &[RowValues],
        dest: &mut T,
    ) -> Result<(), SqlEssentialsError> {
        self.select_scan_exists(ctx, query, args, dest)
            .await
            .map(|_| ())
    }

    /// # Errors
    /// Returns the driver error or a `MappingError`.
    pub async fn select_scan_exists<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        query: &str,
        args: &[RowValues],
        dest: &mut T,
    ) -> Result<bool, SqlEssentialsError> {
        let stmt = self.cache.get_or_prepare(ctx, query).await?;
        scan_exists(ctx, &stmt, args, dest).await
    }

    /// Struct-scanning [`select_range`](Self::select_range). `dest` is
    /// overwritten by every row.
    ///
    /// # Errors
    /// Returns the first driver, iteration or mapping error.
    pub async fn select_range_scan<T, F>(
        &self,
        ctx: &Context,
        query: &str,
        args: &[RowValues],
        dest: &mut T,
        handle_row: F,
    ) -> Result<(), SqlEssentialsError>
    where
        T: DeserializeOwned,
        F: FnMut(&T),
    {
        let stmt = self.cache.get_or_prepare(ctx, query).await?;
        scan_range(ctx, &stmt, args, dest, handle_row).await
    }

    /// # Errors
    /// As for [`select_scan`](Self::select_scan); a failure to release the
    /// statement is merged into any error in flight.
    pub async fn select_scan_tx<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        tx: &D::Tx,
        query: &str,
        args: &[RowValues],
        dest: &mut T,
    ) -> Result<(), SqlEssentialsError> {
        self.select_scan_exists_tx(ctx, tx, query, args, dest)
            .await
            .map(|_| ())
    }

    /// # Errors
    /// As for [`select_scan_exists`](Self::select_scan_exists); a failure to
    /// release the statement is merged into any error in flight.
    pub async fn select_scan_exists_tx<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        tx: &D::Tx,
        query: &str,
        args: &[RowValues],
        dest: &mut T,
    ) -> Result<bool, SqlEssentialsError> {
        let stmt = tx.prepare(ctx, query).await?;
        let result = scan_exists(ctx, &stmt, args, dest).await;
        release(stmt, result).await
    }

    /// # Errors
    /// As for [`select_range_scan`](Self::select_range_scan); a failure to
    /// release the statement is merged into any error in flight.
    pub async fn select_range_scan_tx<T, F>(
        &self,
        ctx: &Context,
        tx: &D::Tx,
        query: &str,
        args: &[RowValues],
        dest: &mut T,
        handle_row: F,
    ) -> Result<(), SqlEssentialsError>
    where
        T: DeserializeOwned,
        F: FnMut(&T),
    {
        let stmt = tx.prepare(ctx, query).await?;
        let result = scan_range(ctx, &stmt, args, dest, handle_row).await;
        release(stmt, result).await
    }

    /// # Errors
    /// Returns the builder's error before touching the database.
    pub async fn select_scan_sb<Q, T>(
        &self,
        ctx: &Context,
        sb: &Q,
        dest: &mut T,
    ) -> Result<(), SqlEssentialsError>
    where
        Q: SqlSource + ?Sized,
        T: DeserializeOwned,
    {
        self.select_scan_exists_sb(ctx, sb, dest).await.map(|_| ())
    }

    /// # Errors
    /// Returns the builder's error before touching the database.
    pub async fn select_scan_exists_sb<Q, T>(
        &self,
        ctx: &Context,
        sb: &Q,
        dest: &mut T,
    ) -> Result<bool, SqlEssentialsError>
    where
        Q: SqlSource + ?Sized,
        T: DeserializeOwned,
    {
        let (query, args) = sb.to_sql()?;
        self.select_scan_exists(ctx, &query, &args, dest).await
    }

    /// # Errors
    /// Returns the builder's error before touching the database.
    pub async fn select_range_scan_sb<Q, T, F>(
        &self,
        ctx: &Context,
        sb: &Q,
        dest: &mut T,
        handle_row: F,
    ) -> Result<(), SqlEssentialsError>
    where
        Q: SqlSource + ?Sized,
        T: DeserializeOwned,
        F: FnMut(&T),
    {
        let (query, args) = sb.to_sql()?;
        self.select_range_scan(ctx, &query, &args, dest, handle_row)
            .await
    }

    /// # Errors
    /// Returns the builder's error before touching the database.
    pub async fn select_scan_sb_tx<Q, T>(
        &self,
        ctx: &Context,
        tx: &D::Tx,
        sb: &Q,
        dest: &mut T,
    ) -> Result<(), SqlEssentialsError>
    where
        Q: SqlSource + ?Sized,
        T: DeserializeOwned,
    {
        self.select_scan_exists_sb_tx(ctx, tx, sb, dest)
            .await
            .map(|_| ())
    }

    /// # Errors
    /// Returns the builder's error before touching the database.
    pub async fn select_scan_exists_sb_tx<Q, T>(
        &self,
        ctx: &Context,
        tx: &D::Tx,
        sb: &Q,
        dest: &mut T,
    ) -> Result<bool, SqlEssentialsError>
    where
        Q: SqlSource + ?Sized,
        T: DeserializeOwned,
    {
        let (query, args) = sb.to_sql()?;
        self.select_scan_exists_tx(ctx, tx, &query, &args, dest)
            .await
    }

    /// # Errors
    /// Returns the builder's error before touching the database.
    pub async fn select_range_scan_sb_tx<Q, T, F>(
        &self,
        ctx: &Context,
        tx: &D::Tx,
        sb: &Q,
        dest: &mut T,
        handle_row: F,
    ) -> Result<(), SqlEssentialsError>
    where
        Q: SqlSource + ?Sized,
        T: DeserializeOwned,
        F: FnMut(&T),
    {
        let (query, args) = sb.to_sql()?;
        self.select_range_scan_tx(ctx, tx, &query, &args, dest, handle_row)
            .await
    }
}

async fn scan_exists<S, T>(
    ctx: &Context,
    stmt: &S,
    args: &[RowValues],
    dest: &mut T,
) -> Result<bool, SqlEssentialsError>
where
    S: Statement,
    T: DeserializeOwned,
{
    let mut rows = match stmt.query(ctx, args).await {
        Ok(rows) => rows,
        Err(err) if err.is_no_rows() => return Ok(false),
        Err(err) => return Err(err),
    };
    match rows.next().await {
        Ok(Some(row)) => {
            *dest = map_row(rows.columns(), &row)?;
            Ok(true)
        }
        Ok(None) => Ok(false),
        Err(err) if err.is_no_rows() => Ok(false),
        Err(err) => Err(err),
    }
}

async fn scan_range<S, T, F>(
    ctx: &Context,
    stmt: &S,
    args: &[RowValues],
    dest: &mut T,
    mut handle_row: F,
) -> Result<(), SqlEssentialsError>
where
    S: Statement,
    T: DeserializeOwned,
    F: FnMut(&T),
{
    let mut rows = stmt.query(ctx, args).await?;
    while let Some(row) = rows.next().await? {
        *dest = map_row(rows.columns(), &row)?;
        handle_row(&*dest);
    }
    Ok(())
}

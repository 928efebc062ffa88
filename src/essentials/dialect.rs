use crate::context::Context;
use crate::driver::Driver;
use crate::error::SqlEssentialsError;
use crate::types::RowValues;

use super::Essentials;

// Helpers that build SQL text by string formatting. They work on any backend
// that understands `SELECT EXISTS (...)` and `COUNT(col)`, which covers
// SQLite, MySQL and PostgreSQL.
impl<D: Driver> Essentials<D> {
    /// Check whether `query` would return at least one row.
    ///
    /// This is NOT safe against SQL injection: `query` is pasted into the
    /// statement text. Use it only with trusted input.
    ///
    /// # Errors
    /// Returns the driver or scan error.
    pub async fn unsafe_exists(
        &self,
        ctx: &Context,
        query: &str,
        args: &[RowValues],
    ) -> Result<bool, SqlEssentialsError> {
        let wrapped = format!("SELECT EXISTS ({query})");
        let mut dest = (false,);
        self.select(ctx, &wrapped, args, &mut dest).await?;
        Ok(dest.0)
    }

    /// Count the non-NULL values of `column` in `table`.
    ///
    /// This is NOT safe against SQL injection: `table` and `column` are pasted
    /// into the statement text. Use it only with trusted input.
    ///
    /// # Errors
    /// Returns the driver or scan error.
    pub async fn unsafe_count(
        &self,
        ctx: &Context,
        table: &str,
        column: &str,
    ) -> Result<i64, SqlEssentialsError> {
        let query = format!("SELECT COUNT({column}) FROM {table}");
        let mut dest = (0_i64,);
        self.select(ctx, &query, &[], &mut dest).await?;
        Ok(dest.0)
    }
}

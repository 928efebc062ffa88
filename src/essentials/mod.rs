//! The execution helpers.
//!
//! Every operation comes in two scopes. The plain form runs on the pool and
//! goes through the [`StmtCache`]. The `*_tx` form prepares the statement on the
//! given transaction, uses it once and closes it on every exit path; a close
//! failure is merged into any error already in flight.

mod dialect;
mod exec;
mod select;
mod struct_scan;
mod tx;

use std::fmt;
use std::sync::Arc;

use crate::driver::{Driver, Statement};
use crate::error::{SqlEssentialsError, with_cleanup};
use crate::scan::Destination;
use crate::stmt_cache::StmtCache;

/// Convenience layer over a [`Driver`].
///
/// The helpers forward query text and arguments unchanged; they only take care
/// of statement reuse, releasing what they prepare, and scanning results into
/// caller-owned destinations.
pub struct Essentials<D: Driver> {
    driver: Arc<D>,
    cache: StmtCache<D>,
}

impl<D: Driver> Essentials<D> {
    pub fn new(driver: D) -> Self {
        Self::from_shared(Arc::new(driver))
    }

    pub fn from_shared(driver: Arc<D>) -> Self {
        Self {
            cache: StmtCache::new(Arc::clone(&driver)),
            driver,
        }
    }

    #[must_use]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    #[must_use]
    pub fn cache(&self) -> &StmtCache<D> {
        &self.cache
    }
}

impl<D: Driver> fmt::Debug for Essentials<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Essentials")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

fn ensure_destination<Dst: Destination + ?Sized>(dest: &Dst) -> Result<(), SqlEssentialsError> {
    if dest.width() == 0 {
        Err(SqlEssentialsError::NoDestination)
    } else {
        Ok(())
    }
}

/// Close a transaction-scoped statement and fold the outcome into `result`.
async fn release<S: Statement, T>(
    stmt: S,
    result: Result<T, SqlEssentialsError>,
) -> Result<T, SqlEssentialsError> {
    with_cleanup(result, stmt.close().await)
}

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use async_trait::async_trait;
use futures_util::Stream;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

use crate::context::Context;
use crate::driver::{Preparer, Statement};
use crate::error::SqlEssentialsError;

type StatementMap<S> = HashMap<String, Arc<S>>;

/// Prepared statements shared across the pool, keyed by exact query text.
///
/// Lookups take the read lock only. A miss prepares the statement with the
/// lock released and then inserts it under the write lock. When two callers
/// race on the same new query text, the first insert wins: the loser closes its
/// own handle and returns the cached one, so at most one handle per query text
/// is ever kept alive.
///
/// Handles handed out by the cache stay owned by the cache. Do not `close`
/// them; use [`evict_all`](Self::evict_all) instead.
///
/// Only statements prepared against the pool belong here. Statements prepared
/// on a transaction die with it.
pub struct StmtCache<P: Preparer> {
    prep: Arc<P>,
    cache: Arc<RwLock<StatementMap<P::Statement>>>,
}

impl<P: Preparer> StmtCache<P> {
    pub fn new(prep: Arc<P>) -> Self {
        Self {
            prep,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The preparer that misses are forwarded to.
    #[must_use]
    pub fn preparer(&self) -> &Arc<P> {
        &self.prep
    }

    /// Return the cached statement for `query`, preparing it on first use.
    ///
    /// # Errors
    /// Returns the preparer's error; nothing is cached in that case.
    pub async fn get_or_prepare(
        &self,
        ctx: &Context,
        query: &str,
    ) -> Result<Arc<P::Statement>, SqlEssentialsError> {
        if let Some(stmt) = self.cache.read().await.get(query) {
            return Ok(Arc::clone(stmt));
        }

        debug!(query, "statement cache miss");
        let stmt = Arc::new(self.prep.prepare(ctx, query).await?);

        let cached = match self.cache.write().await.entry(query.to_owned()) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&stmt));
                return Ok(stmt);
            }
        };

        debug!(query, "lost preparation race, closing duplicate statement");
        if let Err(err) = stmt.close().await {
            warn!(query, error = %err, "failed to close duplicate prepared statement");
        }
        Ok(cached)
    }

    /// Remove every cached statement and close it.
    ///
    /// The write lock is held until every handle is closed, so concurrent
    /// lookups wait for the eviction to finish. Closing runs on a spawned task;
    /// the returned [`EvictErrors`] yields each close failure once. Dropping it
    /// early stops the reporting, not the closing.
    pub async fn evict_all(&self) -> EvictErrors {
        let mut guard = Arc::clone(&self.cache).write_owned().await;
        let stmts: Vec<_> = guard.drain().collect();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let total = stmts.len();
            let mut failed = 0_usize;
            for (query, stmt) in stmts {
                if let Err(err) = stmt.close().await {
                    failed += 1;
                    debug!(query, error = %err, "failed to close evicted statement");
                    // The receiver may be gone; the remaining handles still get closed.
                    let _ = tx.send(err);
                }
            }
            debug!(total, failed, "statement cache evicted");
            drop(guard);
        });

        EvictErrors { rx }
    }

    /// Same as [`evict_all`](Self::evict_all) but waits for every close and
    /// discards the errors.
    pub async fn evict_all_discard(&self) {
        let mut guard = self.cache.write().await;
        let mut failed = 0_usize;
        for (query, stmt) in guard.drain() {
            if let Err(err) = stmt.close().await {
                failed += 1;
                debug!(query, error = %err, "discarding close error for evicted statement");
            }
        }
        debug!(failed, "statement cache evicted, errors discarded");
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    pub async fn contains(&self, query: &str) -> bool {
        self.cache.read().await.contains_key(query)
    }
}

impl<P: Preparer> fmt::Debug for StmtCache<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StmtCache").finish_non_exhaustive()
    }
}

#[async_trait]
impl<P: Preparer> Preparer for StmtCache<P> {
    type Statement = Arc<P::Statement>;

    async fn prepare(
        &self,
        ctx: &Context,
        query: &str,
    ) -> Result<Self::Statement, SqlEssentialsError> {
        self.get_or_prepare(ctx, query).await
    }
}

/// Close failures produced by [`StmtCache::evict_all`].
///
/// Errors arrive while eviction is still running. The stream ends once every
/// evicted statement has been closed.
#[derive(Debug)]
pub struct EvictErrors {
    rx: mpsc::UnboundedReceiver<SqlEssentialsError>,
}

impl EvictErrors {
    /// Wait for the next close failure; `None` once eviction has finished.
    pub async fn recv(&mut self) -> Option<SqlEssentialsError> {
        self.rx.recv().await
    }

    /// Drain every close failure, waiting for eviction to finish.
    pub async fn collect(mut self) -> Vec<SqlEssentialsError> {
        let mut errors = Vec::new();
        while let Some(err) = self.rx.recv().await {
            errors.push(err);
        }
        errors
    }
}

impl Stream for EvictErrors {
    type Item = SqlEssentialsError;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

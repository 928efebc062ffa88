use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::context::Context;
use crate::driver::{Driver, Preparer, Rows, Statement, Transaction};
use crate::error::SqlEssentialsError;
use crate::types::{ExecResult, RowValues, TxOptions};

#[derive(Default)]
struct Script {
    results: HashMap<String, (Vec<String>, Vec<Vec<RowValues>>)>,
    exec: HashMap<String, ExecResult>,
    fail_prepare: HashSet<String>,
    fail_execute: HashSet<String>,
    fail_query: HashSet<String>,
    fail_rows_after: HashMap<String, usize>,
    fail_close: HashSet<String>,
    fail_begin: bool,
    fail_commit: bool,
    fail_rollback: bool,
    prepare_delay: Option<Duration>,
}

#[derive(Default)]
struct Counters {
    prepares: AtomicUsize,
    tx_prepares: AtomicUsize,
    executes: AtomicUsize,
    queries: AtomicUsize,
    closes: AtomicUsize,
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

#[derive(Default)]
struct MockState {
    script: Mutex<Script>,
    counters: Counters,
    executed: Mutex<Vec<String>>,
}

impl MockState {
    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn injected(what: &str, query: &str) -> SqlEssentialsError {
    SqlEssentialsError::ExecutionError(format!("injected {what} failure: {query}"))
}

/// Snapshot of the calls a [`MockDriver`] has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockStats {
    /// Statements prepared against the pool.
    pub prepares: usize,
    /// Statements prepared inside a transaction.
    pub tx_prepares: usize,
    pub executes: usize,
    pub queries: usize,
    pub closes: usize,
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
}

impl MockStats {
    /// Every driver call of any kind.
    #[must_use]
    pub fn total(&self) -> usize {
        self.prepares
            + self.tx_prepares
            + self.executes
            + self.queries
            + self.closes
            + self.begins
            + self.commits
            + self.rollbacks
    }
}

/// In-memory [`Driver`] with canned results and injectable failures.
///
/// Queries without canned rows return an empty result set; statements
/// without a canned exec result report `ExecResult::new(0, 1)`.
#[derive(Clone, Default)]
pub struct MockDriver {
    state: Arc<MockState>,
}

impl MockDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_rows(self, query: &str, columns: &[&str], rows: Vec<Vec<RowValues>>) -> Self {
        let columns = columns.iter().map(|c| (*c).to_owned()).collect();
        self.state
            .script()
            .results
            .insert(query.to_owned(), (columns, rows));
        self
    }

    #[must_use]
    pub fn with_exec(self, query: &str, result: ExecResult) -> Self {
        self.state.script().exec.insert(query.to_owned(), result);
        self
    }

    #[must_use]
    pub fn fail_prepare(self, query: &str) -> Self {
        self.state.script().fail_prepare.insert(query.to_owned());
        self
    }

    #[must_use]
    pub fn fail_execute(self, query: &str) -> Self {
        self.state.script().fail_execute.insert(query.to_owned());
        self
    }

    #[must_use]
    pub fn fail_query(self, query: &str) -> Self {
        self.state.script().fail_query.insert(query.to_owned());
        self
    }

    /// Iteration of `query` fails after `rows` rows were delivered.
    #[must_use]
    pub fn fail_rows_after(self, query: &str, rows: usize) -> Self {
        self.state
            .script()
            .fail_rows_after
            .insert(query.to_owned(), rows);
        self
    }

    #[must_use]
    pub fn fail_close(self, query: &str) -> Self {
        self.state.script().fail_close.insert(query.to_owned());
        self
    }

    #[must_use]
    pub fn fail_begin(self) -> Self {
        self.state.script().fail_begin = true;
        self
    }

    #[must_use]
    pub fn fail_commit(self) -> Self {
        self.state.script().fail_commit = true;
        self
    }

    #[must_use]
    pub fn fail_rollback(self) -> Self {
        self.state.script().fail_rollback = true;
        self
    }

    /// Every prepare sleeps for `delay` first, widening race windows.
    #[must_use]
    pub fn prepare_delay(self, delay: Duration) -> Self {
        self.state.script().prepare_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn stats(&self) -> MockStats {
        let c = &self.state.counters;
        MockStats {
            prepares: c.prepares.load(Ordering::SeqCst),
            tx_prepares: c.tx_prepares.load(Ordering::SeqCst),
            executes: c.executes.load(Ordering::SeqCst),
            queries: c.queries.load(Ordering::SeqCst),
            closes: c.closes.load(Ordering::SeqCst),
            begins: c.begins.load(Ordering::SeqCst),
            commits: c.commits.load(Ordering::SeqCst),
            rollbacks: c.rollbacks.load(Ordering::SeqCst),
        }
    }

    /// Query texts that were executed successfully, in order.
    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        self.state
            .executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn prepare_on(
        &self,
        ctx: &Context,
        query: &str,
        tx: Option<MockTx>,
    ) -> Result<MockStatement, SqlEssentialsError> {
        ctx.check()?;
        let counter = if tx.is_some() {
            &self.state.counters.tx_prepares
        } else {
            &self.state.counters.prepares
        };
        counter.fetch_add(1, Ordering::SeqCst);

        let (delay, fail) = {
            let script = self.state.script();
            (script.prepare_delay, script.fail_prepare.contains(query))
        };
        if let Some(delay) = delay {
            ctx.run(async {
                tokio::time::sleep(delay).await;
                Ok(())
            })
            .await?;
        }
        if fail {
            return Err(injected("prepare", query));
        }
        Ok(MockStatement {
            sql: query.to_owned(),
            state: Arc::clone(&self.state),
            tx,
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Preparer for MockDriver {
    type Statement = MockStatement;

    async fn prepare(&self, ctx: &Context, query: &str) -> Result<MockStatement, SqlEssentialsError> {
        self.prepare_on(ctx, query, None).await
    }
}

#[async_trait]
impl Driver for MockDriver {
    type Tx = MockTx;

    async fn begin(&self, ctx: &Context, _opts: &TxOptions) -> Result<MockTx, SqlEssentialsError> {
        ctx.check()?;
        self.state.counters.begins.fetch_add(1, Ordering::SeqCst);
        if self.state.script().fail_begin {
            return Err(injected("begin", "BEGIN"));
        }
        Ok(MockTx {
            driver: self.clone(),
            done: Arc::new(AtomicBool::new(false)),
        })
    }
}

/// Transaction of a [`MockDriver`]. Clones share the finished flag.
#[derive(Clone)]
pub struct MockTx {
    driver: MockDriver,
    done: Arc<AtomicBool>,
}

impl MockTx {
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), SqlEssentialsError> {
        if self.is_done() {
            Err(SqlEssentialsError::TransactionDone)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Preparer for MockTx {
    type Statement = MockStatement;

    async fn prepare(&self, ctx: &Context, query: &str) -> Result<MockStatement, SqlEssentialsError> {
        self.ensure_open()?;
        self.driver.prepare_on(ctx, query, Some(self.clone())).await
    }
}

#[async_trait]
impl Transaction for MockTx {
    async fn commit(&self) -> Result<(), SqlEssentialsError> {
        if self.done.swap(true, Ordering::SeqCst) {
            return Err(SqlEssentialsError::TransactionDone);
        }
        self.driver
            .state
            .counters
            .commits
            .fetch_add(1, Ordering::SeqCst);
        if self.driver.state.script().fail_commit {
            return Err(injected("commit", "COMMIT"));
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<(), SqlEssentialsError> {
        if self.done.swap(true, Ordering::SeqCst) {
            return Err(SqlEssentialsError::TransactionDone);
        }
        self.driver
            .state
            .counters
            .rollbacks
            .fetch_add(1, Ordering::SeqCst);
        if self.driver.state.script().fail_rollback {
            return Err(injected("rollback", "ROLLBACK"));
        }
        Ok(())
    }
}

pub struct MockStatement {
    sql: String,
    state: Arc<MockState>,
    tx: Option<MockTx>,
    closed: AtomicBool,
}

impl std::fmt::Debug for MockStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStatement")
            .field("sql", &self.sql)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl MockStatement {
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_usable(&self) -> Result<(), SqlEssentialsError> {
        if self.is_closed() {
            return Err(SqlEssentialsError::StatementClosed);
        }
        match &self.tx {
            Some(tx) => tx.ensure_open(),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Statement for MockStatement {
    type Rows = MockRows;

    fn sql(&self) -> &str {
        &self.sql
    }

    async fn execute(
        &self,
        ctx: &Context,
        _args: &[RowValues],
    ) -> Result<ExecResult, SqlEssentialsError> {
        ctx.check()?;
        self.ensure_usable()?;
        self.state.counters.executes.fetch_add(1, Ordering::SeqCst);
        let (fail, result) = {
            let script = self.state.script();
            (
                script.fail_execute.contains(&self.sql),
                script.exec.get(&self.sql).copied(),
            )
        };
        if fail {
            return Err(injected("execute", &self.sql));
        }
        self.state
            .executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(self.sql.clone());
        Ok(result.unwrap_or_else(|| ExecResult::new(0, 1)))
    }

    async fn query(&self, ctx: &Context, _args: &[RowValues]) -> Result<MockRows, SqlEssentialsError> {
        ctx.check()?;
        self.ensure_usable()?;
        self.state.counters.queries.fetch_add(1, Ordering::SeqCst);
        let script = self.state.script();
        if script.fail_query.contains(&self.sql) {
            return Err(injected("query", &self.sql));
        }
        let (columns, rows) = script.results.get(&self.sql).cloned().unwrap_or_default();
        Ok(MockRows {
            columns,
            rows: rows.into(),
            fail_after: script.fail_rows_after.get(&self.sql).copied(),
            delivered: 0,
            ctx: ctx.clone(),
        })
    }

    async fn close(&self) -> Result<(), SqlEssentialsError> {
        self.state.counters.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        if self.state.script().fail_close.contains(&self.sql) {
            return Err(injected("close", &self.sql));
        }
        Ok(())
    }
}

pub struct MockRows {
    columns: Vec<String>,
    rows: VecDeque<Vec<RowValues>>,
    fail_after: Option<usize>,
    delivered: usize,
    ctx: Context,
}

#[async_trait]
impl Rows for MockRows {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn next(&mut self) -> Result<Option<Vec<RowValues>>, SqlEssentialsError> {
        self.ctx.check()?;
        if self.fail_after == Some(self.delivered) {
            self.rows.clear();
            self.fail_after = None;
            return Err(SqlEssentialsError::ExecutionError(
                "injected row iteration failure".into(),
            ));
        }
        let row = self.rows.pop_front();
        if row.is_some() {
            self.delivered += 1;
        }
        Ok(row)
    }
}

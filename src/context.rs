use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::SqlEssentialsError;

/// Cancellation and deadline carried into every driver call.
///
/// The execution helpers never look at the context themselves; they hand it to
/// the driver, which reports [`SqlEssentialsError::Cancelled`] or
/// [`SqlEssentialsError::DeadlineExceeded`] when it fires. Clones share the same
/// cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a context that expires `timeout` from now. An earlier deadline
    /// inherited from `self` is kept.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Derive a context that is cancelled with its parent or when the returned
    /// token is cancelled, whichever comes first.
    #[must_use]
    pub fn with_cancel(&self) -> (Self, CancellationToken) {
        let token = self.token.child_token();
        let ctx = Self {
            token: token.clone(),
            deadline: self.deadline,
        };
        (ctx, token)
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The reason this context is done, if it is.
    #[must_use]
    pub fn err(&self) -> Option<SqlEssentialsError> {
        if self.token.is_cancelled() {
            return Some(SqlEssentialsError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Some(SqlEssentialsError::DeadlineExceeded)
            }
            _ => None,
        }
    }

    /// Fail fast when the context is already done.
    ///
    /// # Errors
    /// Returns `Cancelled` or `DeadlineExceeded`.
    pub fn check(&self) -> Result<(), SqlEssentialsError> {
        self.err().map_or(Ok(()), Err)
    }

    /// Drive `fut` to completion unless the context fires first. The future is
    /// dropped when it loses the race.
    ///
    /// # Errors
    /// Returns the future's error, or `Cancelled` / `DeadlineExceeded`.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, SqlEssentialsError>
    where
        F: Future<Output = Result<T, SqlEssentialsError>>,
    {
        self.check()?;
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            res = fut => res,
            () = self.token.cancelled() => Err(SqlEssentialsError::Cancelled),
            () = deadline => Err(SqlEssentialsError::DeadlineExceeded),
        }
    }
}

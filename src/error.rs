use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlEssentialsError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("no destination given to scan into")]
    NoDestination,

    #[error("no rows in result set")]
    NoRows,

    #[error("expected {expected} destination values, row has {actual} columns")]
    ColumnMismatch { expected: usize, actual: usize },

    #[error("Value conversion error: {0}")]
    ConversionError(String),

    #[error("Row mapping error: {0}")]
    MappingError(String),

    #[error("context cancelled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("statement is closed")]
    StatementClosed,

    #[error("transaction has already been committed or rolled back")]
    TransactionDone,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),

    #[error("Other database error: {0}")]
    Other(String),

    #[error(transparent)]
    Multiple(#[from] MultiError),
}

impl SqlEssentialsError {
    /// True when the driver signalled an empty result for a single-row read.
    #[must_use]
    pub fn is_no_rows(&self) -> bool {
        match self {
            Self::NoRows => true,
            #[cfg(feature = "sqlite")]
            Self::SqliteError(rusqlite::Error::QueryReturnedNoRows) => true,
            _ => false,
        }
    }

    /// Borrow the aggregate when this error bundles several causes.
    #[must_use]
    pub fn as_multiple(&self) -> Option<&MultiError> {
        if let Self::Multiple(multi) = self {
            Some(multi)
        } else {
            None
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<bb8::RunError<SqlEssentialsError>> for SqlEssentialsError {
    fn from(err: bb8::RunError<SqlEssentialsError>) -> Self {
        match err {
            bb8::RunError::User(inner) => inner,
            other => SqlEssentialsError::ConnectionError(format!("SQLite pool error: {other}")),
        }
    }
}

/// A primary failure together with the failures hit while cleaning up after it.
///
/// The first error is always the cause that started the failure path (a handler
/// error, a scan error, ...). Every following error was produced by cleanup work
/// such as a rollback or a statement release. Appending to an aggregate flattens
/// it, so the list never nests.
#[derive(Debug)]
pub struct MultiError {
    errors: Vec<SqlEssentialsError>,
}

impl MultiError {
    /// Combine `primary` with a `cleanup` failure into a single error value.
    #[must_use]
    pub fn append(primary: SqlEssentialsError, cleanup: SqlEssentialsError) -> SqlEssentialsError {
        let mut errors = match primary {
            SqlEssentialsError::Multiple(multi) => multi.errors,
            other => vec![other],
        };
        match cleanup {
            SqlEssentialsError::Multiple(multi) => errors.extend(multi.errors),
            other => errors.push(other),
        }
        SqlEssentialsError::Multiple(MultiError { errors })
    }

    /// The error that started the failure path.
    #[must_use]
    pub fn primary(&self) -> &SqlEssentialsError {
        &self.errors[0]
    }

    /// Errors collected while cleaning up after the primary failure.
    #[must_use]
    pub fn secondary(&self) -> &[SqlEssentialsError] {
        &self.errors[1..]
    }

    /// Number of errors held; always at least two.
    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SqlEssentialsError> {
        self.errors.iter()
    }

    #[must_use]
    pub fn into_errors(self) -> Vec<SqlEssentialsError> {
        self.errors
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors occurred:", self.errors.len())?;
        for err in &self.errors {
            write!(f, "\n\t* {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.primary())
    }
}

impl<'a> IntoIterator for &'a MultiError {
    type Item = &'a SqlEssentialsError;
    type IntoIter = std::slice::Iter<'a, SqlEssentialsError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

/// Fold the outcome of a cleanup step into the outcome of the work it guarded.
///
/// A cleanup failure never hides an in-flight failure: both end up in a
/// [`MultiError`]. After a successful operation the cleanup failure alone is
/// returned.
pub(crate) fn with_cleanup<T>(
    result: Result<T, SqlEssentialsError>,
    cleanup: Result<(), SqlEssentialsError>,
) -> Result<T, SqlEssentialsError> {
    match (result, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(cleanup_err)) => Err(cleanup_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(cleanup_err)) => Err(MultiError::append(err, cleanup_err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_keeps_primary_first_and_flattens() {
        let first = MultiError::append(
            SqlEssentialsError::ExecutionError("handler".into()),
            SqlEssentialsError::ExecutionError("close".into()),
        );
        let second = MultiError::append(first, SqlEssentialsError::Other("rollback".into()));

        let multi = second.as_multiple().expect("aggregate");
        assert_eq!(multi.len(), 3);
        assert!(matches!(
            multi.primary(),
            SqlEssentialsError::ExecutionError(msg) if msg == "handler"
        ));
        assert_eq!(multi.secondary().len(), 2);
        assert!(second.to_string().starts_with("3 errors occurred:"));
    }

    #[test]
    fn cleanup_failure_after_success_is_returned_alone() {
        let res: Result<i32, _> = with_cleanup(Ok(1), Err(SqlEssentialsError::StatementClosed));
        assert!(matches!(res, Err(SqlEssentialsError::StatementClosed)));

        let res: Result<(), _> = with_cleanup(Err(SqlEssentialsError::NoDestination), Ok(()));
        assert!(matches!(res, Err(SqlEssentialsError::NoDestination)));

        let res: Result<(), _> = with_cleanup(
            Err(SqlEssentialsError::Cancelled),
            Err(SqlEssentialsError::StatementClosed),
        );
        let err = res.expect_err("both failed");
        let multi = err.as_multiple().expect("aggregate");
        assert!(matches!(multi.primary(), SqlEssentialsError::Cancelled));
        assert!(matches!(
            multi.secondary(),
            [SqlEssentialsError::StatementClosed]
        ));
    }
}

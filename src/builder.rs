use crate::error::SqlEssentialsError;
use crate::types::RowValues;

/// Anything that can produce a query text and its positional arguments,
/// typically a query builder. Used by the `*_sb` helpers.
pub trait SqlSource {
    /// # Errors
    /// Whatever the builder reports; the helpers return it unchanged without
    /// touching the database.
    fn to_sql(&self) -> Result<(String, Vec<RowValues>), SqlEssentialsError>;
}

/// A query and its parameters bundled together.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAndParams {
    /// The SQL query string
    pub query: String,
    /// The parameters to be bound to the query
    pub params: Vec<RowValues>,
}

impl QueryAndParams {
    pub fn new(query: impl Into<String>, params: Vec<RowValues>) -> Self {
        Self {
            query: query.into(),
            params,
        }
    }

    /// A query without parameters.
    pub fn new_without_params(query: impl Into<String>) -> Self {
        Self::new(query, Vec::new())
    }
}

impl SqlSource for QueryAndParams {
    fn to_sql(&self) -> Result<(String, Vec<RowValues>), SqlEssentialsError> {
        Ok((self.query.clone(), self.params.clone()))
    }
}

impl SqlSource for (String, Vec<RowValues>) {
    fn to_sql(&self) -> Result<(String, Vec<RowValues>), SqlEssentialsError> {
        Ok(self.clone())
    }
}

impl SqlSource for (&str, Vec<RowValues>) {
    fn to_sql(&self) -> Result<(String, Vec<RowValues>), SqlEssentialsError> {
        Ok((self.0.to_owned(), self.1.clone()))
    }
}

impl<S: SqlSource + ?Sized> SqlSource for &S {
    fn to_sql(&self) -> Result<(String, Vec<RowValues>), SqlEssentialsError> {
        (**self).to_sql()
    }
}

//! Outcome of one execution call.

use crate::error::{Error, Result};
use crate::value::Value;

/// The result of executing a request.
///
/// Produced exactly once per execution call. Every failure of an execution,
/// from query building to native stepping, is carried in the `Error` variant.
#[derive(Debug)]
pub enum QueryResult<S> {
    /// The statement completed without producing rows.
    Success,
    /// The statement produced rows, available through the stream.
    Rows(S),
    /// A single scalar value.
    Value(Value),
    /// The execution failed.
    Error(Error),
}

impl<S> QueryResult<S> {
    /// Check whether this is `Success`.
    pub const fn is_success(&self) -> bool {
        matches!(self, QueryResult::Success)
    }

    /// Check whether this carries rows.
    pub const fn has_rows(&self) -> bool {
        matches!(self, QueryResult::Rows(_))
    }

    /// Check whether this is an error.
    pub const fn is_error(&self) -> bool {
        matches!(self, QueryResult::Error(_))
    }

    /// Borrow the error, if any.
    pub const fn as_error(&self) -> Option<&Error> {
        match self {
            QueryResult::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Take the error, if any.
    pub fn into_error(self) -> Option<Error> {
        match self {
            QueryResult::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Take the row stream, if any.
    pub fn into_rows(self) -> Option<S> {
        match self {
            QueryResult::Rows(s) => Some(s),
            _ => None,
        }
    }

    /// Take the scalar value, if any.
    pub fn into_value(self) -> Option<Value> {
        match self {
            QueryResult::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Convert into a `Result`, moving the error variant into `Err`.
    pub fn into_result(self) -> Result<Self> {
        match self {
            QueryResult::Error(e) => Err(e),
            other => Ok(other),
        }
    }

    /// Map the stream type, leaving other variants untouched.
    pub fn map_rows<T>(self, f: impl FnOnce(S) -> T) -> QueryResult<T> {
        match self {
            QueryResult::Success => QueryResult::Success,
            QueryResult::Rows(s) => QueryResult::Rows(f(s)),
            QueryResult::Value(v) => QueryResult::Value(v),
            QueryResult::Error(e) => QueryResult::Error(e),
        }
    }
}

impl<S> From<Error> for QueryResult<S> {
    fn from(err: Error) -> Self {
        QueryResult::Error(err)
    }
}

impl<S> From<Result<QueryResult<S>>> for QueryResult<S> {
    fn from(res: Result<QueryResult<S>>) -> Self {
        res.unwrap_or_else(QueryResult::Error)
    }
}

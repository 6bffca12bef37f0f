//! Database connection traits.
//!
//! This module defines the protocol a driver implements:
//!
//! - [`Connection`] - executing requests, prepared statements and transactions
//! - [`ResultFetcher`] - lazily fetching rows of a result set
//! - [`Request`] / [`Source`] / [`Params`] - what an execution call receives
//!
//! All async operations take a `Cx` context, in line with asupersync's
//! structured concurrency, and report through `Outcome` or [`QueryResult`].

use crate::dialect::Substitutions;
use crate::error::{Error, Result};
use crate::query::Query;
use crate::result::QueryResult;
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};

/// Parameters of one execution.
///
/// Positional and named binding are separate variants, so a request can never
/// mix both styles.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Params {
    /// No parameters.
    #[default]
    None,
    /// Parameters bound by 1-based position.
    Positional(Vec<Value>),
    /// Parameters bound by name, without the dialect's marker prefix.
    Named(Vec<(String, Value)>),
}

impl Params {
    /// Build positional parameters.
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Params::Positional(values.into_iter().map(Into::into).collect())
    }

    /// Build named parameters.
    pub fn named<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Params::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        match self {
            Params::None => 0,
            Params::Positional(v) => v.len(),
            Params::Named(v) => v.len(),
        }
    }

    /// Check if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where the SQL text of a request comes from.
#[derive(Clone, Copy)]
pub enum Source<'a> {
    /// A structured query, built with the connection's substitution table.
    Query(&'a dyn Query),
    /// SQL text passed through unchanged.
    Raw(&'a str),
}

impl std::fmt::Debug for Source<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Query(_) => f.write_str("Source::Query(..)"),
            Source::Raw(sql) => f.debug_tuple("Source::Raw").field(sql).finish(),
        }
    }
}

impl Source<'_> {
    /// Render the SQL text of this source.
    pub fn render(&self, substitutions: &Substitutions) -> Result<String> {
        match self {
            Source::Query(q) => q.build(substitutions),
            Source::Raw(sql) => Ok((*sql).to_string()),
        }
    }
}

/// One execution request: SQL source plus parameters.
#[derive(Debug, Clone)]
pub struct Request<'a> {
    pub source: Source<'a>,
    pub params: Params,
}

impl<'a> Request<'a> {
    /// A request for a structured query.
    pub fn query(query: &'a dyn Query) -> Self {
        Self {
            source: Source::Query(query),
            params: Params::None,
        }
    }

    /// A request for raw SQL text.
    pub fn raw(sql: &'a str) -> Self {
        Self {
            source: Source::Raw(sql),
            params: Params::None,
        }
    }

    /// Replace the parameters.
    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Bind positional parameters.
    pub fn bind<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.params(Params::positional(values))
    }

    /// Bind named parameters.
    pub fn bind_named<I, K, V>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.params(Params::named(pairs))
    }

    /// The generated-identifier request of the underlying query.
    pub fn return_id(&self) -> crate::query::ReturnId {
        match self.source {
            Source::Query(q) => q.return_id(),
            Source::Raw(_) => crate::query::ReturnId::None,
        }
    }
}

/// A lazily fetched sequence of rows.
///
/// Column titles are known as soon as the fetcher exists. Rows are pulled one
/// at a time; once the end is reached or [`done`](ResultFetcher::done) is
/// called, the fetcher releases its underlying resources and yields no more.
pub trait ResultFetcher: Send {
    /// Column titles in result order.
    fn titles(&self) -> &[String];

    /// Fetch the next row, or `None` once the result set is exhausted.
    fn fetch_next(&mut self, cx: &Cx) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send;

    /// Release the result set early. Safe to call repeatedly and after
    /// exhaustion.
    fn done(&mut self);

    /// Drain the remaining rows.
    fn collect_rows(&mut self, cx: &Cx) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send
    where
        Self: Sized,
    {
        async move {
            let mut rows = Vec::new();
            loop {
                match self.fetch_next(cx).await {
                    Outcome::Ok(Some(row)) => rows.push(row),
                    Outcome::Ok(None) => return Outcome::Ok(rows),
                    Outcome::Err(e) => return Outcome::Err(e),
                    Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                    Outcome::Panicked(p) => return Outcome::Panicked(p),
                }
            }
        }
    }
}

/// A database connection capable of executing structured and raw requests.
///
/// Execution calls never panic on database failures: every error is carried
/// in [`QueryResult::Error`]. Callers serialize their own calls on a single
/// connection; no request queueing is promised.
///
/// # Example
///
/// ```rust,ignore
/// conn.connect(&cx).await?;
/// let select = Select::from_table("t").column("a");
/// match conn.execute(&cx, Request::query(&select)).await {
///     QueryResult::Rows(mut rows) => {
///         while let Outcome::Ok(Some(row)) = rows.fetch_next(&cx).await { /* ... */ }
///     }
///     QueryResult::Error(e) => return Err(e),
///     _ => {}
/// }
/// ```
pub trait Connection: Send + Sync {
    /// Row stream produced by this connection.
    type Stream: ResultFetcher;

    /// Durable prepared statement handle.
    type Statement: Send + Sync;

    /// Open the underlying database. Succeeds without effect when already
    /// connected.
    fn connect(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;

    /// Whether a database handle is currently open.
    fn is_connected(&self) -> bool;

    /// Close the database handle, if open. Idempotent.
    fn close_connection(&self);

    /// The dialect substitution table queries are built with.
    fn substitutions(&self) -> &Substitutions;

    /// Render a query to SQL without touching the database.
    fn description_of(&self, query: &dyn Query) -> Result<String> {
        query.build(self.substitutions())
    }

    /// Execute a request.
    fn execute(
        &self,
        cx: &Cx,
        request: Request<'_>,
    ) -> impl Future<Output = QueryResult<Self::Stream>> + Send;

    /// Prepare a durable statement for repeated execution.
    fn prepare(
        &self,
        cx: &Cx,
        source: Source<'_>,
    ) -> impl Future<Output = Outcome<Self::Statement, Error>> + Send;

    /// Execute a durable statement with fresh parameters.
    fn execute_prepared(
        &self,
        cx: &Cx,
        statement: &Self::Statement,
        params: Params,
    ) -> impl Future<Output = QueryResult<Self::Stream>> + Send;

    /// Finalize a durable statement.
    fn release(
        &self,
        cx: &Cx,
        statement: Self::Statement,
    ) -> impl Future<Output = Outcome<(), Error>> + Send;

    /// Begin a transaction.
    fn start_transaction(&self, cx: &Cx) -> impl Future<Output = QueryResult<Self::Stream>> + Send;

    /// Commit the active transaction.
    fn commit(&self, cx: &Cx) -> impl Future<Output = QueryResult<Self::Stream>> + Send;

    /// Roll back the active transaction.
    fn rollback(&self, cx: &Cx) -> impl Future<Output = QueryResult<Self::Stream>> + Send;

    /// Create a savepoint inside the active transaction.
    fn create_savepoint(
        &self,
        cx: &Cx,
        name: &str,
    ) -> impl Future<Output = QueryResult<Self::Stream>> + Send;

    /// Roll back to a savepoint; the transaction stays active.
    fn rollback_to_savepoint(
        &self,
        cx: &Cx,
        name: &str,
    ) -> impl Future<Output = QueryResult<Self::Stream>> + Send;

    /// Release a savepoint; the transaction stays active.
    fn release_savepoint(
        &self,
        cx: &Cx,
        name: &str,
    ) -> impl Future<Output = QueryResult<Self::Stream>> + Send;
}

//! SQLite connection implementation.
//!
//! [`SqliteConnection`] owns one native handle and its transaction state, and
//! implements the `Connection` trait from sqlbridge-core. Every native call
//! runs as a job on the connection's [`WorkerPool`]; the async methods await
//! the job, the `_blocking` variants wait for it on the calling thread.
//!
//! ```rust,ignore
//! use sqlbridge_core::{Connection, Cx, QueryResult, Request, ResultFetcher};
//! use sqlbridge_sqlite::{SqliteConfig, SqliteConnection, WorkerPool};
//!
//! let workers = WorkerPool::with_defaults()?;
//! let conn = SqliteConnection::open(SqliteConfig::memory(), workers)?;
//! conn.execute_blocking(Request::raw("CREATE TABLE t (a INTEGER)"));
//!
//! let cx = Cx::for_testing();
//! if let QueryResult::Rows(mut rows) = conn.execute(&cx, Request::raw("SELECT a FROM t")).await {
//!     let all = rows.collect_rows(&cx).await;
//! }
//! ```

use crate::config::SqliteConfig;
use crate::dialect::sqlite_substitutions;
use crate::handle::{NativeHandle, Session, SessionState};
use crate::statement::{self, Lifetime, StatementCell, Started};
use crate::stream::ResultStream;
use crate::transaction::{TransactionCommand, TransactionState};
use crate::worker::{Completion, WorkerPool, ensure_blocking_allowed};
use sqlbridge_core::{
    Connection, Cx, Error, Outcome, Params, QueryResult, Request, Result, ResultFetcher, ReturnId,
    Source, Substitutions, Value,
};
use std::fmt;
use std::sync::Arc;

/// A statement prepared for repeated execution.
///
/// Obtained from [`SqliteConnection::prepare`]; executions only reset it.
/// Release it with [`SqliteConnection::release`]. Dropping it without
/// releasing finalizes it once no stream reads from it anymore.
pub struct PreparedStatement {
    statement: Arc<StatementCell>,
}

impl PreparedStatement {
    /// The SQL the statement was prepared from.
    pub fn sql(&self) -> &str {
        self.statement.sql()
    }

    /// Whether the native statement has been finalized.
    pub fn is_released(&self) -> bool {
        self.statement.is_released()
    }
}

impl fmt::Debug for PreparedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedStatement")
            .field("sql", &self.sql())
            .finish_non_exhaustive()
    }
}

/// The statement produced by one execution job and how it started.
struct Executed {
    statement: Arc<StatementCell>,
    started: Started,
}

/// A connection to a SQLite database.
///
/// The native handle and transaction state sit behind one mutex that every
/// job holds for its duration. Callers still serialize their own calls; the
/// connection does not queue or reorder them.
pub struct SqliteConnection {
    config: SqliteConfig,
    session: Session,
    substitutions: Arc<Substitutions>,
    workers: WorkerPool,
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("location", &self.config.location)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl SqliteConnection {
    /// Create an unopened connection using the SQLite substitution table.
    pub fn new(config: SqliteConfig, workers: WorkerPool) -> Self {
        Self::with_substitutions(config, sqlite_substitutions(), workers)
    }

    /// Create an unopened connection with a custom substitution table.
    pub fn with_substitutions(
        config: SqliteConfig,
        substitutions: Substitutions,
        workers: WorkerPool,
    ) -> Self {
        Self {
            config,
            session: Session::default(),
            substitutions: Arc::new(substitutions),
            workers,
        }
    }

    /// Create and open a connection, blocking until it is open.
    ///
    /// Like every `_blocking` method, this fails with [`Error::Unsupported`]
    /// when called on a thread owned by a tokio runtime.
    pub fn open(config: SqliteConfig, workers: WorkerPool) -> Result<Self> {
        let conn = Self::new(config, workers);
        conn.connect_blocking()?;
        Ok(conn)
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    /// Open the database, blocking the current thread.
    pub fn connect_blocking(&self) -> Result<()> {
        ensure_blocking_allowed().and_then(|()| self.start_connect().wait())
    }

    /// Current transaction state.
    pub fn transaction_state(&self) -> TransactionState {
        self.session.lock().transaction
    }

    /// Whether a transaction is active.
    pub fn in_transaction(&self) -> bool {
        self.transaction_state().is_active()
    }

    /// Rows changed by the most recent INSERT, UPDATE or DELETE.
    pub fn changes(&self) -> Result<i64> {
        Ok(self.session.lock().handle()?.changes())
    }

    /// Rowid of the most recent successful INSERT.
    pub fn last_insert_rowid(&self) -> Result<i64> {
        Ok(self.session.lock().handle()?.last_insert_rowid())
    }

    /// Execute a request, blocking the current thread.
    pub fn execute_blocking(&self, request: Request<'_>) -> QueryResult<ResultStream> {
        let result =
            ensure_blocking_allowed().and_then(|()| self.start_execute(request).wait());
        self.finish_execute(result)
    }

    /// Execute a request and return the first column of its first row.
    ///
    /// Yields [`QueryResult::Success`] when the request produced no rows.
    pub fn execute_scalar(
        &self,
        cx: &Cx,
        request: Request<'_>,
    ) -> impl Future<Output = QueryResult<ResultStream>> + Send {
        let pending = self.execute(cx, request);
        async move { into_scalar(pending.await) }
    }

    /// Blocking variant of [`execute_scalar`](Self::execute_scalar).
    pub fn execute_scalar_blocking(&self, request: Request<'_>) -> QueryResult<ResultStream> {
        into_scalar(self.execute_blocking(request))
    }

    /// Prepare a durable statement, blocking the current thread.
    pub fn prepare_blocking(&self, source: Source<'_>) -> Result<PreparedStatement> {
        ensure_blocking_allowed().and_then(|()| self.start_prepare(source).wait())
    }

    /// Execute a durable statement, blocking the current thread.
    pub fn execute_prepared_blocking(
        &self,
        statement: &PreparedStatement,
        params: Params,
    ) -> QueryResult<ResultStream> {
        let result = ensure_blocking_allowed()
            .and_then(|()| self.start_execute_prepared(statement, params).wait());
        self.finish_execute(result)
    }

    /// Finalize a durable statement, blocking the current thread.
    pub fn release_blocking(&self, statement: PreparedStatement) -> Result<()> {
        ensure_blocking_allowed()?;
        self.start_release(statement).wait()
    }

    /// Run a transaction command.
    pub fn transact(
        &self,
        _cx: &Cx,
        command: TransactionCommand,
    ) -> impl Future<Output = QueryResult<ResultStream>> + Send {
        let pending = self.start_command(command);
        async move { command_result(pending.await) }
    }

    /// Run a transaction command, blocking the current thread.
    pub fn transact_blocking(&self, command: TransactionCommand) -> QueryResult<ResultStream> {
        let result = ensure_blocking_allowed().and_then(|()| self.start_command(command).wait());
        command_result(result)
    }

    pub fn start_transaction_blocking(&self) -> QueryResult<ResultStream> {
        self.transact_blocking(TransactionCommand::Begin)
    }

    pub fn commit_blocking(&self) -> QueryResult<ResultStream> {
        self.transact_blocking(TransactionCommand::Commit)
    }

    pub fn rollback_blocking(&self) -> QueryResult<ResultStream> {
        self.transact_blocking(TransactionCommand::Rollback)
    }

    pub fn create_savepoint_blocking(&self, name: &str) -> QueryResult<ResultStream> {
        self.transact_blocking(TransactionCommand::Savepoint(name.to_string()))
    }

    pub fn rollback_to_savepoint_blocking(&self, name: &str) -> QueryResult<ResultStream> {
        self.transact_blocking(TransactionCommand::RollbackTo(name.to_string()))
    }

    pub fn release_savepoint_blocking(&self, name: &str) -> QueryResult<ResultStream> {
        self.transact_blocking(TransactionCommand::ReleaseSavepoint(name.to_string()))
    }

    // Jobs

    fn start_connect(&self) -> Completion<()> {
        let session = self.session.clone();
        let config = self.config.clone();
        self.workers.dispatch(move || {
            let mut state = session.lock();
            if state.handle.is_some() {
                return Ok(());
            }
            let handle =
                NativeHandle::open(&config.location, config.flags, config.busy_timeout_ms)?;
            *state = SessionState {
                handle: Some(handle),
                transaction: TransactionState::Idle,
            };
            tracing::debug!(
                location = ?config.location,
                busy_timeout_ms = config.busy_timeout_ms,
                "SQLite connection opened"
            );
            Ok(())
        })
    }

    fn start_execute(&self, request: Request<'_>) -> Completion<Executed> {
        let sql = match request.source.render(&self.substitutions) {
            Ok(sql) => sql,
            Err(e) => return Completion::ready(Err(e)),
        };
        let id_sql = match request.return_id() {
            ReturnId::None => None,
            ReturnId::AutoIncrement(column) => Some(format!(
                "SELECT last_insert_rowid() AS {}",
                self.substitutions.quote_identifier(&column)
            )),
            ReturnId::Unavailable(table) => {
                return Completion::ready(Err(Error::syntax(format!(
                    "cannot return a generated id: table '{table}' has no auto-increment primary key"
                ))));
            }
        };

        let session = self.session.clone();
        let substitutions = Arc::clone(&self.substitutions);
        let params = request.params;
        tracing::trace!(sql = %sql, params = params.len(), "execute");

        self.workers.dispatch(move || {
            let state = session.lock();
            let handle = state.handle()?;

            let raw = statement::prepare(handle, &sql)?;
            let cell = StatementCell::new(session.clone(), raw, sql, Lifetime::Ephemeral);
            let started = cell.start(handle, &params, &substitutions)?;

            // Read the id before anything else can run on this handle.
            match (started, id_sql) {
                (Started::Done, Some(id_sql)) => {
                    let raw = statement::prepare(handle, &id_sql)?;
                    let id_cell =
                        StatementCell::new(session.clone(), raw, id_sql, Lifetime::Ephemeral);
                    let started = id_cell.start(handle, &Params::None, &substitutions)?;
                    Ok(Executed {
                        statement: id_cell,
                        started,
                    })
                }
                (started, _) => Ok(Executed {
                    statement: cell,
                    started,
                }),
            }
        })
    }

    fn start_prepare(&self, source: Source<'_>) -> Completion<PreparedStatement> {
        let sql = match source.render(&self.substitutions) {
            Ok(sql) => sql,
            Err(e) => return Completion::ready(Err(e)),
        };
        let session = self.session.clone();
        self.workers.dispatch(move || {
            let state = session.lock();
            let handle = state.handle()?;
            let raw = statement::prepare(handle, &sql)?;
            Ok(PreparedStatement {
                statement: StatementCell::new(session.clone(), raw, sql, Lifetime::Durable),
            })
        })
    }

    fn start_execute_prepared(
        &self,
        prepared: &PreparedStatement,
        params: Params,
    ) -> Completion<Executed> {
        if !prepared.statement.session().same_as(&self.session) {
            return Completion::ready(Err(Error::Unsupported(
                "statement was prepared on a different connection".to_string(),
            )));
        }
        let cell = Arc::clone(&prepared.statement);
        let session = self.session.clone();
        let substitutions = Arc::clone(&self.substitutions);
        tracing::trace!(sql = %cell.sql(), params = params.len(), "execute prepared");

        self.workers.dispatch(move || {
            let state = session.lock();
            let handle = state.handle()?;
            let started = cell.start(handle, &params, &substitutions)?;
            Ok(Executed {
                statement: cell,
                started,
            })
        })
    }

    fn start_release(&self, prepared: PreparedStatement) -> Completion<()> {
        let session = self.session.clone();
        self.workers.dispatch(move || {
            let _state = session.lock();
            if prepared.statement.finalize() {
                tracing::trace!(sql = %prepared.sql(), "released statement");
            }
            Ok(())
        })
    }

    fn start_command(&self, command: TransactionCommand) -> Completion<()> {
        let session = self.session.clone();
        self.workers.dispatch(move || {
            let mut state = session.lock();
            let SessionState {
                handle,
                transaction,
            } = &mut *state;
            let handle = handle.as_ref().ok_or_else(Error::not_connected)?;
            transaction.apply(handle, &command)
        })
    }

    fn finish_execute(&self, executed: Result<Executed>) -> QueryResult<ResultStream> {
        match executed {
            Ok(Executed {
                started: Started::Done,
                ..
            }) => QueryResult::Success,
            Ok(Executed {
                statement,
                started:
                    Started::Rows {
                        columns,
                        first,
                        generation,
                    },
            }) => QueryResult::Rows(ResultStream::new(
                statement,
                self.workers.clone(),
                columns,
                first,
                generation,
            )),
            Err(e) => {
                tracing::debug!(error = %e, "execution failed");
                QueryResult::Error(e)
            }
        }
    }
}

fn into_scalar(result: QueryResult<ResultStream>) -> QueryResult<ResultStream> {
    match result {
        QueryResult::Rows(mut stream) => {
            let value = stream
                .take_buffered()
                .and_then(|row| row.into_values().into_iter().next())
                .unwrap_or(Value::Null);
            stream.done();
            QueryResult::Value(value)
        }
        other => other,
    }
}

fn command_result(result: Result<()>) -> QueryResult<ResultStream> {
    match result {
        Ok(()) => QueryResult::Success,
        Err(e) => QueryResult::Error(e),
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        self.close_connection();
    }
}

impl Connection for SqliteConnection {
    type Stream = ResultStream;
    type Statement = PreparedStatement;

    fn connect(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        let pending = self.start_connect();
        async move { pending.await.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn is_connected(&self) -> bool {
        self.session.lock().handle.is_some()
    }

    fn close_connection(&self) {
        let mut state = self.session.lock();
        state.transaction = TransactionState::Idle;
        if state.handle.take().is_some() {
            tracing::debug!(location = ?self.config.location, "SQLite connection closed");
        }
    }

    fn substitutions(&self) -> &Substitutions {
        &self.substitutions
    }

    fn execute(
        &self,
        _cx: &Cx,
        request: Request<'_>,
    ) -> impl Future<Output = QueryResult<ResultStream>> + Send {
        let pending = self.start_execute(request);
        async move { self.finish_execute(pending.await) }
    }

    fn prepare(
        &self,
        _cx: &Cx,
        source: Source<'_>,
    ) -> impl Future<Output = Outcome<PreparedStatement, Error>> + Send {
        let pending = self.start_prepare(source);
        async move { pending.await.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn execute_prepared(
        &self,
        _cx: &Cx,
        statement: &PreparedStatement,
        params: Params,
    ) -> impl Future<Output = QueryResult<ResultStream>> + Send {
        let pending = self.start_execute_prepared(statement, params);
        async move { self.finish_execute(pending.await) }
    }

    fn release(
        &self,
        _cx: &Cx,
        statement: PreparedStatement,
    ) -> impl Future<Output = Outcome<(), Error>> + Send {
        let pending = self.start_release(statement);
        async move { pending.await.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn start_transaction(&self, cx: &Cx) -> impl Future<Output = QueryResult<ResultStream>> + Send {
        self.transact(cx, TransactionCommand::Begin)
    }

    fn commit(&self, cx: &Cx) -> impl Future<Output = QueryResult<ResultStream>> + Send {
        self.transact(cx, TransactionCommand::Commit)
    }

    fn rollback(&self, cx: &Cx) -> impl Future<Output = QueryResult<ResultStream>> + Send {
        self.transact(cx, TransactionCommand::Rollback)
    }

    fn create_savepoint(
        &self,
        cx: &Cx,
        name: &str,
    ) -> impl Future<Output = QueryResult<ResultStream>> + Send {
        self.transact(cx, TransactionCommand::Savepoint(name.to_string()))
    }

    fn rollback_to_savepoint(
        &self,
        cx: &Cx,
        name: &str,
    ) -> impl Future<Output = QueryResult<ResultStream>> + Send {
        self.transact(cx, TransactionCommand::RollbackTo(name.to_string()))
    }

    fn release_savepoint(
        &self,
        cx: &Cx,
        name: &str,
    ) -> impl Future<Output = QueryResult<ResultStream>> + Send {
        self.transact(cx, TransactionCommand::ReleaseSavepoint(name.to_string()))
    }
}

//! Lazily fetched result rows.

use crate::statement::StatementCell;
use crate::worker::{Completion, WorkerPool, ensure_blocking_allowed};
use sqlbridge_core::row::ColumnInfo;
use sqlbridge_core::{Cx, Error, Outcome, ResultFetcher, Row};
use std::fmt;
use std::sync::Arc;

enum Cursor {
    /// The row read by the execution's first step, not yet handed out
    Buffered(Row),
    Streaming,
    Exhausted,
}

enum Advance {
    Ready(Result<Option<Row>, Error>),
    Step(Completion<Option<Row>>),
}

/// Rows of one statement execution, read one native step at a time.
///
/// Column titles are captured when the stream is created. The statement is
/// released exactly once: when the rows run out, when a step fails, on
/// [`done`](ResultFetcher::done), or on drop, whichever comes first.
pub struct ResultStream {
    columns: Arc<ColumnInfo>,
    cursor: Cursor,
    statement: Arc<StatementCell>,
    workers: WorkerPool,
    generation: u64,
}

impl ResultStream {
    pub(crate) fn new(
        statement: Arc<StatementCell>,
        workers: WorkerPool,
        columns: Arc<ColumnInfo>,
        first: Row,
        generation: u64,
    ) -> Self {
        Self {
            columns,
            cursor: Cursor::Buffered(first),
            statement,
            workers,
            generation,
        }
    }

    /// Shared column metadata of every row.
    pub fn columns(&self) -> &Arc<ColumnInfo> {
        &self.columns
    }

    /// SQL of the statement being read.
    pub fn sql(&self) -> &str {
        self.statement.sql()
    }

    /// Whether no more rows will be produced.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.cursor, Cursor::Exhausted)
    }

    /// Fetch the next row, blocking the current thread.
    pub fn fetch_next_blocking(&mut self) -> Result<Option<Row>, Error> {
        ensure_blocking_allowed()?;
        match self.advance() {
            Advance::Ready(result) => result,
            Advance::Step(completion) => {
                let result = completion.wait();
                self.settle(result)
            }
        }
    }

    /// Drain the remaining rows, blocking the current thread.
    pub fn collect_rows_blocking(&mut self) -> Result<Vec<Row>, Error> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetch_next_blocking()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Take the buffered first row without stepping.
    pub(crate) fn take_buffered(&mut self) -> Option<Row> {
        match std::mem::replace(&mut self.cursor, Cursor::Streaming) {
            Cursor::Buffered(row) => Some(row),
            other => {
                self.cursor = other;
                None
            }
        }
    }

    fn advance(&mut self) -> Advance {
        match std::mem::replace(&mut self.cursor, Cursor::Streaming) {
            Cursor::Buffered(row) => Advance::Ready(Ok(Some(row))),
            Cursor::Exhausted => {
                self.cursor = Cursor::Exhausted;
                Advance::Ready(Ok(None))
            }
            Cursor::Streaming => {
                let statement = Arc::clone(&self.statement);
                let columns = Arc::clone(&self.columns);
                let generation = self.generation;
                Advance::Step(self.workers.dispatch(move || {
                    let state = statement.session().lock();
                    let handle = state.handle()?;
                    statement.step(handle, &columns, generation)
                }))
            }
        }
    }

    fn settle(&mut self, result: Result<Option<Row>, Error>) -> Result<Option<Row>, Error> {
        match &result {
            Ok(Some(_)) => {}
            Ok(None) => self.done(),
            Err(e) => {
                tracing::debug!(sql = %self.statement.sql(), error = %e, "row fetch failed");
                self.done();
            }
        }
        result
    }
}

impl ResultFetcher for ResultStream {
    fn titles(&self) -> &[String] {
        self.columns.names()
    }

    fn fetch_next(&mut self, _cx: &Cx) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        async move {
            let result = match self.advance() {
                Advance::Ready(result) => result,
                Advance::Step(completion) => {
                    let result = completion.await;
                    self.settle(result)
                }
            };
            result.map_or_else(Outcome::Err, Outcome::Ok)
        }
    }

    fn done(&mut self) {
        if matches!(self.cursor, Cursor::Exhausted) {
            return;
        }
        self.cursor = Cursor::Exhausted;
        self.statement.complete(self.generation);
    }
}

impl Drop for ResultStream {
    fn drop(&mut self) {
        self.done();
    }
}

impl fmt::Debug for ResultStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultStream")
            .field("titles", &self.columns.names())
            .field("exhausted", &self.is_exhausted())
            .finish_non_exhaustive()
    }
}

//! Prepared statement lifecycle.
//!
//! An ephemeral statement lives for one execution and is finalized as soon as
//! that execution completes. A durable statement is only reset between
//! executions; it is finalized by an explicit release, or when its last
//! owner drops it.

use crate::ffi;
use crate::handle::{NativeHandle, Session, nul_in_sql};
use crate::types;
use sqlbridge_core::error::{QueryError, QueryErrorKind};
use sqlbridge_core::row::ColumnInfo;
use sqlbridge_core::{Error, Params, Result, Row, Substitutions};
use std::ffi::{CString, c_char, c_int};
use std::ptr::{self, NonNull};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// An owned `sqlite3_stmt*`, finalized on drop.
pub(crate) struct RawStatement {
    stmt: NonNull<ffi::sqlite3_stmt>,
}

// SAFETY: the database is opened in serialized mode, and statement use is
// serialized by the statement cell's mutex.
unsafe impl Send for RawStatement {}

impl RawStatement {
    pub(crate) fn as_ptr(&self) -> *mut ffi::sqlite3_stmt {
        self.stmt.as_ptr()
    }
}

impl Drop for RawStatement {
    fn drop(&mut self) {
        // SAFETY: stmt is valid and not used after this call. The return code
        // repeats the last step error, which was already reported.
        unsafe { ffi::sqlite3_finalize(self.as_ptr()) };
    }
}

/// Rewind a statement and drop its bindings.
///
/// # Safety
///
/// `stmt` must be a valid statement.
unsafe fn rewind(stmt: *mut ffi::sqlite3_stmt) {
    // SAFETY: guaranteed by the caller
    unsafe {
        ffi::sqlite3_reset(stmt);
        ffi::sqlite3_clear_bindings(stmt);
    }
}

/// Compile the first statement of `sql`.
///
/// Empty or comment-only SQL yields no statement and is an error. Text after
/// the first statement is ignored.
pub(crate) fn prepare(handle: &NativeHandle, sql: &str) -> Result<RawStatement> {
    let c_sql = CString::new(sql).map_err(|_| nul_in_sql(sql))?;
    let len = c_int::try_from(c_sql.as_bytes().len()).map_err(|_| {
        Error::Query(QueryError {
            kind: QueryErrorKind::DataTruncation,
            sql: None,
            code: Some(ffi::SQLITE_TOOBIG),
            message: "SQL text exceeds the native size limit".to_string(),
        })
    })?;

    let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
    let mut tail: *const c_char = ptr::null();
    // SAFETY: all pointers are valid for the duration of the call
    let rc = unsafe {
        ffi::sqlite3_prepare_v2(
            handle.as_ptr(),
            c_sql.as_ptr(),
            len,
            &raw mut stmt,
            &raw mut tail,
        )
    };

    if rc != ffi::SQLITE_OK {
        return Err(handle.error(rc, sql));
    }
    let Some(stmt) = NonNull::new(stmt) else {
        return Err(Error::Query(QueryError {
            kind: QueryErrorKind::Database,
            sql: Some(sql.to_string()),
            code: None,
            message: "no statement to execute (empty SQL)".to_string(),
        }));
    };

    if !tail.is_null() {
        // SAFETY: tail points into c_sql
        let consumed = unsafe { tail.offset_from(c_sql.as_ptr()) };
        let rest = usize::try_from(consumed)
            .ok()
            .and_then(|at| sql.get(at..))
            .unwrap_or_default();
        if !rest.trim().is_empty() {
            tracing::warn!(ignored = rest.trim(), "only the first SQL statement is executed");
        }
    }

    tracing::trace!(sql = %sql, "prepared statement");
    Ok(RawStatement { stmt })
}

/// Whether a statement outlives one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifetime {
    Ephemeral,
    Durable,
}

struct Slot {
    raw: Option<RawStatement>,
    /// Bumped by every execution, so a stale stream cannot step or reset a
    /// newer one.
    generation: u64,
}

/// Outcome of the first step of an execution.
pub(crate) enum Started {
    /// The statement ran to completion without producing rows.
    Done,
    /// The statement produced at least one row.
    Rows {
        columns: Arc<ColumnInfo>,
        first: Row,
        generation: u64,
    },
}

/// A statement shared between its owner and the streams reading from it.
///
/// Lock order: the session first, then the statement.
pub(crate) struct StatementCell {
    session: Session,
    sql: String,
    lifetime: Lifetime,
    slot: Mutex<Slot>,
}

impl StatementCell {
    pub(crate) fn new(session: Session, raw: RawStatement, sql: String, lifetime: Lifetime) -> Arc<Self> {
        Arc::new(Self {
            session,
            sql,
            lifetime,
            slot: Mutex::new(Slot {
                raw: Some(raw),
                generation: 0,
            }),
        })
    }

    pub(crate) fn sql(&self) -> &str {
        &self.sql
    }

    pub(crate) fn session(&self) -> &Session {
        &self.session
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_released(&self) -> bool {
        self.lock().raw.is_none()
    }

    /// Bind `params` and take the first step.
    ///
    /// The caller holds the session lock and passes its handle.
    pub(crate) fn start(
        &self,
        handle: &NativeHandle,
        params: &Params,
        substitutions: &Substitutions,
    ) -> Result<Started> {
        let mut slot = self.lock();
        let Some(stmt) = slot.raw.as_ref().map(RawStatement::as_ptr) else {
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::Database,
                sql: Some(self.sql.clone()),
                code: Some(ffi::SQLITE_MISUSE),
                message: format!(
                    "{}: statement has been released",
                    ffi::error_string(ffi::SQLITE_MISUSE)
                ),
            }));
        };
        slot.generation += 1;
        let generation = slot.generation;

        // SAFETY: stmt stays alive while the slot is locked, and was prepared
        // on `handle`
        let bound = unsafe {
            rewind(stmt);
            types::bind_params(stmt, handle, params, substitutions, &self.sql)
        };
        if let Err(err) = bound {
            self.dispose(&mut slot);
            return Err(err);
        }

        // SAFETY: as above
        let rc = unsafe { ffi::sqlite3_step(stmt) };
        match rc {
            ffi::SQLITE_ROW => {
                // SAFETY: stmt is positioned on a row
                let columns = Arc::new(ColumnInfo::new(unsafe { types::column_titles(stmt) }));
                let first = unsafe { types::read_row(stmt, &columns) };
                tracing::trace!(sql = %self.sql, columns = columns.len(), "statement produced rows");
                Ok(Started::Rows {
                    columns,
                    first,
                    generation,
                })
            }
            ffi::SQLITE_DONE => {
                self.dispose(&mut slot);
                Ok(Started::Done)
            }
            rc => {
                let err = handle.error(rc, &self.sql);
                self.dispose(&mut slot);
                Err(err)
            }
        }
    }

    /// Step once on behalf of the stream of `generation`.
    ///
    /// Returns `None` once the rows are exhausted, or when the stream is
    /// stale. The caller holds the session lock.
    pub(crate) fn step(
        &self,
        handle: &NativeHandle,
        columns: &Arc<ColumnInfo>,
        generation: u64,
    ) -> Result<Option<Row>> {
        let mut slot = self.lock();
        if slot.generation != generation {
            return Ok(None);
        }
        let Some(stmt) = slot.raw.as_ref().map(RawStatement::as_ptr) else {
            return Ok(None);
        };

        // SAFETY: stmt stays alive while the slot is locked
        match unsafe { ffi::sqlite3_step(stmt) } {
            // SAFETY: stmt is positioned on a row
            ffi::SQLITE_ROW => Ok(Some(unsafe { types::read_row(stmt, columns) })),
            ffi::SQLITE_DONE => {
                self.dispose(&mut slot);
                Ok(None)
            }
            rc => {
                let err = handle.error(rc, &self.sql);
                self.dispose(&mut slot);
                Err(err)
            }
        }
    }

    /// Release the execution of `generation`: finalize an ephemeral
    /// statement, rewind a durable one.
    pub(crate) fn complete(&self, generation: u64) {
        let mut slot = self.lock();
        if slot.generation == generation {
            self.dispose(&mut slot);
        }
    }

    /// Finalize regardless of lifetime. Returns whether anything was
    /// finalized.
    pub(crate) fn finalize(&self) -> bool {
        self.lock().raw.take().is_some()
    }

    fn dispose(&self, slot: &mut Slot) {
        match self.lifetime {
            Lifetime::Ephemeral => drop(slot.raw.take()),
            Lifetime::Durable => {
                if let Some(raw) = &slot.raw {
                    // SAFETY: raw is alive while the slot is locked
                    unsafe { rewind(raw.as_ptr()) };
                }
            }
        }
    }
}

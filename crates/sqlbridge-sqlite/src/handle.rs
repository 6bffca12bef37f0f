//! The native database handle and the session that guards it.

use crate::config::{Location, OpenFlags};
use crate::ffi;
use crate::transaction::TransactionState;
use sqlbridge_core::Error;
use sqlbridge_core::error::{ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind};
use std::ffi::{CString, c_char, c_int};
use std::ptr::{self, NonNull};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// An open `sqlite3*`, exclusively owned.
///
/// Closed with `sqlite3_close_v2` on drop, so statements that outlive the
/// handle keep the database alive until they are finalized.
#[derive(Debug)]
pub(crate) struct NativeHandle {
    db: NonNull<ffi::sqlite3>,
}

// SAFETY: the handle is opened in serialized mode and every use goes through
// the session mutex, so moving it between worker threads is sound.
unsafe impl Send for NativeHandle {}

impl NativeHandle {
    /// Open the database at `location` and apply the busy timeout.
    pub(crate) fn open(
        location: &Location,
        flags: OpenFlags,
        busy_timeout_ms: u32,
    ) -> Result<Self, Error> {
        let filename = location.as_filename();
        let c_path = CString::new(filename)
            .map_err(|_| connect_error(format!("database path '{filename}' contains a NUL byte")))?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        // SAFETY: c_path is NUL-terminated and db is a valid out pointer
        let rc = unsafe {
            ffi::sqlite3_open_v2(
                c_path.as_ptr(),
                &raw mut db,
                flags.to_sqlite_flags(),
                ptr::null(),
            )
        };

        let Some(db) = NonNull::new(db) else {
            return Err(connect_error(format!(
                "Failed to open database '{}': {}",
                filename,
                ffi::error_string(rc)
            )));
        };
        // From here on, dropping `handle` closes the partially opened database.
        let handle = Self { db };
        if rc != ffi::SQLITE_OK {
            return Err(connect_error(format!(
                "Failed to open database '{}': {}: {}",
                filename,
                ffi::error_string(rc),
                handle.errmsg()
            )));
        }

        let timeout = c_int::try_from(busy_timeout_ms).unwrap_or(c_int::MAX);
        // SAFETY: db is a valid open handle
        unsafe { ffi::sqlite3_busy_timeout(handle.as_ptr(), timeout) };

        Ok(handle)
    }

    pub(crate) fn as_ptr(&self) -> *mut ffi::sqlite3 {
        self.db.as_ptr()
    }

    /// The message of the most recent failed call on this handle.
    pub(crate) fn errmsg(&self) -> String {
        // SAFETY: db is valid; the message is copied before any other call
        unsafe { ffi::owned_string(ffi::sqlite3_errmsg(self.as_ptr())) }
            .unwrap_or_else(|| "unknown error".to_string())
    }

    /// Run one or more statements without results.
    pub(crate) fn exec(&self, sql: &str) -> Result<(), Error> {
        let c_sql = CString::new(sql).map_err(|_| nul_in_sql(sql))?;
        let mut errmsg: *mut c_char = ptr::null_mut();

        // SAFETY: db and c_sql are valid; errmsg receives a library allocation
        let rc = unsafe {
            ffi::sqlite3_exec(
                self.as_ptr(),
                c_sql.as_ptr(),
                None,
                ptr::null_mut(),
                &raw mut errmsg,
            )
        };

        if rc == ffi::SQLITE_OK {
            return Ok(());
        }

        // SAFETY: errmsg is null or a NUL-terminated string we now own
        let message = unsafe { ffi::owned_string(errmsg) }.unwrap_or_else(|| self.errmsg());
        if !errmsg.is_null() {
            // SAFETY: errmsg was allocated by sqlite3_exec
            unsafe { ffi::sqlite3_free(errmsg.cast()) };
        }
        Err(native_error(rc, &message, sql))
    }

    /// The error for a failed call whose status was `rc`.
    pub(crate) fn error(&self, rc: c_int, sql: &str) -> Error {
        native_error(rc, &self.errmsg(), sql)
    }

    /// Rows modified by the most recent INSERT, UPDATE or DELETE.
    pub(crate) fn changes(&self) -> i64 {
        // SAFETY: db is valid
        i64::from(unsafe { ffi::sqlite3_changes(self.as_ptr()) })
    }

    /// Rowid of the most recent successful INSERT.
    pub(crate) fn last_insert_rowid(&self) -> i64 {
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_last_insert_rowid(self.as_ptr()) }
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        // SAFETY: db is valid and not used after this call
        let rc = unsafe { ffi::sqlite3_close_v2(self.as_ptr()) };
        if rc != ffi::SQLITE_OK {
            tracing::warn!(code = rc, error = ffi::error_string(rc), "sqlite3_close_v2 failed");
        }
    }
}

/// Classify a native result code.
pub(crate) fn error_code_to_kind(code: c_int) -> QueryErrorKind {
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH => QueryErrorKind::Permission,
        ffi::SQLITE_TOOBIG => QueryErrorKind::DataTruncation,
        ffi::SQLITE_INTERRUPT => QueryErrorKind::Cancelled,
        _ => QueryErrorKind::Database,
    }
}

/// A database error carrying the native status string and message.
///
/// The message is appended only when it adds to the status string.
pub(crate) fn native_error(code: c_int, message: &str, sql: &str) -> Error {
    let status = ffi::error_string(code);
    let message = if message.is_empty() || message == status {
        status.to_string()
    } else {
        format!("{status}: {message}")
    };
    Error::Query(QueryError {
        kind: error_code_to_kind(code),
        sql: Some(sql.to_string()),
        code: Some(code),
        message,
    })
}

pub(crate) fn nul_in_sql(sql: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Database,
        sql: Some(sql.to_string()),
        code: None,
        message: "SQL contains a NUL byte".to_string(),
    })
}

fn connect_error(message: String) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Connect,
        message,
        source: None,
    })
}

/// State guarded by the session mutex.
#[derive(Default)]
pub(crate) struct SessionState {
    /// Present iff the connection is open
    pub(crate) handle: Option<NativeHandle>,
    pub(crate) transaction: TransactionState,
}

impl SessionState {
    /// The open handle, or the "not connected" error.
    pub(crate) fn handle(&self) -> Result<&NativeHandle, Error> {
        self.handle.as_ref().ok_or_else(Error::not_connected)
    }
}

/// A connection's native state, shared with its statements and streams.
///
/// Every worker job locks the session for its whole duration, so calls on
/// one handle never overlap. When a statement is also needed, the session is
/// always locked first.
#[derive(Clone, Default)]
pub(crate) struct Session {
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn same_as(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> NativeHandle {
        NativeHandle::open(&Location::InMemory, OpenFlags::default(), 200).expect("open memory db")
    }

    #[test]
    fn test_open_and_exec() {
        let handle = memory();
        handle.exec("CREATE TABLE t (a INTEGER)").unwrap();
        handle.exec("INSERT INTO t VALUES (1); INSERT INTO t VALUES (2)").unwrap();
        assert_eq!(handle.changes(), 1);
        assert_eq!(handle.last_insert_rowid(), 2);
    }

    #[test]
    fn test_exec_error_carries_native_text() {
        let handle = memory();
        let err = handle.exec("SELECT * FROM missing").unwrap_err();
        assert!(err.is_database());
        assert_eq!(err.code(), Some(ffi::SQLITE_ERROR));
        let text = err.to_string();
        assert!(text.contains("SQL logic error"), "{text}");
        assert!(text.contains("no such table: missing"), "{text}");
    }

    #[test]
    fn test_native_message_not_repeated() {
        let busy = native_error(ffi::SQLITE_BUSY, "database is locked", "INSERT INTO t VALUES (1)");
        assert_eq!(busy.to_string(), "Database error: database is locked (code 5)");
        let detailed = native_error(ffi::SQLITE_ERROR, "near \"SELEC\": syntax error", "SELEC");
        assert!(detailed.to_string().contains("SQL logic error: near"));
    }

    #[test]
    fn test_open_failure_is_connection_error() {
        let location = Location::Uri("/nonexistent-dir/for/sure/db.sqlite".to_string());
        let err = NativeHandle::open(&location, OpenFlags::read_write(), 200)
            .err()
            .expect("open must fail");
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(error_code_to_kind(ffi::SQLITE_CONSTRAINT), QueryErrorKind::Constraint);
        assert_eq!(error_code_to_kind(ffi::SQLITE_BUSY), QueryErrorKind::Busy);
        assert_eq!(error_code_to_kind(ffi::SQLITE_LOCKED), QueryErrorKind::Busy);
        assert_eq!(error_code_to_kind(ffi::SQLITE_ERROR), QueryErrorKind::Database);
        // extended codes classify by their primary code
        assert_eq!(error_code_to_kind(ffi::SQLITE_CONSTRAINT | (8 << 8)), QueryErrorKind::Constraint);
    }

    #[test]
    fn test_session_not_connected() {
        let session = Session::default();
        let state = session.lock();
        assert!(state.handle().unwrap_err().is_connection_error());
        assert!(session.same_as(&session.clone()));
        assert!(!session.same_as(&Session::default()));
    }
}

//! Low-level access to libsqlite3.
//!
//! The raw declarations come from `libsqlite3-sys`, built against the bundled
//! amalgamation. This module narrows them to the surface the driver needs and
//! adds safe wrappers for the library's static strings.

use std::ffi::{CStr, c_char, c_int};

pub use libsqlite3_sys::{
    SQLITE_AUTH, SQLITE_BLOB, SQLITE_BUSY, SQLITE_CONSTRAINT, SQLITE_DONE, SQLITE_ERROR,
    SQLITE_FLOAT, SQLITE_INTEGER, SQLITE_INTERRUPT, SQLITE_LOCKED, SQLITE_MISUSE, SQLITE_NULL,
    SQLITE_OK, SQLITE_OPEN_CREATE, SQLITE_OPEN_FULLMUTEX, SQLITE_OPEN_MEMORY,
    SQLITE_OPEN_PRIVATECACHE, SQLITE_OPEN_READONLY, SQLITE_OPEN_READWRITE,
    SQLITE_OPEN_SHAREDCACHE, SQLITE_OPEN_URI, SQLITE_PERM, SQLITE_RANGE, SQLITE_ROW, SQLITE_TEXT,
    SQLITE_TOOBIG, SQLITE_TRANSIENT, sqlite3, sqlite3_bind_blob, sqlite3_bind_double,
    sqlite3_bind_int, sqlite3_bind_int64, sqlite3_bind_null, sqlite3_bind_parameter_count,
    sqlite3_bind_parameter_index, sqlite3_bind_text, sqlite3_busy_timeout, sqlite3_changes,
    sqlite3_clear_bindings, sqlite3_column_blob, sqlite3_column_bytes,
    sqlite3_column_count, sqlite3_column_double, sqlite3_column_int64, sqlite3_column_name,
    sqlite3_column_text, sqlite3_column_type, sqlite3_errcode, sqlite3_errmsg, sqlite3_errstr,
    sqlite3_exec, sqlite3_finalize, sqlite3_free, sqlite3_last_insert_rowid,
    sqlite3_libversion, sqlite3_libversion_number, sqlite3_open_v2, sqlite3_prepare_v2,
    sqlite3_reset, sqlite3_step, sqlite3_stmt,
};

// libsqlite3-sys leaves close_v2 out of its generated bindings. The symbol is
// still exported by the bundled library it links.
unsafe extern "C" {
    pub fn sqlite3_close_v2(db: *mut sqlite3) -> c_int;
}

/// Get the SQLite library version as a string.
pub fn version() -> &'static str {
    // SAFETY: sqlite3_libversion returns a static string
    unsafe { static_str(sqlite3_libversion()) }.unwrap_or("unknown")
}

/// Get the SQLite library version as a number (`3XXYYZZ`).
pub fn version_number() -> i32 {
    // SAFETY: sqlite3_libversion_number is always safe to call
    unsafe { sqlite3_libversion_number() }
}

/// Convert an SQLite result code to its English description.
pub fn error_string(code: c_int) -> &'static str {
    // SAFETY: sqlite3_errstr returns a static string for every code
    unsafe { static_str(sqlite3_errstr(code)) }.unwrap_or("unknown error")
}

/// Borrow a NUL-terminated string owned by the library for its lifetime.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that is never freed.
unsafe fn static_str(ptr: *const c_char) -> Option<&'static str> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: guaranteed by the caller
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

/// Copy a library-owned C string into an owned `String`.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string valid for the call.
pub(crate) unsafe fn owned_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: guaranteed by the caller
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

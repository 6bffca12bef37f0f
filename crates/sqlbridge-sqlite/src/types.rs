//! Conversion between `Value` and native SQLite storage.
//!
//! # Binding
//!
//! | Value | Native call |
//! |-------|-------------|
//! | `Null` | `sqlite3_bind_null` |
//! | `Int` | `sqlite3_bind_int` |
//! | `BigInt` | `sqlite3_bind_int64` |
//! | `Float`, `Double` | `sqlite3_bind_double` |
//! | `Text` | `sqlite3_bind_text`, copied |
//! | `Bytes` | `sqlite3_bind_blob`, copied |
//!
//! `Json` and `Array` have no native storage class and are rejected.
//!
//! # Reading
//!
//! Columns decode by their runtime storage class: INTEGER to `BigInt`, FLOAT
//! to `Double`, TEXT to `Text`, BLOB to `Bytes`, everything else to `Null`.

use crate::ffi;
use crate::handle::NativeHandle;
use sqlbridge_core::error::{QueryError, QueryErrorKind};
use sqlbridge_core::row::ColumnInfo;
use sqlbridge_core::{Error, Params, Result, Row, Substitutions, Value};
use std::ffi::{CString, c_int};
use std::sync::Arc;

/// Bind a single value to a parameter slot.
///
/// Returns the native status of the bind call, or an error before any native
/// call when the value cannot be bound at all.
///
/// # Safety
///
/// `stmt` must be a valid, unfinalized statement handle.
pub(crate) unsafe fn bind_value(
    stmt: *mut ffi::sqlite3_stmt,
    index: c_int,
    value: &Value,
) -> Result<c_int> {
    // SAFETY: stmt is valid per the caller; text and blob buffers are copied
    // by the library (SQLITE_TRANSIENT) before the call returns.
    let rc = unsafe {
        match value {
            Value::Null => ffi::sqlite3_bind_null(stmt, index),
            Value::Int(v) => ffi::sqlite3_bind_int(stmt, index, *v),
            Value::BigInt(v) => ffi::sqlite3_bind_int64(stmt, index, *v),
            Value::Float(v) => ffi::sqlite3_bind_double(stmt, index, f64::from(*v)),
            Value::Double(v) => ffi::sqlite3_bind_double(stmt, index, *v),
            Value::Text(s) => ffi::sqlite3_bind_text(
                stmt,
                index,
                s.as_ptr().cast(),
                native_len(s.len())?,
                ffi::SQLITE_TRANSIENT(),
            ),
            Value::Bytes(b) => ffi::sqlite3_bind_blob(
                stmt,
                index,
                b.as_ptr().cast(),
                native_len(b.len())?,
                ffi::SQLITE_TRANSIENT(),
            ),
            Value::Json(_) | Value::Array(_) => {
                return Err(Error::Unsupported(format!(
                    "cannot bind a {} parameter",
                    value.type_name()
                )));
            }
        }
    };
    Ok(rc)
}

fn native_len(len: usize) -> Result<c_int> {
    c_int::try_from(len).map_err(|_| {
        Error::Query(QueryError {
            kind: QueryErrorKind::DataTruncation,
            sql: None,
            code: Some(ffi::SQLITE_TOOBIG),
            message: format!("parameter of {len} bytes exceeds the native size limit"),
        })
    })
}

/// Bind every parameter of `params`.
///
/// Positional values go to slots `1..=n`. Named values are looked up with the
/// dialect's named-parameter marker (`@name`); a name that already carries a
/// marker is used as written.
///
/// # Safety
///
/// `stmt` must be a valid statement prepared on `handle`.
pub(crate) unsafe fn bind_params(
    stmt: *mut ffi::sqlite3_stmt,
    handle: &NativeHandle,
    params: &Params,
    substitutions: &Substitutions,
    sql: &str,
) -> Result<()> {
    match params {
        Params::None => Ok(()),
        Params::Positional(values) => {
            for (i, value) in values.iter().enumerate() {
                let index = c_int::try_from(i + 1)
                    .map_err(|_| bind_failure(sql, None, format!("too many parameters ({})", values.len())))?;
                // SAFETY: stmt is valid per the caller
                unsafe { bind_at(stmt, handle, index, value, &index.to_string(), sql) }?;
            }
            Ok(())
        }
        Params::Named(pairs) => {
            for (name, value) in pairs {
                let key = if name.starts_with([':', '@', '$']) {
                    name.clone()
                } else {
                    substitutions.named_parameter(name)
                };
                let c_key = CString::new(key.as_str())
                    .map_err(|_| bind_failure(sql, None, format!("parameter name '{key}' contains a NUL byte")))?;
                // SAFETY: stmt is valid and c_key is NUL-terminated
                let index = unsafe { ffi::sqlite3_bind_parameter_index(stmt, c_key.as_ptr()) };
                if index == 0 {
                    return Err(bind_failure(
                        sql,
                        None,
                        format!("unknown named parameter '{key}'"),
                    ));
                }
                // SAFETY: stmt is valid per the caller
                unsafe { bind_at(stmt, handle, index, value, &key, sql) }?;
            }
            Ok(())
        }
    }
}

unsafe fn bind_at(
    stmt: *mut ffi::sqlite3_stmt,
    handle: &NativeHandle,
    index: c_int,
    value: &Value,
    label: &str,
    sql: &str,
) -> Result<()> {
    // SAFETY: forwarded from the caller
    let rc = unsafe { bind_value(stmt, index, value) }.inspect_err(|e| {
        tracing::warn!(parameter = label, error = %e, "parameter rejected");
    })?;
    if rc != ffi::SQLITE_OK {
        return Err(bind_failure(
            sql,
            Some(rc),
            format!(
                "Failed to bind parameter {}: {}: {}",
                label,
                ffi::error_string(rc),
                handle.errmsg()
            ),
        ));
    }
    Ok(())
}

fn bind_failure(sql: &str, code: Option<c_int>, message: String) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Bind,
        sql: Some(sql.to_string()),
        code,
        message,
    })
}

/// Read one column of the current row.
///
/// # Safety
///
/// `stmt` must be a valid statement positioned on a row, and `index` within
/// its column count.
pub(crate) unsafe fn read_column(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Value {
    // SAFETY: guaranteed by the caller; pointers returned by the library stay
    // valid until the next step, and are copied before that.
    unsafe {
        match ffi::sqlite3_column_type(stmt, index) {
            ffi::SQLITE_INTEGER => Value::BigInt(ffi::sqlite3_column_int64(stmt, index)),
            ffi::SQLITE_FLOAT => Value::Double(ffi::sqlite3_column_double(stmt, index)),
            ffi::SQLITE_TEXT => {
                let ptr = ffi::sqlite3_column_text(stmt, index);
                if ptr.is_null() {
                    return Value::Null;
                }
                let len = ffi::sqlite3_column_bytes(stmt, index);
                let bytes = std::slice::from_raw_parts(ptr, usize::try_from(len).unwrap_or(0));
                Value::Text(String::from_utf8_lossy(bytes).into_owned())
            }
            ffi::SQLITE_BLOB => {
                let ptr = ffi::sqlite3_column_blob(stmt, index);
                if ptr.is_null() {
                    return Value::Null;
                }
                let len = ffi::sqlite3_column_bytes(stmt, index);
                let bytes =
                    std::slice::from_raw_parts(ptr.cast::<u8>(), usize::try_from(len).unwrap_or(0));
                Value::Bytes(bytes.to_vec())
            }
            _ => Value::Null,
        }
    }
}

/// Column titles of a statement, in result order.
///
/// # Safety
///
/// `stmt` must be a valid statement.
pub(crate) unsafe fn column_titles(stmt: *mut ffi::sqlite3_stmt) -> Vec<String> {
    // SAFETY: guaranteed by the caller
    let count = unsafe { ffi::sqlite3_column_count(stmt) };
    (0..count)
        .map(|i| {
            // SAFETY: i is below the column count
            unsafe { ffi::owned_string(ffi::sqlite3_column_name(stmt, i)) }
                .unwrap_or_else(|| format!("column{i}"))
        })
        .collect()
}

/// Read the current row.
///
/// # Safety
///
/// `stmt` must be positioned on a row and `columns` must describe it.
pub(crate) unsafe fn read_row(stmt: *mut ffi::sqlite3_stmt, columns: &Arc<ColumnInfo>) -> Row {
    let count = c_int::try_from(columns.len()).unwrap_or(c_int::MAX);
    // SAFETY: i is below the column count
    let values = (0..count).map(|i| unsafe { read_column(stmt, i) }).collect();
    Row::with_columns(Arc::clone(columns), values)
}

//! SQLite driver for sqlbridge.
//!
//! This crate implements the `Connection` trait from sqlbridge-core on top of
//! libsqlite3 (compiled from the bundled amalgamation by `libsqlite3-sys`).
//!
//! # Features
//!
//! - Structured and raw requests with positional or named parameters
//! - Lazily fetched result rows with exact column decoding
//! - Durable prepared statements
//! - Transactions with savepoints, guarded by a state machine
//! - Blocking native calls isolated on a worker pool
//! - In-memory, temporary and file-based databases
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlbridge_core::{Request, QueryResult};
//! use sqlbridge_sqlite::{SqliteConfig, SqliteConnection, WorkerPool};
//!
//! let workers = WorkerPool::with_defaults()?;
//! let conn = SqliteConnection::open(SqliteConfig::memory(), workers)?;
//! conn.execute_blocking(Request::raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)"))
//!     .into_result()?;
//! conn.execute_blocking(Request::raw("INSERT INTO users (name) VALUES (@name)").bind_named([("name", "Alice")]))
//!     .into_result()?;
//! if let QueryResult::Rows(mut rows) = conn.execute_blocking(Request::raw("SELECT id, name FROM users")) {
//!     for row in rows.collect_rows_blocking()? {
//!         println!("{:?}", row.get_by_name("name"));
//!     }
//! }
//! ```
//!
//! # Type Mapping
//!
//! | Value | Bound as | Read back as |
//! |-------|----------|--------------|
//! | `Int(i32)` | INTEGER | `BigInt` |
//! | `BigInt(i64)` | INTEGER | `BigInt` |
//! | `Float(f32)` | REAL | `Double` |
//! | `Double(f64)` | REAL | `Double` |
//! | `Text` | TEXT | `Text` |
//! | `Bytes` | BLOB | `Bytes` |
//! | `Null` | NULL | `Null` |
//! | `Json`, `Array` | unsupported | |
//!
//! # Thread Safety
//!
//! `SqliteConnection` is both `Send` and `Sync`. The native handle sits behind
//! a mutex held by every job, and is opened in serialized mode.

#![allow(unsafe_code)]
#![allow(clippy::result_large_err)]
#![allow(clippy::borrow_as_ptr)]

pub mod config;
pub mod connection;
pub mod dialect;
pub mod ffi;
mod handle;
pub mod pool;
mod statement;
pub mod stream;
pub mod transaction;
mod types;
pub mod worker;

pub use config::{Location, OpenFlags, SqliteConfig};
pub use connection::{PreparedStatement, SqliteConnection};
pub use dialect::{SqliteColumnBuilder, sqlite_substitutions};
pub use pool::create_pool;
pub use stream::ResultStream;
pub use transaction::{TransactionCommand, TransactionState};
pub use worker::{Completion, WorkerPool, WorkerPoolConfig};

/// Re-export the SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

/// Re-export the SQLite library version number.
pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}

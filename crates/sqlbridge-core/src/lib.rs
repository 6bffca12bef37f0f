//! Core types and traits for sqlbridge.
//!
//! This crate provides the protocol shared by query builders and drivers:
//!
//! - `Value` and `Row` for data crossing the driver boundary
//! - `Query` contract and the dialect `Substitutions` table
//! - `Connection` and `ResultFetcher` traits implemented by drivers
//! - `QueryResult` produced by every execution call
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod connection;
pub mod dialect;
pub mod error;
pub mod query;
pub mod result;
pub mod row;
pub mod types;
pub mod value;

pub use connection::{Connection, Params, Request, ResultFetcher, Source};
pub use dialect::{ColumnBuilder, StandardColumnBuilder, Substitution, Substitutions};
pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, Error, PoolError, PoolErrorKind,
    QueryError, QueryErrorKind, Result, TransactionError, TransactionErrorKind, TypeError,
};
pub use query::{Query, ReturnId};
pub use result::QueryResult;
pub use row::{ColumnInfo, FromValue, Row};
pub use types::{ColumnDefault, ColumnSpec, SqlType};
pub use value::Value;

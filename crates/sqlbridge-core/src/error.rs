//! Error types for sqlbridge operations.

use std::fmt;

/// The primary error type for all sqlbridge operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (open failure, not connected)
    Connection(ConnectionError),
    /// Query errors: builder rejections (`Syntax`) and native failures
    Query(QueryError),
    /// Typed row access errors
    Type(TypeError),
    /// Transaction state machine violations
    Transaction(TransactionError),
    /// Pool errors
    Pool(PoolError),
    /// Configuration errors
    Config(ConfigError),
    /// Operation or parameter type not handled by the driver
    Unsupported(String),
    /// A completion was dropped without ever producing a result
    NoResult,
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to open the database
    Connect,
    /// Operation attempted without an open handle
    NotConnected,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    /// Native result code, when the failure came from the engine
    pub code: Option<i32>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// The query builder rejected the query
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Database locked by another connection
    Busy,
    /// Permission denied
    Permission,
    /// Data too large
    DataTruncation,
    /// Interrupted by the engine
    Cancelled,
    /// Parameter binding failed
    Bind,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
    pub rust_type: Option<&'static str>,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// A transaction is already active
    AlreadyActive,
    /// No transaction is active
    NotActive,
}

#[derive(Debug)]
pub struct PoolError {
    pub kind: PoolErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolErrorKind {
    /// The generator could not produce a connection
    Exhausted,
    /// Connection checkout timeout
    Timeout,
    /// Pool is closed
    Closed,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Build a syntax error (query builder rejection).
    pub fn syntax(message: impl Into<String>) -> Self {
        Error::Query(QueryError {
            kind: QueryErrorKind::Syntax,
            sql: None,
            code: None,
            message: message.into(),
        })
    }

    /// Build the "not connected" connection error.
    pub fn not_connected() -> Self {
        Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::NotConnected,
            message: "Not connected".to_string(),
            source: None,
        })
    }

    /// Is this a retryable error (busy database, pool exhaustion, timeouts)?
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Query(q) => q.kind == QueryErrorKind::Busy,
            Error::Pool(p) => matches!(p.kind, PoolErrorKind::Exhausted | PoolErrorKind::Timeout),
            _ => false,
        }
    }

    /// Is this a syntax error produced while building a query?
    pub fn is_syntax(&self) -> bool {
        matches!(self, Error::Query(q) if q.kind == QueryErrorKind::Syntax)
    }

    /// Is this an error reported by the native engine?
    pub fn is_database(&self) -> bool {
        matches!(self, Error::Query(q) if q.kind != QueryErrorKind::Syntax)
    }

    /// Is this a connection error that likely requires reconnection?
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Get the native result code, if available.
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Query(q) => q.code,
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) if e.kind == QueryErrorKind::Syntax => {
                write!(f, "Syntax error: {}", e.message)
            }
            Error::Query(e) => write!(f, "Database error: {}", e),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::Pool(e) => write!(f, "Pool error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            Error::NoResult => write!(f, "Operation completed without producing a result"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code {
            write!(f, "{} (code {})", self.message, code)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::Transaction(err)
    }
}

impl From<PoolError> for Error {
    fn from(err: PoolError) -> Self {
        Error::Pool(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for sqlbridge operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_and_database_classification() {
        let syntax = Error::syntax("duplicate column 'a'");
        assert!(syntax.is_syntax());
        assert!(!syntax.is_database());
        assert_eq!(syntax.to_string(), "Syntax error: duplicate column 'a'");

        let db = Error::Query(QueryError {
            kind: QueryErrorKind::Database,
            sql: Some("SELECT * FROM missing".to_string()),
            code: Some(1),
            message: "SQL logic error: no such table: missing".to_string(),
        });
        assert!(db.is_database());
        assert_eq!(db.code(), Some(1));
        assert_eq!(db.sql(), Some("SELECT * FROM missing"));
        assert!(db.to_string().starts_with("Database error: SQL logic error"));
    }

    #[test]
    fn retryable_and_connection_flags() {
        let busy = Error::Query(QueryError {
            kind: QueryErrorKind::Busy,
            sql: None,
            code: Some(5),
            message: "database is locked".to_string(),
        });
        assert!(busy.is_retryable());

        let pool_timeout = Error::Pool(PoolError {
            kind: PoolErrorKind::Timeout,
            message: "timed out".to_string(),
        });
        assert!(pool_timeout.is_retryable());

        let not_connected = Error::not_connected();
        assert!(not_connected.is_connection_error());
        assert!(!not_connected.is_retryable());
    }

    #[test]
    fn transaction_and_unsupported_display() {
        let err = Error::Transaction(TransactionError {
            kind: TransactionErrorKind::NotActive,
            message: "No transaction in progress".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Transaction error: No transaction in progress"
        );
        assert_eq!(
            Error::Unsupported("bind of ARRAY".into()).to_string(),
            "Unsupported: bind of ARRAY"
        );
    }
}

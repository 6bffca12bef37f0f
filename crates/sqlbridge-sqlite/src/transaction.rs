//! Transaction and savepoint state machine.
//!
//! A connection is either idle or inside one transaction. Every command
//! checks the state before touching the database and only moves it once the
//! native command succeeded.
//!
//! | Command | Requires | Sends | Leaves |
//! |---------|----------|-------|--------|
//! | begin | idle | `BEGIN TRANSACTION` | active |
//! | commit | active | `END TRANSACTION` | idle |
//! | rollback | active | `ROLLBACK` | idle |
//! | savepoint | active | `SAVEPOINT <name>` | active |
//! | rollback to | active | `ROLLBACK TO <name>` | active |
//! | release | active | `RELEASE SAVEPOINT <name>` | active |
//!
//! Savepoint names are sent verbatim; callers must not pass untrusted input.

use crate::handle::NativeHandle;
use sqlbridge_core::error::{QueryError, TransactionError, TransactionErrorKind};
use sqlbridge_core::{Error, Result};

/// Whether a transaction is open on the connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransactionState {
    #[default]
    Idle,
    Active,
}

/// A transaction control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionCommand {
    Begin,
    Commit,
    Rollback,
    Savepoint(String),
    RollbackTo(String),
    ReleaseSavepoint(String),
}

impl TransactionCommand {
    /// The SQL sent for this command.
    pub fn sql(&self) -> String {
        match self {
            TransactionCommand::Begin => "BEGIN TRANSACTION".to_string(),
            TransactionCommand::Commit => "END TRANSACTION".to_string(),
            TransactionCommand::Rollback => "ROLLBACK".to_string(),
            TransactionCommand::Savepoint(name) => format!("SAVEPOINT {name}"),
            TransactionCommand::RollbackTo(name) => format!("ROLLBACK TO {name}"),
            TransactionCommand::ReleaseSavepoint(name) => format!("RELEASE SAVEPOINT {name}"),
        }
    }

    /// State the connection must be in.
    pub const fn requires(&self) -> TransactionState {
        match self {
            TransactionCommand::Begin => TransactionState::Idle,
            _ => TransactionState::Active,
        }
    }

    /// State after the command succeeds.
    pub const fn leaves(&self) -> TransactionState {
        match self {
            TransactionCommand::Commit | TransactionCommand::Rollback => TransactionState::Idle,
            _ => TransactionState::Active,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            TransactionCommand::Begin => "begin transaction",
            TransactionCommand::Commit => "commit",
            TransactionCommand::Rollback => "rollback",
            TransactionCommand::Savepoint(_) => "create savepoint",
            TransactionCommand::RollbackTo(_) => "rollback to savepoint",
            TransactionCommand::ReleaseSavepoint(_) => "release savepoint",
        }
    }
}

impl TransactionState {
    pub fn is_active(self) -> bool {
        self == TransactionState::Active
    }

    /// Check that `command` may run in this state.
    pub fn check(self, command: &TransactionCommand) -> Result<()> {
        if self == command.requires() {
            return Ok(());
        }
        let (kind, message) = match self {
            TransactionState::Active => (
                TransactionErrorKind::AlreadyActive,
                format!("cannot {}: a transaction is already active", command.label()),
            ),
            TransactionState::Idle => (
                TransactionErrorKind::NotActive,
                format!("cannot {}: no transaction is active", command.label()),
            ),
        };
        Err(Error::Transaction(TransactionError { kind, message }))
    }

    /// Run `command` on `handle`, moving the state only on success.
    pub(crate) fn apply(&mut self, handle: &NativeHandle, command: &TransactionCommand) -> Result<()> {
        self.check(command)?;

        let sql = command.sql();
        if let Err(err) = handle.exec(&sql) {
            tracing::debug!(sql = %sql, error = %err, "transaction command failed");
            return Err(match err {
                Error::Query(q) => Error::Query(QueryError {
                    message: format!("{} failed: {}", command.label(), q.message),
                    ..q
                }),
                other => other,
            });
        }

        let next = command.leaves();
        tracing::debug!(sql = %sql, from = ?*self, to = ?next, "transaction state");
        *self = next;
        Ok(())
    }
}

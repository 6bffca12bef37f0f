//! The query builder contract consumed by drivers.

use crate::dialect::Substitutions;
use crate::error::Result;

/// How an insert wants its generated identifier reported.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReturnId {
    /// No generated identifier requested.
    #[default]
    None,
    /// Report the identifier generated for this auto-increment key column.
    AutoIncrement(String),
    /// An identifier was requested but the target table has no column that
    /// is both primary key and auto-increment.
    Unavailable(String),
}

/// A structured query that renders itself to dialect SQL.
///
/// Implementors must not assume a live connection: `build` is called by
/// `description_of` as well as by execution, and must be free of side effects.
pub trait Query: Send + Sync {
    /// Render SQL text using the dialect's substitution table.
    ///
    /// Builder rejections are returned as syntax errors.
    fn build(&self, substitutions: &Substitutions) -> Result<String>;

    /// Generated-identifier request carried by this query.
    fn return_id(&self) -> ReturnId {
        ReturnId::None
    }
}

impl<Q: Query + ?Sized> Query for &Q {
    fn build(&self, substitutions: &Substitutions) -> Result<String> {
        (**self).build(substitutions)
    }

    fn return_id(&self) -> ReturnId {
        (**self).return_id()
    }
}

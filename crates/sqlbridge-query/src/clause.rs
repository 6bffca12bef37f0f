//! SQL clause types (WHERE, ORDER BY, LIMIT, etc.)

use crate::expr::Expr;
use sqlbridge_core::{Result, Substitutions};

/// WHERE clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Where {
    expr: Expr,
}

impl Where {
    /// Create a new WHERE clause with the given expression.
    pub fn new(expr: Expr) -> Self {
        Self { expr }
    }

    /// Add an AND condition.
    pub fn and(self, expr: Expr) -> Self {
        Self {
            expr: self.expr.and(expr),
        }
    }

    /// Add an OR condition.
    pub fn or(self, expr: Expr) -> Self {
        Self {
            expr: self.expr.or(expr),
        }
    }

    /// Render the condition (without the `WHERE` keyword).
    pub fn build(&self, subs: &Substitutions) -> Result<String> {
        self.expr.build(subs)
    }

    /// Merge a condition into an optional clause.
    pub fn merge(existing: Option<Where>, expr: Expr) -> Where {
        match existing {
            Some(w) => w.and(expr),
            None => Where::new(expr),
        }
    }
}

/// ORDER BY term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub(crate) expr: Expr,
    pub(crate) direction: OrderDirection,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderBy {
    pub(crate) fn new(expr: Expr, direction: OrderDirection) -> Self {
        Self { expr, direction }
    }

    /// Create an ascending order by a column.
    pub fn asc(column: impl Into<String>) -> Self {
        Self::new(Expr::col(column), OrderDirection::Asc)
    }

    /// Create a descending order by a column.
    pub fn desc(column: impl Into<String>) -> Self {
        Self::new(Expr::col(column), OrderDirection::Desc)
    }

    /// Generate SQL for this ORDER BY term.
    pub fn build(&self, subs: &Substitutions) -> Result<String> {
        let mut sql = self.expr.build(subs)?;
        sql.push_str(match self.direction {
            OrderDirection::Asc => " ASC",
            OrderDirection::Desc => " DESC",
        });
        Ok(sql)
    }
}

/// LIMIT clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit(pub u64);

/// OFFSET clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset(pub u64);

//! SELECT query builder.

use crate::clause::{Limit, Offset, OrderBy, Where};
use crate::expr::Expr;
use sqlbridge_core::{Error, Query, Result, Substitutions};

/// One entry of a SELECT list.
#[derive(Debug, Clone, PartialEq)]
struct Projection {
    expr: Expr,
    alias: Option<String>,
}

/// A SELECT query builder.
///
/// Provides a fluent API for building SELECT queries; rendering happens
/// through [`Query::build`] with the connection's substitution table.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    /// Source table (a table-less SELECT evaluates expressions only)
    table: Option<String>,
    /// Columns to select (empty = all)
    columns: Vec<Projection>,
    /// WHERE clause conditions
    where_clause: Option<Where>,
    /// ORDER BY clauses
    order_by: Vec<OrderBy>,
    /// LIMIT clause
    limit: Option<Limit>,
    /// OFFSET clause
    offset: Option<Offset>,
    /// GROUP BY columns
    group_by: Vec<String>,
    /// DISTINCT flag
    distinct: bool,
}

impl Select {
    /// Create a new SELECT query reading from `table`.
    pub fn from_table(table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            ..Self::expressions()
        }
    }

    /// Create a SELECT with no FROM clause.
    pub fn expressions() -> Self {
        Self {
            table: None,
            columns: Vec::new(),
            where_clause: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            group_by: Vec::new(),
            distinct: false,
        }
    }

    /// Select specific columns.
    pub fn columns(mut self, cols: &[&str]) -> Self {
        self.columns = cols
            .iter()
            .map(|&c| Projection {
                expr: Expr::col(c),
                alias: None,
            })
            .collect();
        self
    }

    /// Add a column to the SELECT list.
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(Projection {
            expr: Expr::col(name),
            alias: None,
        });
        self
    }

    /// Add an aliased expression to the SELECT list.
    pub fn expr_as(mut self, expr: Expr, alias: impl Into<String>) -> Self {
        self.columns.push(Projection {
            expr,
            alias: Some(alias.into()),
        });
        self
    }

    /// Add a WHERE condition.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = Some(Where::merge(self.where_clause, expr));
        self
    }

    /// Add an OR WHERE condition.
    pub fn or_filter(mut self, expr: Expr) -> Self {
        self.where_clause = Some(match self.where_clause {
            Some(existing) => existing.or(expr),
            None => Where::new(expr),
        });
        self
    }

    /// Add ORDER BY clause.
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Add GROUP BY columns.
    pub fn group_by(mut self, cols: &[&str]) -> Self {
        self.group_by.extend(cols.iter().map(|&s| s.to_string()));
        self
    }

    /// Set LIMIT.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(Limit(n));
        self
    }

    /// Set OFFSET.
    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(Offset(n));
        self
    }

    /// Make this a DISTINCT query.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}

impl Query for Select {
    fn build(&self, subs: &Substitutions) -> Result<String> {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }

        if self.columns.is_empty() {
            if self.table.is_none() {
                return Err(Error::syntax("SELECT without a table needs at least one expression"));
            }
            sql.push('*');
        } else {
            let mut parts = Vec::with_capacity(self.columns.len());
            for p in &self.columns {
                let mut part = p.expr.build(subs)?;
                if let Some(alias) = &p.alias {
                    part.push_str(" AS ");
                    part.push_str(&subs.quote_identifier(alias));
                }
                parts.push(part);
            }
            sql.push_str(&parts.join(", "));
        }

        if let Some(table) = &self.table {
            sql.push_str(" FROM ");
            sql.push_str(&subs.quote_identifier(table));
        }

        if let Some(w) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&w.build(subs)?);
        }

        if !self.group_by.is_empty() {
            let cols: Vec<_> = self
                .group_by
                .iter()
                .map(|c| subs.quote_identifier(c))
                .collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&cols.join(", "));
        }

        if !self.order_by.is_empty() {
            let terms = self
                .order_by
                .iter()
                .map(|o| o.build(subs))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        match (self.limit, self.offset) {
            (Some(Limit(n)), Some(Offset(o))) => sql.push_str(&format!(" LIMIT {} OFFSET {}", n, o)),
            (Some(Limit(n)), None) => sql.push_str(&format!(" LIMIT {}", n)),
            // SQL requires a LIMIT before OFFSET; -1 means unbounded
            (None, Some(Offset(o))) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", o)),
            (None, None) => {}
        }

        tracing::trace!(sql = %sql, "built SELECT");
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_all() {
        let subs = Substitutions::default();
        let sql = Select::from_table("heroes").build(&subs).unwrap();
        assert_eq!(sql, "SELECT * FROM \"heroes\"");
    }

    #[test]
    fn test_select_full() {
        let subs = Substitutions::default();
        let sql = Select::from_table("t")
            .columns(&["a", "b"])
            .filter(Expr::col("a").gt(Expr::param()))
            .filter(Expr::col("b").is_not_null())
            .order_by(OrderBy::desc("a"))
            .limit(10)
            .offset(5)
            .distinct()
            .build(&subs)
            .unwrap();
        assert_eq!(
            sql,
            "SELECT DISTINCT \"a\", \"b\" FROM \"t\" WHERE \"a\" > ? AND \"b\" IS NOT NULL \
             ORDER BY \"a\" DESC LIMIT 10 OFFSET 5"
        );
    }

    #[test]
    fn test_group_by_with_alias() {
        let subs = Substitutions::default();
        let sql = Select::from_table("t")
            .column("kind")
            .expr_as(Expr::count_star(), "n")
            .group_by(&["kind"])
            .build(&subs)
            .unwrap();
        assert_eq!(
            sql,
            "SELECT \"kind\", COUNT(*) AS \"n\" FROM \"t\" GROUP BY \"kind\""
        );
    }

    #[test]
    fn test_tableless_select() {
        let subs = Substitutions::default();
        let sql = Select::expressions()
            .expr_as(Expr::lit(1), "one")
            .build(&subs)
            .unwrap();
        assert_eq!(sql, "SELECT 1 AS \"one\"");
        assert!(Select::expressions().build(&subs).unwrap_err().is_syntax());
    }

    #[test]
    fn test_offset_without_limit() {
        let subs = Substitutions::default();
        let sql = Select::from_table("t").offset(3).build(&subs).unwrap();
        assert_eq!(sql, "SELECT * FROM \"t\" LIMIT -1 OFFSET 3");
    }
}

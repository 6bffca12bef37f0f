//! Query builders for INSERT, UPDATE, DELETE operations.

use crate::clause::Where;
use crate::expr::Expr;
use crate::schema::Table;
use sqlbridge_core::{Error, Query, Result, ReturnId, Substitutions};
use std::collections::HashSet;

/// INSERT query builder.
///
/// Built from a [`Table`] definition, the insert checks its columns against
/// the table and knows whether a generated identifier can be reported.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    table: String,
    /// Known columns of the target table, when built from a definition
    known_columns: Option<Vec<String>>,
    /// The target's auto-increment key column
    auto_key: Option<String>,
    values: Vec<(String, Expr)>,
    want_id: bool,
}

impl Insert {
    /// Insert into a defined table.
    pub fn into_table(table: &Table) -> Self {
        Self {
            table: table.name().to_string(),
            known_columns: Some(table.columns().iter().map(|c| c.name.clone()).collect()),
            auto_key: table.auto_increment_column().map(|c| c.name.clone()),
            values: Vec::new(),
            want_id: false,
        }
    }

    /// Insert into a table known only by name.
    ///
    /// Such an insert cannot report generated identifiers.
    pub fn into_named(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            known_columns: None,
            auto_key: None,
            values: Vec::new(),
            want_id: false,
        }
    }

    /// Set a column to an expression (literal, parameter, function...).
    pub fn value(mut self, column: impl Into<String>, expr: impl Into<Expr>) -> Self {
        self.values.push((column.into(), expr.into()));
        self
    }

    /// Set several columns to positional parameters, in order.
    pub fn params(mut self, columns: &[&str]) -> Self {
        self.values
            .extend(columns.iter().map(|&c| (c.to_string(), Expr::param())));
        self
    }

    /// Ask for the generated identifier to be returned after the insert.
    pub fn returning_id(mut self) -> Self {
        self.want_id = true;
        self
    }
}

impl Query for Insert {
    fn build(&self, subs: &Substitutions) -> Result<String> {
        if self.values.is_empty() {
            return Err(Error::syntax(format!(
                "insert into '{}' has no values",
                self.table
            )));
        }

        let mut seen = HashSet::new();
        for (col, _) in &self.values {
            if !seen.insert(col.as_str()) {
                return Err(Error::syntax(format!(
                    "duplicate column '{}' in insert into '{}'",
                    col, self.table
                )));
            }
            if let Some(known) = &self.known_columns {
                if !known.iter().any(|k| k == col) {
                    return Err(Error::syntax(format!(
                        "column '{}' is not defined in table '{}'",
                        col, self.table
                    )));
                }
            }
        }

        let columns: Vec<_> = self
            .values
            .iter()
            .map(|(c, _)| subs.quote_identifier(c))
            .collect();
        let values = self
            .values
            .iter()
            .map(|(_, e)| e.build(subs))
            .collect::<Result<Vec<_>>>()?;

        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            subs.quote_identifier(&self.table),
            columns.join(", "),
            values.join(", ")
        ))
    }

    fn return_id(&self) -> ReturnId {
        if !self.want_id {
            return ReturnId::None;
        }
        match &self.auto_key {
            Some(col) => ReturnId::AutoIncrement(col.clone()),
            None => ReturnId::Unavailable(self.table.clone()),
        }
    }
}

/// UPDATE query builder.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    table: String,
    set: Vec<(String, Expr)>,
    where_clause: Option<Where>,
}

impl Update {
    /// Update rows of `table`.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            set: Vec::new(),
            where_clause: None,
        }
    }

    /// Set a column.
    pub fn set(mut self, column: impl Into<String>, expr: impl Into<Expr>) -> Self {
        self.set.push((column.into(), expr.into()));
        self
    }

    /// Add a WHERE condition.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = Some(Where::merge(self.where_clause, expr));
        self
    }
}

impl Query for Update {
    fn build(&self, subs: &Substitutions) -> Result<String> {
        if self.set.is_empty() {
            return Err(Error::syntax(format!(
                "update of '{}' sets no columns",
                self.table
            )));
        }
        let mut seen = HashSet::new();
        let mut assignments = Vec::with_capacity(self.set.len());
        for (col, expr) in &self.set {
            if !seen.insert(col.as_str()) {
                return Err(Error::syntax(format!(
                    "duplicate column '{}' in update of '{}'",
                    col, self.table
                )));
            }
            assignments.push(format!("{} = {}", subs.quote_identifier(col), expr.build(subs)?));
        }

        let mut sql = format!(
            "UPDATE {} SET {}",
            subs.quote_identifier(&self.table),
            assignments.join(", ")
        );
        if let Some(w) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&w.build(subs)?);
        }
        Ok(sql)
    }
}

/// DELETE query builder.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    table: String,
    where_clause: Option<Where>,
}

impl Delete {
    /// Delete rows from `table`.
    pub fn from_table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            where_clause: None,
        }
    }

    /// Add a WHERE condition.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = Some(Where::merge(self.where_clause, expr));
        self
    }
}

impl Query for Delete {
    fn build(&self, subs: &Substitutions) -> Result<String> {
        let mut sql = format!("DELETE FROM {}", subs.quote_identifier(&self.table));
        if let Some(w) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&w.build(subs)?);
        }
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlbridge_core::{ColumnSpec, SqlType};

    fn items() -> Table {
        Table::new("items")
            .column(
                ColumnSpec::new("id", SqlType::Integer)
                    .primary_key()
                    .auto_increment(),
            )
            .column(ColumnSpec::new("label", SqlType::Text))
    }

    #[test]
    fn test_insert_sql() {
        let subs = Substitutions::default();
        let sql = Insert::into_table(&items())
            .value("label", Expr::param())
            .build(&subs)
            .unwrap();
        assert_eq!(sql, "INSERT INTO \"items\" (\"label\") VALUES (?)");
    }

    #[test]
    fn test_insert_return_id() {
        let plain = Insert::into_table(&items()).value("label", "x");
        assert_eq!(plain.return_id(), ReturnId::None);

        let with_id = plain.clone().returning_id();
        assert_eq!(with_id.return_id(), ReturnId::AutoIncrement("id".to_string()));

        let by_name = Insert::into_named("items").value("label", "x").returning_id();
        assert_eq!(by_name.return_id(), ReturnId::Unavailable("items".to_string()));
    }

    #[test]
    fn test_insert_rejections() {
        let subs = Substitutions::default();
        assert!(Insert::into_table(&items()).build(&subs).unwrap_err().is_syntax());
        assert!(
            Insert::into_table(&items())
                .params(&["label", "label"])
                .build(&subs)
                .unwrap_err()
                .is_syntax()
        );
        assert!(
            Insert::into_table(&items())
                .value("missing", 1)
                .build(&subs)
                .unwrap_err()
                .is_syntax()
        );
    }

    #[test]
    fn test_update_sql() {
        let subs = Substitutions::default();
        let sql = Update::table("items")
            .set("label", Expr::named("label"))
            .filter(Expr::col("id").eq(Expr::named("id")))
            .build(&subs)
            .unwrap();
        assert_eq!(sql, "UPDATE \"items\" SET \"label\" = @label WHERE \"id\" = @id");
        assert!(Update::table("items").build(&subs).unwrap_err().is_syntax());
    }

    #[test]
    fn test_delete_sql() {
        let subs = Substitutions::default();
        assert_eq!(
            Delete::from_table("items").build(&subs).unwrap(),
            "DELETE FROM \"items\""
        );
        assert_eq!(
            Delete::from_table("items")
                .filter(Expr::col("id").lt(10))
                .build(&subs)
                .unwrap(),
            "DELETE FROM \"items\" WHERE \"id\" < 10"
        );
    }
}

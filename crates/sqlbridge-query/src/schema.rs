//! Table definitions and DDL queries.
//!
//! A [`Table`] describes columns with [`ColumnSpec`]s. Column rendering is
//! delegated to the dialect's column builder, so type names and key syntax
//! stay dialect-specific while validation happens here.

use sqlbridge_core::{ColumnSpec, Error, Query, Result, Substitutions};
use std::collections::HashSet;

/// A table definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<ColumnSpec>,
    /// Table-level (possibly composite) primary key
    primary_key: Vec<String>,
}

impl Table {
    /// Create an empty table definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    /// Add a column.
    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    /// Declare a table-level primary key.
    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|&c| c.to_string()).collect();
        self
    }

    /// The table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared columns.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Find a column by name.
    pub fn find_column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The column that is both primary key and auto-increment, if any.
    pub fn auto_increment_column(&self) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.is_auto_increment_key())
    }

    /// Check the definition for errors a builder must reject.
    ///
    /// Rejects empty tables, duplicate column names and conflicting primary
    /// key declarations.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::syntax("table name must not be empty"));
        }
        if self.columns.is_empty() {
            return Err(Error::syntax(format!(
                "table '{}' has no columns",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for col in &self.columns {
            if !seen.insert(col.name.as_str()) {
                return Err(Error::syntax(format!(
                    "duplicate column '{}' in table '{}'",
                    col.name, self.name
                )));
            }
        }

        let column_keys: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect();
        if column_keys.len() > 1 {
            return Err(Error::syntax(format!(
                "table '{}' declares primary key on several columns ({}); use a table-level key",
                self.name,
                column_keys.join(", ")
            )));
        }
        if !column_keys.is_empty() && !self.primary_key.is_empty() {
            return Err(Error::syntax(format!(
                "table '{}' declares both a column and a table-level primary key",
                self.name
            )));
        }
        for key in &self.primary_key {
            if !seen.contains(key.as_str()) {
                return Err(Error::syntax(format!(
                    "primary key column '{}' is not defined in table '{}'",
                    key, self.name
                )));
            }
        }
        Ok(())
    }

    /// CREATE TABLE for this definition.
    pub fn create(&self) -> CreateTable<'_> {
        CreateTable {
            table: self,
            if_not_exists: false,
        }
    }

    /// DROP TABLE for this definition.
    pub fn drop_table(&self) -> DropTable {
        DropTable::new(&self.name)
    }

    /// ALTER TABLE ... ADD COLUMN for this definition.
    pub fn add_column(&self, column: ColumnSpec) -> AlterTable {
        AlterTable {
            table: self.name.clone(),
            existing: self.columns.iter().map(|c| c.name.clone()).collect(),
            column,
        }
    }
}

/// CREATE TABLE query.
#[derive(Debug, Clone)]
pub struct CreateTable<'a> {
    table: &'a Table,
    if_not_exists: bool,
}

impl CreateTable<'_> {
    /// Add IF NOT EXISTS.
    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }
}

impl Query for CreateTable<'_> {
    fn build(&self, subs: &Substitutions) -> Result<String> {
        self.table.validate()?;

        let mut parts = self
            .table
            .columns
            .iter()
            .map(|c| subs.build_column(c))
            .collect::<Result<Vec<_>>>()?;
        if !self.table.primary_key.is_empty() {
            let keys: Vec<_> = self
                .table
                .primary_key
                .iter()
                .map(|k| subs.quote_identifier(k))
                .collect();
            parts.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }

        let sql = format!(
            "CREATE TABLE {}{} ({})",
            if self.if_not_exists { "IF NOT EXISTS " } else { "" },
            subs.quote_identifier(&self.table.name),
            parts.join(", ")
        );
        tracing::debug!(table = %self.table.name, sql = %sql, "built CREATE TABLE");
        Ok(sql)
    }
}

/// DROP TABLE query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTable {
    table: String,
    if_exists: bool,
}

impl DropTable {
    /// Drop the named table.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            if_exists: false,
        }
    }

    /// Add IF EXISTS.
    pub fn if_exists(mut self) -> Self {
        self.if_exists = true;
        self
    }
}

impl Query for DropTable {
    fn build(&self, subs: &Substitutions) -> Result<String> {
        if self.table.is_empty() {
            return Err(Error::syntax("table name must not be empty"));
        }
        Ok(format!(
            "DROP TABLE {}{}",
            if self.if_exists { "IF EXISTS " } else { "" },
            subs.quote_identifier(&self.table)
        ))
    }
}

/// ALTER TABLE ... ADD COLUMN query.
#[derive(Debug, Clone, PartialEq)]
pub struct AlterTable {
    table: String,
    existing: Vec<String>,
    column: ColumnSpec,
}

impl Query for AlterTable {
    fn build(&self, subs: &Substitutions) -> Result<String> {
        if self.existing.iter().any(|c| *c == self.column.name) {
            return Err(Error::syntax(format!(
                "duplicate column '{}' in table '{}'",
                self.column.name, self.table
            )));
        }
        if self.column.primary_key {
            return Err(Error::syntax(format!(
                "cannot add primary key column '{}' to existing table '{}'",
                self.column.name, self.table
            )));
        }
        Ok(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            subs.quote_identifier(&self.table),
            subs.build_column(&self.column)?
        ))
    }
}

//! Dialect substitution table.
//!
//! Query builders never hard-code dialect-specific fragments. They look them
//! up in a [`Substitutions`] table owned by the connection, and delegate column
//! DDL to the table's [`ColumnBuilder`] hook. The table is immutable once a
//! connection is constructed and is shared behind an `Arc`.

use crate::error::{Error, Result};
use crate::types::{ColumnDefault, ColumnSpec};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Keys of the substitution table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Substitution {
    /// Uppercase string function
    Upper,
    /// Lowercase string function
    Lower,
    /// String length function
    Len,
    /// Current timestamp expression
    Now,
    /// Substring function
    Substr,
    /// Boolean TRUE literal
    BooleanTrue,
    /// Boolean FALSE literal
    BooleanFalse,
    /// Identifier quote character
    IdentifierQuote,
    /// Prefix of named parameters
    NamedParameter,
    /// Positional parameter marker
    NumberedParameter,
}

impl Substitution {
    /// ANSI fallback used when a table has no entry for the key.
    pub const fn default_sql(self) -> &'static str {
        match self {
            Substitution::Upper => "UPPER",
            Substitution::Lower => "LOWER",
            Substitution::Len => "LEN",
            Substitution::Now => "NOW()",
            Substitution::Substr => "SUBSTRING",
            Substitution::BooleanTrue => "true",
            Substitution::BooleanFalse => "false",
            Substitution::IdentifierQuote => "\"",
            Substitution::NamedParameter => "@",
            Substitution::NumberedParameter => "?",
        }
    }
}

/// Hook rendering one column definition of a `CREATE TABLE` / `ALTER TABLE`.
pub trait ColumnBuilder: Send + Sync + fmt::Debug {
    /// Render `column` (name, type and constraints) for this dialect.
    ///
    /// Returns a syntax error for column shapes the dialect cannot express.
    fn build_column(&self, column: &ColumnSpec, substitutions: &Substitutions) -> Result<String>;
}

/// Column builder producing ANSI type names and constraint order.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardColumnBuilder;

impl ColumnBuilder for StandardColumnBuilder {
    fn build_column(&self, column: &ColumnSpec, substitutions: &Substitutions) -> Result<String> {
        let mut sql = format!(
            "{} {}",
            substitutions.quote_identifier(&column.name),
            column.sql_type.sql_name()
        );
        if column.primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        append_constraints(&mut sql, column, substitutions)?;
        Ok(sql)
    }
}

/// Append NOT NULL, UNIQUE, DEFAULT, CHECK and COLLATE clauses in that order.
pub fn append_constraints(
    sql: &mut String,
    column: &ColumnSpec,
    substitutions: &Substitutions,
) -> Result<()> {
    if column.not_null {
        sql.push_str(" NOT NULL");
    }
    if column.unique {
        sql.push_str(" UNIQUE");
    }
    if let Some(default) = &column.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(&substitutions.pack_default(default)?);
    }
    if let Some(check) = &column.check {
        sql.push_str(&format!(" CHECK ({})", check));
    }
    if let Some(collate) = &column.collate {
        sql.push_str(&format!(" COLLATE {}", collate));
    }
    Ok(())
}

/// A dialect's substitution table.
#[derive(Clone)]
pub struct Substitutions {
    entries: HashMap<Substitution, String>,
    column_builder: Arc<dyn ColumnBuilder>,
}

impl fmt::Debug for Substitutions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Substitutions")
            .field("entries", &self.entries)
            .field("column_builder", &self.column_builder)
            .finish()
    }
}

impl Default for Substitutions {
    fn default() -> Self {
        Self::new(Arc::new(StandardColumnBuilder))
    }
}

impl Substitutions {
    /// Create an empty table (every key falls back to its ANSI default).
    pub fn new(column_builder: Arc<dyn ColumnBuilder>) -> Self {
        Self {
            entries: HashMap::new(),
            column_builder,
        }
    }

    /// Set one entry.
    pub fn with(mut self, key: Substitution, sql: impl Into<String>) -> Self {
        self.entries.insert(key, sql.into());
        self
    }

    /// Look up an entry.
    pub fn get(&self, key: Substitution) -> &str {
        self.entries
            .get(&key)
            .map_or_else(|| key.default_sql(), String::as_str)
    }

    /// The column DDL hook.
    pub fn column_builder(&self) -> &dyn ColumnBuilder {
        self.column_builder.as_ref()
    }

    /// Render a column definition through the column DDL hook.
    pub fn build_column(&self, column: &ColumnSpec) -> Result<String> {
        self.column_builder.build_column(column, self)
    }

    /// Quote an identifier, doubling embedded quote characters.
    pub fn quote_identifier(&self, ident: &str) -> String {
        let quote = self.get(Substitution::IdentifierQuote);
        let doubled = format!("{quote}{quote}");
        format!("{quote}{}{quote}", ident.replace(quote, &doubled))
    }

    /// Render a named parameter marker, e.g. `@name`.
    pub fn named_parameter(&self, name: &str) -> String {
        format!("{}{}", self.get(Substitution::NamedParameter), name)
    }

    /// Render a boolean literal.
    pub fn boolean(&self, value: bool) -> &str {
        if value {
            self.get(Substitution::BooleanTrue)
        } else {
            self.get(Substitution::BooleanFalse)
        }
    }

    /// Pack a value as an inline SQL literal.
    pub fn pack_literal(&self, value: &Value) -> Result<String> {
        match value {
            Value::Null => Ok("NULL".to_string()),
            Value::Int(v) => Ok(v.to_string()),
            Value::BigInt(v) => Ok(v.to_string()),
            Value::Float(v) => pack_float(f64::from(*v)),
            Value::Double(v) => pack_float(*v),
            Value::Text(s) => Ok(quote_text(s)),
            Value::Bytes(b) => {
                let hex: String = b.iter().map(|byte| format!("{:02X}", byte)).collect();
                Ok(format!("X'{}'", hex))
            }
            Value::Json(doc) => Ok(quote_text(&doc.to_string())),
            Value::Array(_) => Err(Error::syntax("array values cannot be packed as literals")),
        }
    }

    /// Pack a column default.
    pub fn pack_default(&self, default: &ColumnDefault) -> Result<String> {
        match default {
            ColumnDefault::Value(v) => self.pack_literal(v),
            ColumnDefault::Bool(b) => Ok(self.boolean(*b).to_string()),
            ColumnDefault::CurrentTimestamp => Ok(self.get(Substitution::Now).to_string()),
        }
    }
}

fn pack_float(v: f64) -> Result<String> {
    if v.is_finite() {
        Ok(format!("{:?}", v))
    } else {
        Err(Error::syntax(format!("non-finite number {} has no SQL literal", v)))
    }
}

fn quote_text(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

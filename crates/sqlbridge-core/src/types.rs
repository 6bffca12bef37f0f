//! SQL type definitions and column specifications.

use crate::value::Value;

/// SQL data types a column can be declared with.
///
/// Dialects map these onto their own type names through the column builder
/// of their substitution table; a dialect may reject types it cannot store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlType {
    // Integer types
    SmallInt,
    Integer,
    BigInt,

    // Floating point
    Real,
    Double,

    // Boolean
    Boolean,

    // String types
    Char(u32),
    VarChar(u32),
    Text,

    // Binary
    Blob,

    // Date/time types
    Date,
    Time,
    Timestamp,

    // JSON
    Json,

    // Custom type name, rendered verbatim
    Custom(String),
}

impl SqlType {
    /// Get the ANSI SQL type name for this type.
    pub fn sql_name(&self) -> String {
        match self {
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Real => "REAL".to_string(),
            SqlType::Double => "DOUBLE PRECISION".to_string(),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Char(len) => format!("CHAR({})", len),
            SqlType::VarChar(len) => format!("VARCHAR({})", len),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Blob => "BLOB".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Time => "TIME".to_string(),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::Json => "JSON".to_string(),
            SqlType::Custom(name) => name.clone(),
        }
    }

    /// Check if this type is an integer type.
    pub const fn is_integer(&self) -> bool {
        matches!(self, SqlType::SmallInt | SqlType::Integer | SqlType::BigInt)
    }

    /// Check if this type is text-based.
    pub const fn is_text(&self) -> bool {
        matches!(self, SqlType::Char(_) | SqlType::VarChar(_) | SqlType::Text)
    }

    /// Check if this type is a date/time type.
    pub const fn is_temporal(&self) -> bool {
        matches!(self, SqlType::Date | SqlType::Time | SqlType::Timestamp)
    }
}

/// Default value of a column in DDL.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnDefault {
    /// A literal value, packed by the dialect.
    Value(Value),
    /// A boolean, rendered with the dialect's boolean literals.
    Bool(bool),
    /// The dialect's current-timestamp expression.
    CurrentTimestamp,
}

/// Declaration of one table column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub sql_type: SqlType,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub not_null: bool,
    pub unique: bool,
    pub default: Option<ColumnDefault>,
    /// Raw CHECK expression
    pub check: Option<String>,
    /// Collation name
    pub collate: Option<String>,
}

impl ColumnSpec {
    /// Create a nullable column with no constraints.
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            primary_key: false,
            auto_increment: false,
            not_null: false,
            unique: false,
            default: None,
            check: None,
            collate: None,
        }
    }

    /// Mark the column as the primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Mark the column as auto-incrementing.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Add a NOT NULL constraint.
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Add a UNIQUE constraint.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Set the default value.
    pub fn default_value(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }

    /// Add a CHECK constraint.
    pub fn check(mut self, expr: impl Into<String>) -> Self {
        self.check = Some(expr.into());
        self
    }

    /// Set the collation.
    pub fn collate(mut self, collation: impl Into<String>) -> Self {
        self.collate = Some(collation.into());
        self
    }

    /// Whether this column receives generated identifiers on insert.
    pub fn is_auto_increment_key(&self) -> bool {
        self.primary_key && self.auto_increment
    }
}

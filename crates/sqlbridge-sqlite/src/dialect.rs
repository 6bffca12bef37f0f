//! SQLite substitution table and column DDL.

use sqlbridge_core::dialect::append_constraints;
use sqlbridge_core::{ColumnBuilder, ColumnSpec, Error, Result, SqlType, Substitution, Substitutions};
use std::sync::Arc;

/// `NOW` rendered as UTC text with an explicit offset.
pub const SQLITE_NOW: &str = "(datetime('now') || '+0000')";

/// The substitution table queries are built with on SQLite.
pub fn sqlite_substitutions() -> Substitutions {
    Substitutions::new(Arc::new(SqliteColumnBuilder))
        .with(Substitution::Len, "LENGTH")
        .with(Substitution::Now, SQLITE_NOW)
        .with(Substitution::Substr, "SUBSTR")
        .with(Substitution::BooleanTrue, "1")
        .with(Substitution::BooleanFalse, "0")
        .with(Substitution::IdentifierQuote, "\"")
        .with(Substitution::NamedParameter, "@")
        .with(Substitution::NumberedParameter, "?")
}

/// Column builder using SQLite's storage classes.
///
/// An auto-increment column must be an integer primary key and renders as
/// `integer PRIMARY KEY AUTOINCREMENT`, which makes it the table's rowid.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteColumnBuilder;

impl SqliteColumnBuilder {
    fn type_name(column: &ColumnSpec) -> Result<String> {
        let name = match &column.sql_type {
            SqlType::SmallInt | SqlType::Integer | SqlType::BigInt | SqlType::Boolean => "integer",
            SqlType::Real | SqlType::Double => "real",
            SqlType::Char(_) | SqlType::VarChar(_) | SqlType::Text => "text",
            SqlType::Blob => "blob",
            // ISO-8601 text
            SqlType::Date | SqlType::Time | SqlType::Timestamp => "text",
            SqlType::Custom(name) => return Ok(name.clone()),
            SqlType::Json => {
                return Err(Error::syntax(format!(
                    "column '{}': type {} is not supported by SQLite",
                    column.name,
                    column.sql_type.sql_name()
                )));
            }
        };
        Ok(name.to_string())
    }
}

impl ColumnBuilder for SqliteColumnBuilder {
    fn build_column(&self, column: &ColumnSpec, substitutions: &Substitutions) -> Result<String> {
        if column.auto_increment && !(column.primary_key && column.sql_type.is_integer()) {
            return Err(Error::syntax(format!(
                "auto-increment column '{}' must be an integer primary key",
                column.name
            )));
        }

        let mut sql = format!(
            "{} {}",
            substitutions.quote_identifier(&column.name),
            Self::type_name(column)?
        );
        if column.primary_key {
            sql.push_str(" PRIMARY KEY");
            if column.auto_increment {
                sql.push_str(" AUTOINCREMENT");
            }
        }
        append_constraints(&mut sql, column, substitutions)?;
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlbridge_core::{ColumnDefault, Value};

    #[test]
    fn test_substitutions() {
        let subs = sqlite_substitutions();
        assert_eq!(subs.get(Substitution::Len), "LENGTH");
        assert_eq!(subs.get(Substitution::Upper), "UPPER");
        assert_eq!(subs.get(Substitution::Now), SQLITE_NOW);
        assert_eq!(subs.boolean(true), "1");
        assert_eq!(subs.named_parameter("id"), "@id");
    }

    #[test]
    fn test_auto_increment_key() {
        let subs = sqlite_substitutions();
        let id = ColumnSpec::new("id", SqlType::BigInt)
            .primary_key()
            .auto_increment();
        assert_eq!(
            subs.build_column(&id).unwrap(),
            "\"id\" integer PRIMARY KEY AUTOINCREMENT"
        );
    }

    #[test]
    fn test_auto_increment_rejections() {
        let subs = sqlite_substitutions();
        let text_key = ColumnSpec::new("id", SqlType::Text)
            .primary_key()
            .auto_increment();
        assert!(subs.build_column(&text_key).unwrap_err().is_syntax());

        let not_key = ColumnSpec::new("n", SqlType::Integer).auto_increment();
        assert!(subs.build_column(&not_key).unwrap_err().is_syntax());
    }

    #[test]
    fn test_constraints_and_defaults() {
        let subs = sqlite_substitutions();
        let active = ColumnSpec::new("active", SqlType::Boolean)
            .not_null()
            .default_value(ColumnDefault::Bool(true));
        assert_eq!(
            subs.build_column(&active).unwrap(),
            "\"active\" integer NOT NULL DEFAULT 1"
        );

        let created = ColumnSpec::new("created", SqlType::Timestamp)
            .default_value(ColumnDefault::CurrentTimestamp);
        assert_eq!(
            subs.build_column(&created).unwrap(),
            format!("\"created\" text DEFAULT {SQLITE_NOW}")
        );

        let name = ColumnSpec::new("name", SqlType::VarChar(40))
            .unique()
            .default_value(ColumnDefault::Value(Value::Text("it's".into())))
            .check("length(name) > 0")
            .collate("NOCASE");
        assert_eq!(
            subs.build_column(&name).unwrap(),
            "\"name\" text UNIQUE DEFAULT 'it''s' CHECK (length(name) > 0) COLLATE NOCASE"
        );
    }

    #[test]
    fn test_unsupported_type() {
        let subs = sqlite_substitutions();
        let doc = ColumnSpec::new("doc", SqlType::Json);
        assert!(subs.build_column(&doc).unwrap_err().is_syntax());
        let custom = ColumnSpec::new("n", SqlType::Custom("NUMERIC".into()));
        assert_eq!(subs.build_column(&custom).unwrap(), "\"n\" NUMERIC");
    }
}

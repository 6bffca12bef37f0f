//! Result rows and typed column access.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Column titles shared by every row of one result set.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl ColumnInfo {
    /// Build from titles in result order.
    ///
    /// When a title repeats, lookups by name resolve to its first occurrence.
    pub fn new(names: Vec<String>) -> Self {
        let mut positions = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            positions.entry(name.clone()).or_insert(i);
        }
        Self { names, positions }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// One row of a result set.
///
/// Rows of the same stream share their [`ColumnInfo`].
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<ColumnInfo>,
    values: Vec<Value>,
}

impl Row {
    /// A row with its own column titles.
    pub fn new(titles: Vec<String>, values: Vec<Value>) -> Self {
        Self::with_columns(Arc::new(ColumnInfo::new(titles)), values)
    }

    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Decode the column at `index`.
    pub fn get_as<T: FromValue>(&self, index: usize) -> Result<T> {
        match self.get(index) {
            Some(value) => T::from_value(value),
            None => Err(missing::<T>(
                format!("no column at index {index} (row has {})", self.len()),
                None,
            )),
        }
    }

    /// Decode the column titled `name`. Type errors name the column.
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let Some(value) = self.get_by_name(name) else {
            return Err(missing::<T>(
                format!("no column '{name}'"),
                Some(name.to_string()),
            ));
        };
        T::from_value(value).map_err(|err| match err {
            Error::Type(mut te) => {
                te.column = Some(name.to_string());
                Error::Type(te)
            }
            other => other,
        })
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// (title, value) pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(&self.values)
    }
}

fn missing<T>(actual: String, column: Option<String>) -> Error {
    Error::Type(TypeError {
        expected: std::any::type_name::<T>(),
        actual,
        column,
        rust_type: None,
    })
}

/// Conversion out of a decoded column value.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch(expected: &'static str, value: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: value.type_name().to_string(),
        column: None,
        rust_type: None,
    })
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_i64()
            .map(|v| v != 0)
            .ok_or_else(|| mismatch("bool", value))
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        let wide = value.as_i64().ok_or_else(|| mismatch("i32", value))?;
        i32::try_from(wide).map_err(|_| {
            Error::Type(TypeError {
                expected: "i32",
                actual: format!("out-of-range integer {wide}"),
                column: None,
                rust_type: None,
            })
        })
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_i64().ok_or_else(|| mismatch("i64", value))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| mismatch("f64", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| mismatch("String", value))
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| mismatch("Vec<u8>", value))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            return Ok(None);
        }
        T::from_value(value).map(Some)
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

/// SQLite has no JSON storage class; documents come back as text.
impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Json(doc) => Ok(doc.clone()),
            Value::Text(s) => serde_json::from_str(s).map_err(|e| {
                Error::Type(TypeError {
                    expected: "JSON text",
                    actual: format!("unparsable text ({e})"),
                    column: None,
                    rust_type: None,
                })
            }),
            _ => Err(mismatch("JSON", value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(titles: &[&str], values: Vec<Value>) -> Row {
        Row::new(titles.iter().map(|t| (*t).to_string()).collect(), values)
    }

    #[test]
    fn test_lookup_by_index_and_name() {
        let r = row(&["id", "name"], vec![Value::BigInt(1), Value::from("Alice")]);
        assert_eq!(r.len(), 2);
        assert_eq!(r.get(0), Some(&Value::BigInt(1)));
        assert_eq!(r.get(2), None);
        assert_eq!(r.get_by_name("name"), Some(&Value::from("Alice")));
        assert_eq!(r.get_by_name("missing"), None);
    }

    #[test]
    fn test_typed_access() {
        let r = row(&["id", "ratio", "flag"], vec![
            Value::BigInt(42),
            Value::Double(0.5),
            Value::BigInt(1),
        ]);
        assert_eq!(r.get_as::<i32>(0).unwrap(), 42);
        assert_eq!(r.get_named::<i64>("id").unwrap(), 42);
        assert!((r.get_named::<f64>("ratio").unwrap() - 0.5).abs() < f64::EPSILON);
        assert!(r.get_named::<bool>("flag").unwrap());
    }

    #[test]
    fn test_type_errors_name_the_column() {
        let r = row(&["id"], vec![Value::from("x")]);
        match r.get_named::<i64>("id") {
            Err(Error::Type(te)) => assert_eq!(te.column.as_deref(), Some("id")),
            other => panic!("expected type error, got {other:?}"),
        }
        assert!(r.get_named::<i64>("missing").is_err());
        assert!(r.get_as::<i64>(9).is_err());
    }

    #[test]
    fn test_narrowing_checks_range() {
        let r = row(&["n"], vec![Value::BigInt(i64::MAX)]);
        assert!(r.get_named::<i32>("n").is_err());
        assert_eq!(r.get_named::<i64>("n").unwrap(), i64::MAX);
    }

    #[test]
    fn test_null_only_decodes_as_option() {
        let r = row(&["maybe"], vec![Value::Null]);
        assert_eq!(r.get_named::<Option<i64>>("maybe").unwrap(), None);
        assert!(r.get_named::<i64>("maybe").is_err());
    }

    #[test]
    fn test_rows_share_titles() {
        let columns = Arc::new(ColumnInfo::new(vec!["a".to_string(), "b".to_string()]));
        let first = Row::with_columns(Arc::clone(&columns), vec![Value::Int(1), Value::Int(2)]);
        let second = Row::with_columns(Arc::clone(&columns), vec![Value::Int(3), Value::Int(4)]);

        assert!(Arc::ptr_eq(&first.column_info(), &second.column_info()));
        let pairs: Vec<_> = first.iter().collect();
        assert_eq!(pairs, vec![("a", &Value::Int(1)), ("b", &Value::Int(2))]);
    }

    #[test]
    fn test_duplicate_titles_resolve_to_first() {
        let info = ColumnInfo::new(vec!["x".to_string(), "x".to_string()]);
        assert_eq!(info.len(), 2);
        assert_eq!(info.index_of("x"), Some(0));
    }

    #[test]
    fn test_json_from_text() {
        let r = row(&["doc"], vec![Value::from("{\"k\":1}")]);
        let doc: serde_json::Value = r.get_named("doc").unwrap();
        assert_eq!(doc["k"], 1);
    }
}

use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::ToSql;
use std::collections::HashMap;

use crate::error::{MapperError, Result};

/// Core value types for SQLite operations
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
    /// Ordered list of text, stored as a JSON array in a TEXT column.
    TextList(Vec<String>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in mismatch messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
            Value::Boolean(_) => "boolean",
            Value::TextList(_) => "text list",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }
}

impl TryFrom<ValueRef<'_>> for Value {
    type Error = MapperError;

    /// Copies a cell out of a result row. TEXT that is not valid UTF-8 is an
    /// error rather than being patched with replacement characters.
    fn try_from(value: ValueRef<'_>) -> Result<Self> {
        Ok(match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(value) => Value::Integer(value),
            ValueRef::Real(value) => Value::Real(value),
            ValueRef::Text(bytes) => Value::Text(
                std::str::from_utf8(bytes)
                    .map_err(rusqlite::Error::Utf8Error)?
                    .to_string(),
            ),
            ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
        })
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let output = match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(value) => ToSqlOutput::Owned(SqlValue::Integer(*value)),
            Value::Real(value) => ToSqlOutput::Owned(SqlValue::Real(*value)),
            Value::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
            Value::Blob(value) => ToSqlOutput::Borrowed(ValueRef::Blob(value)),
            Value::Boolean(value) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*value))),
            Value::TextList(items) => {
                let encoded = serde_json::to_string(items)
                    .map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))?;
                ToSqlOutput::Owned(SqlValue::Text(encoded))
            }
        };
        Ok(output)
    }
}

macro_rules! impl_value_from {
    ($t:ty, $variant:ident) => {
        impl From<$t> for Value {
            fn from(value: $t) -> Self {
                Value::$variant(value.into())
            }
        }

        impl From<Option<$t>> for Value {
            fn from(value: Option<$t>) -> Self {
                value.map_or(Value::Null, |value| Value::$variant(value.into()))
            }
        }
    };
}

impl_value_from!(i64, Integer);
impl_value_from!(i32, Integer);
impl_value_from!(f64, Real);
impl_value_from!(bool, Boolean);
impl_value_from!(String, Text);
impl_value_from!(Vec<u8>, Blob);
impl_value_from!(Vec<String>, TextList);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

/// Conversion from a stored [`Value`] back into an entity field type.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch(expected: &str, found: &Value) -> MapperError {
    MapperError::invalid(format!("expected {expected}, found {}", found.kind()))
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Integer(value) => Ok(value),
            Value::Boolean(value) => Ok(i64::from(value)),
            other => Err(mismatch("integer", &other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide)
            .map_err(|_| MapperError::invalid(format!("integer {wide} does not fit in i32")))
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Real(value) => Ok(value),
            // SQLite hands back integral REAL values as integers in some paths.
            Value::Integer(value) => Ok(value as f64),
            other => Err(mismatch("real", &other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Boolean(value) => Ok(value),
            Value::Integer(0) => Ok(false),
            Value::Integer(1) => Ok(true),
            other => Err(mismatch("boolean", &other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(value) => Ok(value),
            other => Err(mismatch("text", &other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Blob(value) => Ok(value),
            other => Err(mismatch("blob", &other)),
        }
    }
}

impl FromValue for Vec<String> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::TextList(items) => Ok(items),
            other => Err(mismatch("text list", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// A result row keyed by column name.
pub type Row = HashMap<String, Value>;

/// SQL statement with positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub statement: String,
    pub params: Vec<Value>,
}

impl SqlQuery {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    /// Append one positional parameter
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }
}

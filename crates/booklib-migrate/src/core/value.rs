//! Scalar values carried by migrated records.

use std::error::Error;
use std::fmt;

use bytes::BytesMut;
use serde::Serialize;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

/// A scalar field value.
///
/// Integer columns of every width are read as [`SqlValue::I64`] and narrowed
/// again when bound to a destination column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// Integer value.
    I64(i64),

    /// Floating point value.
    F64(f64),

    /// Text value.
    Text(String),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Short type name used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::I64(_) => "integer",
            SqlValue::F64(_) => "float",
            SqlValue::Text(_) => "text",
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::I64(v) => write!(f, "{}", v),
            SqlValue::F64(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I64(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Binds a value to whatever column type the server inferred for the parameter.
impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn Error + Sync + Send>> {
        match (self, ty) {
            (SqlValue::Null, _) => Ok(IsNull::Yes),
            (SqlValue::Bool(v), &Type::BOOL) => v.to_sql(ty, out),
            (SqlValue::I64(v), &Type::INT2) => i16::try_from(*v)?.to_sql(ty, out),
            (SqlValue::I64(v), &Type::INT4) => i32::try_from(*v)?.to_sql(ty, out),
            (SqlValue::I64(v), &Type::INT8) => v.to_sql(ty, out),
            (SqlValue::I64(v), &Type::FLOAT8) => (*v as f64).to_sql(ty, out),
            (SqlValue::F64(v), &Type::FLOAT4) => {
                let narrowed = *v as f32;
                if f64::from(narrowed) != *v && !v.is_nan() {
                    return Err(format!("float value {} does not fit column type {}", v, ty).into());
                }
                narrowed.to_sql(ty, out)
            }
            (SqlValue::F64(v), &Type::FLOAT8) => v.to_sql(ty, out),
            (SqlValue::Text(v), &Type::TEXT)
            | (SqlValue::Text(v), &Type::VARCHAR)
            | (SqlValue::Text(v), &Type::BPCHAR)
            | (SqlValue::Text(v), &Type::NAME) => v.as_str().to_sql(ty, out),
            (value, ty) => Err(format!(
                "cannot bind {} value {} to column of type {}",
                value.kind(),
                value,
                ty
            )
            .into()),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_value_is_null() {
        assert!(SqlValue::Null.is_null());
        assert!(!SqlValue::I64(42).is_null());
    }

    #[test]
    fn test_from_implementations() {
        assert_eq!(SqlValue::from(42i32), SqlValue::I64(42));
        assert_eq!(SqlValue::from("drama"), SqlValue::Text("drama".to_string()));
        assert_eq!(SqlValue::from(None::<String>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(7i64)), SqlValue::I64(7));
    }

    #[test]
    fn test_to_sql_narrows_integers() {
        let mut buf = BytesMut::new();
        let result = SqlValue::I64(7).to_sql(&Type::INT4, &mut buf).unwrap();
        assert!(matches!(result, IsNull::No));
        assert_eq!(&buf[..], &7i32.to_be_bytes());
    }

    #[test]
    fn test_to_sql_rejects_overflow() {
        let mut buf = BytesMut::new();
        assert!(SqlValue::I64(i64::MAX).to_sql(&Type::INT4, &mut buf).is_err());
    }

    #[test]
    fn test_to_sql_float4_requires_exact_value() {
        let mut buf = BytesMut::new();
        assert!(SqlValue::F64(1.5).to_sql(&Type::FLOAT4, &mut buf).is_ok());
        assert_eq!(&buf[..], &1.5f32.to_be_bytes());

        let mut buf = BytesMut::new();
        let err = SqlValue::F64(0.1).to_sql(&Type::FLOAT4, &mut buf).err().unwrap();
        assert!(err.to_string().contains("does not fit"));
        assert!(SqlValue::F64(1e300).to_sql(&Type::FLOAT4, &mut buf).is_err());
    }

    #[test]
    fn test_to_sql_rejects_type_mismatch() {
        let mut buf = BytesMut::new();
        let err = SqlValue::Text("x".into())
            .to_sql(&Type::INT8, &mut buf)
            .err()
            .unwrap();
        assert!(err.to_string().contains("text"));
    }

    #[test]
    fn test_null_binds_to_anything() {
        let mut buf = BytesMut::new();
        assert!(matches!(
            SqlValue::Null.to_sql(&Type::TEXT, &mut buf).unwrap(),
            IsNull::Yes
        ));
    }
}

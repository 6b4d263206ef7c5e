//! Positional parameter values

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A nullable scalar bound to a statement placeholder.
///
/// Each variant carries its declared type even when the value is NULL, so drivers that need a
/// typed NULL (e.g. PostgreSQL) can bind one.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(Option<bool>),
    Int(Option<i32>),
    Long(Option<i64>),
    Double(Option<f64>),
    Text(Option<String>),
    Bytes(Option<Vec<u8>>),
    Uuid(Option<Uuid>),
    Timestamp(Option<DateTime<Utc>>),
    Json(Option<serde_json::Value>),
}

impl Value {
    /// Returns `true` if this is a NULL of any type.
    pub fn is_null(&self) -> bool {
        match self {
            Self::Bool(v) => v.is_none(),
            Self::Int(v) => v.is_none(),
            Self::Long(v) => v.is_none(),
            Self::Double(v) => v.is_none(),
            Self::Text(v) => v.is_none(),
            Self::Bytes(v) => v.is_none(),
            Self::Uuid(v) => v.is_none(),
            Self::Timestamp(v) => v.is_none(),
            Self::Json(v) => v.is_none(),
        }
    }

    /// Name of the declared type, used in log fields and driver error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Double(_) => "double",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Uuid(_) => "uuid",
            Self::Timestamp(_) => "timestamp",
            Self::Json(_) => "json",
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(Some(v))
                }
            }

            impl From<Option<$ty>> for Value {
                fn from(v: Option<$ty>) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

impl_from_value! {
    bool => Bool,
    i32 => Int,
    i64 => Long,
    f64 => Double,
    String => Text,
    Vec<u8> => Bytes,
    Uuid => Uuid,
    DateTime<Utc> => Timestamp,
    serde_json::Value => Json,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(Some(v.to_owned()))
    }
}

impl From<Option<&str>> for Value {
    fn from(v: Option<&str>) -> Self {
        Self::Text(v.map(str::to_owned))
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(Some(v.to_vec()))
    }
}

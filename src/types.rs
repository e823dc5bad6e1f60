use std::fmt;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::de::value::{MapAccessDeserializer, SeqAccessDeserializer};
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

/// One SQL value, as a parameter going in or a cell coming out.
///
/// Positional parameters, procedure inputs, output parameter values and
/// cursor cells all share this type:
/// ```rust
/// use sql_pool_middleware::prelude::*;
///
/// let lookup = [RowValues::from("HW"), RowValues::Int(10)];
/// assert_eq!(lookup[1].to_column_string().as_deref(), Some("10"));
/// ```
///
/// Deserialization follows the shape of the input only: strings are always
/// `Text` (never parsed into timestamps), arrays and objects are `JSON`, and
/// byte strings from binary formats are `Blob`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RowValues {
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Zone-less; drivers convert DB2 `TIMESTAMP` and SQLite text alike.
    Timestamp(NaiveDateTime),
    /// Fixed-width `CHAR` data arrives padded; marshalling trims it.
    Text(String),
    Null,
    JSON(JsonValue),
    Blob(Vec<u8>),
}

struct RowValuesVisitor;

impl<'de> Visitor<'de> for RowValuesVisitor {
    type Value = RowValues;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a SQL parameter value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<RowValues, E> {
        Ok(RowValues::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<RowValues, E> {
        Ok(RowValues::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<RowValues, E> {
        Ok(i64::try_from(v).map_or_else(|_| RowValues::JSON(JsonValue::from(v)), RowValues::Int))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<RowValues, E> {
        Ok(RowValues::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<RowValues, E> {
        Ok(RowValues::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<RowValues, E> {
        Ok(RowValues::Text(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<RowValues, E> {
        Ok(RowValues::Blob(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<RowValues, E> {
        Ok(RowValues::Blob(v))
    }

    fn visit_none<E: de::Error>(self) -> Result<RowValues, E> {
        Ok(RowValues::Null)
    }

    fn visit_unit<E: de::Error>(self) -> Result<RowValues, E> {
        Ok(RowValues::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<RowValues, D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> Result<RowValues, A::Error> {
        JsonValue::deserialize(SeqAccessDeserializer::new(seq)).map(RowValues::JSON)
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<RowValues, A::Error> {
        JsonValue::deserialize(MapAccessDeserializer::new(map)).map(RowValues::JSON)
    }
}

impl<'de> Deserialize<'de> for RowValues {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RowValuesVisitor)
    }
}

impl RowValues {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Text content; `CHAR` padding is left as the driver returned it.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// String representation used when marshalling a cell into a row record.
    ///
    /// `NULL` has no string form and yields `None`. Timestamps use the
    /// `YYYY-MM-DD HH:MM:SS[.fff]` form and blobs are rendered as upper-case hex.
    #[must_use]
    pub fn to_column_string(&self) -> Option<String> {
        match self {
            RowValues::Null => None,
            RowValues::Int(i) => Some(i.to_string()),
            RowValues::Float(f) => Some(f.to_string()),
            RowValues::Bool(b) => Some(b.to_string()),
            RowValues::Timestamp(dt) => Some(dt.format("%F %T%.f").to_string()),
            RowValues::Text(s) => Some(s.clone()),
            RowValues::JSON(v) => Some(v.to_string()),
            RowValues::Blob(bytes) => Some(bytes.iter().map(|b| format!("{b:02X}")).collect()),
        }
    }
}

impl From<i64> for RowValues {
    fn from(value: i64) -> Self {
        RowValues::Int(value)
    }
}

impl From<i32> for RowValues {
    fn from(value: i32) -> Self {
        RowValues::Int(i64::from(value))
    }
}

impl From<f64> for RowValues {
    fn from(value: f64) -> Self {
        RowValues::Float(value)
    }
}

impl From<bool> for RowValues {
    fn from(value: bool) -> Self {
        RowValues::Bool(value)
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_string())
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

impl From<NaiveDateTime> for RowValues {
    fn from(value: NaiveDateTime) -> Self {
        RowValues::Timestamp(value)
    }
}

impl<T: Into<RowValues>> From<Option<T>> for RowValues {
    fn from(value: Option<T>) -> Self {
        value.map_or(RowValues::Null, Into::into)
    }
}

/// SQL data type declared for a stored-procedure output parameter.
///
/// Numeric codes follow the JDBC `java.sql.Types` constants used by the
/// host drivers this layer fronts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SqlDataType {
    Char,
    Varchar,
    Longvarchar,
    Clob,
    Smallint,
    Integer,
    Bigint,
    Decimal,
    Numeric,
    Real,
    Double,
    Boolean,
    Date,
    Time,
    Timestamp,
    Binary,
    Varbinary,
    Blob,
}

impl SqlDataType {
    /// Map a JDBC type code onto a declared type.
    #[must_use]
    pub fn from_jdbc_code(code: i32) -> Option<Self> {
        let ty = match code {
            1 => Self::Char,
            12 => Self::Varchar,
            -1 => Self::Longvarchar,
            2005 => Self::Clob,
            5 => Self::Smallint,
            4 => Self::Integer,
            -5 => Self::Bigint,
            3 => Self::Decimal,
            2 => Self::Numeric,
            7 => Self::Real,
            8 => Self::Double,
            16 => Self::Boolean,
            91 => Self::Date,
            92 => Self::Time,
            93 => Self::Timestamp,
            -2 => Self::Binary,
            -3 => Self::Varbinary,
            2004 => Self::Blob,
            _ => return None,
        };
        Some(ty)
    }

    #[must_use]
    pub fn jdbc_code(self) -> i32 {
        match self {
            Self::Char => 1,
            Self::Varchar => 12,
            Self::Longvarchar => -1,
            Self::Clob => 2005,
            Self::Smallint => 5,
            Self::Integer => 4,
            Self::Bigint => -5,
            Self::Decimal => 3,
            Self::Numeric => 2,
            Self::Real => 7,
            Self::Double => 8,
            Self::Boolean => 16,
            Self::Date => 91,
            Self::Time => 92,
            Self::Timestamp => 93,
            Self::Binary => -2,
            Self::Varbinary => -3,
            Self::Blob => 2004,
        }
    }

    /// Parse a type name such as `"VARCHAR"` or `"integer"`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(name, true).ok()
    }
}

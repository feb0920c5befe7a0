//! Scalar values for captured rows.
//!
//! [`SqlValue`] is the unified scalar union used everywhere a column value
//! travels through the engine: payload decoding, filter literals and the
//! decoded [`Row`](super::Row). Conversions to and from the JSON payload are
//! centralized here so the round-trip rules live in one place:
//!
//! - integers and booleans ride as native JSON values
//! - decimal/money ride as text (no binary floating point on the wire)
//! - temporal values ride as ISO-8601 text at their declared precision
//! - binary values ride as lowercase hex text
//! - uniqueidentifier rides as the hyphenated text form

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::errors::CommonError;
use crate::models::datatypes::SqlDataType;

/// An exact decimal: unscaled integer plus declared scale.
///
/// `123.77` is `{ unscaled: 12377, scale: 2 }`. Scale is part of the value,
/// so `1.5` and `1.50` are distinct (they round-trip to distinct text).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimalValue {
    unscaled: i128,
    scale: u32,
}

impl DecimalValue {
    pub fn new(unscaled: i128, scale: u32) -> Self {
        Self { unscaled, scale }
    }

    pub fn unscaled(&self) -> i128 {
        self.unscaled
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Approximate numeric value, for coercive comparisons only.
    pub fn to_f64(&self) -> f64 {
        self.unscaled as f64 / 10f64.powi(self.scale as i32)
    }
}

impl fmt::Display for DecimalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.unscaled);
        }
        let sign = if self.unscaled < 0 { "-" } else { "" };
        let magnitude = self.unscaled.unsigned_abs();
        let divisor = 10u128.pow(self.scale);
        let int_part = magnitude / divisor;
        let frac_part = magnitude % divisor;
        write!(
            f,
            "{}{}.{:0width$}",
            sign,
            int_part,
            frac_part,
            width = self.scale as usize
        )
    }
}

impl FromStr for DecimalValue {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let (sign, digits) = match text.strip_prefix('-') {
            Some(rest) => (-1i128, rest),
            None => (1i128, text.strip_prefix('+').unwrap_or(text)),
        };
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(CommonError::InvalidValue(format!("invalid decimal '{s}'")));
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(CommonError::InvalidValue(format!("invalid decimal '{s}'")));
        }
        let scale = frac_part.len() as u32;
        let combined = format!("{int_part}{frac_part}");
        let unscaled: i128 = combined
            .parse()
            .map_err(|_| CommonError::InvalidValue(format!("decimal out of range '{s}'")))?;
        Ok(DecimalValue::new(sign * unscaled, scale))
    }
}

/// A single scalar column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bit(bool),
    TinyInt(u8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Real(f32),
    Float(f64),
    Decimal(DecimalValue),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
    Binary(Vec<u8>),
    Guid(Uuid),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Numeric view for coercive comparisons (filter folding).
    pub fn numeric_value(&self) -> Option<f64> {
        match self {
            SqlValue::TinyInt(v) => Some(*v as f64),
            SqlValue::SmallInt(v) => Some(*v as f64),
            SqlValue::Int(v) => Some(*v as f64),
            SqlValue::BigInt(v) => Some(*v as f64),
            SqlValue::Real(v) => Some(*v as f64),
            SqlValue::Float(v) => Some(*v),
            SqlValue::Decimal(d) => Some(d.to_f64()),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Equality with numeric coercion, so `Int(1)` equals `BigInt(1)`.
    pub fn coercive_eq(&self, other: &SqlValue) -> bool {
        if self == other {
            return true;
        }
        match (self.numeric_value(), other.numeric_value()) {
            (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
            _ => false,
        }
    }

    /// Encode into the JSON payload representation.
    pub fn to_json(&self) -> JsonValue {
        match self {
            SqlValue::Null => JsonValue::Null,
            SqlValue::Bit(v) => JsonValue::Bool(*v),
            SqlValue::TinyInt(v) => JsonValue::from(*v),
            SqlValue::SmallInt(v) => JsonValue::from(*v),
            SqlValue::Int(v) => JsonValue::from(*v),
            SqlValue::BigInt(v) => JsonValue::from(*v),
            SqlValue::Real(v) => JsonValue::from(*v as f64),
            SqlValue::Float(v) => JsonValue::from(*v),
            SqlValue::Decimal(d) => JsonValue::String(d.to_string()),
            SqlValue::Text(s) => JsonValue::String(s.clone()),
            SqlValue::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
            SqlValue::Time(t) => JsonValue::String(format!(
                "{}.{:07}",
                t.format("%H:%M:%S"),
                t.nanosecond() / 100
            )),
            SqlValue::DateTime(dt) => JsonValue::String(format!(
                "{}.{:07}",
                dt.format("%Y-%m-%dT%H:%M:%S"),
                dt.nanosecond() / 100
            )),
            SqlValue::DateTimeOffset(dt) => JsonValue::String(dt.to_rfc3339()),
            SqlValue::Binary(bytes) => JsonValue::String(hex::encode(bytes)),
            SqlValue::Guid(g) => JsonValue::String(g.hyphenated().to_string()),
        }
    }

    /// Decode a payload value, directed by the column's declared type.
    pub fn from_json(
        column: &str,
        data_type: SqlDataType,
        value: &JsonValue,
    ) -> Result<SqlValue, CommonError> {
        if value.is_null() {
            return Ok(SqlValue::Null);
        }
        let mismatch = |expected: &str| CommonError::TypeMismatch {
            column: column.to_string(),
            expected: expected.to_string(),
            got: value.to_string(),
        };
        match data_type {
            SqlDataType::Bit => match value {
                JsonValue::Bool(b) => Ok(SqlValue::Bit(*b)),
                JsonValue::Number(n) => Ok(SqlValue::Bit(n.as_i64() == Some(1))),
                _ => Err(mismatch("bit")),
            },
            SqlDataType::TinyInt => int_from_json(value)
                .and_then(|v| u8::try_from(v).ok())
                .map(SqlValue::TinyInt)
                .ok_or_else(|| mismatch("tinyint")),
            SqlDataType::SmallInt => int_from_json(value)
                .and_then(|v| i16::try_from(v).ok())
                .map(SqlValue::SmallInt)
                .ok_or_else(|| mismatch("smallint")),
            SqlDataType::Int => int_from_json(value)
                .and_then(|v| i32::try_from(v).ok())
                .map(SqlValue::Int)
                .ok_or_else(|| mismatch("int")),
            SqlDataType::BigInt => int_from_json(value)
                .map(SqlValue::BigInt)
                .ok_or_else(|| mismatch("bigint")),
            SqlDataType::Real => float_from_json(value)
                .map(|v| SqlValue::Real(v as f32))
                .ok_or_else(|| mismatch("real")),
            SqlDataType::Float => float_from_json(value)
                .map(SqlValue::Float)
                .ok_or_else(|| mismatch("float")),
            SqlDataType::Decimal | SqlDataType::Money | SqlDataType::SmallMoney => {
                let text = match value {
                    JsonValue::String(s) => s.clone(),
                    JsonValue::Number(n) => n.to_string(),
                    _ => return Err(mismatch("decimal")),
                };
                text.parse::<DecimalValue>().map(SqlValue::Decimal)
            }
            SqlDataType::Char
            | SqlDataType::VarChar
            | SqlDataType::NChar
            | SqlDataType::NVarChar => value
                .as_str()
                .map(|s| SqlValue::Text(s.to_string()))
                .ok_or_else(|| mismatch("string")),
            SqlDataType::Date => {
                let s = value.as_str().ok_or_else(|| mismatch("date"))?;
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map(SqlValue::Date)
                    .map_err(|e| CommonError::InvalidValue(format!("date '{s}': {e}")))
            }
            SqlDataType::Time => {
                let s = value.as_str().ok_or_else(|| mismatch("time"))?;
                NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
                    .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
                    .map(SqlValue::Time)
                    .map_err(|e| CommonError::InvalidValue(format!("time '{s}': {e}")))
            }
            SqlDataType::SmallDateTime | SqlDataType::DateTime | SqlDataType::DateTime2 => {
                let s = value.as_str().ok_or_else(|| mismatch("datetime"))?;
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                    .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                    .map(SqlValue::DateTime)
                    .map_err(|e| CommonError::InvalidValue(format!("datetime '{s}': {e}")))
            }
            SqlDataType::DateTimeOffset => {
                let s = value.as_str().ok_or_else(|| mismatch("datetimeoffset"))?;
                DateTime::parse_from_rfc3339(s)
                    .map(SqlValue::DateTimeOffset)
                    .map_err(|e| CommonError::InvalidValue(format!("datetimeoffset '{s}': {e}")))
            }
            SqlDataType::Binary | SqlDataType::VarBinary | SqlDataType::RowVersion => {
                let s = value.as_str().ok_or_else(|| mismatch("binary"))?;
                let stripped = s.strip_prefix("0x").unwrap_or(s);
                hex::decode(stripped)
                    .map(SqlValue::Binary)
                    .map_err(|e| CommonError::InvalidValue(format!("binary '{s}': {e}")))
            }
            SqlDataType::UniqueIdentifier => {
                let s = value.as_str().ok_or_else(|| mismatch("uniqueidentifier"))?;
                Uuid::parse_str(s)
                    .map(SqlValue::Guid)
                    .map_err(|e| CommonError::InvalidValue(format!("uniqueidentifier '{s}': {e}")))
            }
        }
    }
}

fn int_from_json(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn float_from_json(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bit(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::BigInt(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<DecimalValue> for SqlValue {
    fn from(v: DecimalValue) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Guid(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Binary(v)
    }
}

//! Unified column type system for tablewatch.
//!
//! [`SqlDataType`] is the single source of truth for the server column types
//! the engine can capture and round-trip through the change payload. It maps
//! the server's catalog type names to a closed enum; anything outside the
//! enum is either unknown or explicitly excluded.
//!
//! # Excluded types
//!
//! Large-object, XML and file-reference types cannot be serialized into the
//! per-message payload without truncation or server-side conversion quirks,
//! so table setup fails when the watched column set contains one of them:
//! `text`, `ntext`, `image`, `xml`, `sql_variant`, `geography`, `geometry`,
//! `hierarchyid`, `filestream`.

use serde::{Deserialize, Serialize};

/// Supported server column types.
///
/// Variants are normalized: the catalog may report `numeric` but it parses
/// to [`SqlDataType::Decimal`]; `rowversion` and `timestamp` both parse to
/// [`SqlDataType::RowVersion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlDataType {
    Bit,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Real,
    Float,
    Decimal,
    Money,
    SmallMoney,
    Char,
    VarChar,
    NChar,
    NVarChar,
    Date,
    Time,
    SmallDateTime,
    DateTime,
    DateTime2,
    DateTimeOffset,
    Binary,
    VarBinary,
    RowVersion,
    UniqueIdentifier,
}

/// Server type names that can never be captured into the payload.
const EXCLUDED_TYPES: &[&str] = &[
    "text",
    "ntext",
    "image",
    "xml",
    "sql_variant",
    "geography",
    "geometry",
    "hierarchyid",
    "filestream",
];

impl SqlDataType {
    /// Parse a catalog type name into a supported data type.
    ///
    /// Returns `None` for unknown or excluded type names; callers decide
    /// whether that is a hard error (it is, during table validation).
    pub fn parse(server_type: &str) -> Option<SqlDataType> {
        match server_type.trim().to_ascii_lowercase().as_str() {
            "bit" => Some(SqlDataType::Bit),
            "tinyint" => Some(SqlDataType::TinyInt),
            "smallint" => Some(SqlDataType::SmallInt),
            "int" => Some(SqlDataType::Int),
            "bigint" => Some(SqlDataType::BigInt),
            "real" => Some(SqlDataType::Real),
            "float" => Some(SqlDataType::Float),
            "decimal" | "numeric" => Some(SqlDataType::Decimal),
            "money" => Some(SqlDataType::Money),
            "smallmoney" => Some(SqlDataType::SmallMoney),
            "char" => Some(SqlDataType::Char),
            "varchar" => Some(SqlDataType::VarChar),
            "nchar" => Some(SqlDataType::NChar),
            "nvarchar" => Some(SqlDataType::NVarChar),
            "date" => Some(SqlDataType::Date),
            "time" => Some(SqlDataType::Time),
            "smalldatetime" => Some(SqlDataType::SmallDateTime),
            "datetime" => Some(SqlDataType::DateTime),
            "datetime2" => Some(SqlDataType::DateTime2),
            "datetimeoffset" => Some(SqlDataType::DateTimeOffset),
            "binary" => Some(SqlDataType::Binary),
            "varbinary" => Some(SqlDataType::VarBinary),
            "rowversion" | "timestamp" => Some(SqlDataType::RowVersion),
            "uniqueidentifier" => Some(SqlDataType::UniqueIdentifier),
            _ => None,
        }
    }

    /// Whether a catalog type name is in the excluded set.
    ///
    /// Excluded is stronger than unknown: an excluded column makes table
    /// setup fail even if the column is never mapped into the model.
    pub fn is_excluded(server_type: &str) -> bool {
        let normalized = server_type.trim().to_ascii_lowercase();
        EXCLUDED_TYPES.iter().any(|t| *t == normalized)
    }

    /// Whether values of this type are textual (quoted in SQL literals).
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            SqlDataType::Char | SqlDataType::VarChar | SqlDataType::NChar | SqlDataType::NVarChar
        )
    }

    /// Whether values of this type carry a date and/or time component.
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            SqlDataType::Date
                | SqlDataType::Time
                | SqlDataType::SmallDateTime
                | SqlDataType::DateTime
                | SqlDataType::DateTime2
                | SqlDataType::DateTimeOffset
        )
    }
}

//! The per-message payload document format.
//!
//! Each queue message carries one JSON document per row image: an object with
//! one member per captured column. Values use the representation defined on
//! [`SqlValue`]; decoding is directed by the column shape (name plus declared
//! type) so the payload itself stays untyped text.
//!
//! Decoding is forward-compatible: members that are not part of the supplied
//! shape are ignored, so server objects may capture more columns than the
//! model consumes.

use serde_json::Value as JsonValue;

use crate::errors::CommonError;
use crate::models::{Row, SqlDataType, SqlValue};

/// Name and declared type of one captured column.
pub type ColumnShape = (String, SqlDataType);

/// Encode a row into a payload document.
pub fn encode_row(row: &Row) -> String {
    row.to_json_object().to_string()
}

/// Decode a payload document against a column shape.
///
/// Columns present in the shape but absent from the document are simply not
/// populated; members absent from the shape are ignored.
pub fn decode_row(doc: &str, shape: &[ColumnShape]) -> Result<Row, CommonError> {
    let parsed: JsonValue = serde_json::from_str(doc)?;
    let object = parsed
        .as_object()
        .ok_or_else(|| CommonError::InvalidPayload("payload root is not an object".to_string()))?;

    let mut row = Row::default();
    for (name, data_type) in shape {
        if let Some(value) = object.get(name) {
            row.insert(name.clone(), SqlValue::from_json(name, *data_type, value)?);
        }
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DecimalValue;
    use chrono::{FixedOffset, NaiveDate, TimeZone};
    use uuid::Uuid;

    fn shape_of(entries: &[(&str, SqlDataType)]) -> Vec<ColumnShape> {
        entries.iter().map(|(n, t)| (n.to_string(), *t)).collect()
    }

    #[test]
    fn test_round_trip_every_supported_type() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let cases: Vec<(&str, SqlDataType, SqlValue)> = vec![
            ("flag", SqlDataType::Bit, SqlValue::Bit(true)),
            ("tiny", SqlDataType::TinyInt, SqlValue::TinyInt(255)),
            ("small", SqlDataType::SmallInt, SqlValue::SmallInt(-12)),
            ("id", SqlDataType::Int, SqlValue::Int(100)),
            ("big", SqlDataType::BigInt, SqlValue::BigInt(9_007_199_254_740_993)),
            ("ratio", SqlDataType::Real, SqlValue::Real(1.25)),
            ("weight", SqlDataType::Float, SqlValue::Float(0.1)),
            (
                "price",
                SqlDataType::Decimal,
                SqlValue::Decimal(DecimalValue::new(12377, 2)),
            ),
            (
                "total",
                SqlDataType::Money,
                SqlValue::Decimal(DecimalValue::new(-99_0001, 4)),
            ),
            ("name", SqlDataType::NVarChar, SqlValue::Text("Pâté 10%".into())),
            (
                "born",
                SqlDataType::Date,
                SqlValue::Date(NaiveDate::from_ymd_opt(1987, 6, 5).unwrap()),
            ),
            (
                "at",
                SqlDataType::DateTime2,
                SqlValue::DateTime(
                    NaiveDate::from_ymd_opt(2025, 12, 31)
                        .unwrap()
                        .and_hms_nano_opt(23, 59, 59, 999_999_900)
                        .unwrap(),
                ),
            ),
            (
                "seen",
                SqlDataType::DateTimeOffset,
                SqlValue::DateTimeOffset(
                    offset.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
                ),
            ),
            (
                "stamp",
                SqlDataType::RowVersion,
                SqlValue::Binary(vec![0, 0, 0, 0, 0, 0, 0x0B, 0xB8]),
            ),
            (
                "guid",
                SqlDataType::UniqueIdentifier,
                SqlValue::Guid(Uuid::parse_str("6f9619ff-8b86-d011-b42d-00c04fc964ff").unwrap()),
            ),
        ];

        let row: Row = cases
            .iter()
            .map(|(n, _, v)| (n.to_string(), v.clone()))
            .collect();
        let shape: Vec<ColumnShape> =
            cases.iter().map(|(n, t, _)| (n.to_string(), *t)).collect();

        let doc = encode_row(&row);
        let decoded = decode_row(&doc, &shape).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn test_decode_ignores_unknown_members() {
        let shape = shape_of(&[("id", SqlDataType::Int)]);
        let row = decode_row(r#"{"id": 5, "extra": "whatever"}"#, &shape).unwrap();
        assert_eq!(row.len(), 1);
        assert_eq!(row.get("id"), Some(&SqlValue::Int(5)));
    }

    #[test]
    fn test_decode_skips_absent_columns() {
        let shape = shape_of(&[("id", SqlDataType::Int), ("name", SqlDataType::NVarChar)]);
        let row = decode_row(r#"{"id": 5}"#, &shape).unwrap();
        assert_eq!(row.len(), 1);
        assert!(row.get("name").is_none());
    }

    #[test]
    fn test_decode_rejects_non_object() {
        let shape = shape_of(&[("id", SqlDataType::Int)]);
        assert!(decode_row("[1,2,3]", &shape).is_err());
    }
}

//! Model-property to server-column mapping.
//!
//! Resolution precedence, per property: explicit mapping entry, then the
//! model's own column hints, then case-insensitive name equality. The result
//! is built once at construction and read-only afterwards.

use std::collections::BTreeMap;

use tablewatch_commons::SqlDataType;

use crate::catalog::ColumnDescriptor;
use crate::error::{Result, TableWatchError};

/// One resolved association.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedColumn {
    pub property: String,
    pub column: String,
    pub data_type: SqlDataType,
}

/// Bidirectional property/column association for one dependency instance.
///
/// Invariants enforced at construction: every mapped column exists in the
/// catalog, each column appears at most once, and at least one property maps
/// to a column.
#[derive(Debug, Clone, Default)]
pub struct ColumnMapping {
    entries: Vec<MappedColumn>,
    by_property: BTreeMap<String, usize>,
    by_column: BTreeMap<String, usize>,
}

impl ColumnMapping {
    /// Resolve the mapping for `model_properties` against the discovered
    /// catalog.
    ///
    /// `explicit` is the caller-supplied mapping (highest precedence);
    /// `hints` come from the model type itself.
    pub fn resolve(
        model_properties: &[String],
        hints: &[(String, String)],
        explicit: Option<&[(String, String)]>,
        columns: &[ColumnDescriptor],
    ) -> Result<ColumnMapping> {
        if let Some(pairs) = explicit {
            if pairs.is_empty() {
                return Err(TableWatchError::ModelMapper(
                    "explicit mapping is empty".to_string(),
                ));
            }
            for (property, column) in pairs {
                if column.trim().is_empty() {
                    return Err(TableWatchError::ModelMapper(format!(
                        "explicit mapping for property '{property}' has an empty column name"
                    )));
                }
                if !columns.iter().any(|c| c.name.eq_ignore_ascii_case(column)) {
                    return Err(TableWatchError::ModelMapper(format!(
                        "explicit mapping for property '{property}' names unknown column '{column}'"
                    )));
                }
            }
        }

        let find_column = |wanted: &str| {
            columns
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(wanted))
        };

        let mut mapping = ColumnMapping::default();
        for property in model_properties {
            let target = explicit
                .and_then(|pairs| {
                    pairs
                        .iter()
                        .find(|(p, _)| p == property)
                        .map(|(_, c)| c.clone())
                })
                .or_else(|| {
                    hints
                        .iter()
                        .find(|(p, _)| p == property)
                        .map(|(_, c)| c.clone())
                });

            let descriptor = match target {
                Some(column) => find_column(&column),
                None => find_column(property),
            };

            if let Some(descriptor) = descriptor {
                let data_type = descriptor.data_type.ok_or_else(|| {
                    TableWatchError::UnsupportedColumnType(format!(
                        "column '{}' has type '{}'",
                        descriptor.name, descriptor.server_type
                    ))
                })?;
                mapping.push(property.clone(), descriptor.name.clone(), data_type)?;
            }
        }

        if mapping.entries.is_empty() {
            return Err(TableWatchError::NoMatchBetweenModelAndColumns);
        }
        Ok(mapping)
    }

    fn push(&mut self, property: String, column: String, data_type: SqlDataType) -> Result<()> {
        let column_key = column.to_ascii_lowercase();
        if self.by_column.contains_key(&column_key) {
            return Err(TableWatchError::ModelMapper(format!(
                "column '{column}' is mapped by more than one property"
            )));
        }
        let index = self.entries.len();
        self.by_property.insert(property.clone(), index);
        self.by_column.insert(column_key, index);
        self.entries.push(MappedColumn {
            property,
            column,
            data_type,
        });
        Ok(())
    }

    /// Mapped associations in model-property order.
    pub fn entries(&self) -> &[MappedColumn] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn column_for(&self, property: &str) -> Option<&MappedColumn> {
        self.by_property.get(property).map(|i| &self.entries[*i])
    }

    pub fn property_for(&self, column: &str) -> Option<&MappedColumn> {
        self.by_column
            .get(&column.to_ascii_lowercase())
            .map(|i| &self.entries[*i])
    }

    /// Column shape for payload decoding, in mapping order.
    pub fn column_shape(&self) -> Vec<(String, SqlDataType)> {
        self.entries
            .iter()
            .map(|e| (e.column.clone(), e.data_type))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<ColumnDescriptor> {
        [
            ("Id", "int"),
            ("Name", "nvarchar"),
            ("Qty", "int"),
            ("UnitPrice", "decimal"),
        ]
        .into_iter()
        .map(|(name, server_type)| ColumnDescriptor {
            name: name.to_string(),
            server_type: server_type.to_string(),
            size: None,
            data_type: SqlDataType::parse(server_type),
        })
        .collect()
    }

    fn props(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn pairs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect()
    }

    #[test]
    fn test_name_equality_fallback() {
        let mapping =
            ColumnMapping::resolve(&props(&["Id", "Name"]), &[], None, &catalog()).unwrap();
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.column_for("Id").unwrap().column, "Id");
    }

    #[test]
    fn test_explicit_mapping_wins_over_hints() {
        let hints = pairs(&[("Quantity", "Id")]);
        let explicit = pairs(&[("Quantity", "Qty")]);
        let mapping = ColumnMapping::resolve(
            &props(&["Quantity"]),
            &hints,
            Some(&explicit),
            &catalog(),
        )
        .unwrap();
        assert_eq!(mapping.column_for("Quantity").unwrap().column, "Qty");
    }

    #[test]
    fn test_hints_used_when_no_explicit() {
        let hints = pairs(&[("Quantity", "Qty")]);
        let mapping =
            ColumnMapping::resolve(&props(&["Quantity"]), &hints, None, &catalog()).unwrap();
        assert_eq!(mapping.column_for("Quantity").unwrap().column, "Qty");
    }

    #[test]
    fn test_empty_explicit_mapping_rejected() {
        let err =
            ColumnMapping::resolve(&props(&["Id"]), &[], Some(&[]), &catalog()).unwrap_err();
        assert!(matches!(err, TableWatchError::ModelMapper(_)));
    }

    #[test]
    fn test_unknown_column_in_explicit_mapping_rejected() {
        let explicit = pairs(&[("Id", "NoSuchColumn")]);
        let err = ColumnMapping::resolve(&props(&["Id"]), &[], Some(&explicit), &catalog())
            .unwrap_err();
        assert!(matches!(err, TableWatchError::ModelMapper(_)));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let explicit = pairs(&[("A", "Qty"), ("B", "Qty")]);
        let err = ColumnMapping::resolve(
            &props(&["A", "B"]),
            &[],
            Some(&explicit),
            &catalog(),
        )
        .unwrap_err();
        assert!(matches!(err, TableWatchError::ModelMapper(_)));
    }

    #[test]
    fn test_zero_matches_rejected() {
        let err = ColumnMapping::resolve(&props(&["Nope", "Nada"]), &[], None, &catalog())
            .unwrap_err();
        assert!(matches!(err, TableWatchError::NoMatchBetweenModelAndColumns));
    }

    #[test]
    fn test_property_lookup_is_case_insensitive_on_columns() {
        let explicit = pairs(&[("Price", "unitprice")]);
        let mapping =
            ColumnMapping::resolve(&props(&["Price"]), &[], Some(&explicit), &catalog()).unwrap();
        // Mapping stores the catalog's spelling, not the caller's.
        assert_eq!(mapping.column_for("Price").unwrap().column, "UnitPrice");
        assert!(mapping.property_for("UNITPRICE").is_some());
    }
}

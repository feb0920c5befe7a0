//! Column catalog: introspection and validation of the watched table.

pub mod mapping;

pub use mapping::ColumnMapping;

use log::debug;

use tablewatch_commons::{SqlDataType, SqlValue, TableRef};

use crate::dialect::SqlDialect;
use crate::driver::SqlConnection;
use crate::error::{Result, TableWatchError};

/// One column of the watched table, as discovered from the server catalog.
///
/// Immutable once discovered.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Raw catalog type name, e.g. `nvarchar`.
    pub server_type: String,
    /// Declared size in bytes, when the catalog reports one.
    pub size: Option<i32>,
    /// Resolved type; `None` when the server type is unknown or excluded.
    pub data_type: Option<SqlDataType>,
}

/// Introspect the watched table's columns.
pub async fn discover(
    conn: &mut dyn SqlConnection,
    dialect: &dyn SqlDialect,
    table: &TableRef,
) -> Result<Vec<ColumnDescriptor>> {
    let exists = conn.query_rows(&dialect.table_exists_query(table)).await?;
    if exists.is_empty() {
        return Err(TableWatchError::TableNotFound(table.to_string()));
    }

    let rows = conn.query_rows(&dialect.column_catalog_query(table)).await?;
    if rows.is_empty() {
        return Err(TableWatchError::NoColumns(table.to_string()));
    }

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let name = match row.get("column_name") {
            Some(SqlValue::Text(s)) => s.clone(),
            _ => {
                return Err(TableWatchError::Other(
                    "catalog query returned no column_name".to_string(),
                ))
            }
        };
        let server_type = match row.get("server_type") {
            Some(SqlValue::Text(s)) => s.to_ascii_lowercase(),
            _ => {
                return Err(TableWatchError::Other(format!(
                    "catalog query returned no server_type for column '{name}'"
                )))
            }
        };
        let size = match row.get("max_length") {
            Some(SqlValue::Int(v)) => Some(*v),
            Some(SqlValue::SmallInt(v)) => Some(*v as i32),
            _ => None,
        };
        let data_type = SqlDataType::parse(&server_type);
        columns.push(ColumnDescriptor {
            name,
            server_type,
            size,
            data_type,
        });
    }

    debug!("discovered {} columns on {}", columns.len(), table);
    Ok(columns)
}

/// Fail if any discovered column carries a type that cannot be captured.
pub fn validate(table: &TableRef, columns: &[ColumnDescriptor]) -> Result<()> {
    for column in columns {
        if SqlDataType::is_excluded(&column.server_type) {
            return Err(TableWatchError::UnsupportedColumnType(format!(
                "{}.{} has type '{}'",
                table, column.name, column.server_type
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, server_type: &str) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            server_type: server_type.to_string(),
            size: None,
            data_type: SqlDataType::parse(server_type),
        }
    }

    #[test]
    fn test_validate_accepts_supported_columns() {
        let table = TableRef::new("dbo", "Products");
        let columns = vec![descriptor("Id", "int"), descriptor("Name", "nvarchar")];
        assert!(validate(&table, &columns).is_ok());
    }

    #[test]
    fn test_validate_rejects_excluded_column() {
        let table = TableRef::new("dbo", "Products");
        let columns = vec![descriptor("Id", "int"), descriptor("Doc", "xml")];
        let err = validate(&table, &columns).unwrap_err();
        assert!(matches!(err, TableWatchError::UnsupportedColumnType(_)));
    }
}

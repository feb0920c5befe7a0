//! Model types shared across the tablewatch crates.

pub mod change;
pub mod datatypes;
pub mod row;
pub mod value;

pub use change::{ChangeType, TableRef};
pub use datatypes::SqlDataType;
pub use row::Row;
pub use value::{DecimalValue, SqlValue};

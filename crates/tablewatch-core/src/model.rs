//! The model seam: what the engine needs to know about a record type.
//!
//! There is no runtime reflection here. A model describes itself with a
//! statically-constructed property list (and optionally a property-to-column
//! hint table); decoded rows are materialized through serde.

use serde::de::DeserializeOwned;

/// A record type that can receive change notifications.
///
/// ```rust,ignore
/// #[derive(Deserialize)]
/// struct Product {
///     id: i32,
///     quantity: i32,
/// }
///
/// impl TableRecord for Product {
///     fn table_name() -> String {
///         "Products".to_string()
///     }
///     fn model_properties() -> Vec<String> {
///         vec!["id".to_string(), "quantity".to_string()]
///     }
///     fn column_hints() -> Vec<(String, String)> {
///         vec![
///             ("id".to_string(), "Id".to_string()),
///             ("quantity".to_string(), "Quantity".to_string()),
///         ]
///     }
/// }
/// ```
pub trait TableRecord: DeserializeOwned + Send + 'static {
    /// Default table name when the options leave it unset.
    fn table_name() -> String;

    /// Property names in declaration order.
    fn model_properties() -> Vec<String>;

    /// Property-to-column associations the model carries itself.
    /// Overridden per property by an explicit mapping in the options.
    fn column_hints() -> Vec<(String, String)> {
        Vec::new()
    }
}

//! A decoded row: column name to scalar value.

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::models::value::SqlValue;

/// A unified row representation that holds [`SqlValue`]s but serializes to
/// clean, standard JSON for client types.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub values: BTreeMap<String, SqlValue>,
}

impl Row {
    pub fn new(values: BTreeMap<String, SqlValue>) -> Self {
        Self { values }
    }

    /// Retrieve a value by column name.
    pub fn get(&self, key: &str) -> Option<&SqlValue> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: SqlValue) {
        self.values.insert(key.into(), value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Convert into a JSON object using the payload value representation.
    pub fn to_json_object(&self) -> JsonValue {
        let mut map = JsonMap::with_capacity(self.values.len());
        for (k, v) in &self.values {
            map.insert(k.clone(), v.to_json());
        }
        JsonValue::Object(map)
    }
}

impl Serialize for Row {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (k, v) in &self.values {
            map.serialize_entry(k, &v.to_json())?;
        }
        map.end()
    }
}

impl FromIterator<(String, SqlValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, SqlValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

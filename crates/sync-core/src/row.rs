//! Row representation keyed by column name.

use std::collections::BTreeMap;

use crate::schema::TableSchema;
use crate::values::ColumnValue;

/// A table row as a column-name to value map.
///
/// Columns are always looked up by name; the order in which a source emits
/// them carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    values: BTreeMap<String, ColumnValue>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ColumnValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set a column value, replacing any previous one.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ColumnValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Get a column value by name.
    pub fn get(&self, name: &str) -> Option<&ColumnValue> {
        self.values.get(name)
    }

    /// Whether the row carries a value (possibly NULL) for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of columns in the row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Extract the primary key values of this row in key order.
    ///
    /// Returns `None` when any key column is absent or NULL.
    pub fn primary_key(&self, schema: &TableSchema) -> Option<Vec<ColumnValue>> {
        schema
            .primary_key
            .iter()
            .map(|pk| match self.values.get(pk) {
                Some(value) if !value.is_null() => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    /// Overwrite this row's columns with the ones present in `other`.
    pub fn merge(&mut self, other: &Row) {
        for (name, value) in other.iter() {
            self.values.insert(name.to_string(), value.clone());
        }
    }
}

impl FromIterator<(String, ColumnValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, ColumnValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_key_extraction() {
        let schema = TableSchema::person();
        let row = Row::new().with("id", 7).with("name", "Alice");
        assert_eq!(row.primary_key(&schema), Some(vec![ColumnValue::Integer(7)]));

        let no_key = Row::new().with("name", "Alice");
        assert_eq!(no_key.primary_key(&schema), None);

        let null_key = Row::new().with("id", ColumnValue::Null);
        assert_eq!(null_key.primary_key(&schema), None);
    }

    #[test]
    fn test_merge_overwrites_present_columns_only() {
        let mut row = Row::new().with("id", 1).with("name", "Alice").with("score", 3);
        row.merge(&Row::new().with("score", 30));
        assert_eq!(row.get("score"), Some(&ColumnValue::Integer(30)));
        assert_eq!(row.get("name"), Some(&ColumnValue::text("Alice")));
    }
}

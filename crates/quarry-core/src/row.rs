//! Result rows.

use crate::value::SqlValue;

/// A result row: column names paired with values, in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Creates a row. Missing values are padded with NULL.
    #[must_use]
    pub fn new(columns: Vec<String>, mut values: Vec<SqlValue>) -> Self {
        values.resize(columns.len(), SqlValue::Null);
        Self { columns, values }
    }

    /// Returns the value of the named column.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    /// Returns the value at `index`.
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values.
    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Consumes the row, returning its values.
    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    /// Iterates over `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns.iter().map(String::as_str).zip(&self.values)
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` when the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_access() {
        let row = Row::new(
            vec!["id".into(), "name".into()],
            vec![SqlValue::Int(1)],
        );
        assert_eq!(row.get("id"), Some(&SqlValue::Int(1)));
        assert_eq!(row.get("name"), Some(&SqlValue::Null));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.iter().count(), 2);
    }
}

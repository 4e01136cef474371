use std::collections::HashMap;
use std::ops::Index;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::value::SqlValue;

/// A single row from a query result, with column-name lookup.
///
/// Column names are shared across all rows of a result set via `Arc`,
/// with a per-result-set index cache to avoid repeated string
/// comparisons on lookup.
#[derive(Debug, Clone)]
pub struct Record {
    columns: Arc<Vec<String>>,
    values: Vec<SqlValue>,
    column_index: Arc<HashMap<String, usize>>,
}

/// Build the name-to-index cache shared by every [`Record`] of one
/// result set.
pub(crate) fn column_index(columns: &Arc<Vec<String>>) -> Arc<HashMap<String, usize>> {
    Arc::new(
        columns
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect::<HashMap<_, _>>(),
    )
}

impl Record {
    /// Create a new record, building its own column-index cache.
    #[must_use]
    pub fn new(columns: Arc<Vec<String>>, values: Vec<SqlValue>) -> Self {
        let cache = column_index(&columns);
        Self::from_parts(columns, cache, values)
    }

    /// Create a record reusing a result-set-wide index cache.
    pub(crate) fn from_parts(
        columns: Arc<Vec<String>>,
        column_index: Arc<HashMap<String, usize>>,
        values: Vec<SqlValue>,
    ) -> Self {
        Self {
            columns,
            values,
            column_index,
        }
    }

    /// Column names, in result order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values, in column order.
    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by column name, or `None` if the column is absent.
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&SqlValue> {
        let idx = self
            .column_index
            .get(column_name)
            .copied()
            .or_else(|| self.columns.iter().position(|col| col == column_name))?;
        self.values.get(idx)
    }

    /// Get a value by column index, or `None` if out of bounds.
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SqlValue> {
        self.values.iter()
    }

    /// Render the record as a JSON object keyed by column name.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        let map = self
            .columns
            .iter()
            .zip(self.values.iter())
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect::<serde_json::Map<_, _>>();
        JsonValue::Object(map)
    }
}

impl Index<usize> for Record {
    type Output = SqlValue;

    fn index(&self, index: usize) -> &Self::Output {
        &self.values[index]
    }
}

impl Index<&str> for Record {
    type Output = SqlValue;

    /// Panics when the column does not exist; use [`Record::get`] for a
    /// fallible lookup.
    fn index(&self, column_name: &str) -> &Self::Output {
        self.get(column_name)
            .unwrap_or_else(|| panic!("no such column: {column_name}"))
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = &'a SqlValue;
    type IntoIter = std::slice::Iter<'a, SqlValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

//! Data tables flowing through pipeline slots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single data item with its annotation key/value set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRow {
    /// The data item itself.
    pub value: serde_json::Value,
    /// Annotations attached to this row.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl DataRow {
    /// Creates a row without annotations.
    pub fn new(value: impl Into<serde_json::Value>) -> Self {
        Self {
            value: value.into(),
            annotations: BTreeMap::new(),
        }
    }

    /// Adds an annotation to the row.
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

/// An ordered collection of annotated data rows.
///
/// Tables are the unit of data held by slots and stored in the cache. A
/// cloned table is a fully independent snapshot; equality is value equality
/// over the data type and all rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    /// Data type accepted by the owning slot.
    pub data_type: String,
    /// Rows in insertion order.
    pub rows: Vec<DataRow>,
}

impl DataTable {
    /// Creates an empty table of the given data type.
    pub fn new(data_type: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            rows: Vec::new(),
        }
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends a single row.
    pub fn push(&mut self, row: DataRow) {
        self.rows.push(row);
    }

    /// Appends all rows of another table, keeping each row's annotations.
    pub fn append_from(&mut self, other: &DataTable) {
        self.rows.extend(other.rows.iter().cloned());
    }

    /// Appends all rows of another table, attaching the given annotations
    /// to every copied row. Existing row annotations take precedence.
    pub fn append_annotated(&mut self, other: &DataTable, extra: &BTreeMap<String, String>) {
        for row in &other.rows {
            let mut copied = row.clone();
            for (key, value) in extra {
                copied
                    .annotations
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
            self.rows.push(copied);
        }
    }

    /// Returns a table containing only the given row.
    pub fn slice_row(&self, index: usize) -> Option<DataTable> {
        self.rows.get(index).map(|row| DataTable {
            data_type: self.data_type.clone(),
            rows: vec![row.clone()],
        })
    }
}

//! Tabular dataset normalization.
//!
//! Every backend (XLSX, CSV) hands its raw header and records to
//! [`Dataset::from_records`], which applies the same trimming, missing-value
//! and header rules regardless of the source format.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Text that spreadsheet exports use for a missing value.
const MISSING_MARKER: &str = "nan";

/// An immutable, ordered set of rows sharing one column set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Dataset {
    /// Build a dataset from a raw header row and raw data records.
    ///
    /// - Column names and cells are trimmed.
    /// - Blank or `nan` cells become the empty string.
    /// - Blank headers become `Unnamed: <index>`, duplicates get `.1`, `.2`, ...
    /// - Records are padded (or the header widened) so all rows share the column set.
    /// - Trailing records with no content are dropped.
    pub fn from_records(header: Vec<String>, records: Vec<Vec<String>>) -> Self {
        let width = records
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(header.len()))
            .max()
            .unwrap_or(0);

        let mut raw_header = header;
        raw_header.resize(width, String::new());
        let columns = unique_columns(raw_header);

        let mut rows: Vec<Vec<String>> = records
            .into_iter()
            .map(|record| {
                let mut row: Vec<String> = record.iter().map(|c| normalize_cell(c)).collect();
                row.resize(width, String::new());
                row
            })
            .collect();

        while rows
            .last()
            .is_some_and(|row| row.iter().all(|v| v.is_empty()))
        {
            rows.pop();
        }

        Self { columns, rows }
    }

    /// Column names in source order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the dataset has no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get the row at `index`.
    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        self.rows.get(index).map(|values| Row {
            columns: &self.columns,
            values,
        })
    }

    /// Iterate rows in order.
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|values| Row {
            columns: &self.columns,
            values,
        })
    }
}

/// A borrowed view of one dataset row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [String],
    values: &'a [String],
}

impl<'a> Row<'a> {
    /// Value for `column`, if the column exists.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| self.values[i].as_str())
    }

    /// `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.columns
            .iter()
            .zip(self.values.iter())
            .map(|(c, v)| (c.as_str(), v.as_str()))
    }
}

/// Trim a raw cell and map missing markers to the empty string.
pub fn normalize_cell(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == MISSING_MARKER {
        String::new()
    } else {
        trimmed.to_string()
    }
}

fn unique_columns(raw: Vec<String>) -> Vec<String> {
    let trimmed: Vec<String> = raw
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let name = name.trim();
            if name.is_empty() {
                format!("Unnamed: {}", i)
            } else {
                name.to_string()
            }
        })
        .collect();

    let mut taken: HashSet<String> = HashSet::with_capacity(trimmed.len());
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut columns = Vec::with_capacity(trimmed.len());

    for name in trimmed {
        let mut candidate = name.clone();
        if taken.contains(&candidate) {
            let counter = seen.entry(name.clone()).or_insert(0);
            loop {
                *counter += 1;
                candidate = format!("{}.{}", name, counter);
                if !taken.contains(&candidate) {
                    break;
                }
            }
        }
        taken.insert(candidate.clone());
        columns.push(candidate);
    }

    columns
}

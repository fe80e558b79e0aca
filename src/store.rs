//! 表形式リソースの読み書き。
//!
//! パーティション・年次結果・入力ファイルはすべてキー付きの `Table` として扱う。
pub mod csv_store;
pub mod memory;

use std::path::PathBuf;

use thiserror::Error;

pub use csv_store::CsvTableStore;
pub use memory::MemoryTableStore;

pub const INPUT_TEXT_COLUMN: &str = "Tweet_Content";
pub const TIMESTAMP_COLUMN: &str = "UTC_Time";
pub const TEXT_COLUMN: &str = "text";
pub const LABEL_COLUMN: &str = "sentiment";

#[must_use]
pub fn input_key(year: i32) -> String {
    format!("filtered_tweets_{year}")
}

#[must_use]
pub fn results_key(year: i32) -> String {
    format!("results_{year}_sentiment")
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("resource {key} is missing required column {column}")]
    MissingColumn { key: String, column: String },
    #[error("failed to read resource {key} at {path}")]
    Read {
        key: String,
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("failed to write resource {key} at {path}")]
    Write {
        key: String,
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("resource {key} row {row} has {found} cells, expected {expected}")]
    Ragged {
        key: String,
        row: usize,
        found: usize,
        expected: usize,
    },
}

/// An ordered table of string cells with named columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Builds a table, rejecting rows whose width differs from the header.
    ///
    /// # Errors
    /// Returns [`StoreError::Ragged`] for the first row of the wrong width.
    pub fn from_rows(
        key: &str,
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    ) -> Result<Self, StoreError> {
        if let Some((row, cells)) = rows
            .iter()
            .enumerate()
            .find(|(_, cells)| cells.len() != columns.len())
        {
            return Err(StoreError::Ragged {
                key: key.to_string(),
                row,
                found: cells.len(),
                expected: columns.len(),
            });
        }
        Ok(Self { columns, rows })
    }

    pub fn push_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut row: Vec<String> = cells.into_iter().map(Into::into).collect();
        row.resize(self.columns.len(), String::new());
        self.rows.push(row);
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// # Errors
    /// Returns [`StoreError::MissingColumn`] when `name` is not a header.
    pub fn require_column(&self, key: &str, name: &str) -> Result<usize, StoreError> {
        self.column_index(name)
            .ok_or_else(|| StoreError::MissingColumn {
                key: key.to_string(),
                column: name.to_string(),
            })
    }

    /// Values of one column, in row order.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &str> + '_ {
        self.rows
            .iter()
            .map(move |row| row.get(index).map_or("", String::as_str))
    }

    /// Appends `other` after the existing rows, matching cells by column name.
    ///
    /// Columns only present in `other` are added; cells absent on either side stay empty.
    /// Rows are never deduplicated.
    pub fn append(&mut self, other: &Table) {
        for column in &other.columns {
            if self.column_index(column).is_none() {
                self.columns.push(column.clone());
                for row in &mut self.rows {
                    row.push(String::new());
                }
            }
        }

        let mapping: Vec<usize> = other
            .columns
            .iter()
            .filter_map(|column| self.column_index(column))
            .collect();

        for source in &other.rows {
            let mut row = vec![String::new(); self.columns.len()];
            for (cell, &target) in source.iter().zip(&mapping) {
                row[target].clone_from(cell);
            }
            self.rows.push(row);
        }
    }
}

/// Keyed read/write access to tabular resources.
pub trait TableStore: Send + Sync {
    /// Loads a resource. `Ok(None)` means the resource does not exist.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the resource exists but cannot be read.
    fn read(&self, key: &str) -> Result<Option<Table>, StoreError>;

    /// Replaces the resource with `table` in full.
    ///
    /// # Errors
    /// Returns [`StoreError::Write`] when persisting fails.
    fn write(&self, key: &str, table: &Table) -> Result<(), StoreError>;
}

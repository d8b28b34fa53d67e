//! CSV dataset loading and pure table operations
//!
//! Reads a headed CSV file into a column-major table. Cells are parsed as
//! numbers when possible, empty fields become `Missing` and anything else
//! is kept as text. Every operation returns a new table.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::errors::{PipelineError, Result};

/// A single table cell
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Missing,
}

impl Cell {
    /// Parse a raw CSV field
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => Cell::Number(value),
            _ => Cell::Text(trimmed.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    /// Textual key used for categorical encoding
    ///
    /// Integral numbers render without a fractional part so that `1` and
    /// `1.0` map to the same category.
    pub fn category_key(&self) -> Option<String> {
        match self {
            Cell::Number(v) if v.fract() == 0.0 && v.abs() < 1e15 => Some(format!("{}", *v as i64)),
            Cell::Number(v) => Some(v.to_string()),
            Cell::Text(s) => Some(s.clone()),
            Cell::Missing => None,
        }
    }
}

/// In-memory table with named columns
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    names: Vec<String>,
    columns: Vec<Vec<Cell>>,
    rows: usize,
}

impl Dataset {
    /// Build a table from column names and column-major cells
    pub fn from_columns(names: Vec<String>, columns: Vec<Vec<Cell>>) -> Result<Self> {
        if names.len() != columns.len() {
            return Err(PipelineError::format(format!(
                "{} column names for {} columns",
                names.len(),
                columns.len()
            )));
        }

        let rows = columns.first().map(Vec::len).unwrap_or(0);
        for (name, column) in names.iter().zip(&columns) {
            if column.len() != rows {
                return Err(PipelineError::format(format!(
                    "column '{}' has {} rows, expected {}",
                    name,
                    column.len(),
                    rows
                )));
            }
        }

        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(PipelineError::format(format!("duplicate column '{}'", name)));
            }
        }

        Ok(Self {
            names,
            columns,
            rows,
        })
    }

    /// Load a dataset from a CSV file with a header row
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| PipelineError::file(path, err))?;
        let mut reader = csv::Reader::from_reader(BufReader::new(file));

        let headers = reader.headers()?.clone();
        if headers.is_empty() {
            return Err(PipelineError::format(format!(
                "{}: missing header row",
                path.display()
            )));
        }

        let names: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();
        let mut columns: Vec<Vec<Cell>> = vec![Vec::new(); names.len()];

        for (line_idx, record) in reader.records().enumerate() {
            // csv rejects ragged rows on its own, header is line 1
            let record = record.map_err(|err| {
                PipelineError::format(format!("{} line {}: {}", path.display(), line_idx + 2, err))
            })?;
            for (column, field) in columns.iter_mut().zip(record.iter()) {
                column.push(Cell::parse(field));
            }
        }

        let dataset = Self::from_columns(names, columns)?;
        if dataset.is_empty() {
            return Err(PipelineError::format(format!(
                "{}: dataset has no rows",
                path.display()
            )));
        }

        tracing::debug!(
            rows = dataset.len(),
            columns = dataset.width(),
            "loaded dataset from {}",
            path.display()
        );
        Ok(dataset)
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.names.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Result<&[Cell]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.columns[idx].as_slice())
            .ok_or_else(|| PipelineError::config(format!("column '{}' not found in dataset", name)))
    }

    /// New table holding the given rows in the given order
    pub fn select_rows(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.rows) {
            return Err(PipelineError::state(format!(
                "row index {} out of bounds for {} rows",
                bad, self.rows
            )));
        }

        let columns = self
            .columns
            .iter()
            .map(|column| indices.iter().map(|&i| column[i].clone()).collect())
            .collect();

        Ok(Self {
            names: self.names.clone(),
            columns,
            rows: indices.len(),
        })
    }

    /// New table holding only the named columns, in the given order
    pub fn select_columns(&self, names: &[String]) -> Result<Self> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            columns.push(self.column(name)?.to_vec());
        }
        Self::from_columns(names.to_vec(), columns)
    }

    /// New table without the named column
    pub fn drop_column(&self, name: &str) -> Result<Self> {
        let idx = self
            .names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| PipelineError::config(format!("column '{}' not found in dataset", name)))?;

        let mut names = self.names.clone();
        let mut columns = self.columns.clone();
        names.remove(idx);
        columns.remove(idx);

        Ok(Self {
            names,
            columns,
            rows: self.rows,
        })
    }

    /// Missing-value count per column, in column order
    pub fn missing_counts(&self) -> Vec<(String, usize)> {
        self.names
            .iter()
            .zip(&self.columns)
            .map(|(name, column)| {
                (name.clone(), column.iter().filter(|c| c.is_missing()).count())
            })
            .collect()
    }
}

//! Row-oriented data sources consumed by the writer
//!
//! A data source is forward-only: it exposes its column schema up front and
//! then one current record at a time. [`DataReader`] advances synchronously,
//! [`AsyncDataReader`] may suspend while fetching the next row. Every
//! `DataReader + Send` is usable on the async path as well.

use crate::error::{ExcelError, Result};
use crate::types::{CellValue, Column};
use std::future::Future;

/// Access to the schema and the current record of a data source
pub trait DataRecord {
    /// Column schema; fixed for the lifetime of the source
    fn columns(&self) -> &[Column];

    /// Value of column `ordinal` in the current record
    fn get_value(&self, ordinal: usize) -> Result<CellValue>;

    fn column_count(&self) -> usize {
        self.columns().len()
    }
}

/// Forward-only reader that blocks while advancing
pub trait DataReader: DataRecord {
    /// Move to the next record; `false` once the source is exhausted
    fn read(&mut self) -> Result<bool>;
}

/// Forward-only reader whose advance may suspend
pub trait AsyncDataReader: DataRecord {
    /// Move to the next record; `false` once the source is exhausted
    fn read_async(&mut self) -> impl Future<Output = Result<bool>> + Send;
}

impl<R: DataReader + Send> AsyncDataReader for R {
    fn read_async(&mut self) -> impl Future<Output = Result<bool>> + Send {
        std::future::ready(self.read())
    }
}

/// In-memory data source over pre-built rows
///
/// Rows shorter than the schema read as [`CellValue::Null`] in the missing
/// columns.
///
/// # Examples
///
/// ```
/// use excelstream_data::data_reader::{DataReader, DataRecord, VecReader};
/// use excelstream_data::types::{CellValue, Column, ColumnType};
///
/// let mut reader = VecReader::new(
///     vec![Column::new("Name", ColumnType::String)],
///     vec![vec![CellValue::from("Alice")]],
/// );
/// assert!(reader.read()?);
/// assert_eq!(reader.get_value(0)?, CellValue::from("Alice"));
/// assert!(!reader.read()?);
/// # Ok::<(), excelstream_data::ExcelError>(())
/// ```
#[derive(Debug, Clone)]
pub struct VecReader {
    columns: Vec<Column>,
    rows: Vec<Vec<CellValue>>,
    position: Option<usize>,
}

impl VecReader {
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<CellValue>>) -> Self {
        VecReader {
            columns,
            rows,
            position: None,
        }
    }

    /// Build a reader from header names, inferring column types from the first row
    pub fn from_rows<I, S>(headers: I, rows: Vec<Vec<CellValue>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = headers
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let column_type = rows
                    .first()
                    .and_then(|row| row.get(i))
                    .map(CellValue::column_type)
                    .unwrap_or(crate::types::ColumnType::Unknown);
                Column::new(name, column_type)
            })
            .collect();
        Self::new(columns, rows)
    }

    /// Number of rows not yet read
    pub fn remaining(&self) -> usize {
        match self.position {
            None => self.rows.len(),
            Some(p) => self.rows.len().saturating_sub(p + 1),
        }
    }
}

impl DataRecord for VecReader {
    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn get_value(&self, ordinal: usize) -> Result<CellValue> {
        if ordinal >= self.columns.len() {
            return Err(ExcelError::InvalidDataSource(format!(
                "column ordinal {} out of range ({} columns)",
                ordinal,
                self.columns.len()
            )));
        }
        let row = self
            .position
            .and_then(|p| self.rows.get(p))
            .ok_or_else(|| {
                ExcelError::InvalidDataSource("no current record; call read() first".to_string())
            })?;
        Ok(row.get(ordinal).cloned().unwrap_or(CellValue::Null))
    }
}

impl DataReader for VecReader {
    fn read(&mut self) -> Result<bool> {
        let next = self.position.map_or(0, |p| p + 1);
        if next < self.rows.len() {
            self.position = Some(next);
            Ok(true)
        } else {
            self.position = Some(self.rows.len());
            Ok(false)
        }
    }
}

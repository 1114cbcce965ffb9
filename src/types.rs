//! Type definitions for data flowing from a data source into a worksheet

use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;

/// Declared type of a data source column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// Text
    String,
    /// Signed integer
    Int,
    /// Floating point
    Float,
    /// Boolean
    Bool,
    /// Calendar date without time
    Date,
    /// Date and time without zone
    DateTime,
    /// Type not known to the data source; values are inspected per cell
    Unknown,
}

/// Column metadata exposed by a data source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name, written as the header cell
    pub name: String,
    /// Declared column type
    pub column_type: ColumnType,
}

impl Column {
    /// Create a new column
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Column {
            name: name.into(),
            column_type,
        }
    }
}

/// A single value read from a data source
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Missing value; no cell is emitted
    Null,
    /// String value
    String(String),
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
    /// Boolean value
    Bool(bool),
    /// Date value
    Date(NaiveDate),
    /// DateTime value
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Column type this value naturally belongs to
    pub fn column_type(&self) -> ColumnType {
        match self {
            CellValue::Null => ColumnType::Unknown,
            CellValue::String(_) => ColumnType::String,
            CellValue::Int(_) => ColumnType::Int,
            CellValue::Float(_) => ColumnType::Float,
            CellValue::Bool(_) => ColumnType::Bool,
            CellValue::Date(_) => ColumnType::Date,
            CellValue::DateTime(_) => ColumnType::DateTime,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::String(s) => f.write_str(s),
            CellValue::Int(i) => write!(f, "{}", i),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::Bool(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            CellValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(s)
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Int(i)
    }
}

impl From<i32> for CellValue {
    fn from(i: i32) -> Self {
        CellValue::Int(i64::from(i))
    }
}

impl From<f64> for CellValue {
    fn from(f: f64) -> Self {
        CellValue::Float(f)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(d: NaiveDate) -> Self {
        CellValue::Date(d)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(dt: NaiveDateTime) -> Self {
        CellValue::DateTime(dt)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(CellValue::Null, Into::into)
    }
}

//! Error types for excelstream-data

use thiserror::Error;

/// Result type alias for excelstream-data operations
pub type Result<T> = std::result::Result<T, ExcelError>;

/// Main error type for all write operations
#[derive(Error, Debug)]
pub enum ExcelError {
    /// Error occurred while writing the container
    #[error("Failed to write Excel file: {0}")]
    WriteError(String),

    /// A text value is longer than the format allows and truncation is disabled
    #[error(
        "Value in row {row}, column {column} is {len} characters long; the maximum is {max}"
    )]
    StringTooLong {
        row: u64,
        column: usize,
        len: usize,
        max: usize,
    },

    /// The data source has more columns than a worksheet can hold
    #[error("Data source has {columns} columns; a worksheet holds at most {max}")]
    TooManyColumns { columns: usize, max: usize },

    /// Sheet name rejected by the backend
    #[error("Invalid sheet name '{name}': {reason}")]
    InvalidSheetName { name: String, reason: String },

    /// The data source cannot be written (no columns, bad ordinal, ...)
    #[error("Invalid data source: {0}")]
    InvalidDataSource(String),

    /// The data source failed while producing a value
    #[error("Data source error: {0}")]
    DataSource(String),

    /// A previous I/O failure left the output in an unknown state
    #[error("Writer is faulted after an earlier I/O failure; no further worksheets can be written")]
    Faulted,

    /// IO error wrapper
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ExcelError {
    /// True for failures caused by the data itself rather than the output stream.
    ///
    /// A validation failure leaves the writer usable for further worksheets.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ExcelError::StringTooLong { .. }
                | ExcelError::TooManyColumns { .. }
                | ExcelError::InvalidSheetName { .. }
                | ExcelError::InvalidDataSource(_)
                | ExcelError::DataSource(_)
        )
    }

    /// True when the underlying stream failed.
    pub fn is_io(&self) -> bool {
        matches!(self, ExcelError::IoError(_) | ExcelError::WriteError(_))
    }
}

#[cfg(feature = "postgres")]
impl From<::postgres::Error> for ExcelError {
    fn from(err: ::postgres::Error) -> Self {
        ExcelError::DataSource(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = ExcelError::StringTooLong {
            row: 3,
            column: 1,
            len: 40_000,
            max: 32_767,
        };
        assert!(err.is_validation());
        assert!(!err.is_io());
        assert_eq!(
            err.to_string(),
            "Value in row 3, column 1 is 40000 characters long; the maximum is 32767"
        );

        let err = ExcelError::from(std::io::Error::other("disk full"));
        assert!(err.is_io());
        assert!(!err.is_validation());

        assert!(!ExcelError::Faulted.is_validation());
        assert!(!ExcelError::Faulted.is_io());
    }
}

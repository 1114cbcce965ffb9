//! # excelstream-data
//!
//! Streaming export of row-oriented data sources into Excel workbooks.
//!
//! ## Features
//!
//! - **One call per worksheet**: hand a [`DataReader`] to the writer and every row lands in a new sheet
//! - **Shared strings**: repeated text is stored once for the whole workbook
//! - **Streaming**: rows are compressed as they arrive; the output never needs to seek
//! - **Async + cancellation**: the async path suspends on slow sources and stops cleanly on request
//! - **Stream ownership**: write to a file the writer owns, or to any `Write` you keep
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use excelstream_data::{CellValue, ExcelDataWriter, VecReader};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut writer = ExcelDataWriter::create("output.xlsx")?;
//!
//! let mut people = VecReader::from_rows(
//!     ["Name", "Age", "City"],
//!     vec![
//!         vec![CellValue::from("Alice"), CellValue::Int(30), CellValue::from("New York")],
//!         vec![CellValue::from("Bob"), CellValue::Int(25), CellValue::from("New York")],
//!     ],
//! );
//! let result = writer.write(&mut people, Some("People"))?;
//! println!("wrote {}", result);
//!
//! writer.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Writing to a borrowed stream
//!
//! ```rust
//! use excelstream_data::{CellValue, ExcelDataWriter, VecReader};
//! use std::io::Cursor;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut writer = ExcelDataWriter::from_writer(Cursor::new(Vec::new()));
//! let mut reader = VecReader::from_rows(["Total"], vec![vec![CellValue::Int(42)]]);
//! writer.write(&mut reader, None)?;
//!
//! // The stream comes back open
//! let cursor = writer.close()?.expect("borrowed stream is returned");
//! assert!(!cursor.get_ref().is_empty());
//! # Ok(())
//! # }
//! ```

pub mod backend;
#[cfg(feature = "async")]
pub mod cancel;
pub mod data_reader;
pub mod error;
pub mod fast_writer;
pub mod options;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod shared_strings;
pub mod types;
pub mod write_result;
pub mod writer;

pub use backend::SheetBackend;
#[cfg(feature = "async")]
pub use cancel::{cancellation, CancelHandle, CancellationSignal};
pub use data_reader::{AsyncDataReader, DataReader, DataRecord, VecReader};
pub use error::{ExcelError, Result};
pub use fast_writer::XlsxBackend;
pub use options::{MemoryProfile, WriterOptions};
pub use shared_strings::{SharedStringId, SharedStrings};
pub use types::{CellValue, Column, ColumnType};
pub use write_result::WriteResult;
pub use writer::{DataWriter, ExcelDataWriter, ExcelDataWriterBuilder, StreamOwnership};

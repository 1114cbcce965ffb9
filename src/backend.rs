//! Capability interface implemented by container-format backends
//!
//! A backend turns committed rows into bytes for one container format. It
//! never owns the string table: the writer passes its [`SharedStrings`] into
//! every call, so all worksheets of a workbook share one pool and a backend
//! can only observe it through these calls.

use crate::error::Result;
use crate::shared_strings::SharedStrings;
use crate::types::CellValue;

/// Format-specific worksheet writer
///
/// The writer drives a backend through `begin_sheet`, any number of
/// `write_row` calls, then `end_sheet`, once per worksheet, and finally
/// `finish`. Text handed to `write_row` already satisfies
/// [`max_cell_text_len`](SheetBackend::max_cell_text_len).
pub trait SheetBackend {
    /// Destination returned by [`finish`](SheetBackend::finish)
    type Sink;

    /// Longest cell text, in UTF-16 code units
    fn max_cell_text_len(&self) -> usize;

    /// Rows per worksheet, header included
    fn max_rows(&self) -> u64;

    /// Columns per worksheet
    fn max_columns(&self) -> usize;

    /// Name used when the caller does not pick one
    fn default_sheet_name(&self) -> String;

    /// Open a new worksheet; fails if `name` is not acceptable to the format
    fn begin_sheet(&mut self, name: &str, column_count: usize) -> Result<()>;

    /// Append one row to the open worksheet
    fn write_row(&mut self, row: &[CellValue], strings: &mut SharedStrings) -> Result<()>;

    /// Push buffered bytes to the sink
    fn flush(&mut self) -> Result<()>;

    /// Close the open worksheet, if any
    ///
    /// The worksheet's bytes must be complete in the container when this
    /// returns, so any failure writing them is reported here.
    fn end_sheet(&mut self) -> Result<()>;

    /// Write the remaining container parts and hand the sink back
    fn finish(self, strings: &SharedStrings) -> Result<Self::Sink>;
}

//! Worksheet writer over row-oriented data sources
//!
//! A [`DataWriter`] writes one worksheet per call to [`write`](DataWriter::write)
//! (or [`write_async`](DataWriter::write_async)), pulling every row from a
//! [`DataReader`] and streaming it into its backend. All worksheets written
//! through one writer share a single [`SharedStrings`] table, so a text value
//! keeps its id for the whole workbook.
//!
//! # Examples
//!
//! ```no_run
//! use excelstream_data::data_reader::VecReader;
//! use excelstream_data::types::CellValue;
//! use excelstream_data::writer::ExcelDataWriter;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut writer = ExcelDataWriter::create("report.xlsx")?;
//!
//! let mut reader = VecReader::from_rows(
//!     ["Region", "Amount"],
//!     vec![
//!         vec![CellValue::from("North"), CellValue::Int(1200)],
//!         vec![CellValue::from("Total"), CellValue::Int(1200)],
//!     ],
//! );
//! let result = writer.write(&mut reader, Some("Sales"))?;
//! assert!(result.is_complete());
//!
//! writer.close()?;
//! # Ok(())
//! # }
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::backend::SheetBackend;
#[cfg(feature = "async")]
use crate::cancel::CancellationSignal;
#[cfg(feature = "async")]
use crate::data_reader::AsyncDataReader;
use crate::data_reader::{DataReader, DataRecord};
use crate::error::{ExcelError, Result};
use crate::fast_writer::XlsxBackend;
use crate::options::{MemoryProfile, WriterOptions};
use crate::shared_strings::SharedStrings;
use crate::types::{CellValue, Column};
use crate::write_result::WriteResult;

/// Who closes the output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOwnership {
    /// The writer opened the stream and closes it in [`DataWriter::close`]
    Owned,
    /// The caller supplied the stream; `close` hands it back open
    Borrowed,
}

/// Writer producing one worksheet per data source
pub struct DataWriter<B: SheetBackend> {
    backend: Option<B>,
    ownership: StreamOwnership,
    strings: SharedStrings,
    options: WriterOptions,
    faulted: bool,
    sheets_written: usize,
    row_buffer: Vec<CellValue>,
}

/// XLSX writer over any byte sink
pub type ExcelDataWriter<W> = DataWriter<XlsxBackend<W>>;

impl ExcelDataWriter<BufWriter<File>> {
    /// Create `path` (truncating an existing file) and write an XLSX workbook into it
    ///
    /// The writer owns the file and closes it in [`close`](DataWriter::close).
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::create_with_options(path, WriterOptions::default())
    }

    pub fn create_with_options<P: AsRef<Path>>(path: P, options: WriterOptions) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        log::debug!("created {}", path.as_ref().display());
        let sink = BufWriter::with_capacity(64 * 1024, file); // 64KB buffer
        let backend = XlsxBackend::new(sink, options.compression_level);
        Ok(Self::with_backend(backend, StreamOwnership::Owned, options))
    }
}

impl<W: Write> ExcelDataWriter<W> {
    /// Write an XLSX workbook into a caller-supplied sink
    ///
    /// The sink is returned, still open, by [`close`](DataWriter::close).
    /// Pass `&mut sink` to keep access to it even if the writer is dropped
    /// early.
    pub fn from_writer(sink: W) -> Self {
        Self::from_writer_with_options(sink, WriterOptions::default())
    }

    pub fn from_writer_with_options(sink: W, options: WriterOptions) -> Self {
        let backend = XlsxBackend::new(sink, options.compression_level);
        Self::with_backend(backend, StreamOwnership::Borrowed, options)
    }
}

impl<B: SheetBackend> DataWriter<B> {
    /// Compose a writer from any backend
    pub fn with_backend(backend: B, ownership: StreamOwnership, options: WriterOptions) -> Self {
        DataWriter {
            backend: Some(backend),
            ownership,
            strings: SharedStrings::new(),
            options,
            faulted: false,
            sheets_written: 0,
            row_buffer: Vec::new(),
        }
    }

    pub fn ownership(&self) -> StreamOwnership {
        self.ownership
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// String table shared by every worksheet of this writer
    pub fn shared_strings(&self) -> &SharedStrings {
        &self.strings
    }

    /// Worksheets started through this writer
    pub fn sheets_written(&self) -> usize {
        self.sheets_written
    }

    /// True after an I/O failure; no further worksheets can be written
    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    /// Write every row of `reader` into a new worksheet
    ///
    /// `sheet_name` defaults to the backend's naming scheme (`Sheet1`,
    /// `Sheet2`, ... for XLSX). The result is incomplete when the worksheet
    /// ran out of rows before the reader was exhausted.
    ///
    /// A validation failure (over-long text with truncation disabled, a
    /// rejected sheet name, a data source error) closes the worksheet with
    /// the rows already written and leaves the writer usable. An I/O failure
    /// faults the writer.
    pub fn write<R>(&mut self, reader: &mut R, sheet_name: Option<&str>) -> Result<WriteResult>
    where
        R: DataReader + ?Sized,
    {
        let outcome = self.run(reader, sheet_name);
        self.settle(outcome)
    }

    /// Asynchronous [`write`](Self::write)
    ///
    /// Suspends while the reader fetches rows and yields to the runtime at
    /// every flush point. `cancel` is checked before each row is pulled;
    /// once it fires the worksheet is closed and an incomplete result with
    /// the rows written so far is returned. Produces the same worksheet
    /// content as `write` for the same rows.
    #[cfg(feature = "async")]
    pub async fn write_async<R>(
        &mut self,
        reader: &mut R,
        sheet_name: Option<&str>,
        cancel: Option<&CancellationSignal>,
    ) -> Result<WriteResult>
    where
        R: AsyncDataReader + ?Sized,
    {
        let outcome = self.run_async(reader, sheet_name, cancel).await;
        self.settle(outcome)
    }

    fn run<R>(&mut self, reader: &mut R, sheet_name: Option<&str>) -> Result<WriteResult>
    where
        R: DataReader + ?Sized,
    {
        let mut pass = self.begin_pass(sheet_name, reader.columns())?;
        let complete = loop {
            if !reader.read()? {
                break true;
            }
            if pass.is_full() {
                break false;
            }
            pass.write_record(&*reader)?;
        };
        pass.finish(complete)
    }

    #[cfg(feature = "async")]
    async fn run_async<R>(
        &mut self,
        reader: &mut R,
        sheet_name: Option<&str>,
        cancel: Option<&CancellationSignal>,
    ) -> Result<WriteResult>
    where
        R: AsyncDataReader + ?Sized,
    {
        let mut pass = self.begin_pass(sheet_name, reader.columns())?;
        let complete = loop {
            if cancel.is_some_and(CancellationSignal::is_cancelled) {
                log::debug!("write cancelled after {} rows", pass.rows_written);
                break false;
            }
            if !reader.read_async().await? {
                break true;
            }
            if pass.is_full() {
                break false;
            }
            if pass.write_record(&*reader)? {
                tokio::task::yield_now().await;
            }
        };
        pass.finish(complete)
    }

    fn begin_pass(
        &mut self,
        sheet_name: Option<&str>,
        columns: &[Column],
    ) -> Result<SheetPass<'_, B>> {
        if self.faulted {
            return Err(ExcelError::Faulted);
        }
        let backend = self.backend.as_mut().ok_or(ExcelError::Faulted)?;

        if columns.is_empty() {
            return Err(ExcelError::InvalidDataSource(
                "data source exposes no columns".to_string(),
            ));
        }
        if columns.len() > backend.max_columns() {
            return Err(ExcelError::TooManyColumns {
                columns: columns.len(),
                max: backend.max_columns(),
            });
        }

        let name = match sheet_name {
            Some(name) => name.to_string(),
            None => backend.default_sheet_name(),
        };
        backend.begin_sheet(&name, columns.len())?;
        self.sheets_written += 1;
        log::debug!("writing worksheet '{}' ({} columns)", name, columns.len());

        let mut pass = SheetPass {
            max_text_len: backend.max_cell_text_len(),
            capacity: backend.max_rows(),
            backend,
            strings: &mut self.strings,
            options: &self.options,
            row_buffer: &mut self.row_buffer,
            sheet_row: 0,
            rows_written: 0,
        };

        if pass.options.header {
            pass.write_header(columns)?;
        }
        Ok(pass)
    }

    /// Apply the failure policy to the outcome of one worksheet write
    fn settle(&mut self, outcome: Result<WriteResult>) -> Result<WriteResult> {
        match &outcome {
            Ok(result) => log::debug!("worksheet done: {}", result),
            Err(err) if err.is_validation() => {
                // Keep the container well-formed; rows already committed stay
                let closed = match self.backend.as_mut() {
                    Some(backend) => backend.end_sheet(),
                    None => Ok(()),
                };
                if let Err(close_err) = closed {
                    self.fault(&close_err);
                }
            }
            Err(err) => self.fault(err),
        }
        outcome
    }

    fn fault(&mut self, err: &ExcelError) {
        if !self.faulted {
            log::warn!("writer faulted: {}", err);
        }
        self.faulted = true;
    }

    /// Finish the workbook and release the stream
    ///
    /// An owned stream is flushed and closed, and `None` is returned. A
    /// borrowed stream is flushed and handed back open.
    pub fn close(mut self) -> Result<Option<B::Sink>> {
        let backend = self.backend.take().ok_or(ExcelError::Faulted)?;
        if self.faulted {
            return Err(ExcelError::Faulted);
        }

        let sink = backend.finish(&self.strings)?;
        log::info!(
            "workbook closed: {} worksheets, {} unique strings",
            self.sheets_written,
            self.strings.count()
        );

        match self.ownership {
            StreamOwnership::Owned => {
                drop(sink);
                Ok(None)
            }
            StreamOwnership::Borrowed => Ok(Some(sink)),
        }
    }
}

impl<B: SheetBackend> Drop for DataWriter<B> {
    fn drop(&mut self) {
        if self.backend.is_some() {
            log::warn!("writer dropped without close(); the workbook is incomplete");
        }
    }
}

/// State of one worksheet write, shared by the sync and async loops
struct SheetPass<'w, B: SheetBackend> {
    backend: &'w mut B,
    strings: &'w mut SharedStrings,
    options: &'w WriterOptions,
    row_buffer: &'w mut Vec<CellValue>,
    max_text_len: usize,
    /// Rows left in the worksheet, header included
    capacity: u64,
    /// 1-based worksheet row of the last committed row
    sheet_row: u64,
    rows_written: u64,
}

impl<B: SheetBackend> SheetPass<'_, B> {
    fn is_full(&self) -> bool {
        self.sheet_row >= self.capacity
    }

    fn write_header(&mut self, columns: &[Column]) -> Result<()> {
        self.row_buffer.clear();
        for (ordinal, column) in columns.iter().enumerate() {
            let value = self.fit(CellValue::String(column.name.clone()), ordinal)?;
            self.row_buffer.push(value);
        }
        self.commit()
    }

    /// Convert and commit the current record; `true` at a flush point
    fn write_record<R>(&mut self, record: &R) -> Result<bool>
    where
        R: DataRecord + ?Sized,
    {
        self.row_buffer.clear();
        for ordinal in 0..record.column_count() {
            let value = self.fit(record.get_value(ordinal)?, ordinal)?;
            self.row_buffer.push(value);
        }
        self.commit()?;
        self.rows_written += 1;

        if self.rows_written % u64::from(self.options.flush_interval.max(1)) == 0 {
            self.backend.flush()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn commit(&mut self) -> Result<()> {
        self.backend
            .write_row(self.row_buffer.as_slice(), self.strings)?;
        self.sheet_row += 1;
        Ok(())
    }

    /// Apply the truncation policy to text values
    fn fit(&self, value: CellValue, ordinal: usize) -> Result<CellValue> {
        let CellValue::String(mut text) = value else {
            return Ok(value);
        };
        if let Some(len) = utf16_overflow(&text, self.max_text_len) {
            if !self.options.truncate_strings {
                return Err(ExcelError::StringTooLong {
                    row: self.sheet_row + 1,
                    column: ordinal,
                    len,
                    max: self.max_text_len,
                });
            }
            truncate_utf16(&mut text, self.max_text_len);
            log::debug!(
                "truncated text in row {}, column {} from {} to {} characters",
                self.sheet_row + 1,
                ordinal,
                len,
                self.max_text_len
            );
        }
        Ok(CellValue::String(text))
    }

    fn finish(self, complete: bool) -> Result<WriteResult> {
        self.backend.end_sheet()?;
        Ok(WriteResult::new(self.rows_written, complete))
    }
}

/// UTF-16 length of `text` when it exceeds `max`
fn utf16_overflow(text: &str, max: usize) -> Option<usize> {
    // UTF-8 is never shorter than UTF-16 in code units
    if text.len() <= max {
        return None;
    }
    let len = text.encode_utf16().count();
    (len > max).then_some(len)
}

/// Cut `text` after the last whole character fitting in `max` UTF-16 units
fn truncate_utf16(text: &mut String, max: usize) {
    let mut units = 0;
    let cut = text
        .char_indices()
        .find(|(_, c)| {
            units += c.len_utf16();
            units > max
        })
        .map(|(index, _)| index);
    if let Some(index) = cut {
        text.truncate(index);
    }
}

/// Builder for creating configured XLSX writers
///
/// # Examples
///
/// ```no_run
/// use excelstream_data::writer::ExcelDataWriterBuilder;
///
/// let writer = ExcelDataWriterBuilder::new()
///     .truncate_strings(true)
///     .compression_level(1)
///     .create("output.xlsx")?;
/// # Ok::<(), excelstream_data::ExcelError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExcelDataWriterBuilder {
    options: WriterOptions,
}

impl ExcelDataWriterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorten over-long text instead of failing the write
    pub fn truncate_strings(mut self, truncate: bool) -> Self {
        self.options = self.options.truncate_strings(truncate);
        self
    }

    /// Write column names as the first row of every worksheet
    pub fn header(mut self, header: bool) -> Self {
        self.options = self.options.header(header);
        self
    }

    pub fn compression_level(mut self, level: u32) -> Self {
        self.options = self.options.compression_level(level);
        self
    }

    /// Set flush interval (rows between flushes)
    pub fn flush_interval(mut self, rows: u32) -> Self {
        self.options = self.options.flush_interval(rows);
        self
    }

    pub fn memory_profile(mut self, profile: MemoryProfile) -> Self {
        self.options = self.options.memory_profile(profile);
        self
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Build a writer that owns a new file at `path`
    pub fn create<P: AsRef<Path>>(self, path: P) -> Result<ExcelDataWriter<BufWriter<File>>> {
        ExcelDataWriter::create_with_options(path, self.options)
    }

    /// Build a writer over a caller-supplied sink
    pub fn from_writer<W: Write>(self, sink: W) -> ExcelDataWriter<W> {
        ExcelDataWriter::from_writer_with_options(sink, self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_reader::VecReader;
    use crate::types::ColumnType;

    /// Backend keeping rows in memory
    #[derive(Default)]
    struct RecordingBackend {
        sheets: Vec<(String, Vec<Vec<CellValue>>)>,
        open: bool,
        max_rows: u64,
        flushes: usize,
        fail_writes: bool,
        fail_end: bool,
    }

    impl RecordingBackend {
        fn with_max_rows(max_rows: u64) -> Self {
            RecordingBackend {
                max_rows,
                ..Default::default()
            }
        }
    }

    impl SheetBackend for RecordingBackend {
        type Sink = Vec<(String, Vec<Vec<CellValue>>)>;

        fn max_cell_text_len(&self) -> usize {
            8
        }

        fn max_rows(&self) -> u64 {
            self.max_rows
        }

        fn max_columns(&self) -> usize {
            3
        }

        fn default_sheet_name(&self) -> String {
            format!("Sheet{}", self.sheets.len() + 1)
        }

        fn begin_sheet(&mut self, name: &str, _column_count: usize) -> Result<()> {
            self.end_sheet()?;
            self.sheets.push((name.to_string(), Vec::new()));
            self.open = true;
            Ok(())
        }

        fn write_row(&mut self, row: &[CellValue], strings: &mut SharedStrings) -> Result<()> {
            if self.fail_writes {
                return Err(std::io::Error::other("sink gone").into());
            }
            for value in row {
                if let CellValue::String(s) = value {
                    strings.add_string(s);
                }
            }
            let sheet = self.sheets.last_mut().expect("open sheet");
            sheet.1.push(row.to_vec());
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            self.flushes += 1;
            Ok(())
        }

        fn end_sheet(&mut self) -> Result<()> {
            if self.open && self.fail_end {
                return Err(std::io::Error::other("sink gone at end of sheet").into());
            }
            self.open = false;
            Ok(())
        }

        fn finish(self, _strings: &SharedStrings) -> Result<Self::Sink> {
            Ok(self.sheets)
        }
    }

    fn recording(max_rows: u64, options: WriterOptions) -> DataWriter<RecordingBackend> {
        DataWriter::with_backend(
            RecordingBackend::with_max_rows(max_rows),
            StreamOwnership::Borrowed,
            options,
        )
    }

    fn numbers(n: i64) -> VecReader {
        VecReader::from_rows(["N"], (0..n).map(|i| vec![CellValue::Int(i)]).collect())
    }

    #[test]
    fn test_empty_source_is_complete() -> Result<()> {
        let mut writer = recording(100, WriterOptions::default());
        let result = writer.write(&mut numbers(0), None)?;
        assert_eq!(result, WriteResult::complete(0));

        let sheets = writer.close()?.unwrap();
        assert_eq!(sheets[0].0, "Sheet1");
        assert_eq!(sheets[0].1, vec![vec![CellValue::from("N")]]);
        Ok(())
    }

    #[test]
    fn test_header_not_counted() -> Result<()> {
        let mut writer = recording(100, WriterOptions::default());
        let result = writer.write(&mut numbers(5), Some("Numbers"))?;
        assert_eq!(result, WriteResult::complete(5));

        let mut writer = recording(100, WriterOptions::default().header(false));
        writer.write(&mut numbers(5), None)?;
        let sheets = writer.close()?.unwrap();
        assert_eq!(sheets[0].1.len(), 5);
        assert_eq!(sheets[0].1[0], vec![CellValue::Int(0)]);
        Ok(())
    }

    #[test]
    fn test_full_sheet_is_incomplete() -> Result<()> {
        // 4 rows per sheet: header + 3 data rows
        let mut writer = recording(4, WriterOptions::default());
        assert_eq!(writer.write(&mut numbers(3), None)?, WriteResult::complete(3));
        assert_eq!(
            writer.write(&mut numbers(10), None)?,
            WriteResult::incomplete(3)
        );
        Ok(())
    }

    #[test]
    fn test_truncation_policy() -> Result<()> {
        let long = || {
            VecReader::from_rows(["Text"], vec![vec![CellValue::from("abcdefghijkl")]])
        };

        let mut writer = recording(100, WriterOptions::default().truncate_strings(true));
        writer.write(&mut long(), None)?;
        assert!(writer.shared_strings().lookup("abcdefgh").is_some());
        assert!(writer.shared_strings().lookup("abcdefghijkl").is_none());

        let mut writer = recording(100, WriterOptions::default());
        let err = writer.write(&mut long(), None).unwrap_err();
        assert!(matches!(
            err,
            ExcelError::StringTooLong {
                row: 2,
                column: 0,
                len: 12,
                max: 8
            }
        ));
        assert!(!writer.is_faulted());
        assert!(writer.shared_strings().lookup("abcdefghijkl").is_none());

        // The writer is still usable after a validation failure
        assert!(writer.write(&mut numbers(1), None)?.is_complete());
        Ok(())
    }

    #[test]
    fn test_truncate_utf16_keeps_whole_characters() {
        let mut text = "ab😀cd".to_string(); // 😀 is two UTF-16 units
        truncate_utf16(&mut text, 3);
        assert_eq!(text, "ab");

        let mut text = "ab😀cd".to_string();
        truncate_utf16(&mut text, 4);
        assert_eq!(text, "ab😀");

        assert_eq!(utf16_overflow("ab😀cd", 6), None);
        assert_eq!(utf16_overflow("ab😀cd", 5), Some(6));
    }

    #[test]
    fn test_column_validation() {
        let mut writer = recording(100, WriterOptions::default());

        let mut no_columns = VecReader::new(Vec::new(), Vec::new());
        assert!(matches!(
            writer.write(&mut no_columns, None),
            Err(ExcelError::InvalidDataSource(_))
        ));

        let columns = (0..4)
            .map(|i| Column::new(format!("C{}", i), ColumnType::Int))
            .collect();
        let mut wide = VecReader::new(columns, Vec::new());
        assert!(matches!(
            writer.write(&mut wide, None),
            Err(ExcelError::TooManyColumns { columns: 4, max: 3 })
        ));
        assert_eq!(writer.sheets_written(), 0);
    }

    #[test]
    fn test_io_failure_faults_writer() {
        let mut backend = RecordingBackend::with_max_rows(100);
        backend.fail_writes = true;
        let mut writer =
            DataWriter::with_backend(backend, StreamOwnership::Owned, WriterOptions::default());

        let err = writer.write(&mut numbers(2), None).unwrap_err();
        assert!(err.is_io());
        assert!(writer.is_faulted());
        assert!(matches!(
            writer.write(&mut numbers(2), None),
            Err(ExcelError::Faulted)
        ));
        assert!(matches!(writer.close(), Err(ExcelError::Faulted)));
    }

    #[test]
    fn test_failure_sealing_sheet_is_reported_by_write() {
        let mut backend = RecordingBackend::with_max_rows(100);
        backend.fail_end = true;
        let mut writer =
            DataWriter::with_backend(backend, StreamOwnership::Borrowed, WriterOptions::default());

        // Rows are accepted; the sheet cannot be closed
        let err = writer.write(&mut numbers(3), Some("Sealed")).unwrap_err();
        assert!(err.is_io());
        assert!(writer.is_faulted());
        assert!(matches!(writer.close(), Err(ExcelError::Faulted)));
    }

    #[test]
    fn test_flush_interval() -> Result<()> {
        let mut writer = recording(100, WriterOptions::default().flush_interval(2));
        writer.write(&mut numbers(5), None)?;
        assert_eq!(writer.backend.as_ref().map(|b| b.flushes), Some(2));
        Ok(())
    }

    #[test]
    fn test_strings_shared_across_sheets() -> Result<()> {
        let mut writer = recording(100, WriterOptions::default().header(false));
        let total = || VecReader::from_rows(["Label"], vec![vec![CellValue::from("Total")]]);

        writer.write(&mut total(), Some("First"))?;
        let id = writer.shared_strings().lookup("Total");
        writer.write(&mut numbers(1), Some("Second"))?;
        writer.write(&mut total(), Some("Third"))?;

        assert_eq!(writer.shared_strings().lookup("Total"), id);
        assert_eq!(writer.shared_strings().count(), 1);
        assert_eq!(writer.sheets_written(), 3);
        Ok(())
    }

    #[test]
    fn test_ownership_decides_close_result() -> Result<()> {
        let writer = DataWriter::with_backend(
            RecordingBackend::with_max_rows(10),
            StreamOwnership::Owned,
            WriterOptions::default(),
        );
        assert_eq!(writer.ownership(), StreamOwnership::Owned);
        assert!(writer.close()?.is_none());

        let writer = recording(10, WriterOptions::default());
        assert!(writer.close()?.is_some());
        Ok(())
    }

    #[test]
    fn test_builder_options() {
        let builder = ExcelDataWriterBuilder::new()
            .truncate_strings(true)
            .header(false)
            .compression_level(12)
            .memory_profile(MemoryProfile::Medium);
        assert!(builder.options().truncate_strings);
        assert!(!builder.options().header);
        assert_eq!(builder.options().compression_level, 9);
        assert_eq!(builder.options().flush_interval, 500);

        let writer = builder.from_writer(Vec::new());
        assert_eq!(writer.ownership(), StreamOwnership::Borrowed);
        assert!(writer.options().truncate_strings);
    }

    #[cfg(feature = "async")]
    mod async_path {
        use super::*;
        use crate::cancel::{cancellation, CancelHandle};
        use crate::data_reader::AsyncDataReader;
        use std::future::Future;

        /// Reader that requests cancellation once it has served `cancel_after` rows
        struct CancellingReader {
            inner: VecReader,
            served: usize,
            cancel_after: usize,
            handle: CancelHandle,
        }

        impl DataRecord for CancellingReader {
            fn columns(&self) -> &[Column] {
                self.inner.columns()
            }

            fn get_value(&self, ordinal: usize) -> Result<CellValue> {
                self.inner.get_value(ordinal)
            }
        }

        impl AsyncDataReader for CancellingReader {
            fn read_async(&mut self) -> impl Future<Output = Result<bool>> + Send {
                let more = self.inner.read();
                if matches!(more, Ok(true)) {
                    self.served += 1;
                    if self.served == self.cancel_after {
                        self.handle.cancel();
                    }
                }
                async move {
                    tokio::task::yield_now().await;
                    more
                }
            }
        }

        #[tokio::test]
        async fn test_cancel_after_k_rows() -> Result<()> {
            let (handle, signal) = cancellation();
            let mut reader = CancellingReader {
                inner: numbers(10),
                served: 0,
                cancel_after: 4,
                handle,
            };

            let mut writer = recording(100, WriterOptions::default());
            let result = writer
                .write_async(&mut reader, None, Some(&signal))
                .await?;
            assert_eq!(result, WriteResult::incomplete(4));
            assert_eq!(reader.inner.remaining(), 6);

            let sheets = writer.close()?.unwrap();
            assert_eq!(sheets[0].1.len(), 5); // header + 4 rows
            Ok(())
        }

        #[tokio::test]
        async fn test_cancelled_before_start() -> Result<()> {
            let (handle, signal) = cancellation();
            handle.cancel();

            let mut writer = recording(100, WriterOptions::default());
            let result = writer
                .write_async(&mut numbers(3), Some("Empty"), Some(&signal))
                .await?;
            assert_eq!(result, WriteResult::incomplete(0));
            Ok(())
        }

        #[tokio::test]
        async fn test_async_matches_sync() -> Result<()> {
            let mut sync_writer = recording(100, WriterOptions::default().flush_interval(3));
            let sync_result = sync_writer.write(&mut numbers(7), None)?;

            let mut async_writer = recording(100, WriterOptions::default().flush_interval(3));
            let async_result = async_writer.write_async(&mut numbers(7), None, None).await?;

            assert_eq!(sync_result, async_result);
            assert_eq!(sync_writer.close()?, async_writer.close()?);
            Ok(())
        }

        #[tokio::test]
        async fn test_async_truncation_failure() {
            let mut writer = recording(100, WriterOptions::default());
            let mut reader =
                VecReader::from_rows(["Text"], vec![vec![CellValue::from("much too long")]]);
            let err = writer
                .write_async(&mut reader, None, None)
                .await
                .unwrap_err();
            assert!(err.is_validation());
        }

        #[tokio::test]
        async fn test_async_io_failure_faults_writer() {
            let mut backend = RecordingBackend::with_max_rows(100);
            backend.fail_writes = true;
            let mut writer =
                DataWriter::with_backend(backend, StreamOwnership::Owned, WriterOptions::default());

            let err = writer
                .write_async(&mut numbers(2), None, None)
                .await
                .unwrap_err();
            assert!(err.is_io());
            assert!(writer.is_faulted());
            assert!(matches!(
                writer.write_async(&mut numbers(2), None, None).await,
                Err(ExcelError::Faulted)
            ));
            assert!(matches!(writer.close(), Err(ExcelError::Faulted)));
        }
    }
}

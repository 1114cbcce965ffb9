//! XLSX backend optimized for streaming
//!
//! This module provides the container-format side of the writer:
//! - Direct XML generation into reusable buffers
//! - On-the-fly deflate into a ZIP that never seeks
//! - Shared-string cell references
//! - Streaming-first design: worksheet rows are compressed as they arrive

pub mod streaming_zip_writer;
pub mod workbook;
pub mod worksheet;
pub mod xml_writer;

pub use streaming_zip_writer::StreamingZipWriter;
pub use workbook::XlsxBackend;

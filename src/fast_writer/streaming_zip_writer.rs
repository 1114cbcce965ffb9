//! Streaming ZIP writer that compresses XML on-the-fly
//!
//! Entries are written with the data-descriptor flag, so sizes and CRCs
//! follow the compressed data instead of being patched into the local
//! header. The output therefore never needs to seek and any `Write` works
//! as a sink: files, sockets, in-memory buffers.
//!
//! Sizes and offsets that do not fit in 32 bits are carried in ZIP64
//! records: a 64-bit data descriptor, the ZIP64 extra field in the central
//! directory, and the ZIP64 end of central directory record.

use crate::error::{ExcelError, Result};
use chrono::{Datelike, Local, Timelike};
use crc32fast::Hasher as Crc32;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::Write;

const LOCAL_HEADER_SIG: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];
const DATA_DESCRIPTOR_SIG: [u8; 4] = [0x50, 0x4b, 0x07, 0x08];
const CENTRAL_DIR_SIG: [u8; 4] = [0x50, 0x4b, 0x01, 0x02];
const ZIP64_END_OF_CENTRAL_DIR_SIG: [u8; 4] = [0x50, 0x4b, 0x06, 0x06];
const ZIP64_END_LOCATOR_SIG: [u8; 4] = [0x50, 0x4b, 0x06, 0x07];
const END_OF_CENTRAL_DIR_SIG: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];

const VERSION: u16 = 20;
const VERSION_ZIP64: u16 = 45;
const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
const METHOD_DEFLATE: u16 = 8;
const ZIP64_EXTRA_TAG: u16 = 0x0001;

/// Values at or above this need a ZIP64 record
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;
const ZIP64_ENTRY_THRESHOLD: usize = u16::MAX as usize;

/// Entry already written, kept for the central directory
struct ZipEntry {
    name: String,
    local_header_offset: u64,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
}

/// Writer that counts the bytes reaching the sink
struct CountingWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

struct CurrentEntry<W: Write> {
    name: String,
    local_header_offset: u64,
    data_offset: u64,
    crc: Crc32,
    uncompressed_size: u64,
    encoder: DeflateEncoder<CountingWriter<W>>,
}

enum State<W: Write> {
    Idle(CountingWriter<W>),
    Entry(Box<CurrentEntry<W>>),
    /// An I/O failure consumed the sink
    Broken,
}

/// Streaming ZIP writer that compresses data on-the-fly
pub struct StreamingZipWriter<W: Write> {
    state: State<W>,
    entries: Vec<ZipEntry>,
    compression_level: u32,
    zip64_threshold: u64,
    dos_time: u16,
    dos_date: u16,
}

impl<W: Write> StreamingZipWriter<W> {
    pub fn new(output: W, compression_level: u32) -> Self {
        let (dos_time, dos_date) = dos_timestamp();
        StreamingZipWriter {
            state: State::Idle(CountingWriter {
                inner: output,
                written: 0,
            }),
            entries: Vec::new(),
            compression_level: compression_level.min(9),
            zip64_threshold: ZIP64_THRESHOLD,
            dos_time,
            dos_date,
        }
    }

    /// Lower the ZIP64 threshold so small archives take the ZIP64 path
    #[cfg(test)]
    fn with_zip64_threshold(mut self, threshold: u64) -> Self {
        self.zip64_threshold = threshold;
        self
    }

    fn needs_zip64(&self, value: u64) -> bool {
        value >= self.zip64_threshold
    }

    /// Start a new entry (file) in the ZIP
    pub fn start_entry(&mut self, name: &str) -> Result<()> {
        // Finish previous entry if any
        self.finish_entry()?;

        let mut output = match std::mem::replace(&mut self.state, State::Broken) {
            State::Idle(output) => output,
            _ => return Err(broken()),
        };

        let local_header_offset = output.written;
        let name_len = u16::try_from(name.len())
            .map_err(|_| ExcelError::WriteError(format!("entry name too long: {}", name)))?;

        let mut header = Vec::with_capacity(30 + name.len());
        header.extend_from_slice(&LOCAL_HEADER_SIG);
        header.extend_from_slice(&VERSION.to_le_bytes());
        header.extend_from_slice(&FLAG_DATA_DESCRIPTOR.to_le_bytes());
        header.extend_from_slice(&METHOD_DEFLATE.to_le_bytes());
        header.extend_from_slice(&self.dos_time.to_le_bytes());
        header.extend_from_slice(&self.dos_date.to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes()); // crc32, in data descriptor
        header.extend_from_slice(&0u32.to_le_bytes()); // compressed size, in data descriptor
        header.extend_from_slice(&0u32.to_le_bytes()); // uncompressed size, in data descriptor
        header.extend_from_slice(&name_len.to_le_bytes());
        header.extend_from_slice(&0u16.to_le_bytes()); // extra len
        header.extend_from_slice(name.as_bytes());
        output.write_all(&header)?;

        let data_offset = output.written;
        let encoder = DeflateEncoder::new(output, Compression::new(self.compression_level));
        self.state = State::Entry(Box::new(CurrentEntry {
            name: name.to_string(),
            local_header_offset,
            data_offset,
            crc: Crc32::new(),
            uncompressed_size: 0,
            encoder,
        }));

        Ok(())
    }

    /// Write uncompressed data to current entry (will be compressed on-the-fly)
    pub fn write_data(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.state {
            State::Entry(entry) => {
                entry.crc.update(data);
                entry.uncompressed_size += data.len() as u64;
                if let Err(err) = entry.encoder.write_all(data) {
                    self.state = State::Broken;
                    return Err(err.into());
                }
                Ok(())
            }
            State::Idle(_) => Err(ExcelError::WriteError("No entry started".to_string())),
            State::Broken => Err(broken()),
        }
    }

    /// Push compressed bytes produced so far to the sink
    pub fn flush(&mut self) -> Result<()> {
        let outcome = match &mut self.state {
            State::Entry(entry) => entry.encoder.flush(),
            State::Idle(output) => output.flush(),
            State::Broken => return Err(broken()),
        };
        if let Err(err) = outcome {
            self.state = State::Broken;
            return Err(err.into());
        }
        Ok(())
    }

    /// Seal the open entry: drain the compressor and write its data descriptor
    ///
    /// No-op when no entry is open.
    pub fn finish_entry(&mut self) -> Result<()> {
        let entry = match std::mem::replace(&mut self.state, State::Broken) {
            State::Entry(entry) => entry,
            State::Idle(output) => {
                self.state = State::Idle(output);
                return Ok(());
            }
            State::Broken => return Err(broken()),
        };

        let CurrentEntry {
            name,
            local_header_offset,
            data_offset,
            crc,
            uncompressed_size,
            encoder,
        } = *entry;

        let mut output = encoder.finish()?;
        let crc32 = crc.finalize();
        let compressed_size = output.written - data_offset;

        let mut descriptor = Vec::with_capacity(24);
        descriptor.extend_from_slice(&DATA_DESCRIPTOR_SIG);
        descriptor.extend_from_slice(&crc32.to_le_bytes());
        if self.needs_zip64(compressed_size) || self.needs_zip64(uncompressed_size) {
            descriptor.extend_from_slice(&compressed_size.to_le_bytes());
            descriptor.extend_from_slice(&uncompressed_size.to_le_bytes());
        } else {
            descriptor.extend_from_slice(&(compressed_size as u32).to_le_bytes());
            descriptor.extend_from_slice(&(uncompressed_size as u32).to_le_bytes());
        }
        output.write_all(&descriptor)?;

        log::debug!(
            "sealed {} ({} -> {} bytes)",
            name,
            uncompressed_size,
            compressed_size
        );
        self.entries.push(ZipEntry {
            name,
            local_header_offset,
            crc32,
            compressed_size,
            uncompressed_size,
        });
        self.state = State::Idle(output);
        Ok(())
    }

    /// Finish ZIP file (write central directory) and hand back the sink
    pub fn finish(mut self) -> Result<W> {
        // Finish last entry
        self.finish_entry()?;

        let mut output = match std::mem::replace(&mut self.state, State::Broken) {
            State::Idle(output) => output,
            _ => return Err(broken()),
        };

        let central_dir_offset = output.written;
        let mut directory = Vec::with_capacity(self.entries.len() * 80 + 98);

        for entry in &self.entries {
            // ZIP64 extra field carries, in this order, whichever values overflowed
            let mut zip64_extra = Vec::new();
            let uncompressed_size =
                self.clamp_or_extend(entry.uncompressed_size, &mut zip64_extra);
            let compressed_size = self.clamp_or_extend(entry.compressed_size, &mut zip64_extra);
            let local_header_offset =
                self.clamp_or_extend(entry.local_header_offset, &mut zip64_extra);
            let version = if zip64_extra.is_empty() {
                VERSION
            } else {
                VERSION_ZIP64
            };
            let extra_len = if zip64_extra.is_empty() {
                0
            } else {
                zip64_extra.len() as u16 + 4
            };

            directory.extend_from_slice(&CENTRAL_DIR_SIG);
            directory.extend_from_slice(&version.to_le_bytes()); // version made by
            directory.extend_from_slice(&version.to_le_bytes()); // version needed
            directory.extend_from_slice(&FLAG_DATA_DESCRIPTOR.to_le_bytes());
            directory.extend_from_slice(&METHOD_DEFLATE.to_le_bytes());
            directory.extend_from_slice(&self.dos_time.to_le_bytes());
            directory.extend_from_slice(&self.dos_date.to_le_bytes());
            directory.extend_from_slice(&entry.crc32.to_le_bytes());
            directory.extend_from_slice(&compressed_size.to_le_bytes());
            directory.extend_from_slice(&uncompressed_size.to_le_bytes());
            directory.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
            directory.extend_from_slice(&extra_len.to_le_bytes());
            directory.extend_from_slice(&0u16.to_le_bytes()); // file comment len
            directory.extend_from_slice(&0u16.to_le_bytes()); // disk number start
            directory.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
            directory.extend_from_slice(&0u32.to_le_bytes()); // external attrs
            directory.extend_from_slice(&local_header_offset.to_le_bytes());
            directory.extend_from_slice(entry.name.as_bytes());
            if !zip64_extra.is_empty() {
                directory.extend_from_slice(&ZIP64_EXTRA_TAG.to_le_bytes());
                directory.extend_from_slice(&(zip64_extra.len() as u16).to_le_bytes());
                directory.extend_from_slice(&zip64_extra);
            }
        }

        let entry_count = self.entries.len();
        let central_dir_size = directory.len() as u64;
        let zip64_end = entry_count >= ZIP64_ENTRY_THRESHOLD
            || self.needs_zip64(central_dir_size)
            || self.needs_zip64(central_dir_offset);

        if zip64_end {
            let zip64_end_offset = central_dir_offset + central_dir_size;

            directory.extend_from_slice(&ZIP64_END_OF_CENTRAL_DIR_SIG);
            directory.extend_from_slice(&44u64.to_le_bytes()); // size of remaining record
            directory.extend_from_slice(&VERSION_ZIP64.to_le_bytes()); // version made by
            directory.extend_from_slice(&VERSION_ZIP64.to_le_bytes()); // version needed
            directory.extend_from_slice(&0u32.to_le_bytes()); // disk number
            directory.extend_from_slice(&0u32.to_le_bytes()); // disk with central dir
            directory.extend_from_slice(&(entry_count as u64).to_le_bytes());
            directory.extend_from_slice(&(entry_count as u64).to_le_bytes());
            directory.extend_from_slice(&central_dir_size.to_le_bytes());
            directory.extend_from_slice(&central_dir_offset.to_le_bytes());

            directory.extend_from_slice(&ZIP64_END_LOCATOR_SIG);
            directory.extend_from_slice(&0u32.to_le_bytes()); // disk with ZIP64 end record
            directory.extend_from_slice(&zip64_end_offset.to_le_bytes());
            directory.extend_from_slice(&1u32.to_le_bytes()); // total disks
        }

        // Readers look for the ZIP64 locator when the offset is saturated
        let eocd_count = entry_count.min(ZIP64_ENTRY_THRESHOLD) as u16;
        let eocd_size = central_dir_size.min(ZIP64_THRESHOLD) as u32;
        let eocd_offset = if zip64_end {
            u32::MAX
        } else {
            central_dir_offset as u32
        };

        // End of central directory
        directory.extend_from_slice(&END_OF_CENTRAL_DIR_SIG);
        directory.extend_from_slice(&0u16.to_le_bytes()); // disk number
        directory.extend_from_slice(&0u16.to_le_bytes()); // disk with central dir
        directory.extend_from_slice(&eocd_count.to_le_bytes());
        directory.extend_from_slice(&eocd_count.to_le_bytes());
        directory.extend_from_slice(&eocd_size.to_le_bytes());
        directory.extend_from_slice(&eocd_offset.to_le_bytes());
        directory.extend_from_slice(&0u16.to_le_bytes()); // comment len

        output.write_all(&directory)?;
        output.flush()?;
        log::debug!(
            "ZIP finished: {} entries, {} bytes{}",
            entry_count,
            output.written,
            if zip64_end { " (ZIP64)" } else { "" }
        );
        Ok(output.inner)
    }

    /// 32-bit field for `value`, saturated and pushed to `extra` when it overflows
    fn clamp_or_extend(&self, value: u64, extra: &mut Vec<u8>) -> u32 {
        if self.needs_zip64(value) {
            extra.extend_from_slice(&value.to_le_bytes());
            u32::MAX
        } else {
            value as u32
        }
    }
}

fn broken() -> ExcelError {
    ExcelError::WriteError("ZIP stream is unusable after an earlier I/O failure".to_string())
}

/// MS-DOS time and date fields for the current local time
fn dos_timestamp() -> (u16, u16) {
    let now = Local::now();
    let year = now.year().clamp(1980, 2107) as u16;
    let time = ((now.hour() as u16) << 11) | ((now.minute() as u16) << 5) | (now.second() as u16 / 2);
    let date = ((year - 1980) << 9) | ((now.month() as u16) << 5) | now.day() as u16;
    (time, date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    fn read_entry(bytes: &[u8], name: &str) -> Vec<u8> {
        let mut archive = ::zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut data = Vec::new();
        archive
            .by_name(name)
            .unwrap()
            .read_to_end(&mut data)
            .unwrap();
        data
    }

    #[test]
    fn test_archive_readable() {
        let mut zip = StreamingZipWriter::new(Vec::new(), 6);
        zip.start_entry("a.xml").unwrap();
        zip.write_data(b"<a>hello</a>").unwrap();
        zip.flush().unwrap();
        zip.write_data(b"<a>again</a>").unwrap();
        zip.start_entry("dir/b.xml").unwrap();
        zip.write_data(&vec![b'x'; 100_000]).unwrap();
        assert_eq!(zip.entries.len(), 1);
        let bytes = zip.finish().unwrap();

        assert_eq!(&bytes[..4], &LOCAL_HEADER_SIG);
        assert_eq!(
            ::zip::ZipArchive::new(Cursor::new(bytes.as_slice()))
                .unwrap()
                .len(),
            2
        );
        assert_eq!(read_entry(&bytes, "a.xml"), b"<a>hello</a><a>again</a>");
        assert_eq!(read_entry(&bytes, "dir/b.xml").len(), 100_000);
    }

    #[test]
    fn test_finish_entry_seals_without_starting_another() {
        let mut zip = StreamingZipWriter::new(Vec::new(), 6);
        zip.start_entry("a.xml").unwrap();
        zip.write_data(b"<a/>").unwrap();
        zip.finish_entry().unwrap();
        assert_eq!(zip.entries.len(), 1);

        // Sealing twice is harmless; writing needs a new entry
        zip.finish_entry().unwrap();
        assert!(matches!(
            zip.write_data(b"late"),
            Err(ExcelError::WriteError(_))
        ));

        let bytes = zip.finish().unwrap();
        assert_eq!(read_entry(&bytes, "a.xml"), b"<a/>");
    }

    #[test]
    fn test_zip64_records_readable() {
        // Every size and offset takes the ZIP64 path
        let mut zip = StreamingZipWriter::new(Vec::new(), 6).with_zip64_threshold(0);
        zip.start_entry("first.xml").unwrap();
        zip.write_data(b"<first/>").unwrap();
        zip.start_entry("second.xml").unwrap();
        zip.write_data(&vec![b'y'; 50_000]).unwrap();
        let bytes = zip.finish().unwrap();

        // Classic end record points readers at the ZIP64 one
        let eocd = &bytes[bytes.len() - 22..];
        assert_eq!(&eocd[..4], &END_OF_CENTRAL_DIR_SIG);
        assert_eq!(&eocd[16..20], &u32::MAX.to_le_bytes());
        let locator = &bytes[bytes.len() - 42..bytes.len() - 22];
        assert_eq!(&locator[..4], &ZIP64_END_LOCATOR_SIG);

        assert_eq!(read_entry(&bytes, "first.xml"), b"<first/>");
        assert_eq!(read_entry(&bytes, "second.xml"), vec![b'y'; 50_000]);
    }

    #[test]
    fn test_zip64_data_descriptor_is_wide() {
        let mut zip = StreamingZipWriter::new(Vec::new(), 6).with_zip64_threshold(4);
        zip.start_entry("big.xml").unwrap();
        zip.write_data(b"more than four bytes").unwrap();
        zip.finish_entry().unwrap();
        let bytes = zip.finish().unwrap();

        let central = bytes
            .windows(4)
            .position(|w| w == CENTRAL_DIR_SIG)
            .unwrap();
        // 24-byte descriptor: signature, crc, two 64-bit sizes
        let descriptor = &bytes[central - 24..central];
        assert_eq!(&descriptor[..4], &DATA_DESCRIPTOR_SIG);
        let uncompressed = u64::from_le_bytes(descriptor[16..24].try_into().unwrap());
        assert_eq!(uncompressed, 20);

        assert_eq!(read_entry(&bytes, "big.xml"), b"more than four bytes");
    }

    #[test]
    fn test_write_without_entry_fails() {
        let mut zip = StreamingZipWriter::new(Vec::new(), 1);
        assert!(matches!(
            zip.write_data(b"orphan"),
            Err(ExcelError::WriteError(_))
        ));
    }

    #[test]
    fn test_empty_archive() {
        let zip = StreamingZipWriter::new(Vec::new(), 6);
        let bytes = zip.finish().unwrap();
        assert_eq!(bytes.len(), 22);
        assert_eq!(&bytes[..4], &END_OF_CENTRAL_DIR_SIG);
    }
}

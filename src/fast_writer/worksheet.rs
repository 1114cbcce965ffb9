//! Worksheet row markup
//!
//! Cells reference text through the shared string table (`t="s"`), numbers
//! and booleans are written inline, and dates become serial numbers tagged
//! with one of the two date styles of the workbook stylesheet.

use super::xml_writer::XmlWriter;
use crate::shared_strings::SharedStrings;
use crate::types::CellValue;
use chrono::{NaiveDate, NaiveDateTime, Timelike};

/// `cellXfs` index of the date style (number format 14)
pub const DATE_STYLE: u64 = 1;
/// `cellXfs` index of the date-time style (number format 22)
pub const DATETIME_STYLE: u64 = 2;

pub const WORKSHEET_START: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
    "<worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" ",
    "xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">",
    "<sheetData>"
);

pub const WORKSHEET_END: &str = "</sheetData></worksheet>";

/// Append the column letters of 1-based column `n` (1 -> A, 27 -> AA)
pub fn push_column_letter(xml: &mut XmlWriter, mut n: u32) {
    if n == 0 {
        return;
    }
    let mut tmp = [0u8; 4];
    let mut len = 0;
    while n > 0 {
        let rem = (n - 1) % 26;
        tmp[len] = b'A' + rem as u8;
        len += 1;
        n = (n - 1) / 26;
    }
    tmp[..len].reverse();
    xml.write_raw(&tmp[..len]);
}

/// Excel serial day number of `date` in the 1900 date system
///
/// Serials before March 1900 are shifted by one to stay aligned with
/// Excel, which counts a nonexistent 1900-02-29.
pub fn date_serial(date: NaiveDate) -> Option<i64> {
    let first = NaiveDate::from_ymd_opt(1900, 1, 1)?;
    if date < first {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let leap_bug = NaiveDate::from_ymd_opt(1900, 3, 1)?;
    let days = (date - epoch).num_days();
    Some(if date < leap_bug { days - 1 } else { days })
}

/// Excel serial number (days plus day fraction) of `dt`
pub fn datetime_serial(dt: NaiveDateTime) -> Option<f64> {
    let days = date_serial(dt.date())?;
    let time = dt.time();
    let seconds = time.num_seconds_from_midnight() as f64 + time.nanosecond() as f64 / 1e9;
    Some(days as f64 + seconds / 86_400.0)
}

/// Append `<row>` markup for `cells` as row `row_number` (1-based)
pub fn write_row(
    xml: &mut XmlWriter,
    row_number: u32,
    cells: &[CellValue],
    strings: &mut SharedStrings,
) {
    xml.start_element("row");
    xml.attribute_int("r", u64::from(row_number));
    xml.close_start_tag();

    for (col_idx, value) in cells.iter().enumerate() {
        if value.is_null() {
            continue;
        }

        xml.write_raw(b"<c r=\"");
        push_column_letter(xml, col_idx as u32 + 1);
        xml.write_int(u64::from(row_number));
        xml.write_raw(b"\"");

        match value {
            CellValue::Null => unreachable!("null cells are skipped"),
            CellValue::String(s) => write_shared_string(xml, s, strings),
            CellValue::Int(i) => {
                xml.write_raw(b"><v>");
                xml.write_i64(*i);
                xml.write_raw(b"</v></c>");
            }
            CellValue::Float(f) if f.is_finite() => {
                xml.write_raw(b"><v>");
                xml.write_str(&f.to_string());
                xml.write_raw(b"</v></c>");
            }
            CellValue::Float(_) => {
                xml.write_raw(b" t=\"e\"><v>#NUM!</v></c>");
            }
            CellValue::Bool(b) => {
                xml.write_raw(b" t=\"b\"><v>");
                xml.write_raw(if *b { b"1" } else { b"0" });
                xml.write_raw(b"</v></c>");
            }
            CellValue::Date(d) => match date_serial(*d) {
                Some(serial) => {
                    xml.attribute_int("s", DATE_STYLE);
                    xml.write_raw(b"><v>");
                    xml.write_i64(serial);
                    xml.write_raw(b"</v></c>");
                }
                // Excel has no serial for dates before 1900
                None => write_shared_string(xml, &value.to_string(), strings),
            },
            CellValue::DateTime(dt) => match datetime_serial(*dt) {
                Some(serial) => {
                    xml.attribute_int("s", DATETIME_STYLE);
                    xml.write_raw(b"><v>");
                    xml.write_str(&serial.to_string());
                    xml.write_raw(b"</v></c>");
                }
                None => write_shared_string(xml, &value.to_string(), strings),
            },
        }
    }

    xml.end_element("row");
}

fn write_shared_string(xml: &mut XmlWriter, s: &str, strings: &mut SharedStrings) {
    let id = strings.add_string(s);
    xml.write_raw(b" t=\"s\"><v>");
    xml.write_int(u64::from(id.index()));
    xml.write_raw(b"</v></c>");
}

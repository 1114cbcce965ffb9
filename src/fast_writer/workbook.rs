//! XLSX workbook backend streaming worksheets straight into the ZIP compressor

use std::io::Write;

use super::streaming_zip_writer::StreamingZipWriter;
use super::worksheet::{self, WORKSHEET_END, WORKSHEET_START};
use super::xml_writer::{needs_space_preserve, XmlWriter};
use crate::backend::SheetBackend;
use crate::error::{ExcelError, Result};
use crate::shared_strings::SharedStrings;
use crate::types::CellValue;

/// Rows per worksheet
pub const MAX_ROWS: u64 = 1_048_576;
/// Columns per worksheet
pub const MAX_COLUMNS: usize = 16_384;
/// Characters (UTF-16 code units) per cell
pub const MAX_CELL_TEXT_LEN: usize = 32_767;
/// Characters per sheet name
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Buffered markup is drained into the ZIP entry past this size
const DRAIN_THRESHOLD: usize = 64 * 1024;

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n";
const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PACKAGE_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// Workbook that streams XML directly into the compressor (no temp files)
///
/// Worksheets are compressed as their rows arrive; the shared strings part
/// and the workbook metadata are written once, when the backend finishes.
pub struct XlsxBackend<W: Write> {
    zip: StreamingZipWriter<W>,
    worksheets: Vec<String>,
    current_row: u32,
    in_worksheet: bool,
    xml: XmlWriter,
}

impl<W: Write> XlsxBackend<W> {
    pub fn new(output: W, compression_level: u32) -> Self {
        XlsxBackend {
            zip: StreamingZipWriter::new(output, compression_level),
            worksheets: Vec::new(),
            current_row: 0,
            in_worksheet: false,
            xml: XmlWriter::with_capacity(4096),
        }
    }

    /// Names of the worksheets written so far, in order
    pub fn worksheet_names(&self) -> &[String] {
        &self.worksheets
    }

    fn name_taken(&self, name: &str) -> bool {
        let lowered = name.to_lowercase();
        self.worksheets.iter().any(|n| n.to_lowercase() == lowered)
    }

    fn validate_sheet_name(&self, name: &str) -> Result<()> {
        let reject = |reason: &str| {
            Err(ExcelError::InvalidSheetName {
                name: name.to_string(),
                reason: reason.to_string(),
            })
        };

        if name.is_empty() {
            return reject("name is empty");
        }
        if name.encode_utf16().count() > MAX_SHEET_NAME_LEN {
            return reject("name is longer than 31 characters");
        }
        if let Some(c) = name
            .chars()
            .find(|c| matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        {
            return reject(&format!("character '{}' is not allowed", c));
        }
        if name.starts_with('\'') || name.ends_with('\'') {
            return reject("name cannot start or end with an apostrophe");
        }
        if name.eq_ignore_ascii_case("History") {
            return reject("name is reserved");
        }
        if self.name_taken(name) {
            return reject("a worksheet with this name already exists");
        }
        Ok(())
    }

    /// Move buffered markup into the open ZIP entry
    fn drain(&mut self) -> Result<()> {
        if !self.xml.is_empty() {
            self.zip.write_data(self.xml.as_bytes())?;
            self.xml.clear();
        }
        Ok(())
    }

    fn write_part(&mut self, name: &str, content: &str) -> Result<()> {
        self.zip.start_entry(name)?;
        self.zip.write_data(content.as_bytes())
    }

    fn write_content_types(&mut self) -> Result<()> {
        self.xml.clear();
        self.xml.write_str(XML_DECLARATION);
        self.xml.write_str(concat!(
            "<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">",
            "<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>",
            "<Default Extension=\"xml\" ContentType=\"application/xml\"/>",
            "<Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>",
            "<Override PartName=\"/xl/styles.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml\"/>",
            "<Override PartName=\"/xl/sharedStrings.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml\"/>",
            "<Override PartName=\"/docProps/core.xml\" ContentType=\"application/vnd.openxmlformats-package.core-properties+xml\"/>",
            "<Override PartName=\"/docProps/app.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.extended-properties+xml\"/>",
        ));
        for i in 1..=self.worksheets.len() as u64 {
            self.xml.write_str("<Override PartName=\"/xl/worksheets/sheet");
            self.xml.write_int(i);
            self.xml.write_str(".xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>");
        }
        self.xml.end_element("Types");

        self.zip.start_entry("[Content_Types].xml")?;
        self.drain()
    }

    fn write_root_rels(&mut self) -> Result<()> {
        let xml = concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
            "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
            "<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"xl/workbook.xml\"/>",
            "<Relationship Id=\"rId2\" Type=\"http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties\" Target=\"docProps/core.xml\"/>",
            "<Relationship Id=\"rId3\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties\" Target=\"docProps/app.xml\"/>",
            "</Relationships>"
        );
        self.write_part("_rels/.rels", xml)
    }

    fn write_workbook_xml(&mut self) -> Result<()> {
        self.xml.clear();
        self.xml.write_str(XML_DECLARATION);
        self.xml.start_element("workbook");
        self.xml.attribute("xmlns", MAIN_NS);
        self.xml.attribute("xmlns:r", REL_NS);
        self.xml.close_start_tag();
        self.xml.start_element("sheets");
        self.xml.close_start_tag();

        for (i, name) in self.worksheets.iter().enumerate() {
            let sheet_id = i as u64 + 1;
            self.xml.start_element("sheet");
            self.xml.attribute("name", name);
            self.xml.attribute_int("sheetId", sheet_id);
            self.xml.attribute("r:id", &format!("rId{}", sheet_id));
            self.xml.close_empty();
        }

        self.xml.end_element("sheets");
        self.xml.end_element("workbook");

        self.zip.start_entry("xl/workbook.xml")?;
        self.drain()
    }

    fn write_workbook_rels(&mut self) -> Result<()> {
        self.xml.clear();
        self.xml.write_str(XML_DECLARATION);
        self.xml.start_element("Relationships");
        self.xml.attribute("xmlns", PACKAGE_REL_NS);
        self.xml.close_start_tag();

        let sheet_count = self.worksheets.len() as u64;
        for rid in 1..=sheet_count {
            self.xml.start_element("Relationship");
            self.xml.attribute("Id", &format!("rId{}", rid));
            self.xml.attribute(
                "Type",
                "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet",
            );
            self.xml
                .attribute("Target", &format!("worksheets/sheet{}.xml", rid));
            self.xml.close_empty();
        }

        self.xml.start_element("Relationship");
        self.xml.attribute("Id", &format!("rId{}", sheet_count + 1));
        self.xml.attribute(
            "Type",
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles",
        );
        self.xml.attribute("Target", "styles.xml");
        self.xml.close_empty();

        self.xml.start_element("Relationship");
        self.xml.attribute("Id", &format!("rId{}", sheet_count + 2));
        self.xml.attribute(
            "Type",
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings",
        );
        self.xml.attribute("Target", "sharedStrings.xml");
        self.xml.close_empty();

        self.xml.end_element("Relationships");

        self.zip.start_entry("xl/_rels/workbook.xml.rels")?;
        self.drain()
    }

    // Only the date formats cells refer to; no user styling.
    fn write_styles(&mut self) -> Result<()> {
        let xml = concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
            "<styleSheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">",
            "<fonts count=\"1\"><font><sz val=\"11\"/><name val=\"Calibri\"/></font></fonts>",
            "<fills count=\"2\"><fill><patternFill patternType=\"none\"/></fill>",
            "<fill><patternFill patternType=\"gray125\"/></fill></fills>",
            "<borders count=\"1\"><border><left/><right/><top/><bottom/><diagonal/></border></borders>",
            "<cellStyleXfs count=\"1\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\"/></cellStyleXfs>",
            "<cellXfs count=\"3\">",
            "<xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\" xfId=\"0\"/>",
            "<xf numFmtId=\"14\" fontId=\"0\" fillId=\"0\" borderId=\"0\" xfId=\"0\" applyNumberFormat=\"1\"/>",
            "<xf numFmtId=\"22\" fontId=\"0\" fillId=\"0\" borderId=\"0\" xfId=\"0\" applyNumberFormat=\"1\"/>",
            "</cellXfs>",
            "<cellStyles count=\"1\"><cellStyle name=\"Normal\" xfId=\"0\" builtinId=\"0\"/></cellStyles>",
            "</styleSheet>"
        );
        self.write_part("xl/styles.xml", xml)
    }

    /// Write shared strings XML
    fn write_shared_strings(&mut self, strings: &SharedStrings) -> Result<()> {
        self.zip.start_entry("xl/sharedStrings.xml")?;

        self.xml.clear();
        self.xml.write_str(XML_DECLARATION);
        self.xml.start_element("sst");
        self.xml.attribute("xmlns", MAIN_NS);
        self.xml.attribute_int("count", strings.total_references());
        self.xml.attribute_int("uniqueCount", strings.count() as u64);
        self.xml.close_start_tag();

        for (_, s) in strings.iter() {
            self.xml.write_str("<si>");
            self.xml.start_element("t");
            if needs_space_preserve(s) {
                self.xml.attribute("xml:space", "preserve");
            }
            self.xml.close_start_tag();
            self.xml.write_escaped(s);
            self.xml.write_str("</t></si>");

            if self.xml.len() >= DRAIN_THRESHOLD {
                self.drain()?;
            }
        }

        self.xml.end_element("sst");
        self.drain()
    }

    fn write_app_props(&mut self) -> Result<()> {
        self.xml.clear();
        self.xml.write_str(XML_DECLARATION);
        self.xml.write_str(concat!(
            "<Properties xmlns=\"http://schemas.openxmlformats.org/officeDocument/2006/extended-properties\">",
            "<Application>ExcelStream</Application>",
        ));
        self.xml.write_str("<AppVersion>");
        self.xml.write_str(env!("CARGO_PKG_VERSION"));
        self.xml.write_str("</AppVersion></Properties>");

        self.zip.start_entry("docProps/app.xml")?;
        self.drain()
    }

    fn write_core_props(&mut self) -> Result<()> {
        let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

        self.xml.clear();
        self.xml.write_str(XML_DECLARATION);
        self.xml.write_str(concat!(
            "<cp:coreProperties xmlns:cp=\"http://schemas.openxmlformats.org/package/2006/metadata/core-properties\" ",
            "xmlns:dc=\"http://purl.org/dc/elements/1.1/\" xmlns:dcterms=\"http://purl.org/dc/terms/\" ",
            "xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">",
            "<dc:creator>ExcelStream</dc:creator>",
        ));
        for element in ["dcterms:created", "dcterms:modified"] {
            self.xml.start_element(element);
            self.xml.attribute("xsi:type", "dcterms:W3CDTF");
            self.xml.close_start_tag();
            self.xml.write_str(&now);
            self.xml.end_element(element);
        }
        self.xml.end_element("cp:coreProperties");

        self.zip.start_entry("docProps/core.xml")?;
        self.drain()
    }
}

impl<W: Write> SheetBackend for XlsxBackend<W> {
    type Sink = W;

    fn max_cell_text_len(&self) -> usize {
        MAX_CELL_TEXT_LEN
    }

    fn max_rows(&self) -> u64 {
        MAX_ROWS
    }

    fn max_columns(&self) -> usize {
        MAX_COLUMNS
    }

    fn default_sheet_name(&self) -> String {
        (self.worksheets.len() + 1..)
            .map(|n| format!("Sheet{}", n))
            .find(|name| !self.name_taken(name))
            .unwrap_or_else(|| "Sheet".to_string())
    }

    fn begin_sheet(&mut self, name: &str, column_count: usize) -> Result<()> {
        // Finish previous worksheet if any
        self.end_sheet()?;
        self.validate_sheet_name(name)?;

        self.worksheets.push(name.to_string());
        self.current_row = 0;

        // Start new worksheet entry in ZIP
        let entry_name = format!("xl/worksheets/sheet{}.xml", self.worksheets.len());
        self.zip.start_entry(&entry_name)?;
        self.zip.write_data(WORKSHEET_START.as_bytes())?;
        self.in_worksheet = true;

        log::debug!(
            "started worksheet '{}' ({}, {} columns)",
            name,
            entry_name,
            column_count
        );
        Ok(())
    }

    fn write_row(&mut self, row: &[CellValue], strings: &mut SharedStrings) -> Result<()> {
        if !self.in_worksheet {
            return Err(ExcelError::WriteError("No worksheet started".to_string()));
        }
        if u64::from(self.current_row) >= MAX_ROWS {
            return Err(ExcelError::WriteError(format!(
                "worksheet is full ({} rows)",
                MAX_ROWS
            )));
        }

        self.current_row += 1;

        // Build row XML in buffer, then stream to compressor
        self.xml.clear();
        worksheet::write_row(&mut self.xml, self.current_row, row, strings);
        self.drain()
    }

    fn flush(&mut self) -> Result<()> {
        self.zip.flush()
    }

    fn end_sheet(&mut self) -> Result<()> {
        if self.in_worksheet {
            self.in_worksheet = false;
            self.zip.write_data(WORKSHEET_END.as_bytes())?;
            // Seal now so size and sink errors belong to this sheet
            self.zip.finish_entry()?;
            log::debug!(
                "finished worksheet '{}' with {} rows",
                self.worksheets.last().map(String::as_str).unwrap_or_default(),
                self.current_row
            );
        }
        Ok(())
    }

    fn finish(mut self, strings: &SharedStrings) -> Result<W> {
        self.end_sheet()?;

        // A workbook needs at least one sheet to open
        if self.worksheets.is_empty() {
            let name = self.default_sheet_name();
            self.begin_sheet(&name, 0)?;
            self.end_sheet()?;
        }

        self.write_content_types()?;
        self.write_root_rels()?;
        self.write_workbook_xml()?;
        self.write_workbook_rels()?;
        self.write_styles()?;
        self.write_shared_strings(strings)?;
        self.write_app_props()?;
        self.write_core_props()?;

        self.zip.finish()
    }
}

//! Spreadsheet export of report lists

use rust_xlsxwriter::{Format, Workbook};
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::ZipWriter;

use crate::duration::format_duration;
use crate::error::{AppError, Result};
use crate::models::ReportRecord;

/// Column headers; billing type and cost center are always the last two.
pub const HEADERS: [&str; 9] = [
    "date",
    "duration",
    "customer",
    "project",
    "task",
    "user",
    "comment",
    "billing_type",
    "cost_center",
];

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Csv,
    Xlsx,
    Ods,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Csv => "csv",
            FileType::Xlsx => "xlsx",
            FileType::Ods => "ods",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            FileType::Csv => "text/csv",
            FileType::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            FileType::Ods => "application/vnd.oasis.opendocument.spreadsheet",
        }
    }
}

impl std::str::FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "csv" => Ok(FileType::Csv),
            "xlsx" => Ok(FileType::Xlsx),
            "ods" => Ok(FileType::Ods),
            _ => Err(format!("Invalid file type: {}", s)),
        }
    }
}

/// Refuse exports larger than `max`; `max <= 0` disables the limit.
pub fn check_max_count(count: i64, max: i64) -> Result<()> {
    if max > 0 && count > max {
        return Err(AppError::BadRequest(format!(
            "Your request exceeds the maximum allowed entries ({} > {})",
            count, max
        )));
    }
    Ok(())
}

/// Project a record into its export row
pub fn row(record: &ReportRecord) -> [String; 9] {
    [
        record.report.date.to_string(),
        format_duration(record.report.duration),
        record.customer_name.clone(),
        record.project_name.clone(),
        record.task_name.clone(),
        record.username.clone(),
        record.report.comment.clone(),
        record.effective_billing_type().to_string(),
        record.effective_cost_center().to_string(),
    ]
}

/// Render `records` (in the given order) as a header row plus one row each
pub fn render(file_type: FileType, records: &[ReportRecord]) -> Result<Vec<u8>> {
    let rows: Vec<[String; 9]> = records.iter().map(row).collect();
    match file_type {
        FileType::Csv => render_csv(&rows),
        FileType::Xlsx => render_xlsx(&rows),
        FileType::Ods => render_ods(&rows),
    }
}

fn render_csv(rows: &[[String; 9]]) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());

    wtr.write_record(HEADERS).map_err(export_error)?;
    for row in rows {
        wtr.write_record(row).map_err(export_error)?;
    }

    wtr.into_inner().map_err(export_error)
}

fn render_xlsx(rows: &[[String; 9]]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let header_format = Format::new().set_bold();

    for (col, header) in HEADERS.iter().enumerate() {
        worksheet
            .write_with_format(0, col as u16, *header, &header_format)
            .map_err(export_error)?;
    }
    worksheet.set_freeze_panes(1, 0).map_err(export_error)?;

    for (index, row) in rows.iter().enumerate() {
        let r = (index + 1) as u32;
        for (col, value) in row.iter().enumerate() {
            worksheet
                .write(r, col as u16, value.as_str())
                .map_err(export_error)?;
        }
    }

    workbook.save_to_buffer().map_err(export_error)
}

const ODS_MIMETYPE: &str = "application/vnd.oasis.opendocument.spreadsheet";

const ODS_MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0" manifest:version="1.2">
 <manifest:file-entry manifest:full-path="/" manifest:media-type="application/vnd.oasis.opendocument.spreadsheet"/>
 <manifest:file-entry manifest:full-path="content.xml" manifest:media-type="text/xml"/>
</manifest:manifest>
"#;

/// Minimal OpenDocument spreadsheet: one table, string cells only
fn render_ods(rows: &[[String; 9]]) -> Result<Vec<u8>> {
    let mut content = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:table="urn:oasis:names:tc:opendocument:xmlns:table:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0" office:version="1.2">
<office:body><office:spreadsheet><table:table table:name="Reports">
"#,
    );

    push_ods_row(&mut content, HEADERS.iter().copied());
    for row in rows {
        push_ods_row(&mut content, row.iter().map(String::as_str));
    }
    content.push_str("</table:table></office:spreadsheet></office:body></office:document-content>\n");

    let mut archive = ZipWriter::new(Cursor::new(Vec::new()));

    // mimetype must come first and uncompressed
    archive.start_file("mimetype", zip_options(zip::CompressionMethod::Stored))
        .map_err(export_error)?;
    archive.write_all(ODS_MIMETYPE.as_bytes()).map_err(export_error)?;
    archive.start_file(
        "META-INF/manifest.xml",
        zip_options(zip::CompressionMethod::Deflated),
    )
    .map_err(export_error)?;
    archive.write_all(ODS_MANIFEST.as_bytes()).map_err(export_error)?;
    archive.start_file("content.xml", zip_options(zip::CompressionMethod::Deflated))
        .map_err(export_error)?;
    archive.write_all(content.as_bytes()).map_err(export_error)?;

    let cursor = archive.finish().map_err(export_error)?;
    Ok(cursor.into_inner())
}

fn zip_options(method: zip::CompressionMethod) -> FileOptions<'static, ()> {
    FileOptions::default().compression_method(method)
}

fn push_ods_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    out.push_str("<table:table-row>");
    for cell in cells {
        out.push_str("<table:table-cell office:value-type=\"string\"><text:p>");
        out.push_str(&xml_escape(cell));
        out.push_str("</text:p></table:table-cell>");
    }
    out.push_str("</table:table-row>\n");
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn export_error<E: std::fmt::Display>(e: E) -> AppError {
    AppError::Export(e.to_string())
}

//! Report rendering.
//!
//! Turns flat [`ReportRecord`]s into one of three export formats:
//! - spreadsheet: one "Summary" sheet, header row from the first record's keys
//! - PDF: title line then one numbered JSON line per record, paginated on A4
//! - document: the same numbered lines as paragraphs
//!
//! Rendered bytes can be staged on disk as an [`ExportArtifact`], which removes
//! its file when read back or dropped.

use chrono::Utc;
use docx_rs::{Docx, Paragraph, Run};
use domain::models::{format_timestamp, CellValue, ReportFormat, ReportRecord};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use std::io::{Cursor, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

pub const REPORT_TITLE: &str = "Clinic Summary Report";
pub const SHEET_NAME: &str = "Summary";

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 15.0;
const TITLE_SIZE: f32 = 16.0;
const BODY_SIZE: f32 = 10.0;
const LINE_HEIGHT_MM: f32 = 5.0;
const WRAP_COLUMNS: usize = 95;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] XlsxError),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("Document error: {0}")]
    Document(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A rendered report held in memory.
#[derive(Debug, Clone)]
pub struct RenderedReport {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: &'static str,
    pub format: ReportFormat,
}

impl RenderedReport {
    /// Replace the filename stem, keeping the format's extension.
    pub fn with_stem(mut self, stem: &str) -> Self {
        self.filename = format!("{}.{}", stem, self.format.extension());
        self
    }
}

/// Render `records` in `format`.
pub fn render(records: &[ReportRecord], format: ReportFormat) -> Result<RenderedReport, RenderError> {
    let bytes = match format {
        ReportFormat::Spreadsheet => render_spreadsheet(records)?,
        ReportFormat::Pdf => render_pdf(records)?,
        ReportFormat::Document => render_document(records)?,
    };

    debug!(
        format = format.extension(),
        records = records.len(),
        size = bytes.len(),
        "Report rendered"
    );

    Ok(RenderedReport {
        bytes,
        filename: format!(
            "clinic_report_{}.{}",
            Utc::now().format("%Y%m%d%H%M%S"),
            format.extension()
        ),
        content_type: format.content_type(),
        format,
    })
}

/// Header row for a record set: the first record's keys.
pub fn headers(records: &[ReportRecord]) -> Vec<String> {
    records
        .first()
        .map(|r| r.keys().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Numbered entry lines shared by the PDF and document renderers.
pub fn entry_lines(records: &[ReportRecord]) -> Vec<String> {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| format!("{}. {}", i + 1, record.to_json_line()))
        .collect()
}

fn render_spreadsheet(records: &[ReportRecord]) -> Result<Vec<u8>, RenderError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    let columns = headers(records);
    if columns.is_empty() {
        return Ok(workbook.save_to_buffer()?);
    }

    for (col, header) in columns.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, header.as_str(), &header_format)?;
    }

    for (i, record) in records.iter().enumerate() {
        let row = (i + 1) as u32;
        for (col, key) in columns.iter().enumerate() {
            let col = col as u16;
            match record.get(key) {
                Some(CellValue::Text(s)) => {
                    worksheet.write_string(row, col, s.as_str())?;
                }
                Some(CellValue::Integer(n)) => {
                    worksheet.write_number(row, col, *n as f64)?;
                }
                Some(CellValue::Decimal(d)) => {
                    worksheet.write_number(row, col, *d)?;
                }
                Some(CellValue::Timestamp(ts)) => {
                    worksheet.write_string(row, col, format_timestamp(ts))?;
                }
                Some(CellValue::Null) | None => {}
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// Split a line into chunks of at most `width` characters.
fn wrap(line: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars.chunks(width).map(|c| c.iter().collect()).collect()
}

struct PdfCursor {
    doc: PdfDocumentReference,
    font: IndirectFontRef,
    layer: printpdf::PdfLayerReference,
    y: f32,
    pages: usize,
}

impl PdfCursor {
    fn write(&mut self, text: &str, size: f32) {
        if self.y < MARGIN_MM {
            self.pages += 1;
            let (page, layer) = self.doc.add_page(
                Mm(PAGE_WIDTH_MM),
                Mm(PAGE_HEIGHT_MM),
                format!("Page {}", self.pages),
            );
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = PAGE_HEIGHT_MM - MARGIN_MM;
        }
        self.layer
            .use_text(text, size, Mm(MARGIN_MM), Mm(self.y), &self.font);
        self.y -= LINE_HEIGHT_MM;
    }
}

fn render_pdf(records: &[ReportRecord]) -> Result<Vec<u8>, RenderError> {
    let (doc, page, layer) = PdfDocument::new(
        REPORT_TITLE,
        Mm(PAGE_WIDTH_MM),
        Mm(PAGE_HEIGHT_MM),
        "Page 1",
    );
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| RenderError::Pdf(e.to_string()))?;
    let layer = doc.get_page(page).get_layer(layer);

    let mut cursor = PdfCursor {
        doc,
        font,
        layer,
        y: PAGE_HEIGHT_MM - MARGIN_MM,
        pages: 1,
    };

    cursor.write(REPORT_TITLE, TITLE_SIZE);
    cursor.y -= LINE_HEIGHT_MM;

    for line in entry_lines(records) {
        for chunk in wrap(&line, WRAP_COLUMNS) {
            cursor.write(&chunk, BODY_SIZE);
        }
    }

    cursor
        .doc
        .save_to_bytes()
        .map_err(|e| RenderError::Pdf(e.to_string()))
}

fn render_document(records: &[ReportRecord]) -> Result<Vec<u8>, RenderError> {
    let mut docx = Docx::new().add_paragraph(
        Paragraph::new().add_run(Run::new().add_text(REPORT_TITLE).bold().size(32)),
    );

    for line in entry_lines(records) {
        docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(line)));
    }

    let mut buffer = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut buffer)
        .map_err(|e| RenderError::Document(e.to_string()))?;
    Ok(buffer.into_inner())
}

/// A rendered report staged as a temporary file.
///
/// The file is removed by [`ExportArtifact::into_bytes`] or when the artifact
/// is dropped, whichever comes first.
#[derive(Debug)]
pub struct ExportArtifact {
    file: NamedTempFile,
    filename: String,
    content_type: &'static str,
    format: ReportFormat,
}

impl ExportArtifact {
    /// Write `rendered` to a new temp file inside `dir`.
    pub fn persist(dir: &Path, rendered: RenderedReport) -> Result<Self, RenderError> {
        std::fs::create_dir_all(dir)?;

        let mut file = tempfile::Builder::new()
            .prefix("clinic-export-")
            .suffix(&format!(".{}", rendered.format.extension()))
            .tempfile_in(dir)?;
        file.write_all(&rendered.bytes)?;
        file.flush()?;

        debug!(path = %file.path().display(), "Export artifact staged");

        Ok(Self {
            file,
            filename: rendered.filename,
            content_type: rendered.content_type,
            format: rendered.format,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Read the staged file back and delete it.
    pub fn into_bytes(self) -> Result<RenderedReport, RenderError> {
        let ExportArtifact {
            file,
            filename,
            content_type,
            format,
        } = self;

        let bytes = std::fs::read(file.path())?;
        file.close()?;

        Ok(RenderedReport {
            bytes,
            filename,
            content_type,
            format,
        })
    }
}

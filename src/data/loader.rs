use std::io::{Cursor, Read, Seek};
use std::path::Path;

use anyhow::{Context, Result as AnyResult};
use calamine::{Data, DataType, Range, Reader, Xls, Xlsx};
use lopdf::Document;

use super::model::{CellValue, Dataset};
use crate::error::{DashError, RejectReason, Result};

/// Uploads above this size are rejected before parsing (50 MB).
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Cell texts treated as missing values.
const NULL_TOKENS: &[&str] = &["NA", "N/A", "NaN", "nan", "null", "NULL", "None", "#N/A"];

/// Delimiters tried when sniffing plain-text tables.
const TEXT_DELIMITERS: &[u8] = &[b',', b';', b'\t', b'|'];

/// Column holding the lines of a document that is not a table.
pub const TEXT_COLUMN: &str = "text";

/// Lines inspected when sniffing a text table.
const SNIFF_LINES: usize = 10;

// ---------------------------------------------------------------------------
// Upload formats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFormat {
    Csv,
    Xlsx,
    Xls,
    Pdf,
    Txt,
}

impl UploadFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(UploadFormat::Csv),
            "xlsx" => Some(UploadFormat::Xlsx),
            "xls" => Some(UploadFormat::Xls),
            "pdf" => Some(UploadFormat::Pdf),
            "txt" => Some(UploadFormat::Txt),
            _ => None,
        }
    }

    /// Format implied by a file name, if supported.
    pub fn of(filename: &str) -> Option<Self> {
        Self::from_extension(&extension_of(filename))
    }

    /// Free-form documents whose text can be sent for extraction.
    pub fn is_document(self) -> bool {
        matches!(self, UploadFormat::Pdf | UploadFormat::Txt)
    }
}

fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Check size and extension of an upload without looking at its content.
pub fn validate_upload(size: usize, filename: &str) -> Result<UploadFormat> {
    if size > MAX_UPLOAD_BYTES {
        return Err(DashError::UploadRejected(RejectReason::Oversize {
            size,
            limit: MAX_UPLOAD_BYTES,
        }));
    }
    let ext = extension_of(filename);
    UploadFormat::from_extension(&ext)
        .ok_or(DashError::UploadRejected(RejectReason::UnsupportedFormat(ext)))
}

/// Validate and parse an uploaded file into a raw dataset.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`          – header row + records
/// * `.xlsx`, `.xls` – first worksheet, first row is the header
/// * `.txt`          – delimiter-sniffed table, else one `text` column of lines
/// * `.pdf`          – text layer parsed like `.txt`
pub fn load_upload(bytes: &[u8], filename: &str) -> Result<Dataset> {
    let format = validate_upload(bytes.len(), filename)?;

    let dataset = match format {
        UploadFormat::Csv => parse_csv(&decode_text(bytes), b',')
            .map_err(|e| DashError::ParseFailure(format!("{e:#}")))?,
        UploadFormat::Xlsx => load_workbook::<Xlsx<Cursor<Vec<u8>>>>(bytes)?,
        UploadFormat::Xls => load_workbook::<Xls<Cursor<Vec<u8>>>>(bytes)?,
        UploadFormat::Txt => parse_text_table(&decode_text(bytes))
            .map_err(|e| DashError::ParseFailure(format!("{e:#}")))?,
        UploadFormat::Pdf => load_pdf(bytes)?,
    };

    if dataset.width() == 0 {
        return Err(DashError::UploadRejected(RejectReason::Empty(
            "no columns found".into(),
        )));
    }
    if dataset.is_empty() {
        return Err(DashError::UploadRejected(RejectReason::Empty(
            "no data rows found".into(),
        )));
    }

    log::info!(
        "Loaded {filename}: {} rows x {} columns ({format:?})",
        dataset.len(),
        dataset.width()
    );
    Ok(dataset)
}

/// Load a file from disk.  The size check runs on file metadata, so an
/// oversize file is never read into memory.
pub fn load_file(path: &Path) -> Result<Dataset> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_string();
    let size = std::fs::metadata(path)?.len() as usize;
    validate_upload(size, &filename)?;

    let bytes = std::fs::read(path)?;
    load_upload(&bytes, &filename)
}

// ---------------------------------------------------------------------------
// Cell / header helpers
// ---------------------------------------------------------------------------

fn decode_text(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.trim_start_matches('\u{feff}').to_string()
}

fn text_cell(s: &str) -> CellValue {
    let s = s.trim();
    if s.is_empty() || NULL_TOKENS.contains(&s) {
        CellValue::Null
    } else {
        CellValue::Text(s.to_string())
    }
}

/// Trim header names, name blank ones `column_<n>` and suffix duplicates.
fn normalize_headers<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for (i, h) in raw.into_iter().enumerate() {
        let base = match h.as_ref().trim() {
            "" => format!("column_{}", i + 1),
            name => name.to_string(),
        };
        let mut name = base.clone();
        let mut n = 2;
        while out.contains(&name) {
            name = format!("{base}_{n}");
            n += 1;
        }
        out.push(name);
    }
    out
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// Header row with column names, one record per line.  Short records are
/// padded with nulls.
fn parse_csv(text: &str, delimiter: u8) -> AnyResult<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = normalize_headers(reader.headers().context("reading CSV headers")?.iter());
    if headers.is_empty() {
        return Ok(Dataset::new(headers, Vec::new()));
    }

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {}", row_no + 1))?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(text_cell).collect());
    }

    Ok(Dataset::new(headers, rows))
}

// ---------------------------------------------------------------------------
// Plain-text loader (also used for PDF text)
// ---------------------------------------------------------------------------

/// Pick the delimiter that splits the first lines into the same number
/// (≥ 2) of fields.  The delimiter yielding the most columns wins.
fn detect_delimiter(text: &str) -> Option<u8> {
    let sample: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();
    if sample.len() < 2 {
        return None;
    }

    let mut best: Option<(u8, usize)> = None;
    for &delim in TEXT_DELIMITERS {
        let counts: Vec<usize> = sample
            .iter()
            .map(|l| l.bytes().filter(|&b| b == delim).count() + 1)
            .collect();
        let first = counts[0];
        if first < 2 || counts.iter().any(|&c| c != first) {
            continue;
        }
        if best.map_or(true, |(_, n)| first > n) {
            best = Some((delim, first));
        }
    }
    best.map(|(d, _)| d)
}

/// Whitespace-aligned tables, as produced by PDF text extraction.
fn whitespace_table(text: &str) -> Option<Dataset> {
    let lines: Vec<Vec<&str>> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.split_whitespace().collect())
        .collect();
    if lines.len() < 2 {
        return None;
    }
    let width = lines[0].len();
    let consistent = lines
        .iter()
        .take(SNIFF_LINES)
        .all(|fields| fields.len() == width);
    if width < 2 || !consistent {
        return None;
    }

    let headers = normalize_headers(lines[0].iter());
    let rows = lines[1..]
        .iter()
        .map(|fields| fields.iter().map(|f| text_cell(f)).collect())
        .collect();
    Some(Dataset::new(headers, rows))
}

fn parse_text_table(text: &str) -> AnyResult<Dataset> {
    if let Some(delim) = detect_delimiter(text) {
        log::debug!("Text table delimiter detected: {:?}", delim as char);
        return parse_csv(text, delim);
    }
    if let Some(ds) = whitespace_table(text) {
        log::debug!("Text table parsed as whitespace-aligned columns");
        return Ok(ds);
    }

    log::debug!("No table structure found; loading lines as a single text column");
    let rows = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| vec![text_cell(l)])
        .collect();
    Ok(Dataset::new(vec![TEXT_COLUMN.to_string()], rows))
}

// ---------------------------------------------------------------------------
// Excel loader
// ---------------------------------------------------------------------------

fn load_workbook<R>(bytes: &[u8]) -> Result<Dataset>
where
    R: Reader<Cursor<Vec<u8>>>,
    R::Error: std::fmt::Display,
{
    let workbook = R::new(Cursor::new(bytes.to_vec())).map_err(|e| {
        DashError::UploadRejected(RejectReason::Corrupt(format!("cannot open workbook: {e}")))
    })?;
    read_first_sheet(workbook)
}

fn read_first_sheet<RS, R>(mut workbook: R) -> Result<Dataset>
where
    RS: Read + Seek,
    R: Reader<RS>,
    R::Error: std::fmt::Display,
{
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| DashError::UploadRejected(RejectReason::Empty("no worksheet found".into())))?
        .map_err(|e| DashError::ParseFailure(format!("reading worksheet: {e}")))?;

    Ok(range_to_dataset(&range))
}

fn range_to_dataset(range: &Range<Data>) -> Dataset {
    let mut rows_iter = range.rows();
    let Some(header_row) = rows_iter.next() else {
        return Dataset::new(Vec::new(), Vec::new());
    };
    let headers = normalize_headers(header_row.iter().map(|c| match c {
        Data::Empty => String::new(),
        other => other.to_string(),
    }));

    let rows = rows_iter
        .map(|row| row.iter().map(excel_cell).collect::<Vec<_>>())
        .filter(|row: &Vec<CellValue>| row.iter().any(|c| !c.is_null()))
        .collect();

    Dataset::new(headers, rows)
}

/// Excel cells keep their native type; strings go through the null-token check.
fn excel_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Null,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => text_cell(s),
        Data::Float(f) => CellValue::Float(*f),
        Data::Int(i) => CellValue::Integer(*i),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(_) => cell
            .as_datetime()
            .map(CellValue::Date)
            .unwrap_or(CellValue::Null),
    }
}

// ---------------------------------------------------------------------------
// PDF loader
// ---------------------------------------------------------------------------

fn load_pdf(bytes: &[u8]) -> Result<Dataset> {
    let document = Document::load_mem(bytes).map_err(|e| {
        DashError::UploadRejected(RejectReason::Corrupt(format!("cannot load PDF: {e}")))
    })?;

    let mut text = String::new();
    for (page_num, _) in document.get_pages() {
        match document.extract_text(&[page_num]) {
            Ok(page_text) => {
                let trimmed = page_text.trim();
                if !trimmed.is_empty() {
                    text.push_str(trimmed);
                    text.push('\n');
                }
            }
            Err(e) => log::warn!("PDF page {page_num}: text extraction failed: {e}"),
        }
    }

    if text.trim().is_empty() {
        return Err(DashError::ParseFailure(
            "PDF has no extractable text layer".into(),
        ));
    }

    parse_text_table(&text).map_err(|e| DashError::ParseFailure(format!("{e:#}")))
}

//! FileIngestor: decode spreadsheet bytes into parsed sheets.
//!
//! Excel-family workbooks are decoded with calamine, CSV with the csv crate.
//! Each sheet becomes a raw [`Grid`], the header row is located by the
//! [`HeaderDetector`], and the remaining rows become [`Row`] objects keyed by
//! header label.

use std::collections::HashSet;
use std::io::Cursor;

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use serde::Serialize;
use serde_json::{Number, Value};
use tracing::debug;
use utoipa::ToSchema;

use super::header::HeaderDetector;
use super::{Grid, Row, is_blank};

/// Errors raised while decoding a file. Recoverable by picking another file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("could not read spreadsheet: {0}")]
    Corrupt(String),

    #[error("no data found")]
    NoData,
}

/// Container formats the ingestor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadsheetFormat {
    /// xlsx, xlsm, xls, xlsb, ods
    Workbook,
    Csv,
}

impl SpreadsheetFormat {
    /// Detect the format from a file name's extension.
    pub fn from_filename(filename: &str) -> Result<Self, ParseError> {
        let ext = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Ok(Self::Workbook),
            "csv" => Ok(Self::Csv),
            "" => Err(ParseError::UnsupportedFormat(format!(
                "'{}' has no file extension",
                filename
            ))),
            other => Err(ParseError::UnsupportedFormat(format!(".{}", other))),
        }
    }

    /// MIME type recorded on the upload.
    pub fn mime_type(&self, filename: &str) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Workbook => {
                let lower = filename.to_ascii_lowercase();
                if lower.ends_with(".xls") {
                    "application/vnd.ms-excel"
                } else if lower.ends_with(".ods") {
                    "application/vnd.oasis.opendocument.spreadsheet"
                } else {
                    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
                }
            }
        }
    }
}

/// A decoded sheet ready for mapping.
///
/// `rows.len() == total_rows` and `total_rows > 0` for every sheet returned
/// by [`FileIngestor::ingest`].
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ParsedSheet {
    pub name: String,
    /// Zero-based index of the detected header row within the raw grid.
    pub header_row_index: usize,
    pub headers: Vec<String>,
    #[schema(value_type = Vec<Object>)]
    pub rows: Vec<Row>,
    pub total_rows: usize,
}

/// Decodes raw file bytes into sheets.
#[derive(Debug, Clone, Default)]
pub struct FileIngestor {
    detector: HeaderDetector,
}

impl FileIngestor {
    pub fn new(detector: HeaderDetector) -> Self {
        Self { detector }
    }

    /// Decode every sheet in `bytes` and keep those with at least one data row.
    pub fn ingest(&self, filename: &str, bytes: &[u8]) -> Result<Vec<ParsedSheet>, ParseError> {
        let grids = match SpreadsheetFormat::from_filename(filename)? {
            SpreadsheetFormat::Workbook => decode_workbook(bytes)?,
            SpreadsheetFormat::Csv => vec![("Sheet1".to_string(), decode_csv(bytes)?)],
        };

        let sheets: Vec<ParsedSheet> = grids
            .into_iter()
            .filter_map(|(name, grid)| self.parse_grid(name, &grid))
            .collect();

        if sheets.is_empty() {
            return Err(ParseError::NoData);
        }

        debug!(filename, sheets = sheets.len(), "Spreadsheet ingested");
        Ok(sheets)
    }

    /// Turn one raw grid into a sheet, or `None` when it holds no data rows.
    pub fn parse_grid(&self, name: String, grid: &Grid) -> Option<ParsedSheet> {
        let detection = self.detector.detect(grid)?;
        let headers = dedupe_labels(detection.labels);

        let rows: Vec<Row> = grid
            .iter()
            .skip(detection.index + 1)
            .filter(|cells| !cells.iter().all(is_blank))
            .map(|cells| build_row(&headers, cells))
            .collect();

        if rows.is_empty() {
            debug!(sheet = %name, "Sheet dropped: no data rows after header");
            return None;
        }

        Some(ParsedSheet {
            name,
            header_row_index: detection.index,
            headers,
            total_rows: rows.len(),
            rows,
        })
    }
}

/// Build a row object. Cells past the end of a ragged row, blank cells, and
/// cells beyond the header width are left out.
fn build_row(headers: &[String], cells: &[Value]) -> Row {
    headers
        .iter()
        .zip(cells.iter())
        .filter(|(_, value)| !is_blank(value))
        .map(|(label, value)| (label.clone(), value.clone()))
        .collect()
}

/// Suffix repeated labels (`Phone`, `Phone_2`) so columns never collide,
/// skipping suffixes another column already uses.
fn dedupe_labels(labels: Vec<String>) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::with_capacity(labels.len());
    labels
        .into_iter()
        .map(|label| {
            let mut candidate = label.clone();
            let mut n = 1;
            while used.contains(&candidate) {
                n += 1;
                candidate = format!("{}_{}", label, n);
            }
            used.insert(candidate.clone());
            candidate
        })
        .collect()
}

fn decode_workbook(bytes: &[u8]) -> Result<Vec<(String, Grid)>, ParseError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| ParseError::Corrupt(e.to_string()))?;

    let mut grids = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| ParseError::Corrupt(format!("sheet '{}': {}", name, e)))?;

        let grid: Grid = range
            .rows()
            .map(|row| row.iter().map(workbook_cell).collect())
            .collect();
        grids.push((name, grid));
    }

    Ok(grids)
}

/// Convert a calamine cell. Dates are normalized to `YYYY-MM-DD` here.
pub(crate) fn workbook_cell(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Bool(b) => Value::Bool(*b),
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => float_value(*f),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(datetime) if dt.is_datetime() => {
                Value::String(datetime.date().format("%Y-%m-%d").to_string())
            }
            _ => float_value(dt.as_f64()),
        },
        Data::DateTimeIso(s) => match s.get(..10) {
            Some(date) if chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok() => {
                Value::String(date.to_string())
            }
            _ => Value::String(s.clone()),
        },
        Data::DurationIso(s) => Value::String(s.clone()),
    }
}

fn float_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Value::from(f as i64)
    } else {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn decode_csv(bytes: &[u8]) -> Result<Grid, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut grid = Grid::new();
    for (index, record) in reader.byte_records().enumerate() {
        let record = record.map_err(|e| ParseError::Corrupt(e.to_string()))?;
        let cells = record
            .iter()
            .enumerate()
            .map(|(col, raw)| {
                let text = String::from_utf8_lossy(raw);
                let text = if index == 0 && col == 0 {
                    text.trim_start_matches('\u{feff}').to_string()
                } else {
                    text.into_owned()
                };
                if text.is_empty() {
                    Value::Null
                } else {
                    Value::String(text)
                }
            })
            .collect();
        grid.push(cells);
    }

    Ok(grid)
}

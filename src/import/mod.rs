//! Spreadsheet import core.
//!
//! Everything in this module is a pure function of its inputs: bytes in,
//! sheets and staging records out. Nothing here touches storage, the network
//! or a clock, which keeps the pipeline testable in isolation from the
//! upload session that drives it.
//!
//! ```text
//! ingest (bytes) ──► header detection ──► ParsedSheet ──► mapper ──► stager ──► StagingRecord
//! ```

pub mod header;
pub mod ingest;
pub mod mapper;
pub mod schema;
pub mod stager;

use serde_json::Value;

/// One data row: source column label to raw cell value, in column order.
pub type Row = serde_json::Map<String, Value>;

/// Raw decoded cells of one sheet, before header detection.
pub type Grid = Vec<Vec<Value>>;

pub use header::{HEADER_KEYWORDS, HeaderDetection, HeaderDetector};
pub use ingest::{FileIngestor, ParseError, ParsedSheet, SpreadsheetFormat};
pub use mapper::{Coercion, FieldBinding, MappedRow, MatchKind, map_row};
pub use schema::{CanonicalSchema, FieldSpec, ImportSource};
pub use stager::{StagingRecord, StagingStatus, ValidationErrors, stage_rows};

/// Returns true when a cell carries no usable content.
pub(crate) fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Render a cell as display text (used for header labels and keyword scoring).
pub(crate) fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

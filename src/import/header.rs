//! HeaderDetector: locate the real header row in a human-produced sheet.
//!
//! Exported spreadsheets often start with titles, report dates or blank
//! lines. Each of the first `scan_rows` rows is scored by how many of its
//! cells contain a known header keyword; the best-scoring row wins and the
//! earliest row wins ties.

use super::{Grid, cell_text};

/// Default number of leading rows considered as header candidates.
pub const DEFAULT_SCAN_ROWS: usize = 15;

/// Keyword fragments shared by every import schema.
///
/// Matched as substrings of a cell's lowercase, letters-only text.
pub const HEADER_KEYWORDS: &[&str] = &[
    "name",
    "first",
    "last",
    "email",
    "phone",
    "mobile",
    "cell",
    "contact",
    "license",
    "dob",
    "birth",
    "address",
    "street",
    "city",
    "state",
    "zip",
    "postal",
    "pickup",
    "dropoff",
    "destination",
    "origin",
    "date",
    "time",
    "appointment",
    "driver",
    "patient",
    "employee",
    "staff",
    "vehicle",
    "status",
    "medicaid",
    "insurance",
    "member",
    "mobility",
    "wheelchair",
    "gender",
    "emergency",
    "position",
    "title",
    "department",
    "hire",
    "rate",
    "trip",
    "miles",
    "mileage",
    "fare",
    "notes",
];

/// Result of header detection on one grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderDetection {
    /// Zero-based row index of the header within the grid.
    pub index: usize,
    /// Trimmed header text, or `Column_{n}` (1-based) for blank cells.
    pub labels: Vec<String>,
    /// Keyword match count of the selected row.
    pub score: usize,
}

/// Scores candidate rows against a keyword vocabulary.
#[derive(Debug, Clone)]
pub struct HeaderDetector {
    scan_rows: usize,
}

impl Default for HeaderDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SCAN_ROWS)
    }
}

impl HeaderDetector {
    pub fn new(scan_rows: usize) -> Self {
        Self {
            scan_rows: scan_rows.max(1),
        }
    }

    /// Pick the header row. Returns `None` only for an empty grid.
    pub fn detect(&self, grid: &Grid) -> Option<HeaderDetection> {
        let mut best: Option<(usize, usize)> = None;

        // Blank rows are still candidates; they just score zero.
        for (index, row) in grid.iter().take(self.scan_rows).enumerate() {
            let score = row
                .iter()
                .filter(|cell| self.matches_keyword(&cell_text(cell)))
                .count();

            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((index, score)),
            }
        }

        let (index, score) = best?;
        let labels = grid[index]
            .iter()
            .enumerate()
            .map(|(col, cell)| {
                let text = cell_text(cell);
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    format!("Column_{}", col + 1)
                } else {
                    trimmed.to_string()
                }
            })
            .collect();

        Some(HeaderDetection {
            index,
            labels,
            score,
        })
    }

    fn matches_keyword(&self, text: &str) -> bool {
        let normalized = letters_only(text);
        !normalized.is_empty() && HEADER_KEYWORDS.iter().any(|kw| normalized.contains(kw))
    }
}

/// Lowercase and keep ASCII letters only ("Pick-up Address:" -> "pickupaddress").
pub fn letters_only(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_lowercase())
        .collect()
}

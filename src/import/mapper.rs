//! ColumnMapper: bind arbitrary source columns onto a canonical schema.
//!
//! Source keys and aliases are compared after normalization (lowercase,
//! alphanumerics only). For each canonical field:
//!
//! 1. The earliest alias that equals a source key wins outright.
//! 2. Otherwise the alias/key pair with a substring relation (either
//!    direction) and the **longest** alias wins; equal lengths keep the
//!    earliest alias, and for one alias the earliest source column.
//!
//! Substring matching ignores strings shorter than [`MIN_PARTIAL_LEN`] so
//! headers like "To" or "E" only ever match exactly.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use super::Row;
use super::schema::{CanonicalSchema, FieldSpec};

/// Minimum normalized length for substring (partial) matches.
pub const MIN_PARTIAL_LEN: usize = 3;

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%m-%d-%Y", "%d-%b-%Y", "%m/%d/%y",
];

/// How a field was bound to its source column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Partial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct FieldBinding {
    pub field: String,
    pub source_column: String,
    pub match_kind: MatchKind,
}

/// A value rewritten during extraction (currently: dates to ISO).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Coercion {
    pub field: String,
    pub original: String,
    pub coerced: String,
}

/// Output of mapping one row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedRow {
    /// Identity-bearing fields, written to the top level of the staged record.
    pub core: Row,
    /// Recognized non-core fields.
    pub metadata: Row,
    pub bindings: Vec<FieldBinding>,
    pub coercions: Vec<Coercion>,
}

impl MappedRow {
    pub fn is_resolved(&self, field: &str) -> bool {
        self.core.contains_key(field) || self.metadata.contains_key(field)
    }
}

/// Lowercase and strip everything that is not alphanumeric.
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Map one row onto `schema`. Unbound source columns are left to the raw snapshot.
pub fn map_row(schema: &CanonicalSchema, row: &Row) -> MappedRow {
    let index: Vec<(String, &String)> = row
        .keys()
        .map(|key| (normalize_key(key), key))
        .filter(|(normalized, _)| !normalized.is_empty())
        .collect();

    let mut mapped = MappedRow::default();

    for field in schema.fields {
        let Some((source_column, match_kind)) = resolve_column(field, &index) else {
            continue;
        };
        let Some(raw) = row.get(source_column) else {
            continue;
        };
        let Some(value) = extract_value(schema, field.name, raw, &mut mapped.coercions) else {
            continue;
        };

        if field.core {
            mapped.core.insert(field.name.to_string(), value);
        } else {
            mapped.metadata.insert(field.name.to_string(), value);
        }
        mapped.bindings.push(FieldBinding {
            field: field.name.to_string(),
            source_column: source_column.clone(),
            match_kind,
        });
    }

    mapped
}

fn resolve_column<'a>(
    field: &FieldSpec,
    index: &[(String, &'a String)],
) -> Option<(&'a String, MatchKind)> {
    let mut best_partial: Option<(usize, &'a String)> = None;

    for alias in field.aliases {
        let alias = normalize_key(alias);
        if alias.is_empty() {
            continue;
        }

        if let Some((_, original)) = index.iter().find(|(key, _)| *key == alias) {
            return Some((original, MatchKind::Exact));
        }

        if alias.len() < MIN_PARTIAL_LEN {
            continue;
        }

        let candidate = index.iter().find(|(key, _)| {
            key.len() >= MIN_PARTIAL_LEN && (key.contains(&alias) || alias.contains(key.as_str()))
        });

        if let Some((_, original)) = candidate {
            let longer = best_partial.is_none_or(|(len, _)| alias.len() > len);
            if longer {
                best_partial = Some((alias.len(), original));
            }
        }
    }

    best_partial.map(|(_, original)| (original, MatchKind::Partial))
}

/// Trim text, drop blanks, and coerce date-like text on date fields.
fn extract_value(
    schema: &CanonicalSchema,
    field: &str,
    raw: &Value,
    coercions: &mut Vec<Coercion>,
) -> Option<Value> {
    match raw {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }

            if schema.is_date_field(field) && (trimmed.contains('/') || trimmed.contains('-')) {
                if let Some(date) = parse_date(trimmed) {
                    let iso = date.format("%Y-%m-%d").to_string();
                    if iso != trimmed {
                        coercions.push(Coercion {
                            field: field.to_string(),
                            original: trimmed.to_string(),
                            coerced: iso.clone(),
                        });
                    }
                    return Some(Value::String(iso));
                }
            }

            Some(Value::String(trimmed.to_string()))
        }
        other => Some(other.clone()),
    }
}

/// Parse the date formats commonly found in exported sheets.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let parsed = DATE_FORMATS
        .iter()
        .filter_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        // "%Y" happily reads "60" as year 60; leave two-digit years to "%y".
        .find(|date| date.year() >= 1000);

    parsed.or_else(|| {
        text.get(..10)
            .filter(|_| text.len() > 10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
    })
}

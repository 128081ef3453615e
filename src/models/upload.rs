//! Upload audit records and object-store listings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::import::ImportSource;

/// Lifecycle status of an upload.
///
/// Stored statuses only move forward. `Unlinked` is never stored: it is
/// derived for blobs that have no metadata row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Processing,
    ReadyForReview,
    Committed,
    Error,
    Unlinked,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::ReadyForReview => "ready_for_review",
            Self::Committed => "committed",
            Self::Error => "error",
            Self::Unlinked => "unlinked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(Self::Processing),
            "ready_for_review" => Some(Self::ReadyForReview),
            "committed" => Some(Self::Committed),
            "error" => Some(Self::Error),
            "unlinked" => Some(Self::Unlinked),
            _ => None,
        }
    }

    /// Whether the status may be written to the metadata store.
    pub fn is_stored(&self) -> bool {
        !matches!(self, Self::Unlinked)
    }

    /// Forward-only transition check for stored statuses.
    pub fn can_advance_to(&self, next: UploadStatus) -> bool {
        matches!(
            (self, next),
            (Self::Processing, Self::ReadyForReview)
                | (Self::Processing, Self::Error)
                | (Self::ReadyForReview, Self::Committed)
                | (Self::ReadyForReview, Self::Error)
        )
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted audit entity for one uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UploadRecord {
    pub id: Uuid,
    pub org_id: String,
    /// Absent only on synthesized `unlinked` records.
    pub source: Option<ImportSource>,
    pub file_path: String,
    pub original_filename: String,
    pub file_size: i64,
    pub mime_type: Option<String>,
    pub status: UploadStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub uploaded_by: Option<String>,
    pub committed_by: Option<String>,
}

/// Values for a new upload row (always created as `processing`).
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub id: Uuid,
    pub org_id: String,
    pub source: ImportSource,
    pub file_path: String,
    pub original_filename: String,
    pub file_size: i64,
    pub mime_type: Option<String>,
    pub uploaded_by: Option<String>,
}

/// One object from an object-store listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BlobEntry {
    /// Name relative to the listed prefix.
    pub name: String,
    /// Full object key.
    pub path: String,
    pub size: i64,
    pub created_at: Option<DateTime<Utc>>,
}

/// Last segment of an object key.
pub fn blob_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Object-store prefix holding a tenant's uploads.
pub fn uploads_prefix(org_id: &str) -> String {
    format!("{}/uploads/", org_id)
}

/// Object key for a new upload: `{org_id}/uploads/{unix_ms}_{sanitized_filename}`.
pub fn upload_path(org_id: &str, timestamp_ms: i64, filename: &str) -> String {
    format!(
        "{}{}_{}",
        uploads_prefix(org_id),
        timestamp_ms,
        sanitize_filename(filename)
    )
}

/// Keep ASCII letters, digits, `.`, `-` and `_`; everything else becomes `_`.
pub fn sanitize_filename(filename: &str) -> String {
    let base = blob_name(filename.trim());
    let sanitized: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "upload".to_string()
    } else {
        sanitized
    }
}

/// Split a blob name into its upload timestamp and original filename.
pub fn split_blob_name(name: &str) -> (Option<DateTime<Utc>>, &str) {
    match name.split_once('_') {
        Some((ts, rest)) if !rest.is_empty() && ts.chars().all(|c| c.is_ascii_digit()) => {
            let created = ts
                .parse::<i64>()
                .ok()
                .and_then(DateTime::<Utc>::from_timestamp_millis);
            (created, rest)
        }
        _ => (None, name),
    }
}

//! RecordStager: turn mapped rows into staging records for human review.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::Row;
use super::mapper::map_row;
use super::schema::ImportSource;

/// Review status of a staged row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StagingStatus {
    Pending,
    Error,
}

impl StagingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ValidationErrors {
    /// Canonical fields that could not be resolved.
    pub missing: Vec<String>,
}

/// One imported row awaiting review. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StagingRecord {
    pub upload_id: Uuid,
    pub org_id: String,
    pub record_type: String,
    pub row_index: u32,
    /// The source row exactly as ingested.
    #[schema(value_type = Object)]
    pub raw_data: Row,
    /// Core canonical fields.
    #[schema(value_type = Object)]
    pub mapped: Row,
    /// Recognized non-core fields.
    #[schema(value_type = Object)]
    pub metadata: Row,
    pub status: StagingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<ValidationErrors>,
}

impl StagingRecord {
    pub fn is_valid(&self) -> bool {
        self.status == StagingStatus::Pending
    }
}

/// Build staging records for every row, in order, starting at `row_index` 0.
///
/// Only the identity field is validated; any other canonical field may be
/// absent.
pub fn stage_rows(
    source: ImportSource,
    upload_id: Uuid,
    org_id: &str,
    rows: &[Row],
) -> Vec<StagingRecord> {
    let schema = source.schema();

    rows.iter()
        .enumerate()
        .map(|(index, row)| {
            let mapped = map_row(schema, row);
            let (status, validation_errors) = if mapped.is_resolved(schema.identity_field) {
                (StagingStatus::Pending, None)
            } else {
                (
                    StagingStatus::Error,
                    Some(ValidationErrors {
                        missing: vec![schema.identity_field.to_string()],
                    }),
                )
            };

            StagingRecord {
                upload_id,
                org_id: org_id.to_string(),
                record_type: source.record_type().to_string(),
                row_index: index as u32,
                raw_data: row.clone(),
                mapped: mapped.core,
                metadata: mapped.metadata,
                status,
                validation_errors,
            }
        })
        .collect()
}

//! Bulk persistence of staging records.

use chrono::Utc;
use sea_orm::{DatabaseConnection, EntityTrait, Set, TransactionTrait};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::entity::staging_record::{ActiveModel, Entity as StagingRecordEntity};
use crate::error::{AppError, AppResult};
use crate::import::StagingRecord;

/// Rows per INSERT statement; keeps bind parameters far below the PostgreSQL limit.
const INSERT_CHUNK: usize = 500;

fn to_active_model(record: &StagingRecord) -> AppResult<ActiveModel> {
    let validation_errors = record
        .validation_errors
        .as_ref()
        .map(serde_json::to_value)
        .transpose()?;

    Ok(ActiveModel {
        id: Set(Uuid::now_v7()),
        upload_id: Set(record.upload_id),
        org_id: Set(record.org_id.clone()),
        record_type: Set(record.record_type.clone()),
        row_index: Set(i32::try_from(record.row_index).map_err(|_| {
            AppError::InvalidInput(format!("row index {} out of range", record.row_index))
        })?),
        raw_data: Set(JsonValue::Object(record.raw_data.clone())),
        mapped: Set(JsonValue::Object(record.mapped.clone())),
        metadata: Set(JsonValue::Object(record.metadata.clone())),
        status: Set(record.status.as_str().to_string()),
        validation_errors: Set(validation_errors),
        created_at: Set(Utc::now()),
    })
}

/// Insert every record inside one transaction.
pub async fn insert_all(conn: &DatabaseConnection, records: &[StagingRecord]) -> AppResult<u64> {
    if records.is_empty() {
        return Ok(0);
    }

    let txn = conn
        .begin()
        .await
        .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

    let mut inserted = 0u64;
    for chunk in records.chunks(INSERT_CHUNK) {
        let models = chunk
            .iter()
            .map(to_active_model)
            .collect::<AppResult<Vec<_>>>()?;

        StagingRecordEntity::insert_many(models)
            .exec_without_returning(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert staging records: {}", e)))?;

        inserted += chunk.len() as u64;
    }

    txn.commit()
        .await
        .map_err(|e| AppError::Database(format!("Failed to commit staging records: {}", e)))?;

    Ok(inserted)
}

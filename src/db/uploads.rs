//! Database queries for uploads.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::entity::staging_record::{self, Entity as StagingRecordEntity};
use crate::entity::upload::{self, ActiveModel, Entity as Upload};
use crate::error::{AppError, AppResult};
use crate::import::{ImportSource, StagingRecord};
use crate::models::{NewUpload, UploadRecord, UploadStatus};

use super::{DbPool, UploadRepository};

const PATH_LOOKUP_CHUNK: usize = 1000;

/// Convert a stored row into the API model.
fn model_to_record(model: upload::Model) -> AppResult<UploadRecord> {
    let status = UploadStatus::parse(&model.status)
        .filter(UploadStatus::is_stored)
        .ok_or_else(|| {
            AppError::Database(format!(
                "Upload {} has unknown status '{}'",
                model.id, model.status
            ))
        })?;

    Ok(UploadRecord {
        id: model.id,
        org_id: model.org_id,
        source: ImportSource::parse(&model.source),
        file_path: model.file_path,
        original_filename: model.original_filename,
        file_size: model.file_size,
        mime_type: model.mime_type,
        status,
        created_at: model.created_at,
        processed_at: model.processed_at,
        notes: model.notes,
        uploaded_by: model.uploaded_by,
        committed_by: model.committed_by,
    })
}

#[async_trait]
impl UploadRepository for DbPool {
    async fn ping(&self) -> AppResult<()> {
        self.connection()
            .ping()
            .await
            .map_err(|e| AppError::Database(format!("Database ping failed: {}", e)))
    }

    async fn insert_upload(&self, new: NewUpload) -> AppResult<UploadRecord> {
        let now = Utc::now();

        let model = ActiveModel {
            id: Set(new.id),
            org_id: Set(new.org_id),
            source: Set(new.source.as_str().to_string()),
            file_path: Set(new.file_path),
            original_filename: Set(new.original_filename),
            file_size: Set(new.file_size),
            mime_type: Set(new.mime_type),
            status: Set(UploadStatus::Processing.as_str().to_string()),
            notes: Set(None),
            uploaded_by: Set(new.uploaded_by),
            committed_by: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            processed_at: Set(None),
        };

        let inserted = model
            .insert(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert upload: {}", e)))?;

        model_to_record(inserted)
    }

    async fn get_upload(&self, org_id: &str, id: Uuid) -> AppResult<Option<UploadRecord>> {
        Upload::find_by_id(id)
            .filter(upload::Column::OrgId.eq(org_id))
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get upload: {}", e)))?
            .map(model_to_record)
            .transpose()
    }

    async fn linked_paths(&self, org_id: &str, file_paths: &[String]) -> AppResult<Vec<String>> {
        let mut linked = Vec::new();
        for chunk in file_paths.chunks(PATH_LOOKUP_CHUNK) {
            let found: Vec<String> = Upload::find()
                .select_only()
                .column(upload::Column::FilePath)
                .filter(upload::Column::OrgId.eq(org_id))
                .filter(upload::Column::FilePath.is_in(chunk.iter().cloned()))
                .into_tuple()
                .all(self.connection())
                .await
                .map_err(|e| AppError::Database(format!("Failed to look up upload paths: {}", e)))?;
            linked.extend(found);
        }
        Ok(linked)
    }

    async fn update_upload_status(
        &self,
        id: Uuid,
        status: UploadStatus,
        notes: Option<String>,
    ) -> AppResult<UploadRecord> {
        let existing = Upload::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get upload: {}", e)))?
            .ok_or_else(|| AppError::NotFound(format!("Upload {}", id)))?;

        let current = model_to_record(existing.clone())?.status;
        if !current.can_advance_to(status) {
            return Err(AppError::InvalidState(format!(
                "upload {} cannot move from {} to {}",
                id, current, status
            )));
        }

        let mut active: ActiveModel = existing.into();
        active.status = Set(status.as_str().to_string());
        active.updated_at = Set(Utc::now());
        if status == UploadStatus::ReadyForReview {
            active.processed_at = Set(Some(Utc::now()));
        }
        if notes.is_some() {
            active.notes = Set(notes);
        }

        let updated = active
            .update(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to update upload status: {}", e)))?;

        model_to_record(updated)
    }

    async fn list_recent_uploads(&self, org_id: &str, limit: u64) -> AppResult<Vec<UploadRecord>> {
        Upload::find()
            .filter(upload::Column::OrgId.eq(org_id))
            .order_by_desc(upload::Column::CreatedAt)
            .limit(limit)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list uploads: {}", e)))?
            .into_iter()
            .map(model_to_record)
            .collect()
    }

    async fn list_stuck_uploads(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<UploadRecord>> {
        Upload::find()
            .filter(upload::Column::Status.eq(UploadStatus::Processing.as_str()))
            .filter(upload::Column::CreatedAt.lt(cutoff))
            .order_by_asc(upload::Column::CreatedAt)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list stuck uploads: {}", e)))?
            .into_iter()
            .map(model_to_record)
            .collect()
    }

    async fn delete_upload(&self, id: Uuid) -> AppResult<bool> {
        let txn = self
            .connection()
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        StagingRecordEntity::delete_many()
            .filter(staging_record::Column::UploadId.eq(id))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete staging records: {}", e)))?;

        let result = Upload::delete_by_id(id)
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete upload: {}", e)))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit delete: {}", e)))?;

        Ok(result.rows_affected > 0)
    }

    async fn insert_staging_records(&self, records: &[StagingRecord]) -> AppResult<u64> {
        super::staging_records::insert_all(self.connection(), records).await
    }

    async fn delete_staging_records(&self, upload_id: Uuid) -> AppResult<u64> {
        let result = StagingRecordEntity::delete_many()
            .filter(staging_record::Column::UploadId.eq(upload_id))
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete staging records: {}", e)))?;

        Ok(result.rows_affected)
    }

    async fn count_staging_records(&self, upload_id: Uuid) -> AppResult<u64> {
        count_for_upload(self.connection(), upload_id).await
    }
}

async fn count_for_upload<C: ConnectionTrait>(conn: &C, upload_id: Uuid) -> AppResult<u64> {
    StagingRecordEntity::find()
        .filter(staging_record::Column::UploadId.eq(upload_id))
        .count(conn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to count staging records: {}", e)))
}

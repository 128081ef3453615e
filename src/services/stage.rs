//! Stage workflow: persist a confirmed sheet for human review.
//!
//! Phases run in order: blob upload, upload record insert, bulk staging
//! insert, status update to `ready_for_review`. Staging records are built
//! before any side effect. Every artifact created is recorded, and a failure
//! compensates in reverse order (staging rows, upload row, blob).

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::UploadRepository;
use crate::error::AppError;
use crate::import::{ImportSource, ParsedSheet, StagingStatus, stage_rows};
use crate::models::{NewUpload, UploadRecord, UploadStatus, upload_path};

use super::history::HistoryCache;
use super::storage::ObjectStore;

/// Keys tried before giving up on a crowded millisecond.
const BLOB_KEY_ATTEMPTS: usize = 8;

/// Step of a multi-store write that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    UploadBlob,
    InsertUpload,
    InsertStaging,
    UpdateStatus,
    DeleteBlob,
    DeleteRecord,
    VerifyDelete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::UploadBlob => "file upload",
            Self::InsertUpload => "upload record insert",
            Self::InsertStaging => "staging insert",
            Self::UpdateStatus => "status update",
            Self::DeleteBlob => "file delete",
            Self::DeleteRecord => "upload record delete",
            Self::VerifyDelete => "delete verification",
        };
        f.write_str(label)
    }
}

/// What compensation achieved after a failed phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Rollback {
    /// Nothing was left behind.
    Complete,
    /// Artifacts that could not be removed.
    Incomplete { leftovers: Vec<String> },
    /// The operation has no compensation (deletes).
    NotApplicable,
}

impl fmt::Display for Rollback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => f.write_str("all changes were rolled back"),
            Self::Incomplete { leftovers } => {
                write!(f, "rollback incomplete, left behind: {}", leftovers.join(", "))
            }
            Self::NotApplicable => Ok(()),
        }
    }
}

/// Failure of one persistence phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceError {
    pub phase: Phase,
    pub message: String,
    pub rollback: Rollback,
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.phase, self.message)?;
        if self.rollback != Rollback::NotApplicable {
            write!(f, " ({})", self.rollback)?;
        }
        Ok(())
    }
}

impl std::error::Error for PersistenceError {}

impl PersistenceError {
    pub fn new(phase: Phase, message: impl fmt::Display) -> Self {
        Self {
            phase,
            message: message.to_string(),
            rollback: Rollback::NotApplicable,
        }
    }
}

/// Everything needed to stage one sheet.
#[derive(Debug)]
pub struct StageRequest<'a> {
    pub org_id: &'a str,
    pub uploaded_by: Option<&'a str>,
    pub source: ImportSource,
    pub filename: &'a str,
    pub mime_type: Option<&'a str>,
    pub bytes: Vec<u8>,
    pub sheet: &'a ParsedSheet,
}

/// Hand-off produced by a successful stage.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StageOutcome {
    pub upload_id: Uuid,
    pub file_path: String,
    pub staged_rows: usize,
    pub error_rows: usize,
}

/// Artifacts created so far by one run.
#[derive(Debug)]
struct Saga<'a> {
    org_id: &'a str,
    blob: Option<String>,
    upload: Option<Uuid>,
}

/// Runs the stage phases against the object store and repository.
#[derive(Clone)]
pub struct StageWorkflow {
    store: Arc<dyn ObjectStore>,
    repo: Arc<dyn UploadRepository>,
    cache: HistoryCache,
}

impl StageWorkflow {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        repo: Arc<dyn UploadRepository>,
        cache: HistoryCache,
    ) -> Self {
        Self { store, repo, cache }
    }

    pub async fn run(&self, request: StageRequest<'_>) -> Result<StageOutcome, PersistenceError> {
        let upload_id = Uuid::now_v7();

        let records = stage_rows(
            request.source,
            upload_id,
            request.org_id,
            &request.sheet.rows,
        );
        let error_rows = records
            .iter()
            .filter(|r| r.status == StagingStatus::Error)
            .count();

        let file_size = request.bytes.len() as i64;
        let mut saga = Saga {
            org_id: request.org_id,
            blob: None,
            upload: None,
        };

        let file_path = match self
            .store_blob(request.org_id, request.filename, &request.bytes, request.mime_type)
            .await
        {
            Ok(path) => path,
            Err(e) => return Err(self.fail(&saga, Phase::UploadBlob, e).await),
        };
        // Only a key this run created is ever compensated.
        saga.blob = Some(file_path.clone());

        let new_upload = NewUpload {
            id: upload_id,
            org_id: request.org_id.to_string(),
            source: request.source,
            file_path: file_path.clone(),
            original_filename: request.filename.to_string(),
            file_size,
            mime_type: request.mime_type.map(str::to_string),
            uploaded_by: request.uploaded_by.map(str::to_string),
        };
        if let Err(e) = self.repo.insert_upload(new_upload).await {
            return Err(self.fail(&saga, Phase::InsertUpload, e).await);
        }
        saga.upload = Some(upload_id);

        if let Err(e) = self.repo.insert_staging_records(&records).await {
            return Err(self.fail(&saga, Phase::InsertStaging, e).await);
        }

        if let Err(e) = self
            .repo
            .update_upload_status(upload_id, UploadStatus::ReadyForReview, None)
            .await
        {
            return Err(self.fail(&saga, Phase::UpdateStatus, e).await);
        }

        self.cache.invalidate(request.org_id);

        info!(
            org_id = request.org_id,
            upload_id = %upload_id,
            source = %request.source,
            sheet = %request.sheet.name,
            staged_rows = records.len(),
            error_rows,
            "Upload staged for review"
        );

        Ok(StageOutcome {
            upload_id,
            file_path,
            staged_rows: records.len(),
            error_rows,
        })
    }

    /// Store the file under a fresh key, moving to the next millisecond
    /// while the key is taken by another upload.
    async fn store_blob(
        &self,
        org_id: &str,
        filename: &str,
        bytes: &[u8],
        mime_type: Option<&str>,
    ) -> Result<String, AppError> {
        let mut stamp = Utc::now().timestamp_millis();
        let mut last_err = None;

        for _ in 0..BLOB_KEY_ATTEMPTS {
            let path = upload_path(org_id, stamp, filename);
            match self.store.put(&path, bytes.to_vec(), mime_type).await {
                Ok(()) => return Ok(path),
                Err(AppError::ObjectExists(taken)) => {
                    debug!(path = %taken, "Upload key taken, retrying");
                    last_err = Some(AppError::ObjectExists(taken));
                    stamp += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| AppError::Storage("no upload key attempted".to_string())))
    }

    /// Compensate after `phase` failed and build the error.
    async fn fail(&self, saga: &Saga<'_>, phase: Phase, cause: AppError) -> PersistenceError {
        warn!(org_id = saga.org_id, phase = %phase, error = %cause, "Stage phase failed, compensating");

        let leftovers = self
            .compensate(saga, &format!("stage failed during {}: {}", phase, cause))
            .await;
        self.cache.invalidate(saga.org_id);

        let rollback = if leftovers.is_empty() {
            Rollback::Complete
        } else {
            error!(phase = %phase, ?leftovers, "Stage compensation incomplete");
            Rollback::Incomplete { leftovers }
        };

        PersistenceError {
            phase,
            message: cause.to_string(),
            rollback,
        }
    }

    /// Undo recorded artifacts in reverse order. Returns what survived.
    async fn compensate(&self, saga: &Saga<'_>, reason: &str) -> Vec<String> {
        let mut leftovers = Vec::new();

        if let Some(upload_id) = saga.upload {
            if let Err(e) = self.repo.delete_staging_records(upload_id).await {
                warn!(upload_id = %upload_id, error = %e, "Failed to remove staging rows");
                leftovers.push(format!("staging rows of upload {}", upload_id));
            }

            if let Err(e) = self.repo.delete_upload(upload_id).await {
                warn!(upload_id = %upload_id, error = %e, "Failed to remove upload record");
                let marked = self
                    .repo
                    .update_upload_status(upload_id, UploadStatus::Error, Some(reason.to_string()))
                    .await
                    .is_ok();
                leftovers.push(if marked {
                    format!("upload record {} (marked error)", upload_id)
                } else {
                    format!("upload record {}", upload_id)
                });
            }
        }

        if let Some(path) = &saga.blob
            && let Err(e) = self.store.delete(path).await
        {
            warn!(path = %path, error = %e, "Failed to remove uploaded file");
            leftovers.push(format!("file {}", path));
        }

        leftovers
    }

    /// Retire an upload that never left `processing`: remove its staging
    /// rows and file, then mark it `error` with `reason`.
    pub async fn abandon(&self, upload: &UploadRecord, reason: &str) -> Result<(), PersistenceError> {
        self.repo
            .delete_staging_records(upload.id)
            .await
            .map_err(|e| PersistenceError::new(Phase::DeleteRecord, e))?;

        self.store
            .delete(&upload.file_path)
            .await
            .map_err(|e| PersistenceError::new(Phase::DeleteBlob, e))?;

        self.repo
            .update_upload_status(upload.id, UploadStatus::Error, Some(reason.to_string()))
            .await
            .map_err(|e| PersistenceError::new(Phase::UpdateStatus, e))?;

        self.cache.invalidate(&upload.org_id);
        info!(org_id = %upload.org_id, upload_id = %upload.id, "Abandoned upload retired");
        Ok(())
    }
}

//! In-process object store and upload repository.
//!
//! Used by the `memory` storage backend and by tests. Locks are never held
//! across an await point.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::UploadRepository;
use crate::error::{AppError, AppResult};
use crate::import::StagingRecord;
use crate::models::{BlobEntry, NewUpload, UploadRecord, UploadStatus};

use super::storage::ObjectStore;

fn poisoned() -> AppError {
    AppError::Storage("in-memory store lock poisoned".to_string())
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    created_at: DateTime<Utc>,
}

/// Object store backed by an ordered map of key to bytes.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object with an explicit creation time.
    pub fn insert_at(&self, path: &str, data: Vec<u8>, created_at: DateTime<Utc>) -> AppResult<()> {
        self.objects
            .lock()
            .map_err(|_| poisoned())?
            .insert(path.to_string(), StoredObject { data, created_at });
        Ok(())
    }

    pub fn get(&self, path: &str) -> AppResult<Option<Vec<u8>>> {
        Ok(self
            .objects
            .lock()
            .map_err(|_| poisoned())?
            .get(path)
            .map(|o| o.data.clone()))
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn put(&self, path: &str, data: Vec<u8>, _content_type: Option<&str>) -> AppResult<()> {
        let mut objects = self.objects.lock().map_err(|_| poisoned())?;
        if objects.contains_key(path) {
            return Err(AppError::ObjectExists(path.to_string()));
        }
        objects.insert(
            path.to_string(),
            StoredObject {
                data,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn list(&self, prefix: &str) -> AppResult<Vec<BlobEntry>> {
        let objects = self.objects.lock().map_err(|_| poisoned())?;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| key.len() > prefix.len())
            .map(|(key, object)| BlobEntry {
                name: key[prefix.len()..].to_string(),
                path: key.clone(),
                size: object.data.len() as i64,
                created_at: Some(object.created_at),
            })
            .collect())
    }

    async fn delete(&self, path: &str) -> AppResult<()> {
        self.objects.lock().map_err(|_| poisoned())?.remove(path);
        Ok(())
    }

    async fn exists(&self, path: &str) -> AppResult<bool> {
        Ok(self
            .objects
            .lock()
            .map_err(|_| poisoned())?
            .contains_key(path))
    }
}

#[derive(Debug, Default)]
struct RepositoryState {
    uploads: Vec<UploadRecord>,
    staging: Vec<StagingRecord>,
}

/// Upload repository with the same constraints as the SQL schema:
/// unique file paths, unique `(upload_id, row_index)`, staging rows must
/// reference an existing upload, and stored statuses only move forward.
#[derive(Debug, Default)]
pub struct MemoryUploadRepository {
    state: Mutex<RepositoryState>,
}

impl MemoryUploadRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, RepositoryState>> {
        self.state
            .lock()
            .map_err(|_| AppError::Database("in-memory repository lock poisoned".to_string()))
    }

    /// Staging rows of one upload in row order.
    pub fn staging_records(&self, upload_id: Uuid) -> AppResult<Vec<StagingRecord>> {
        let state = self.lock()?;
        let mut records: Vec<StagingRecord> = state
            .staging
            .iter()
            .filter(|r| r.upload_id == upload_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.row_index);
        Ok(records)
    }

    /// Override the creation time of an upload.
    pub fn backdate_upload(&self, id: Uuid, created_at: DateTime<Utc>) -> AppResult<()> {
        let mut state = self.lock()?;
        let upload = state
            .uploads
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Upload {}", id)))?;
        upload.created_at = created_at;
        Ok(())
    }
}

#[async_trait]
impl UploadRepository for MemoryUploadRepository {
    async fn ping(&self) -> AppResult<()> {
        self.lock().map(|_| ())
    }

    async fn insert_upload(&self, new: NewUpload) -> AppResult<UploadRecord> {
        let mut state = self.lock()?;
        if state
            .uploads
            .iter()
            .any(|u| u.id == new.id || u.file_path == new.file_path)
        {
            return Err(AppError::Database(format!(
                "duplicate upload {} at {}",
                new.id, new.file_path
            )));
        }

        let record = UploadRecord {
            id: new.id,
            org_id: new.org_id,
            source: Some(new.source),
            file_path: new.file_path,
            original_filename: new.original_filename,
            file_size: new.file_size,
            mime_type: new.mime_type,
            status: UploadStatus::Processing,
            created_at: Utc::now(),
            processed_at: None,
            notes: None,
            uploaded_by: new.uploaded_by,
            committed_by: None,
        };
        state.uploads.push(record.clone());
        Ok(record)
    }

    async fn get_upload(&self, org_id: &str, id: Uuid) -> AppResult<Option<UploadRecord>> {
        Ok(self
            .lock()?
            .uploads
            .iter()
            .find(|u| u.id == id && u.org_id == org_id)
            .cloned())
    }

    async fn linked_paths(&self, org_id: &str, file_paths: &[String]) -> AppResult<Vec<String>> {
        let state = self.lock()?;
        Ok(file_paths
            .iter()
            .filter(|path| {
                state
                    .uploads
                    .iter()
                    .any(|u| u.org_id == org_id && &u.file_path == *path)
            })
            .cloned()
            .collect())
    }

    async fn update_upload_status(
        &self,
        id: Uuid,
        status: UploadStatus,
        notes: Option<String>,
    ) -> AppResult<UploadRecord> {
        let mut state = self.lock()?;
        let upload = state
            .uploads
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Upload {}", id)))?;

        if !upload.status.can_advance_to(status) {
            return Err(AppError::InvalidState(format!(
                "upload {} cannot move from {} to {}",
                id, upload.status, status
            )));
        }

        upload.status = status;
        if status == UploadStatus::ReadyForReview {
            upload.processed_at = Some(Utc::now());
        }
        if notes.is_some() {
            upload.notes = notes;
        }
        Ok(upload.clone())
    }

    async fn list_recent_uploads(&self, org_id: &str, limit: u64) -> AppResult<Vec<UploadRecord>> {
        let state = self.lock()?;
        let mut uploads: Vec<UploadRecord> = state
            .uploads
            .iter()
            .filter(|u| u.org_id == org_id)
            .cloned()
            .collect();
        uploads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        uploads.truncate(limit as usize);
        Ok(uploads)
    }

    async fn list_stuck_uploads(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<UploadRecord>> {
        Ok(self
            .lock()?
            .uploads
            .iter()
            .filter(|u| u.status == UploadStatus::Processing && u.created_at < cutoff)
            .cloned()
            .collect())
    }

    async fn delete_upload(&self, id: Uuid) -> AppResult<bool> {
        let mut state = self.lock()?;
        let before = state.uploads.len();
        state.uploads.retain(|u| u.id != id);
        state.staging.retain(|r| r.upload_id != id);
        Ok(state.uploads.len() < before)
    }

    async fn insert_staging_records(&self, records: &[StagingRecord]) -> AppResult<u64> {
        let mut state = self.lock()?;

        for (i, record) in records.iter().enumerate() {
            if !state.uploads.iter().any(|u| u.id == record.upload_id) {
                return Err(AppError::Database(format!(
                    "staging record references missing upload {}",
                    record.upload_id
                )));
            }
            let clashes = state
                .staging
                .iter()
                .chain(records[..i].iter())
                .any(|r| r.upload_id == record.upload_id && r.row_index == record.row_index);
            if clashes {
                return Err(AppError::Database(format!(
                    "duplicate staging row {} for upload {}",
                    record.row_index, record.upload_id
                )));
            }
        }

        state.staging.extend_from_slice(records);
        Ok(records.len() as u64)
    }

    async fn delete_staging_records(&self, upload_id: Uuid) -> AppResult<u64> {
        let mut state = self.lock()?;
        let before = state.staging.len();
        state.staging.retain(|r| r.upload_id != upload_id);
        Ok((before - state.staging.len()) as u64)
    }

    async fn count_staging_records(&self, upload_id: Uuid) -> AppResult<u64> {
        Ok(self
            .lock()?
            .staging
            .iter()
            .filter(|r| r.upload_id == upload_id)
            .count() as u64)
    }
}

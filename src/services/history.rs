//! Upload history: metadata rows reconciled against the object store.
//!
//! Two independent sources of truth are merged into [`HistoryEntry`]
//! values. A row in `uploads` becomes `persisted` (with a flag telling
//! whether its file still exists); a file under the tenant prefix that no
//! row references becomes `storage_only`, carrying a synthesized
//! `unlinked` record so operators can find and remove it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::UploadRepository;
use crate::error::{AppError, AppResult};
use crate::import::SpreadsheetFormat;
use crate::models::{
    BlobEntry, Pagination, PaginationParams, UploadRecord, UploadStatus, split_blob_name,
    uploads_prefix,
};

use super::stage::{Phase, PersistenceError};
use super::storage::ObjectStore;

const UNLINKED_NOTE: &str =
    "File exists in storage but has no upload record. Delete it or import it again.";

/// One row of the merged history.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEntry {
    Persisted {
        record: UploadRecord,
        exists_in_storage: bool,
    },
    StorageOnly {
        blob: BlobEntry,
        /// Synthesized record with status `unlinked`.
        record: UploadRecord,
    },
}

impl HistoryEntry {
    pub fn record(&self) -> &UploadRecord {
        match self {
            Self::Persisted { record, .. } | Self::StorageOnly { record, .. } => record,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.record().created_at
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HistoryPage {
    pub entries: Vec<HistoryEntry>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeleteOutcome {
    pub upload_id: Uuid,
    pub file_path: String,
    pub staging_rows_deleted: u64,
}

/// Deterministic id for a storage-only file.
pub fn unlinked_id(path: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, path.as_bytes())
}

/// Build the `unlinked` record shown for a file nobody references.
pub fn synthesize_unlinked(org_id: &str, blob: &BlobEntry) -> UploadRecord {
    let (stamped_at, original) = split_blob_name(&blob.name);
    let mime_type = SpreadsheetFormat::from_filename(original)
        .ok()
        .map(|format| format.mime_type(original).to_string());

    UploadRecord {
        id: unlinked_id(&blob.path),
        org_id: org_id.to_string(),
        source: None,
        file_path: blob.path.clone(),
        original_filename: original.to_string(),
        file_size: blob.size,
        mime_type,
        status: UploadStatus::Unlinked,
        created_at: blob
            .created_at
            .or(stamped_at)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        processed_at: None,
        notes: Some(UNLINKED_NOTE.to_string()),
        uploaded_by: None,
        committed_by: None,
    }
}

/// Merge metadata rows with a blob listing, newest first.
///
/// `linked_elsewhere` holds blob paths referenced by rows outside the
/// fetched window; those files are neither persisted entries nor orphans.
pub fn reconcile(
    org_id: &str,
    records: Vec<UploadRecord>,
    blobs: Vec<BlobEntry>,
    linked_elsewhere: &HashSet<String>,
) -> Vec<HistoryEntry> {
    let blob_paths: HashSet<&str> = blobs.iter().map(|b| b.path.as_str()).collect();
    let record_paths: HashSet<&str> = records.iter().map(|r| r.file_path.as_str()).collect();

    let orphans: Vec<HistoryEntry> = blobs
        .iter()
        .filter(|b| !record_paths.contains(b.path.as_str()) && !linked_elsewhere.contains(&b.path))
        .map(|blob| HistoryEntry::StorageOnly {
            record: synthesize_unlinked(org_id, blob),
            blob: blob.clone(),
        })
        .collect();

    let mut entries: Vec<HistoryEntry> = records
        .into_iter()
        .map(|record| HistoryEntry::Persisted {
            exists_in_storage: blob_paths.contains(record.file_path.as_str()),
            record,
        })
        .chain(orphans)
        .collect();

    entries.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| a.record().file_path.cmp(&b.record().file_path))
    });
    entries
}

#[derive(Debug)]
struct CachedHistory {
    stored_at: Instant,
    entries: Arc<Vec<HistoryEntry>>,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CachedHistory>,
    /// Bumped on every invalidation of a tenant.
    generations: HashMap<String, u64>,
}

/// Per-tenant reconciliation cache with a short staleness window.
///
/// A refresh reads [`generation`](Self::generation) before touching the
/// stores and hands it back to [`put`](Self::put); a snapshot taken across
/// an invalidation is never cached. Cloning shares the underlying map.
#[derive(Debug, Clone)]
pub struct HistoryCache {
    ttl: Duration,
    inner: Arc<Mutex<CacheState>>,
}

impl HistoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    pub fn get(&self, org_id: &str) -> Option<Arc<Vec<HistoryEntry>>> {
        let state = self.inner.lock().ok()?;
        state
            .entries
            .get(org_id)
            .filter(|cached| cached.stored_at.elapsed() < self.ttl)
            .map(|cached| cached.entries.clone())
    }

    pub fn generation(&self, org_id: &str) -> u64 {
        self.inner
            .lock()
            .ok()
            .and_then(|state| state.generations.get(org_id).copied())
            .unwrap_or(0)
    }

    /// Cache `entries` unless the tenant was invalidated since `generation`.
    /// Returns whether the entries were stored.
    pub fn put(&self, org_id: &str, generation: u64, entries: Arc<Vec<HistoryEntry>>) -> bool {
        let Ok(mut state) = self.inner.lock() else {
            return false;
        };
        if state.generations.get(org_id).copied().unwrap_or(0) != generation {
            return false;
        }
        state.entries.insert(
            org_id.to_string(),
            CachedHistory {
                stored_at: Instant::now(),
                entries,
            },
        );
        true
    }

    pub fn invalidate(&self, org_id: &str) {
        if let Ok(mut state) = self.inner.lock() {
            state.entries.remove(org_id);
            *state.generations.entry(org_id.to_string()).or_default() += 1;
        }
    }
}

/// Browsable, deletable upload history for one deployment.
#[derive(Clone)]
pub struct UploadHistoryStore {
    store: Arc<dyn ObjectStore>,
    repo: Arc<dyn UploadRepository>,
    cache: HistoryCache,
    fetch_limit: u64,
}

impl UploadHistoryStore {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        repo: Arc<dyn UploadRepository>,
        cache: HistoryCache,
        fetch_limit: u64,
    ) -> Self {
        Self {
            store,
            repo,
            cache,
            fetch_limit,
        }
    }

    pub fn cache(&self) -> &HistoryCache {
        &self.cache
    }

    /// Fetch both stores and merge them, bypassing the cache.
    pub async fn refresh(&self, org_id: &str) -> AppResult<Arc<Vec<HistoryEntry>>> {
        let generation = self.cache.generation(org_id);
        let records = self.repo.list_recent_uploads(org_id, self.fetch_limit).await?;
        let blobs = self.store.list(&uploads_prefix(org_id)).await?;

        let known: HashSet<&str> = records.iter().map(|r| r.file_path.as_str()).collect();
        let unmatched: Vec<String> = blobs
            .iter()
            .filter(|b| !known.contains(b.path.as_str()))
            .map(|b| b.path.clone())
            .collect();
        let linked_elsewhere: HashSet<String> = if unmatched.is_empty() {
            HashSet::new()
        } else {
            self.repo
                .linked_paths(org_id, &unmatched)
                .await?
                .into_iter()
                .collect()
        };

        let entries = Arc::new(reconcile(org_id, records, blobs, &linked_elsewhere));
        debug!(org_id, entries = entries.len(), "Upload history reconciled");

        if !self.cache.put(org_id, generation, entries.clone()) {
            debug!(org_id, "History changed during refresh, not cached");
        }
        Ok(entries)
    }

    /// One page of the merged history. Served from the cache unless
    /// `refresh` is set or the cached copy is stale.
    pub async fn list(&self, org_id: &str, params: &PaginationParams) -> AppResult<HistoryPage> {
        let entries = match self.cache.get(org_id) {
            Some(entries) if !params.refresh => entries,
            _ => self.refresh(org_id).await?,
        };

        let page = params.page();
        let limit = params.clamped_limit();
        let page_entries = entries
            .iter()
            .skip(params.offset())
            .take(limit as usize)
            .cloned()
            .collect();

        Ok(HistoryPage {
            entries: page_entries,
            pagination: Pagination::new(page, limit, entries.len() as u64),
        })
    }

    /// Delete an upload's file, metadata row and staging rows, then check
    /// that neither store still holds them.
    pub async fn delete_upload(&self, org_id: &str, id: Uuid) -> AppResult<DeleteOutcome> {
        let record = self
            .repo
            .get_upload(org_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Upload {}", id)))?;

        let staging_rows = self.repo.count_staging_records(id).await?;

        self.store
            .delete(&record.file_path)
            .await
            .map_err(|e| PersistenceError::new(Phase::DeleteBlob, e))?;

        let result = self.repo.delete_upload(id).await;
        self.cache.invalidate(org_id);
        result.map_err(|e| {
            PersistenceError::new(
                Phase::DeleteRecord,
                format!("{} (file {} was already removed)", e, record.file_path),
            )
        })?;

        self.verify_gone(org_id, Some(id), &record.file_path).await?;

        info!(org_id, upload_id = %id, path = %record.file_path, staging_rows, "Upload deleted");

        Ok(DeleteOutcome {
            upload_id: id,
            file_path: record.file_path,
            staging_rows_deleted: staging_rows,
        })
    }

    /// Delete a file under the tenant prefix that no upload references.
    pub async fn delete_unlinked(&self, org_id: &str, path: &str) -> AppResult<()> {
        let prefix = uploads_prefix(org_id);
        let inside_prefix = path
            .strip_prefix(&prefix)
            .is_some_and(|name| !name.is_empty() && !name.contains('/'));
        if !inside_prefix || path.split('/').any(|segment| segment == "..") {
            return Err(AppError::InvalidInput(format!(
                "path must name a file directly under {}",
                prefix
            )));
        }

        if !self
            .repo
            .linked_paths(org_id, &[path.to_string()])
            .await?
            .is_empty()
        {
            return Err(AppError::InvalidState(
                "file belongs to an upload record; delete the upload instead".to_string(),
            ));
        }

        if !self.store.exists(path).await? {
            return Err(AppError::NotFound(format!("File {}", path)));
        }

        self.store
            .delete(path)
            .await
            .map_err(|e| PersistenceError::new(Phase::DeleteBlob, e))?;
        self.cache.invalidate(org_id);

        self.verify_gone(org_id, None, path).await?;

        info!(org_id, path, "Unlinked file deleted");
        Ok(())
    }

    async fn verify_gone(&self, org_id: &str, id: Option<Uuid>, path: &str) -> AppResult<()> {
        let mut survivors = Vec::new();

        if self.store.exists(path).await? {
            survivors.push(format!("file {}", path));
        }
        if let Some(id) = id
            && self.repo.get_upload(org_id, id).await?.is_some()
        {
            survivors.push(format!("upload record {}", id));
        }

        if survivors.is_empty() {
            return Ok(());
        }

        warn!(org_id, ?survivors, "Delete did not remove every artifact");
        Err(PersistenceError::new(
            Phase::VerifyDelete,
            format!("still present after delete: {}", survivors.join(", ")),
        )
        .into())
    }
}

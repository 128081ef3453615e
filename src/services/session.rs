//! Upload sessions: the select → preview → staging state machine.
//!
//! A session holds at most one file's working state. Long operations
//! (parsing a file, running the stage workflow) take the session's
//! [`OperationSlot`]; a second operation arriving while the slot is held is
//! rejected with [`AppError::Busy`] and leaves the session untouched.
//!
//! Session state sits behind a synchronous mutex that is never held across
//! an await point. The registry uses tokio's `RwLock`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::import::{FieldBinding, FileIngestor, ImportSource, ParseError, ParsedSheet, Row, SpreadsheetFormat, map_row};

use super::stage::{StageOutcome, StageRequest, StageWorkflow};

/// Where a session is in the import flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStep {
    Select,
    Preview,
    /// Terminal: the upload was handed off for review.
    Staging,
}

/// Single-slot guard for long-running session operations.
#[derive(Debug, Default)]
pub struct OperationSlot {
    held: AtomicBool,
}

impl OperationSlot {
    /// Take the slot, or `None` when another operation holds it.
    pub fn try_acquire(&self) -> Option<OperationToken<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| OperationToken { slot: self })
    }

    pub fn is_busy(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Releases the slot on drop, including when the owning future is dropped.
#[derive(Debug)]
pub struct OperationToken<'a> {
    slot: &'a OperationSlot,
}

impl Drop for OperationToken<'_> {
    fn drop(&mut self) {
        self.slot.held.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone)]
struct SelectedFile {
    filename: String,
    mime_type: String,
    bytes: Vec<u8>,
    sheets: Vec<ParsedSheet>,
}

#[derive(Debug)]
struct UploadState {
    step: SessionStep,
    file: Option<SelectedFile>,
    sheet: Option<String>,
    source: Option<ImportSource>,
    error: Option<String>,
}

impl Default for UploadState {
    fn default() -> Self {
        Self {
            step: SessionStep::Select,
            file: None,
            sheet: None,
            source: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FileSummary {
    pub filename: String,
    pub size: usize,
    pub mime_type: String,
}

/// Preview of one sheet of the selected file.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SheetPreview {
    pub name: String,
    pub header_row_index: usize,
    pub headers: Vec<String>,
    pub total_rows: usize,
    #[schema(value_type = Vec<Object>)]
    pub preview_rows: Vec<Row>,
    /// Columns bound for the selected import source, empty until one is chosen.
    pub column_mapping: Vec<FieldBinding>,
}

/// Read-only view of a session.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub step: SessionStep,
    pub file: Option<FileSummary>,
    pub sheets: Vec<SheetPreview>,
    pub selected_sheet: Option<String>,
    pub source: Option<ImportSource>,
    pub is_processing: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One user's in-progress import.
#[derive(Debug)]
pub struct UploadSession {
    id: Uuid,
    org_id: String,
    created_at: DateTime<Utc>,
    last_used: Mutex<Instant>,
    slot: OperationSlot,
    state: Mutex<UploadState>,
    ingestor: FileIngestor,
    preview_rows: usize,
}

impl UploadSession {
    pub fn new(org_id: &str, ingestor: FileIngestor, preview_rows: usize) -> Self {
        Self {
            id: Uuid::now_v7(),
            org_id: org_id.to_string(),
            created_at: Utc::now(),
            last_used: Mutex::new(Instant::now()),
            slot: OperationSlot::default(),
            state: Mutex::new(UploadState::default()),
            ingestor,
            preview_rows,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn org_id(&self) -> &str {
        &self.org_id
    }

    pub fn is_processing(&self) -> bool {
        self.slot.is_busy()
    }

    fn state(&self) -> AppResult<MutexGuard<'_, UploadState>> {
        self.state
            .lock()
            .map_err(|_| AppError::InvalidState("session state lock poisoned".to_string()))
    }

    fn touch(&self) {
        if let Ok(mut last_used) = self.last_used.lock() {
            *last_used = Instant::now();
        }
    }

    fn idle_for(&self) -> Duration {
        self.last_used
            .lock()
            .map(|last_used| last_used.elapsed())
            .unwrap_or_default()
    }

    /// Parse a file and move `select → preview`.
    ///
    /// A parse failure sets the error slot and keeps the session in `select`.
    pub async fn select_file(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        source: Option<ImportSource>,
    ) -> AppResult<SessionSnapshot> {
        let token = self.slot.try_acquire().ok_or(AppError::Busy)?;

        {
            let state = self.state()?;
            if state.step != SessionStep::Select {
                return Err(AppError::InvalidState(format!(
                    "a file can only be selected in step select, session is in {}",
                    step_name(state.step)
                )));
            }
        }

        let ingestor = self.ingestor.clone();
        let name = filename.to_string();
        let parsed = tokio::task::spawn_blocking(move || {
            let sheets = ingestor.ingest(&name, &bytes);
            (bytes, sheets)
        })
        .await;

        let (bytes, sheets) = match parsed {
            Ok((bytes, Ok(sheets))) => (bytes, sheets),
            Ok((_, Err(e))) => return Err(self.record_parse_error(filename, e)),
            Err(join_err) => {
                let e = ParseError::Corrupt(format!("parser stopped unexpectedly: {}", join_err));
                return Err(self.record_parse_error(filename, e));
            }
        };

        let mime_type = SpreadsheetFormat::from_filename(filename)
            .map(|format| format.mime_type(filename).to_string())
            .unwrap_or_else(|_| "application/octet-stream".to_string());

        {
            let mut state = self.state()?;
            state.sheet = sheets.first().map(|s| s.name.clone());
            state.source = source;
            state.error = None;
            state.file = Some(SelectedFile {
                filename: filename.to_string(),
                mime_type,
                bytes,
                sheets,
            });
            state.step = SessionStep::Preview;
        }
        drop(token);

        info!(session_id = %self.id, org_id = %self.org_id, filename, "File selected");
        self.snapshot()
    }

    fn record_parse_error(&self, filename: &str, e: ParseError) -> AppError {
        warn!(session_id = %self.id, filename, error = %e, "File rejected");
        if let Ok(mut state) = self.state() {
            state.error = Some(e.to_string());
        }
        AppError::Parse(e)
    }

    /// Choose the sheet and/or import source while previewing.
    pub fn select(&self, sheet: Option<String>, source: Option<ImportSource>) -> AppResult<SessionSnapshot> {
        let token = self.slot.try_acquire().ok_or(AppError::Busy)?;

        {
            let mut state = self.state()?;
            if state.step != SessionStep::Preview {
                return Err(AppError::InvalidState(format!(
                    "selection requires step preview, session is in {}",
                    step_name(state.step)
                )));
            }

            if let Some(sheet) = sheet {
                let known = state
                    .file
                    .as_ref()
                    .is_some_and(|f| f.sheets.iter().any(|s| s.name == sheet));
                if !known {
                    return Err(AppError::InvalidInput(format!("unknown sheet '{}'", sheet)));
                }
                state.sheet = Some(sheet);
            }
            if source.is_some() {
                state.source = source;
            }
        }
        drop(token);

        self.snapshot()
    }

    /// Drop the selected file and return to `select`.
    pub fn cancel(&self) -> AppResult<SessionSnapshot> {
        let token = self.slot.try_acquire().ok_or(AppError::Busy)?;

        {
            let mut state = self.state()?;
            if state.step == SessionStep::Staging {
                return Err(AppError::InvalidState(
                    "the upload was already handed off for review".to_string(),
                ));
            }
            *state = UploadState::default();
        }
        drop(token);

        debug!(session_id = %self.id, "Session reset");
        self.snapshot()
    }

    pub fn clear_error(&self) -> AppResult<SessionSnapshot> {
        let token = self.slot.try_acquire().ok_or(AppError::Busy)?;
        self.state()?.error = None;
        drop(token);
        self.snapshot()
    }

    /// Run the stage workflow for the selected sheet and source.
    ///
    /// On failure the session stays in `preview` with the error recorded.
    pub async fn confirm(
        &self,
        workflow: &StageWorkflow,
        uploaded_by: Option<&str>,
    ) -> AppResult<StageOutcome> {
        let _token = self.slot.try_acquire().ok_or(AppError::Busy)?;

        let (file, sheet, source) = {
            let state = self.state()?;
            if state.step != SessionStep::Preview {
                return Err(AppError::InvalidState(format!(
                    "confirm requires step preview, session is in {}",
                    step_name(state.step)
                )));
            }
            let source = state.source.ok_or_else(|| {
                AppError::InvalidInput("choose an import source before confirming".to_string())
            })?;
            let file = state
                .file
                .clone()
                .ok_or_else(|| AppError::InvalidState("no file selected".to_string()))?;
            let sheet = state
                .sheet
                .as_ref()
                .and_then(|name| file.sheets.iter().find(|s| &s.name == name))
                .cloned()
                .ok_or_else(|| AppError::InvalidInput("choose a sheet before confirming".to_string()))?;
            (file, sheet, source)
        };

        let result = workflow
            .run(StageRequest {
                org_id: &self.org_id,
                uploaded_by,
                source,
                filename: &file.filename,
                mime_type: Some(&file.mime_type),
                bytes: file.bytes,
                sheet: &sheet,
            })
            .await;

        let mut state = self.state()?;
        match result {
            Ok(outcome) => {
                *state = UploadState {
                    step: SessionStep::Staging,
                    ..UploadState::default()
                };
                Ok(outcome)
            }
            Err(e) => {
                state.error = Some(e.to_string());
                Err(AppError::Persistence(e))
            }
        }
    }

    pub fn snapshot(&self) -> AppResult<SessionSnapshot> {
        let state = self.state()?;

        let sheets = state
            .file
            .as_ref()
            .map(|file| {
                file.sheets
                    .iter()
                    .map(|sheet| self.preview(sheet, state.source))
                    .collect()
            })
            .unwrap_or_default();

        Ok(SessionSnapshot {
            id: self.id,
            step: state.step,
            file: state.file.as_ref().map(|f| FileSummary {
                filename: f.filename.clone(),
                size: f.bytes.len(),
                mime_type: f.mime_type.clone(),
            }),
            sheets,
            selected_sheet: state.sheet.clone(),
            source: state.source,
            is_processing: self.slot.is_busy(),
            error: state.error.clone(),
            created_at: self.created_at,
        })
    }

    fn preview(&self, sheet: &ParsedSheet, source: Option<ImportSource>) -> SheetPreview {
        let preview_rows: Vec<Row> = sheet.rows.iter().take(self.preview_rows).cloned().collect();

        let mut column_mapping: Vec<FieldBinding> = Vec::new();
        if let Some(source) = source {
            for row in &preview_rows {
                for binding in map_row(source.schema(), row).bindings {
                    if !column_mapping.iter().any(|b| b.field == binding.field) {
                        column_mapping.push(binding);
                    }
                }
            }
        }

        SheetPreview {
            name: sheet.name.clone(),
            header_row_index: sheet.header_row_index,
            headers: sheet.headers.clone(),
            total_rows: sheet.total_rows,
            preview_rows,
            column_mapping,
        }
    }
}

fn step_name(step: SessionStep) -> &'static str {
    match step {
        SessionStep::Select => "select",
        SessionStep::Preview => "preview",
        SessionStep::Staging => "staging",
    }
}

/// Live sessions keyed by id.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<UploadSession>>>,
    ingestor: FileIngestor,
    preview_rows: usize,
}

impl SessionRegistry {
    pub fn new(ingestor: FileIngestor, preview_rows: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ingestor,
            preview_rows,
        }
    }

    pub async fn create(&self, org_id: &str) -> Arc<UploadSession> {
        let session = Arc::new(UploadSession::new(
            org_id,
            self.ingestor.clone(),
            self.preview_rows,
        ));
        self.sessions
            .write()
            .await
            .insert(session.id(), session.clone());
        debug!(session_id = %session.id(), org_id, "Upload session created");
        session
    }

    /// Look up a session of this tenant. Other tenants' sessions are reported
    /// as missing.
    pub async fn get(&self, org_id: &str, id: Uuid) -> AppResult<Arc<UploadSession>> {
        let session = self
            .sessions
            .read()
            .await
            .get(&id)
            .filter(|s| s.org_id() == org_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Session {}", id)))?;
        session.touch();
        Ok(session)
    }

    pub async fn remove(&self, org_id: &str, id: Uuid) -> AppResult<()> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(&id) {
            Some(session) if session.org_id() == org_id => {
                sessions.remove(&id);
                Ok(())
            }
            _ => Err(AppError::NotFound(format!("Session {}", id))),
        }
    }

    /// Drop sessions idle longer than `max_idle`. Busy sessions are kept.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.is_processing() || s.idle_for() < max_idle);
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

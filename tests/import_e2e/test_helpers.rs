//! Shared test helpers for import E2E tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use actix_web::{App, dev::ServiceResponse, test};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Notify;
use uuid::Uuid;

use transport_crm_import::api;
use transport_crm_import::config::{ImportSettings, ORG_ID_HEADER, USER_ID_HEADER};
use transport_crm_import::db::UploadRepository;
use transport_crm_import::error::{AppError, AppResult};
use transport_crm_import::import::StagingRecord;
use transport_crm_import::middleware::RequestLogger;
use transport_crm_import::models::{BlobEntry, NewUpload, UploadRecord, UploadStatus};
use transport_crm_import::services::{
    ImportServices, MemoryObjectStore, MemoryUploadRepository, ObjectStore,
};

pub const BOUNDARY: &str = "----crm-import-e2e-boundary";

/// Upload limit used by every test app.
pub const TEST_MAX_UPLOAD_SIZE: usize = 64 * 1024;

/// A driver roster with a title row above the header and one row
/// missing the driver's name.
pub const DRIVER_ROSTER: &str = "Driver Roster - exported 2024-03-01\n\
Full Name,Email,Phone Number,DOB,License Number\n\
Jane Doe,jane@example.com,555-1212,01/02/1980,D1234567\n\
John Roe,john@example.com,555-3434,1975-07-04,D7654321\n\
,nobody@example.com,555-0000,,\n";

/// Generate a unique org name for test isolation.
pub fn unique_org(prefix: &str) -> String {
    format!(
        "{}-{}",
        prefix,
        Uuid::now_v7().simple().to_string().split_at(24).1
    )
}

/// Operations a [`FaultyRepo`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepoOp {
    InsertUpload,
    InsertStaging,
    UpdateStatus,
    DeleteUpload,
    DeleteStaging,
}

/// Upload repository that fails chosen operations and otherwise delegates
/// to the in-memory repository.
#[derive(Default)]
pub struct FaultyRepo {
    pub inner: MemoryUploadRepository,
    failing: Mutex<HashSet<RepoOp>>,
    /// When set, `delete_upload` reports success without deleting.
    silent_delete: Mutex<bool>,
}

impl FaultyRepo {
    pub fn fail(&self, op: RepoOp) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn drop_deletes_silently(&self) {
        *self.silent_delete.lock().unwrap() = true;
    }

    fn check(&self, op: RepoOp) -> AppResult<()> {
        if self.failing.lock().unwrap().contains(&op) {
            return Err(AppError::Database(format!("injected failure in {:?}", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl UploadRepository for FaultyRepo {
    async fn ping(&self) -> AppResult<()> {
        self.inner.ping().await
    }

    async fn insert_upload(&self, upload: NewUpload) -> AppResult<UploadRecord> {
        self.check(RepoOp::InsertUpload)?;
        self.inner.insert_upload(upload).await
    }

    async fn get_upload(&self, org_id: &str, id: Uuid) -> AppResult<Option<UploadRecord>> {
        self.inner.get_upload(org_id, id).await
    }

    async fn linked_paths(&self, org_id: &str, file_paths: &[String]) -> AppResult<Vec<String>> {
        self.inner.linked_paths(org_id, file_paths).await
    }

    async fn update_upload_status(
        &self,
        id: Uuid,
        status: UploadStatus,
        notes: Option<String>,
    ) -> AppResult<UploadRecord> {
        self.check(RepoOp::UpdateStatus)?;
        self.inner.update_upload_status(id, status, notes).await
    }

    async fn list_recent_uploads(&self, org_id: &str, limit: u64) -> AppResult<Vec<UploadRecord>> {
        self.inner.list_recent_uploads(org_id, limit).await
    }

    async fn list_stuck_uploads(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<UploadRecord>> {
        self.inner.list_stuck_uploads(cutoff).await
    }

    async fn delete_upload(&self, id: Uuid) -> AppResult<bool> {
        self.check(RepoOp::DeleteUpload)?;
        if *self.silent_delete.lock().unwrap() {
            return Ok(true);
        }
        self.inner.delete_upload(id).await
    }

    async fn insert_staging_records(&self, records: &[StagingRecord]) -> AppResult<u64> {
        self.check(RepoOp::InsertStaging)?;
        self.inner.insert_staging_records(records).await
    }

    async fn delete_staging_records(&self, upload_id: Uuid) -> AppResult<u64> {
        self.check(RepoOp::DeleteStaging)?;
        self.inner.delete_staging_records(upload_id).await
    }

    async fn count_staging_records(&self, upload_id: Uuid) -> AppResult<u64> {
        self.inner.count_staging_records(upload_id).await
    }
}

/// Object store whose `put` waits for a permit on `gate` when gated.
#[derive(Default)]
pub struct GatedStore {
    pub inner: MemoryObjectStore,
    pub gate: Option<Arc<Notify>>,
}

#[async_trait]
impl ObjectStore for GatedStore {
    async fn ping(&self) -> AppResult<()> {
        self.inner.ping().await
    }

    async fn put(&self, path: &str, data: Vec<u8>, content_type: Option<&str>) -> AppResult<()> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.inner.put(path, data, content_type).await
    }

    async fn list(&self, prefix: &str) -> AppResult<Vec<BlobEntry>> {
        self.inner.list(prefix).await
    }

    async fn delete(&self, path: &str) -> AppResult<()> {
        self.inner.delete(path).await
    }

    async fn exists(&self, path: &str) -> AppResult<bool> {
        self.inner.exists(path).await
    }
}

/// Backends shared by a test app, kept for direct inspection.
pub struct TestBackends {
    pub store: Arc<GatedStore>,
    pub repo: Arc<FaultyRepo>,
}

impl TestBackends {
    pub fn new() -> Self {
        Self {
            store: Arc::new(GatedStore::default()),
            repo: Arc::new(FaultyRepo::default()),
        }
    }

    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            store: Arc::new(GatedStore {
                inner: MemoryObjectStore::new(),
                gate: Some(gate),
            }),
            repo: Arc::new(FaultyRepo::default()),
        }
    }

    pub fn services(&self) -> ImportServices {
        ImportServices::new(
            self.store.clone(),
            self.repo.clone(),
            ImportSettings {
                max_upload_size: TEST_MAX_UPLOAD_SIZE,
                preview_rows: 2,
                ..ImportSettings::default()
            },
        )
    }
}

/// Create a test app over the given backends.
pub async fn create_test_app(
    backends: &TestBackends,
) -> impl actix_web::dev::Service<
    actix_http::Request,
    Response = ServiceResponse,
    Error = actix_web::Error,
> {
    test::init_service(
        App::new()
            .wrap(RequestLogger)
            .configure(api::configure_api(backends.services())),
    )
    .await
}

/// Build a multipart body with a `file` part and an optional `source` part.
pub fn multipart_body(filename: &str, bytes: &[u8], source: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(source) = source {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"source\"\r\n\r\n{source}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Read a response as `(status, json)`; empty bodies become `Value::Null`.
pub async fn into_parts(resp: ServiceResponse) -> (u16, Value) {
    let status = resp.status().as_u16();
    let bytes = test::read_body(resp).await;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}

/// Send a request as `org` and return `(status, json)`.
pub async fn send<S>(app: &S, org: &str, req: test::TestRequest) -> (u16, Value)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let req = req
        .insert_header((ORG_ID_HEADER, org))
        .insert_header((USER_ID_HEADER, "dispatcher-1"))
        .to_request();
    into_parts(test::call_service(app, req).await).await
}

/// Create a session and return its id.
pub async fn create_session<S>(app: &S, org: &str) -> String
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let (status, body) = send(app, org, test::TestRequest::post().uri("/api/v1/imports/sessions")).await;
    assert_eq!(status, 201, "Failed to create session: {}", body);
    assert_eq!(body["step"], "select");
    body["id"].as_str().unwrap().to_string()
}

/// Post a file to a session.
pub async fn select_file<S>(
    app: &S,
    org: &str,
    session_id: &str,
    filename: &str,
    bytes: &[u8],
    source: Option<&str>,
) -> (u16, Value)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/imports/sessions/{}/file", session_id))
        .insert_header((
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        ))
        .set_payload(multipart_body(filename, bytes, source));
    send(app, org, req).await
}

/// Confirm a session.
pub async fn confirm<S>(app: &S, org: &str, session_id: &str) -> (u16, Value)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/imports/sessions/{}/confirm", session_id));
    send(app, org, req).await
}

/// Fetch a session snapshot.
pub async fn get_session<S>(app: &S, org: &str, session_id: &str) -> (u16, Value)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let req = test::TestRequest::get().uri(&format!("/api/v1/imports/sessions/{}", session_id));
    send(app, org, req).await
}

/// List upload history, bypassing the cache.
pub async fn list_uploads<S>(app: &S, org: &str, query: &str) -> (u16, Value)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let req = test::TestRequest::get().uri(&format!("/api/v1/uploads?refresh=true&{}", query));
    send(app, org, req).await
}

/// Run the whole flow for the driver roster and return the confirm body.
pub async fn stage_roster<S>(app: &S, org: &str) -> Value
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let session_id = create_session(app, org).await;
    let (status, body) = select_file(
        app,
        org,
        &session_id,
        "drivers.csv",
        DRIVER_ROSTER.as_bytes(),
        Some("drivers"),
    )
    .await;
    assert_eq!(status, 200, "select failed: {}", body);

    let (status, body) = confirm(app, org, &session_id).await;
    assert_eq!(status, 200, "confirm failed: {}", body);
    body
}

//! Upload session API handlers.
//!
//! A client creates a session, posts one file, picks a sheet and import
//! source from the preview, then confirms. Confirm hands back the
//! `upload_id` used by the review screen and discards the session.

use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::TenantContext;
use crate::error::{AppError, AppResult};
use crate::import::ImportSource;
use crate::services::ImportServices;

/// Sheet and source choice made while previewing.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SelectionRequest {
    pub sheet: Option<String>,
    pub source: Option<ImportSource>,
}

/// Multipart body of the file-select call (documentation only).
#[derive(ToSchema)]
pub struct FileUploadForm {
    /// `.xlsx`, `.xlsm`, `.xls`, `.xlsb`, `.ods` or `.csv`
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    pub source: Option<ImportSource>,
}

fn parse_session_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::InvalidInput("Invalid session ID".to_string()))
}

/// Create a new upload session.
#[utoipa::path(
    post,
    path = "/api/v1/imports/sessions",
    tag = "Imports",
    responses(
        (status = 201, description = "Session created in step select", body = crate::services::session::SessionSnapshot),
        (status = 401, description = "Missing tenant header", body = crate::error::ErrorResponse),
    ),
    security(("org_id" = []))
)]
pub async fn create_session(
    tenant: TenantContext,
    services: web::Data<ImportServices>,
) -> AppResult<HttpResponse> {
    let session = services.sessions.create(&tenant.org_id).await;
    Ok(HttpResponse::Created().json(session.snapshot()?))
}

/// Get the current state of a session.
#[utoipa::path(
    get,
    path = "/api/v1/imports/sessions/{session_id}",
    tag = "Imports",
    params(("session_id" = Uuid, Path, description = "Session UUID")),
    responses(
        (status = 200, description = "Session snapshot", body = crate::services::session::SessionSnapshot),
        (status = 404, description = "Session not found", body = crate::error::ErrorResponse),
    ),
    security(("org_id" = []))
)]
pub async fn get_session(
    tenant: TenantContext,
    services: web::Data<ImportServices>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = parse_session_id(&path)?;
    let session = services.sessions.get(&tenant.org_id, id).await?;
    Ok(HttpResponse::Ok().json(session.snapshot()?))
}

/// Discard a session.
#[utoipa::path(
    delete,
    path = "/api/v1/imports/sessions/{session_id}",
    tag = "Imports",
    params(("session_id" = Uuid, Path, description = "Session UUID")),
    responses(
        (status = 204, description = "Session discarded"),
        (status = 404, description = "Session not found", body = crate::error::ErrorResponse),
    ),
    security(("org_id" = []))
)]
pub async fn delete_session(
    tenant: TenantContext,
    services: web::Data<ImportServices>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = parse_session_id(&path)?;
    services.sessions.remove(&tenant.org_id, id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// File and optional source read from a multipart body.
struct FilePart {
    filename: String,
    bytes: Vec<u8>,
    source: Option<ImportSource>,
}

/// Read the `file` and `source` fields, enforcing the size limit while
/// streaming.
async fn read_file_part(payload: &mut Multipart, max_upload_size: usize) -> AppResult<FilePart> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut source = None;

    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| AppError::InvalidInput(format!("Multipart error: {}", e)))?;

        let name = field.name().unwrap_or_default().to_string();
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::InvalidInput(format!("Read error: {}", e)))?;
            if data.len() + chunk.len() > max_upload_size {
                return Err(AppError::PayloadTooLarge(format!(
                    "file exceeds the upload limit of {} bytes",
                    max_upload_size
                )));
            }
            data.extend_from_slice(&chunk);
        }

        match name.as_str() {
            "file" => {
                let filename = filename
                    .filter(|f| !f.trim().is_empty())
                    .ok_or_else(|| AppError::InvalidInput("file field has no filename".to_string()))?;
                file = Some((filename, data));
            }
            "source" => {
                let text = String::from_utf8_lossy(&data);
                source = Some(ImportSource::parse(&text).ok_or_else(|| {
                    AppError::InvalidInput(format!("unknown import source '{}'", text.trim()))
                })?);
            }
            _ => {}
        }
    }

    let (filename, bytes) =
        file.ok_or_else(|| AppError::InvalidInput("Missing multipart field: file".to_string()))?;

    Ok(FilePart {
        filename,
        bytes,
        source,
    })
}

/// Select a file for the session (select → preview).
///
/// POST /imports/sessions/{session_id}/file
/// Content-Type: multipart/form-data with field `file` and optional `source`
#[utoipa::path(
    post,
    path = "/api/v1/imports/sessions/{session_id}/file",
    tag = "Imports",
    params(("session_id" = Uuid, Path, description = "Session UUID")),
    request_body(content = FileUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File parsed, session in step preview", body = crate::services::session::SessionSnapshot),
        (status = 409, description = "Another operation is running or the session is not in step select", body = crate::error::ErrorResponse),
        (status = 413, description = "File too large", body = crate::error::ErrorResponse),
        (status = 422, description = "File could not be parsed", body = crate::error::ErrorResponse),
    ),
    security(("org_id" = []))
)]
pub async fn select_file(
    tenant: TenantContext,
    services: web::Data<ImportServices>,
    path: web::Path<String>,
    mut payload: Multipart,
) -> AppResult<HttpResponse> {
    let id = parse_session_id(&path)?;
    let session = services.sessions.get(&tenant.org_id, id).await?;

    let part = read_file_part(&mut payload, services.settings.max_upload_size).await?;
    let snapshot = session
        .select_file(&part.filename, part.bytes, part.source)
        .await?;

    Ok(HttpResponse::Ok().json(snapshot))
}

/// Choose the sheet and import source while previewing.
#[utoipa::path(
    put,
    path = "/api/v1/imports/sessions/{session_id}/selection",
    tag = "Imports",
    params(("session_id" = Uuid, Path, description = "Session UUID")),
    request_body = SelectionRequest,
    responses(
        (status = 200, description = "Selection updated", body = crate::services::session::SessionSnapshot),
        (status = 400, description = "Unknown sheet", body = crate::error::ErrorResponse),
        (status = 409, description = "Session busy or not in step preview", body = crate::error::ErrorResponse),
    ),
    security(("org_id" = []))
)]
pub async fn update_selection(
    tenant: TenantContext,
    services: web::Data<ImportServices>,
    path: web::Path<String>,
    body: web::Json<SelectionRequest>,
) -> AppResult<HttpResponse> {
    let id = parse_session_id(&path)?;
    let session = services.sessions.get(&tenant.org_id, id).await?;
    let body = body.into_inner();
    Ok(HttpResponse::Ok().json(session.select(body.sheet, body.source)?))
}

/// Cancel the preview and return to file selection.
#[utoipa::path(
    post,
    path = "/api/v1/imports/sessions/{session_id}/cancel",
    tag = "Imports",
    params(("session_id" = Uuid, Path, description = "Session UUID")),
    responses(
        (status = 200, description = "Session reset to step select", body = crate::services::session::SessionSnapshot),
        (status = 409, description = "Session busy or already staged", body = crate::error::ErrorResponse),
    ),
    security(("org_id" = []))
)]
pub async fn cancel(
    tenant: TenantContext,
    services: web::Data<ImportServices>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = parse_session_id(&path)?;
    let session = services.sessions.get(&tenant.org_id, id).await?;
    Ok(HttpResponse::Ok().json(session.cancel()?))
}

/// Stage the selected sheet for review.
///
/// On success the session is discarded and the response carries the
/// `upload_id` for the review screen.
#[utoipa::path(
    post,
    path = "/api/v1/imports/sessions/{session_id}/confirm",
    tag = "Imports",
    params(("session_id" = Uuid, Path, description = "Session UUID")),
    responses(
        (status = 200, description = "Upload staged", body = crate::services::stage::StageOutcome),
        (status = 400, description = "Sheet or source not chosen", body = crate::error::ErrorResponse),
        (status = 409, description = "Session busy or not in step preview", body = crate::error::ErrorResponse),
        (status = 500, description = "A stage phase failed", body = crate::error::ErrorResponse),
    ),
    security(("org_id" = []))
)]
pub async fn confirm(
    tenant: TenantContext,
    services: web::Data<ImportServices>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = parse_session_id(&path)?;
    let session = services.sessions.get(&tenant.org_id, id).await?;

    let outcome = session
        .confirm(&services.workflow, tenant.user_id.as_deref())
        .await?;

    // Already gone if the client discarded it mid-confirm.
    let _ = services.sessions.remove(&tenant.org_id, id).await;
    info!(
        session_id = %id,
        upload_id = %outcome.upload_id,
        "Session handed off for review"
    );

    Ok(HttpResponse::Ok().json(outcome))
}

/// Clear the session's error message.
#[utoipa::path(
    delete,
    path = "/api/v1/imports/sessions/{session_id}/error",
    tag = "Imports",
    params(("session_id" = Uuid, Path, description = "Session UUID")),
    responses(
        (status = 200, description = "Error cleared", body = crate::services::session::SessionSnapshot),
        (status = 409, description = "Another operation is running", body = crate::error::ErrorResponse),
    ),
    security(("org_id" = []))
)]
pub async fn clear_error(
    tenant: TenantContext,
    services: web::Data<ImportServices>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = parse_session_id(&path)?;
    let session = services.sessions.get(&tenant.org_id, id).await?;
    Ok(HttpResponse::Ok().json(session.clear_error()?))
}

/// Configure import session routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/imports/sessions").route(web::post().to(create_session)))
        .service(
            web::resource("/imports/sessions/{session_id}")
                .route(web::get().to(get_session))
                .route(web::delete().to(delete_session)),
        )
        .service(web::resource("/imports/sessions/{session_id}/file").route(web::post().to(select_file)))
        .service(
            web::resource("/imports/sessions/{session_id}/selection")
                .route(web::put().to(update_selection)),
        )
        .service(web::resource("/imports/sessions/{session_id}/cancel").route(web::post().to(cancel)))
        .service(web::resource("/imports/sessions/{session_id}/confirm").route(web::post().to(confirm)))
        .service(
            web::resource("/imports/sessions/{session_id}/error").route(web::delete().to(clear_error)),
        );
}

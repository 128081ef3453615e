//! Upload history API handlers.

use actix_web::{HttpResponse, web};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::auth::TenantContext;
use crate::error::{AppError, AppResult};
use crate::models::PaginationParams;
use crate::services::ImportServices;

/// Query for deleting a storage-only file.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UnlinkedQuery {
    /// Full object path, `{org_id}/uploads/{name}`
    pub path: String,
}

/// List the reconciled upload history.
#[utoipa::path(
    get,
    path = "/api/v1/uploads",
    tag = "Uploads",
    params(PaginationParams),
    responses(
        (status = 200, description = "One page of uploads, newest first", body = crate::services::history::HistoryPage),
        (status = 401, description = "Missing tenant header", body = crate::error::ErrorResponse),
    ),
    security(("org_id" = []))
)]
pub async fn list_uploads(
    tenant: TenantContext,
    services: web::Data<ImportServices>,
    query: web::Query<PaginationParams>,
) -> AppResult<HttpResponse> {
    let page = services.history.list(&tenant.org_id, &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Delete an upload: its file, metadata row and staging rows.
#[utoipa::path(
    delete,
    path = "/api/v1/uploads/{upload_id}",
    tag = "Uploads",
    params(("upload_id" = Uuid, Path, description = "Upload UUID")),
    responses(
        (status = 200, description = "Upload deleted and verified gone", body = crate::services::history::DeleteOutcome),
        (status = 404, description = "Upload not found", body = crate::error::ErrorResponse),
        (status = 500, description = "Delete failed or left an artifact behind", body = crate::error::ErrorResponse),
    ),
    security(("org_id" = []))
)]
pub async fn delete_upload(
    tenant: TenantContext,
    services: web::Data<ImportServices>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = Uuid::parse_str(&path)
        .map_err(|_| AppError::InvalidInput("Invalid upload ID".to_string()))?;
    let outcome = services.history.delete_upload(&tenant.org_id, id).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// Delete a file that no upload record references.
#[utoipa::path(
    delete,
    path = "/api/v1/uploads/unlinked",
    tag = "Uploads",
    params(UnlinkedQuery),
    responses(
        (status = 204, description = "File deleted"),
        (status = 400, description = "Path outside the tenant's upload prefix", body = crate::error::ErrorResponse),
        (status = 404, description = "File not found", body = crate::error::ErrorResponse),
        (status = 409, description = "File belongs to an upload record", body = crate::error::ErrorResponse),
    ),
    security(("org_id" = []))
)]
pub async fn delete_unlinked(
    tenant: TenantContext,
    services: web::Data<ImportServices>,
    query: web::Query<UnlinkedQuery>,
) -> AppResult<HttpResponse> {
    services
        .history
        .delete_unlinked(&tenant.org_id, &query.path)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Configure upload history routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/uploads").route(web::get().to(list_uploads)))
        .service(web::resource("/uploads/unlinked").route(web::delete().to(delete_unlinked)))
        .service(web::resource("/uploads/{upload_id}").route(web::delete().to(delete_upload)));
}

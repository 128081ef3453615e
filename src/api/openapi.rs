//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::{api, error, import, models, services};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Transport CRM Import Service",
        version = "0.3.0",
        description = "Spreadsheet import for the transport CRM: upload sessions, staging for review and reconciled upload history"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Health endpoints
        api::health::health,
        api::health::ready,
        // Import session endpoints
        api::imports::create_session,
        api::imports::get_session,
        api::imports::delete_session,
        api::imports::select_file,
        api::imports::update_selection,
        api::imports::cancel,
        api::imports::confirm,
        api::imports::clear_error,
        // Upload history endpoints
        api::uploads::list_uploads,
        api::uploads::delete_upload,
        api::uploads::delete_unlinked,
    ),
    components(
        schemas(
            // Common
            error::ErrorResponse,
            models::Pagination,
            // Health
            api::health::HealthResponse,
            api::health::ReadyResponse,
            // Imports
            import::ImportSource,
            import::FieldBinding,
            import::MatchKind,
            api::imports::SelectionRequest,
            api::imports::FileUploadForm,
            services::session::SessionStep,
            services::session::FileSummary,
            services::session::SheetPreview,
            services::session::SessionSnapshot,
            services::stage::StageOutcome,
            // Uploads
            models::UploadStatus,
            models::UploadRecord,
            models::BlobEntry,
            services::history::HistoryEntry,
            services::history::HistoryPage,
            services::history::DeleteOutcome,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Imports", description = "Upload sessions: select, preview and stage a spreadsheet"),
        (name = "Uploads", description = "Reconciled upload history and deletion")
    ),
    modifiers(&TenantAddon)
)]
pub struct ApiDoc;

/// Add the tenant header scheme.
struct TenantAddon;

impl utoipa::Modify for TenantAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "org_id",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new(crate::config::ORG_ID_HEADER),
                    ),
                ),
            );
        }
    }
}

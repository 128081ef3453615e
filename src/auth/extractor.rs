//! Actix-web extractor for the tenant headers.

use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};
use std::future::{Ready, ready};

use crate::config::{ORG_ID_HEADER, USER_ID_HEADER};
use crate::error::AppError;

/// Longest accepted organization identifier.
const MAX_ORG_ID_LEN: usize = 128;

/// Read a header as trimmed, non-empty UTF-8.
fn header_value(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Organization (and optional user) a request acts for.
///
/// Use this in every tenant-scoped handler:
/// ```ignore
/// async fn list(tenant: TenantContext) -> impl Responder {
///     // tenant.org_id scopes every read and write
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub org_id: String,
    pub user_id: Option<String>,
}

impl TenantContext {
    /// Validate an organization id. It becomes the first segment of blob
    /// paths, so it must be a single safe path segment.
    fn validate_org_id(org_id: &str) -> Result<(), AppError> {
        let valid = org_id.len() <= MAX_ORG_ID_LEN
            && org_id != "."
            && org_id != ".."
            && org_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if valid {
            Ok(())
        } else {
            Err(AppError::Unauthorized(format!(
                "{} must be 1-{} characters of letters, digits, '-', '_' or '.'",
                ORG_ID_HEADER, MAX_ORG_ID_LEN
            )))
        }
    }
}

impl FromRequest for TenantContext {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let Some(org_id) = header_value(req, ORG_ID_HEADER) else {
            return ready(Err(AppError::Unauthorized(format!(
                "Missing {} header",
                ORG_ID_HEADER
            ))));
        };

        if let Err(e) = Self::validate_org_id(&org_id) {
            return ready(Err(e));
        }

        ready(Ok(TenantContext {
            org_id,
            user_id: header_value(req, USER_ID_HEADER),
        }))
    }
}

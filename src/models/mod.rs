//! API and persistence models shared across services.

pub mod upload;

pub use upload::{
    BlobEntry, NewUpload, UploadRecord, UploadStatus, blob_name, sanitize_filename,
    split_blob_name, upload_path, uploads_prefix,
};

use utoipa::{IntoParams, ToSchema};

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_LIMIT: u32 = 20;
const MAX_LIMIT: u32 = 100;

/// Pagination parameters for the upload history.
#[derive(Debug, Clone, Default, serde::Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    /// 1-based page number (default 1)
    pub page: Option<u32>,
    /// Entries per page (default 20, max 100)
    pub limit: Option<u32>,
    /// Bypass the history cache
    #[serde(default)]
    pub refresh: bool,
}

impl PaginationParams {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(DEFAULT_PAGE).max(1)
    }

    /// Clamp limit to the allowed range.
    pub fn clamped_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    /// Index of the first entry on the page.
    pub fn offset(&self) -> usize {
        (self.page() as usize - 1) * self.clamped_limit() as usize
    }
}

/// Pagination metadata for responses.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, ToSchema)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            total.div_ceil(limit.max(1) as u64) as u32
        };

        Pagination {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

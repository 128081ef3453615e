//! Database module providing connection management, migrations, and queries.

pub mod staging_records;
pub mod uploads;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tracing::info;
use uuid::Uuid;

use crate::config::DatabaseSettings;
use crate::error::{AppError, AppResult};
use crate::import::StagingRecord;
use crate::migration::Migrator;
use crate::models::{NewUpload, UploadRecord, UploadStatus};

/// Relational store for upload metadata and staging rows.
///
/// Every read is scoped by `org_id`; writes keyed by upload id assume the
/// caller already resolved the upload within its tenant.
#[async_trait]
pub trait UploadRepository: Send + Sync {
    async fn ping(&self) -> AppResult<()>;

    /// Insert a new upload with status `processing`.
    async fn insert_upload(&self, upload: NewUpload) -> AppResult<UploadRecord>;

    async fn get_upload(&self, org_id: &str, id: Uuid) -> AppResult<Option<UploadRecord>>;

    /// The subset of `file_paths` referenced by an upload of this tenant.
    async fn linked_paths(&self, org_id: &str, file_paths: &[String]) -> AppResult<Vec<String>>;

    /// Move an upload forward. Backward moves fail with `InvalidState`.
    /// `processed_at` is set when the upload becomes `ready_for_review`.
    async fn update_upload_status(
        &self,
        id: Uuid,
        status: UploadStatus,
        notes: Option<String>,
    ) -> AppResult<UploadRecord>;

    /// Most recent uploads first.
    async fn list_recent_uploads(&self, org_id: &str, limit: u64) -> AppResult<Vec<UploadRecord>>;

    /// Uploads of every tenant still `processing` and created before `cutoff`.
    async fn list_stuck_uploads(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<UploadRecord>>;

    /// Delete an upload and its staging rows atomically. Returns whether a row existed.
    async fn delete_upload(&self, id: Uuid) -> AppResult<bool>;

    /// Insert all records or none.
    async fn insert_staging_records(&self, records: &[StagingRecord]) -> AppResult<u64>;

    async fn delete_staging_records(&self, upload_id: Uuid) -> AppResult<u64>;

    async fn count_staging_records(&self, upload_id: Uuid) -> AppResult<u64>;
}

/// PostgreSQL connection pool wrapper.
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Connect using the configured pool bounds.
    pub async fn new(settings: &DatabaseSettings) -> AppResult<Self> {
        let mut options = ConnectOptions::new(settings.url.clone());
        options
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .connect_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        let conn = Database::connect(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to database: {}", e)))?;

        info!(
            max_connections = settings.max_connections,
            "Database pool established"
        );

        Ok(Self { conn })
    }

    /// Get access to the connection for executing queries.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Apply pending migrations.
    pub async fn run_migrations(&self) -> AppResult<()> {
        Migrator::up(&self.conn, None)
            .await
            .map_err(|e| AppError::Database(format!("Failed to run migrations: {}", e)))
    }
}

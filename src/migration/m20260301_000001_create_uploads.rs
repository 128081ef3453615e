//! Migration: Create uploads table and shared trigger function.
//!
//! Uploads are the audit trail of every spreadsheet stored for import.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                -- Shared trigger function for updated_at
                CREATE OR REPLACE FUNCTION update_updated_at_column()
                RETURNS TRIGGER AS $$
                BEGIN
                    NEW.updated_at = NOW();
                    RETURN NEW;
                END;
                $$ LANGUAGE plpgsql;

                CREATE TABLE uploads (
                    id UUID PRIMARY KEY, -- UUIDv7 for time-ordered sorting
                    org_id VARCHAR(255) NOT NULL,
                    source VARCHAR(20) NOT NULL
                        CHECK (source IN ('drivers', 'patients', 'employees', 'trips')),

                    -- Object key: {org_id}/uploads/{unix_ms}_{sanitized_filename}
                    file_path VARCHAR(1024) NOT NULL,
                    original_filename VARCHAR(500) NOT NULL,
                    file_size BIGINT NOT NULL DEFAULT 0,
                    mime_type VARCHAR(255),

                    -- 'unlinked' is derived for storage-only blobs and never stored
                    status VARCHAR(20) NOT NULL DEFAULT 'processing'
                        CHECK (status IN ('processing', 'ready_for_review', 'committed', 'error')),

                    notes TEXT,
                    uploaded_by VARCHAR(255),
                    committed_by VARCHAR(255),

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    processed_at TIMESTAMPTZ
                );

                -- History listing: most recent first per tenant
                CREATE INDEX idx_uploads_org_created ON uploads(org_id, created_at DESC);

                -- Blob reconciliation and unlinked-delete checks
                CREATE UNIQUE INDEX idx_uploads_file_path ON uploads(file_path);

                -- Stuck-upload sweep
                CREATE INDEX idx_uploads_processing ON uploads(created_at)
                    WHERE status = 'processing';

                CREATE TRIGGER update_uploads_updated_at
                    BEFORE UPDATE ON uploads
                    FOR EACH ROW
                    EXECUTE FUNCTION update_updated_at_column();
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                DROP TRIGGER IF EXISTS update_uploads_updated_at ON uploads;
                DROP TABLE IF EXISTS uploads CASCADE;
                DROP FUNCTION IF EXISTS update_updated_at_column();
                "#,
            )
            .await?;

        Ok(())
    }
}

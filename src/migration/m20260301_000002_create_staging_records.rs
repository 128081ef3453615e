//! Migration: Create staging_records table.
//!
//! One table for every import source; `record_type` partitions the rows.

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
                CREATE TABLE staging_records (
                    id UUID PRIMARY KEY,
                    upload_id UUID NOT NULL REFERENCES uploads(id) ON DELETE CASCADE,
                    org_id VARCHAR(255) NOT NULL,
                    record_type VARCHAR(20) NOT NULL
                        CHECK (record_type IN ('driver', 'patient', 'employee', 'trip')),
                    row_index INTEGER NOT NULL CHECK (row_index >= 0),

                    -- Verbatim source row; never rewritten
                    raw_data JSONB NOT NULL,
                    mapped JSONB NOT NULL DEFAULT '{}',
                    metadata JSONB NOT NULL DEFAULT '{}',

                    status VARCHAR(20) NOT NULL DEFAULT 'pending'
                        CHECK (status IN ('pending', 'error')),
                    -- {missing: [field, ...]}
                    validation_errors JSONB,

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE UNIQUE INDEX idx_staging_records_upload_row
                    ON staging_records(upload_id, row_index);

                -- Review queue per tenant and entity kind
                CREATE INDEX idx_staging_records_org_type
                    ON staging_records(org_id, record_type, status);
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS staging_records CASCADE;")
            .await?;

        Ok(())
    }
}

//! Upload entity for SeaORM.
//!
//! One row per uploaded spreadsheet. `status` never holds `unlinked`.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "uploads")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub org_id: String,
    pub source: String,
    pub file_path: String,
    pub original_filename: String,
    pub file_size: i64,
    pub mime_type: Option<String>,
    /// processing, ready_for_review, committed, error
    pub status: String,
    pub notes: Option<String>,
    pub uploaded_by: Option<String>,
    pub committed_by: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub processed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::staging_record::Entity")]
    StagingRecords,
}

impl Related<super::staging_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StagingRecords.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

//! StagingRecord entity for SeaORM.

use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "staging_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub upload_id: Uuid,
    pub org_id: String,
    /// driver, patient, employee, trip
    pub record_type: String,
    pub row_index: i32,
    #[sea_orm(column_type = "JsonBinary")]
    pub raw_data: JsonValue,
    #[sea_orm(column_type = "JsonBinary")]
    pub mapped: JsonValue,
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: JsonValue,
    pub status: String,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub validation_errors: Option<JsonValue>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::upload::Entity",
        from = "Column::UploadId",
        to = "super::upload::Column::Id",
        on_delete = "Cascade"
    )]
    Upload,
}

impl Related<super::upload::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Upload.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

use super::sea_orm_active_enums::QueueStatus;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "queue_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub reference: Uuid,
    pub user_id: i64,
    pub legend_ref: Option<String>,
    pub opening_ref: Option<String>,
    pub initial_time_seconds: i32,
    pub increment_seconds: i32,
    #[sea_orm(column_type = "Decimal(Some((20, 2)))")]
    pub stake_amount: Decimal,
    pub status: QueueStatus,
    pub created_at: DateTimeUtc,
    pub expires_at: DateTimeUtc,
    pub matched_game_id: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

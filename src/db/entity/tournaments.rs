use super::sea_orm_active_enums::TournamentStatus;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "tournaments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub reference: Uuid,
    pub created_by_user_id: i64,
    pub name: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub mode: Json,
    pub status: TournamentStatus,
    pub max_participants: Option<i32>,
    pub initial_time_seconds: i32,
    pub increment_seconds: i32,
    #[sea_orm(column_type = "Decimal(Some((20, 2)))")]
    pub stake_amount: Decimal,
    pub duration_minutes: i32,
    pub created_at: DateTimeUtc,
    pub started_at: Option<DateTimeUtc>,
    pub ends_at: Option<DateTimeUtc>,
    pub completed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

use super::sea_orm_active_enums::GameStatus;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "games")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub reference: Uuid,
    pub creator_id: i64,
    pub opponent_id: Option<i64>,
    pub tournament_id: Option<i64>,
    #[sea_orm(column_type = "Decimal(Some((20, 2)))")]
    pub stake_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 2)))")]
    pub total_pot: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 2)))")]
    pub platform_fee_amount: Decimal,
    pub status: GameStatus,
    pub legend_ref: Option<String>,
    pub opening_ref: Option<String>,
    pub starting_fen: String,
    pub initial_time_seconds: i32,
    pub increment_seconds: i32,
    pub creator_time_remaining: i64,
    pub opponent_time_remaining: i64,
    pub last_move_at: Option<DateTimeUtc>,
    #[sea_orm(column_type = "JsonBinary")]
    pub game_data: Json,
    #[sea_orm(unique)]
    pub invite_code: Option<String>,
    pub expires_at: Option<DateTimeUtc>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub result: Option<Json>,
    pub created_at: DateTimeUtc,
    pub started_at: Option<DateTimeUtc>,
    pub completed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

use sea_orm::entity::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum QueueStatus {
    #[sea_orm(string_value = "WAITING")]
    Waiting,
    #[sea_orm(string_value = "MATCHED")]
    Matched,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
    #[sea_orm(string_value = "EXPIRED")]
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum GameStatus {
    #[sea_orm(string_value = "WAITING_FOR_OPPONENT")]
    WaitingForOpponent,
    #[sea_orm(string_value = "IN_PROGRESS")]
    InProgress,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum TournamentStatus {
    #[sea_orm(string_value = "LOBBY")]
    Lobby,
    #[sea_orm(string_value = "ACTIVE")]
    Active,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum WalletEntryKind {
    #[sea_orm(string_value = "LOCK")]
    Lock,
    #[sea_orm(string_value = "RELEASE")]
    Release,
    #[sea_orm(string_value = "SETTLE_WIN")]
    SettleWin,
    #[sea_orm(string_value = "SETTLE_LOSS")]
    SettleLoss,
    #[sea_orm(string_value = "PLATFORM_FEE")]
    PlatformFee,
    #[sea_orm(string_value = "DRAW_RELEASE")]
    DrawRelease,
}

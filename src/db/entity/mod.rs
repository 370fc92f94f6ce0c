pub mod prelude;

pub mod games;
pub mod queue_entries;
pub mod sea_orm_active_enums;
pub mod tournament_participants;
pub mod tournaments;
pub mod users;
pub mod wallet_entries;
pub mod wallets;

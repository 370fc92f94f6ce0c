pub use super::games::Entity as Games;
pub use super::queue_entries::Entity as QueueEntries;
pub use super::tournament_participants::Entity as TournamentParticipants;
pub use super::tournaments::Entity as Tournaments;
pub use super::users::Entity as Users;
pub use super::wallet_entries::Entity as WalletEntries;
pub use super::wallets::Entity as Wallets;

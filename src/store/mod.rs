use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::model::{
    Game, NewGame, NewQueueEntry, NewTournament, QueueEntry, Tournament, TournamentParticipant,
    User, Wallet, WalletEntry,
};
use crate::types::{
    Amount, GameId, GameRef, QueueEntryId, QueueRef, TournamentId, TournamentRef, UserId, UserRef,
};

pub mod in_memory;
pub mod sea_orm;

pub use in_memory::InMemoryCoreStorage;
pub use sea_orm::SeaOrmCoreStorage;

/// Entry point to the transactional store. Every core operation runs inside
/// exactly one transaction obtained from `begin`.
#[async_trait]
pub trait CoreStorage: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn CoreStorageTxn>, CoreError>;
}

/// One all-or-nothing unit of work. Methods prefixed `lock_` take a row lock
/// that is held until `commit` or `rollback`; `claim_` methods are
/// compare-and-set operations that either update every named row or none.
#[async_trait]
pub trait CoreStorageTxn: Send {
    async fn load_user(&mut self, reference: UserRef) -> Result<Option<User>, CoreError>;

    async fn load_user_by_id(&mut self, id: UserId) -> Result<Option<User>, CoreError>;

    async fn insert_user(&mut self, user: NewUser) -> Result<User, CoreError>;

    async fn set_user_active(&mut self, id: UserId, active: bool) -> Result<(), CoreError>;

    async fn lock_wallet(&mut self, user_id: UserId) -> Result<Option<Wallet>, CoreError>;

    async fn save_wallet(&mut self, wallet: &Wallet) -> Result<(), CoreError>;

    async fn append_wallet_entry(&mut self, entry: WalletEntry) -> Result<(), CoreError>;

    async fn list_wallet_entries(&mut self, user_id: UserId)
        -> Result<Vec<WalletEntry>, CoreError>;

    async fn load_queue_entry(
        &mut self,
        reference: QueueRef,
    ) -> Result<Option<QueueEntry>, CoreError>;

    async fn find_waiting_entry(&mut self, user_id: UserId)
        -> Result<Option<QueueEntry>, CoreError>;

    /// Fails with `AlreadyQueued` if the user already holds a WAITING entry.
    async fn insert_queue_entry(&mut self, entry: NewQueueEntry)
        -> Result<QueueEntry, CoreError>;

    /// WAITING, unexpired entries in the same time-control and stake bucket,
    /// excluding `entry`'s owner, oldest first.
    async fn pairing_candidates(
        &mut self,
        entry: &QueueEntry,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueEntry>, CoreError>;

    /// Moves every listed entry WAITING -> MATCHED, or none of them.
    async fn claim_waiting_entries(&mut self, ids: &[QueueEntryId]) -> Result<bool, CoreError>;

    async fn attach_matched_game(
        &mut self,
        ids: &[QueueEntryId],
        game_id: GameId,
    ) -> Result<(), CoreError>;

    /// Conditional WAITING -> CANCELLED. Returns false if the entry had
    /// already left WAITING.
    async fn cancel_waiting_entry(&mut self, id: QueueEntryId) -> Result<bool, CoreError>;

    /// Conditional WAITING -> EXPIRED for every entry past its deadline.
    async fn expire_waiting_entries(&mut self, now: DateTime<Utc>) -> Result<u64, CoreError>;

    async fn insert_game(&mut self, game: NewGame) -> Result<Game, CoreError>;

    async fn load_game(&mut self, reference: GameRef) -> Result<Option<Game>, CoreError>;

    async fn load_game_by_id(&mut self, id: GameId) -> Result<Option<Game>, CoreError>;

    async fn lock_game(&mut self, reference: GameRef) -> Result<Option<Game>, CoreError>;

    async fn lock_game_by_invite(&mut self, code: &str) -> Result<Option<Game>, CoreError>;

    async fn lock_expired_invites(&mut self, now: DateTime<Utc>) -> Result<Vec<Game>, CoreError>;

    async fn save_game(&mut self, game: &Game) -> Result<(), CoreError>;

    async fn insert_tournament(
        &mut self,
        tournament: NewTournament,
    ) -> Result<Tournament, CoreError>;

    async fn lock_tournament(
        &mut self,
        reference: TournamentRef,
    ) -> Result<Option<Tournament>, CoreError>;

    async fn load_tournament_by_id(
        &mut self,
        id: TournamentId,
    ) -> Result<Option<Tournament>, CoreError>;

    async fn save_tournament(&mut self, tournament: &Tournament) -> Result<(), CoreError>;

    async fn load_participant(
        &mut self,
        tournament_id: TournamentId,
        user_id: UserId,
    ) -> Result<Option<TournamentParticipant>, CoreError>;

    async fn insert_participant(
        &mut self,
        participant: TournamentParticipant,
    ) -> Result<(), CoreError>;

    async fn save_participant(
        &mut self,
        participant: &TournamentParticipant,
    ) -> Result<(), CoreError>;

    async fn list_participants(
        &mut self,
        tournament_id: TournamentId,
    ) -> Result<Vec<TournamentParticipant>, CoreError>;

    async fn count_participants(&mut self, tournament_id: TournamentId)
        -> Result<u64, CoreError>;

    /// Searching participants, longest-waiting first.
    async fn searching_participants(
        &mut self,
        tournament_id: TournamentId,
    ) -> Result<Vec<TournamentParticipant>, CoreError>;

    /// Clears `is_searching` on every listed participant, or on none of them
    /// if any was no longer searching.
    async fn claim_searching_participants(
        &mut self,
        tournament_id: TournamentId,
        user_ids: &[UserId],
    ) -> Result<bool, CoreError>;

    async fn clear_all_searching(&mut self, tournament_id: TournamentId)
        -> Result<u64, CoreError>;

    async fn commit(self: Box<Self>) -> Result<(), CoreError>;

    async fn rollback(self: Box<Self>);
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub reference: UserRef,
    pub display_name: String,
    pub is_active: bool,
    pub opening_balance: Amount,
}

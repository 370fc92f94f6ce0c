use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::CoreError;
use crate::model::{
    Game, GameData, NewGame, NewQueueEntry, NewTournament, QueueEntry, Tournament,
    TournamentParticipant, User, Wallet, WalletEntry,
};
use crate::types::{
    GameId, GameRef, GameStatus, QueueEntryId, QueueRef, QueueStatus, TournamentId,
    TournamentRef, TournamentStatus, UserId, UserRef,
};

use super::{CoreStorage, CoreStorageTxn, NewUser};

/// Every table sits behind its own `Arc`, so opening a transaction copies
/// pointers and a write clones only the tables it touches.
#[derive(Clone)]
struct Inner {
    users: Arc<BTreeMap<UserId, User>>,
    wallets: Arc<BTreeMap<UserId, Wallet>>,
    wallet_entries: Arc<Vec<WalletEntry>>,
    queue: Arc<BTreeMap<QueueEntryId, QueueEntry>>,
    games: Arc<BTreeMap<GameId, Game>>,
    tournaments: Arc<BTreeMap<TournamentId, Tournament>>,
    participants: Arc<BTreeMap<(TournamentId, UserId), TournamentParticipant>>,
    user_refs: Arc<HashMap<UserRef, UserId>>,
    next_user_id: UserId,
    next_queue_id: QueueEntryId,
    next_game_id: GameId,
    next_tournament_id: TournamentId,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            users: Arc::default(),
            wallets: Arc::default(),
            wallet_entries: Arc::default(),
            queue: Arc::default(),
            games: Arc::default(),
            tournaments: Arc::default(),
            participants: Arc::default(),
            user_refs: Arc::default(),
            next_user_id: 1,
            next_queue_id: 1,
            next_game_id: 1,
            next_tournament_id: 1,
        }
    }
}

/// Process-local store for tests and single-node development. Transactions
/// are fully serialized: `begin` takes the single store lock and works on a
/// copy-on-write snapshot that `commit` swaps in and `rollback` drops.
#[derive(Clone, Default)]
pub struct InMemoryCoreStorage {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryCoreStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct InMemoryCoreTxn {
    guard: OwnedMutexGuard<Inner>,
    working: Inner,
}

#[async_trait]
impl CoreStorage for InMemoryCoreStorage {
    async fn begin(&self) -> Result<Box<dyn CoreStorageTxn>, CoreError> {
        let guard = Arc::clone(&self.inner).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryCoreTxn { guard, working }))
    }
}

impl InMemoryCoreTxn {
    fn game_by_ref(&self, reference: GameRef) -> Option<Game> {
        self.working
            .games
            .values()
            .find(|game| game.reference == reference)
            .cloned()
    }
}

#[async_trait]
impl CoreStorageTxn for InMemoryCoreTxn {
    async fn load_user(&mut self, reference: UserRef) -> Result<Option<User>, CoreError> {
        Ok(self
            .working
            .user_refs
            .get(&reference)
            .and_then(|id| self.working.users.get(id))
            .cloned())
    }

    async fn load_user_by_id(&mut self, id: UserId) -> Result<Option<User>, CoreError> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn insert_user(&mut self, user: NewUser) -> Result<User, CoreError> {
        if self.working.user_refs.contains_key(&user.reference) {
            return Err(CoreError::invalid_state("user reference already registered"));
        }
        let id = self.working.next_user_id;
        self.working.next_user_id += 1;
        let stored = User {
            id,
            reference: user.reference,
            display_name: user.display_name,
            is_active: user.is_active,
        };
        Arc::make_mut(&mut self.working.user_refs).insert(user.reference, id);
        Arc::make_mut(&mut self.working.users).insert(id, stored.clone());
        Arc::make_mut(&mut self.working.wallets).insert(
            id,
            Wallet {
                user_id: id,
                balance: user.opening_balance,
                locked_amount: rust_decimal::Decimal::ZERO,
            },
        );
        Ok(stored)
    }

    async fn set_user_active(&mut self, id: UserId, active: bool) -> Result<(), CoreError> {
        let user = Arc::make_mut(&mut self.working.users)
            .get_mut(&id)
            .ok_or(CoreError::UserNotFound)?;
        user.is_active = active;
        Ok(())
    }

    async fn lock_wallet(&mut self, user_id: UserId) -> Result<Option<Wallet>, CoreError> {
        Ok(self.working.wallets.get(&user_id).cloned())
    }

    async fn save_wallet(&mut self, wallet: &Wallet) -> Result<(), CoreError> {
        match Arc::make_mut(&mut self.working.wallets).get_mut(&wallet.user_id) {
            Some(stored) => {
                *stored = wallet.clone();
                Ok(())
            }
            None => Err(CoreError::NotFound("wallet")),
        }
    }

    async fn append_wallet_entry(&mut self, entry: WalletEntry) -> Result<(), CoreError> {
        Arc::make_mut(&mut self.working.wallet_entries).push(entry);
        Ok(())
    }

    async fn list_wallet_entries(
        &mut self,
        user_id: UserId,
    ) -> Result<Vec<WalletEntry>, CoreError> {
        Ok(self
            .working
            .wallet_entries
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn load_queue_entry(
        &mut self,
        reference: QueueRef,
    ) -> Result<Option<QueueEntry>, CoreError> {
        Ok(self
            .working
            .queue
            .values()
            .find(|entry| entry.reference == reference)
            .cloned())
    }

    async fn find_waiting_entry(
        &mut self,
        user_id: UserId,
    ) -> Result<Option<QueueEntry>, CoreError> {
        Ok(self
            .working
            .queue
            .values()
            .find(|entry| entry.user_id == user_id && entry.status == QueueStatus::Waiting)
            .cloned())
    }

    async fn insert_queue_entry(
        &mut self,
        entry: NewQueueEntry,
    ) -> Result<QueueEntry, CoreError> {
        let duplicate = self
            .working
            .queue
            .values()
            .any(|row| row.user_id == entry.user_id && row.status == QueueStatus::Waiting);
        if duplicate {
            return Err(CoreError::AlreadyQueued);
        }
        let id = self.working.next_queue_id;
        self.working.next_queue_id += 1;
        let stored = QueueEntry {
            id,
            reference: entry.reference,
            user_id: entry.user_id,
            filters: entry.filters,
            time_control: entry.time_control,
            stake_amount: entry.stake_amount,
            status: QueueStatus::Waiting,
            created_at: entry.created_at,
            expires_at: entry.expires_at,
            matched_game_id: None,
        };
        Arc::make_mut(&mut self.working.queue).insert(id, stored.clone());
        Ok(stored)
    }

    async fn pairing_candidates(
        &mut self,
        entry: &QueueEntry,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueEntry>, CoreError> {
        let mut candidates: Vec<QueueEntry> = self
            .working
            .queue
            .values()
            .filter(|row| {
                row.status == QueueStatus::Waiting
                    && row.user_id != entry.user_id
                    && row.expires_at > now
                    && row.time_control == entry.time_control
                    && row.stake_amount == entry.stake_amount
            })
            .cloned()
            .collect();
        candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(candidates)
    }

    async fn claim_waiting_entries(&mut self, ids: &[QueueEntryId]) -> Result<bool, CoreError> {
        let all_waiting = ids.iter().all(|id| {
            self.working
                .queue
                .get(id)
                .is_some_and(|row| row.status == QueueStatus::Waiting)
        });
        if !all_waiting {
            return Ok(false);
        }
        for id in ids {
            if let Some(row) = Arc::make_mut(&mut self.working.queue).get_mut(id) {
                row.status = QueueStatus::Matched;
            }
        }
        Ok(true)
    }

    async fn attach_matched_game(
        &mut self,
        ids: &[QueueEntryId],
        game_id: GameId,
    ) -> Result<(), CoreError> {
        for id in ids {
            let row = Arc::make_mut(&mut self.working.queue)
                .get_mut(id)
                .ok_or(CoreError::NotFound("queue entry"))?;
            row.matched_game_id = Some(game_id);
        }
        Ok(())
    }

    async fn cancel_waiting_entry(&mut self, id: QueueEntryId) -> Result<bool, CoreError> {
        match Arc::make_mut(&mut self.working.queue).get_mut(&id) {
            Some(row) if row.status == QueueStatus::Waiting => {
                row.status = QueueStatus::Cancelled;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_waiting_entries(&mut self, now: DateTime<Utc>) -> Result<u64, CoreError> {
        let stale = |row: &QueueEntry| row.status == QueueStatus::Waiting && row.expires_at < now;
        if !self.working.queue.values().any(stale) {
            return Ok(0);
        }
        let mut expired = 0;
        for row in Arc::make_mut(&mut self.working.queue).values_mut() {
            if row.status == QueueStatus::Waiting && row.expires_at < now {
                row.status = QueueStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn insert_game(&mut self, game: NewGame) -> Result<Game, CoreError> {
        if let Some(code) = &game.invite_code {
            let taken = self
                .working
                .games
                .values()
                .any(|row| row.invite_code.as_ref() == Some(code));
            if taken {
                return Err(CoreError::invalid_state("invite code collision"));
            }
        }
        let id = self.working.next_game_id;
        self.working.next_game_id += 1;
        let initial = game.time_control.initial_millis();
        let stored = Game {
            id,
            reference: game.reference,
            creator_id: game.creator_id,
            opponent_id: game.opponent_id,
            tournament_id: game.tournament_id,
            stake_amount: game.stake_amount,
            total_pot: game.total_pot,
            platform_fee_amount: game.platform_fee_amount,
            status: game.status,
            filters: game.filters,
            game_data: GameData::starting(game.starting_fen.clone()),
            starting_fen: game.starting_fen,
            time_control: game.time_control,
            creator_time_remaining: initial,
            opponent_time_remaining: initial,
            last_move_at: None,
            invite_code: game.invite_code,
            expires_at: game.expires_at,
            result: None,
            created_at: game.created_at,
            started_at: game.started_at,
            completed_at: None,
        };
        Arc::make_mut(&mut self.working.games).insert(id, stored.clone());
        Ok(stored)
    }

    async fn load_game(&mut self, reference: GameRef) -> Result<Option<Game>, CoreError> {
        Ok(self.game_by_ref(reference))
    }

    async fn load_game_by_id(&mut self, id: GameId) -> Result<Option<Game>, CoreError> {
        Ok(self.working.games.get(&id).cloned())
    }

    async fn lock_game(&mut self, reference: GameRef) -> Result<Option<Game>, CoreError> {
        Ok(self.game_by_ref(reference))
    }

    async fn lock_game_by_invite(&mut self, code: &str) -> Result<Option<Game>, CoreError> {
        Ok(self
            .working
            .games
            .values()
            .find(|game| game.invite_code.as_deref() == Some(code))
            .cloned())
    }

    async fn lock_expired_invites(&mut self, now: DateTime<Utc>) -> Result<Vec<Game>, CoreError> {
        Ok(self
            .working
            .games
            .values()
            .filter(|game| {
                game.status == GameStatus::WaitingForOpponent
                    && game.expires_at.is_some_and(|deadline| deadline < now)
            })
            .cloned()
            .collect())
    }

    async fn save_game(&mut self, game: &Game) -> Result<(), CoreError> {
        match Arc::make_mut(&mut self.working.games).get_mut(&game.id) {
            Some(stored) => {
                *stored = game.clone();
                Ok(())
            }
            None => Err(CoreError::NotFound("game")),
        }
    }

    async fn insert_tournament(
        &mut self,
        tournament: NewTournament,
    ) -> Result<Tournament, CoreError> {
        let id = self.working.next_tournament_id;
        self.working.next_tournament_id += 1;
        let stored = Tournament {
            id,
            reference: tournament.reference,
            created_by_user_id: tournament.created_by_user_id,
            name: tournament.name,
            mode: tournament.mode,
            status: TournamentStatus::Lobby,
            max_participants: tournament.max_participants,
            time_control: tournament.time_control,
            stake_amount: tournament.stake_amount,
            duration_minutes: tournament.duration_minutes,
            created_at: tournament.created_at,
            started_at: None,
            ends_at: None,
            completed_at: None,
        };
        Arc::make_mut(&mut self.working.tournaments).insert(id, stored.clone());
        Ok(stored)
    }

    async fn lock_tournament(
        &mut self,
        reference: TournamentRef,
    ) -> Result<Option<Tournament>, CoreError> {
        Ok(self
            .working
            .tournaments
            .values()
            .find(|t| t.reference == reference)
            .cloned())
    }

    async fn load_tournament_by_id(
        &mut self,
        id: TournamentId,
    ) -> Result<Option<Tournament>, CoreError> {
        Ok(self.working.tournaments.get(&id).cloned())
    }

    async fn save_tournament(&mut self, tournament: &Tournament) -> Result<(), CoreError> {
        match Arc::make_mut(&mut self.working.tournaments).get_mut(&tournament.id) {
            Some(stored) => {
                *stored = tournament.clone();
                Ok(())
            }
            None => Err(CoreError::NotFound("tournament")),
        }
    }

    async fn load_participant(
        &mut self,
        tournament_id: TournamentId,
        user_id: UserId,
    ) -> Result<Option<TournamentParticipant>, CoreError> {
        Ok(self
            .working
            .participants
            .get(&(tournament_id, user_id))
            .cloned())
    }

    async fn insert_participant(
        &mut self,
        participant: TournamentParticipant,
    ) -> Result<(), CoreError> {
        let key = (participant.tournament_id, participant.user_id);
        if self.working.participants.contains_key(&key) {
            return Err(CoreError::invalid_state("already a participant"));
        }
        Arc::make_mut(&mut self.working.participants).insert(key, participant);
        Ok(())
    }

    async fn save_participant(
        &mut self,
        participant: &TournamentParticipant,
    ) -> Result<(), CoreError> {
        let key = (participant.tournament_id, participant.user_id);
        match Arc::make_mut(&mut self.working.participants).get_mut(&key) {
            Some(stored) => {
                *stored = participant.clone();
                Ok(())
            }
            None => Err(CoreError::NotAParticipant),
        }
    }

    async fn list_participants(
        &mut self,
        tournament_id: TournamentId,
    ) -> Result<Vec<TournamentParticipant>, CoreError> {
        Ok(self
            .working
            .participants
            .range((tournament_id, UserId::MIN)..=(tournament_id, UserId::MAX))
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn count_participants(
        &mut self,
        tournament_id: TournamentId,
    ) -> Result<u64, CoreError> {
        Ok(self
            .working
            .participants
            .range((tournament_id, UserId::MIN)..=(tournament_id, UserId::MAX))
            .count() as u64)
    }

    async fn searching_participants(
        &mut self,
        tournament_id: TournamentId,
    ) -> Result<Vec<TournamentParticipant>, CoreError> {
        let mut searching: Vec<TournamentParticipant> = self
            .working
            .participants
            .range((tournament_id, UserId::MIN)..=(tournament_id, UserId::MAX))
            .map(|(_, p)| p)
            .filter(|p| p.is_searching)
            .cloned()
            .collect();
        searching.sort_by(|a, b| {
            a.searching_since
                .cmp(&b.searching_since)
                .then(a.user_id.cmp(&b.user_id))
        });
        Ok(searching)
    }

    async fn claim_searching_participants(
        &mut self,
        tournament_id: TournamentId,
        user_ids: &[UserId],
    ) -> Result<bool, CoreError> {
        let all_searching = user_ids.iter().all(|user_id| {
            self.working
                .participants
                .get(&(tournament_id, *user_id))
                .is_some_and(|p| p.is_searching)
        });
        if !all_searching {
            return Ok(false);
        }
        for user_id in user_ids {
            let participants = Arc::make_mut(&mut self.working.participants);
            if let Some(p) = participants.get_mut(&(tournament_id, *user_id)) {
                p.is_searching = false;
                p.searching_since = None;
            }
        }
        Ok(true)
    }

    async fn clear_all_searching(
        &mut self,
        tournament_id: TournamentId,
    ) -> Result<u64, CoreError> {
        let mut cleared = 0;
        for (_, p) in Arc::make_mut(&mut self.working.participants)
            .range_mut((tournament_id, UserId::MIN)..=(tournament_id, UserId::MAX))
        {
            if p.is_searching {
                p.is_searching = false;
                p.searching_since = None;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn commit(self: Box<Self>) -> Result<(), CoreError> {
        let Self { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) {}
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rust_decimal::Decimal;

    use super::*;
    use crate::types::{MatchFilters, TimeControl};

    async fn seed_user(storage: &InMemoryCoreStorage) -> User {
        let mut txn = storage.begin().await.unwrap();
        let user = txn
            .insert_user(NewUser {
                reference: UserRef::new(),
                display_name: "seed".into(),
                is_active: true,
                opening_balance: Decimal::new(100, 0),
            })
            .await
            .unwrap();
        txn.commit().await.unwrap();
        user
    }

    fn ticket(user_id: UserId, now: DateTime<Utc>) -> NewQueueEntry {
        NewQueueEntry {
            reference: QueueRef::new(),
            user_id,
            filters: MatchFilters::none(),
            time_control: TimeControl::new(300, 0),
            stake_amount: Decimal::new(10, 0),
            created_at: now,
            expires_at: now + Duration::minutes(5),
        }
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let storage = InMemoryCoreStorage::new();
        let user = seed_user(&storage).await;
        let now = Utc::now();

        let mut txn = storage.begin().await.unwrap();
        txn.insert_queue_entry(ticket(user.id, now)).await.unwrap();
        txn.rollback().await;

        let mut txn = storage.begin().await.unwrap();
        assert!(txn.find_waiting_entry(user.id).await.unwrap().is_none());
        txn.rollback().await;
    }

    #[tokio::test]
    async fn commit_copies_only_the_tables_it_wrote() {
        let storage = InMemoryCoreStorage::new();
        let user = seed_user(&storage).await;
        let (users_before, queue_before) = {
            let inner = storage.inner.lock().await;
            (Arc::clone(&inner.users), Arc::clone(&inner.queue))
        };

        let mut txn = storage.begin().await.unwrap();
        txn.insert_queue_entry(ticket(user.id, Utc::now())).await.unwrap();
        txn.commit().await.unwrap();

        let inner = storage.inner.lock().await;
        assert!(Arc::ptr_eq(&users_before, &inner.users));
        assert!(!Arc::ptr_eq(&queue_before, &inner.queue));
        assert!(queue_before.is_empty());
        assert_eq!(inner.queue.len(), 1);
    }

    #[tokio::test]
    async fn rolled_back_wallet_write_leaves_the_store_untouched() {
        let storage = InMemoryCoreStorage::new();
        let user = seed_user(&storage).await;

        let mut txn = storage.begin().await.unwrap();
        let mut wallet = txn.lock_wallet(user.id).await.unwrap().unwrap();
        wallet.locked_amount = wallet.balance;
        txn.save_wallet(&wallet).await.unwrap();
        txn.rollback().await;

        let mut txn = storage.begin().await.unwrap();
        let wallet = txn.lock_wallet(user.id).await.unwrap().unwrap();
        assert_eq!(wallet.locked_amount, Decimal::ZERO);
        assert_eq!(wallet.balance, Decimal::new(100, 0));
        txn.rollback().await;
    }

    #[tokio::test]
    async fn second_waiting_ticket_is_rejected() {
        let storage = InMemoryCoreStorage::new();
        let user = seed_user(&storage).await;
        let now = Utc::now();

        let mut txn = storage.begin().await.unwrap();
        txn.insert_queue_entry(ticket(user.id, now)).await.unwrap();
        let err = txn.insert_queue_entry(ticket(user.id, now)).await.unwrap_err();
        assert!(matches!(err, CoreError::AlreadyQueued));
        txn.rollback().await;
    }

    #[tokio::test]
    async fn claim_is_all_or_nothing() {
        let storage = InMemoryCoreStorage::new();
        let a = seed_user(&storage).await;
        let b = seed_user(&storage).await;
        let now = Utc::now();

        let mut txn = storage.begin().await.unwrap();
        let first = txn.insert_queue_entry(ticket(a.id, now)).await.unwrap();
        let second = txn.insert_queue_entry(ticket(b.id, now)).await.unwrap();
        assert!(txn.cancel_waiting_entry(second.id).await.unwrap());
        assert!(!txn
            .claim_waiting_entries(&[first.id, second.id])
            .await
            .unwrap());
        let reloaded = txn.load_queue_entry(first.reference).await.unwrap().unwrap();
        assert_eq!(reloaded.status, QueueStatus::Waiting);
        txn.commit().await.unwrap();
    }
}

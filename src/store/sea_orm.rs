use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Unchanged, ColumnTrait, DatabaseConnection,
    DatabaseTransaction, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    Set, SqlErr, TransactionTrait,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::db::entity::sea_orm_active_enums::{
    GameStatus as DbGameStatus, QueueStatus as DbQueueStatus,
    TournamentStatus as DbTournamentStatus, WalletEntryKind as DbWalletEntryKind,
};
use crate::db::entity::{
    games, queue_entries, tournament_participants, tournaments, users, wallet_entries, wallets,
};
use crate::error::CoreError;
use crate::model::{
    Game, GameData, NewGame, NewQueueEntry, NewTournament, QueueEntry, Tournament,
    TournamentParticipant, User, Wallet, WalletEntry, WalletEntryKind,
};
use crate::types::{
    GameId, GameRef, GameStatus, MatchFilters, QueueEntryId, QueueRef, QueueStatus, TimeControl,
    TournamentId, TournamentRef, TournamentStatus, UserId, UserRef,
};

use super::{CoreStorage, CoreStorageTxn, NewUser};

pub struct SeaOrmCoreStorage {
    connection: DatabaseConnection,
}

impl SeaOrmCoreStorage {
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }
}

pub struct SeaOrmCoreTxn {
    txn: DatabaseTransaction,
}

#[async_trait]
impl CoreStorage for SeaOrmCoreStorage {
    async fn begin(&self) -> Result<Box<dyn CoreStorageTxn>, CoreError> {
        let txn = self.connection.begin().await?;
        Ok(Box::new(SeaOrmCoreTxn { txn }))
    }
}

#[async_trait]
impl CoreStorageTxn for SeaOrmCoreTxn {
    async fn load_user(&mut self, reference: UserRef) -> Result<Option<User>, CoreError> {
        let record = users::Entity::find()
            .filter(users::Column::Reference.eq(reference.as_uuid()))
            .one(&self.txn)
            .await?;
        Ok(record.map(user_from_model))
    }

    async fn load_user_by_id(&mut self, id: UserId) -> Result<Option<User>, CoreError> {
        let record = users::Entity::find_by_id(id).one(&self.txn).await?;
        Ok(record.map(user_from_model))
    }

    async fn insert_user(&mut self, user: NewUser) -> Result<User, CoreError> {
        let now = Utc::now();
        let inserted = users::ActiveModel {
            reference: Set(user.reference.as_uuid()),
            display_name: Set(user.display_name),
            is_active: Set(user.is_active),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&self.txn)
        .await?;
        wallets::ActiveModel {
            user_id: Set(inserted.id),
            balance: Set(user.opening_balance),
            locked_amount: Set(rust_decimal::Decimal::ZERO),
            updated_at: Set(now),
        }
        .insert(&self.txn)
        .await?;
        Ok(user_from_model(inserted))
    }

    async fn set_user_active(&mut self, id: UserId, active: bool) -> Result<(), CoreError> {
        let result = users::Entity::update_many()
            .col_expr(users::Column::IsActive, Expr::value(active))
            .filter(users::Column::Id.eq(id))
            .exec(&self.txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(CoreError::UserNotFound);
        }
        Ok(())
    }

    async fn lock_wallet(&mut self, user_id: UserId) -> Result<Option<Wallet>, CoreError> {
        let record = wallets::Entity::find_by_id(user_id)
            .lock_exclusive()
            .one(&self.txn)
            .await?;
        Ok(record.map(|model| Wallet {
            user_id: model.user_id,
            balance: model.balance,
            locked_amount: model.locked_amount,
        }))
    }

    async fn save_wallet(&mut self, wallet: &Wallet) -> Result<(), CoreError> {
        wallets::ActiveModel {
            user_id: Unchanged(wallet.user_id),
            balance: Set(wallet.balance),
            locked_amount: Set(wallet.locked_amount),
            updated_at: Set(Utc::now()),
        }
        .update(&self.txn)
        .await?;
        Ok(())
    }

    async fn append_wallet_entry(&mut self, entry: WalletEntry) -> Result<(), CoreError> {
        wallet_entries::ActiveModel {
            user_id: Set(entry.user_id),
            kind: Set(entry.kind.into()),
            amount: Set(entry.amount),
            game_id: Set(entry.game_id),
            created_at: Set(entry.created_at),
            ..Default::default()
        }
        .insert(&self.txn)
        .await?;
        Ok(())
    }

    async fn list_wallet_entries(
        &mut self,
        user_id: UserId,
    ) -> Result<Vec<WalletEntry>, CoreError> {
        let rows = wallet_entries::Entity::find()
            .filter(wallet_entries::Column::UserId.eq(user_id))
            .order_by_asc(wallet_entries::Column::Id)
            .all(&self.txn)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| WalletEntry {
                user_id: row.user_id,
                kind: row.kind.into(),
                amount: row.amount,
                game_id: row.game_id,
                created_at: row.created_at,
            })
            .collect())
    }

    async fn load_queue_entry(
        &mut self,
        reference: QueueRef,
    ) -> Result<Option<QueueEntry>, CoreError> {
        queue_entries::Entity::find()
            .filter(queue_entries::Column::Reference.eq(reference.as_uuid()))
            .one(&self.txn)
            .await?
            .map(queue_entry_from_model)
            .transpose()
    }

    async fn find_waiting_entry(
        &mut self,
        user_id: UserId,
    ) -> Result<Option<QueueEntry>, CoreError> {
        queue_entries::Entity::find()
            .filter(queue_entries::Column::UserId.eq(user_id))
            .filter(queue_entries::Column::Status.eq(DbQueueStatus::Waiting))
            .one(&self.txn)
            .await?
            .map(queue_entry_from_model)
            .transpose()
    }

    async fn insert_queue_entry(
        &mut self,
        entry: NewQueueEntry,
    ) -> Result<QueueEntry, CoreError> {
        let model = queue_entries::ActiveModel {
            reference: Set(entry.reference.as_uuid()),
            user_id: Set(entry.user_id),
            legend_ref: Set(entry.filters.legend_ref),
            opening_ref: Set(entry.filters.opening_ref),
            initial_time_seconds: Set(to_i32(entry.time_control.initial_time_seconds)?),
            increment_seconds: Set(to_i32(entry.time_control.increment_seconds)?),
            stake_amount: Set(entry.stake_amount),
            status: Set(DbQueueStatus::Waiting),
            created_at: Set(entry.created_at),
            expires_at: Set(entry.expires_at),
            matched_game_id: Set(None),
            ..Default::default()
        };
        match model.insert(&self.txn).await {
            Ok(inserted) => queue_entry_from_model(inserted),
            Err(err) if is_unique_violation(&err) => Err(CoreError::AlreadyQueued),
            Err(err) => Err(err.into()),
        }
    }

    async fn pairing_candidates(
        &mut self,
        entry: &QueueEntry,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueEntry>, CoreError> {
        queue_entries::Entity::find()
            .filter(queue_entries::Column::Status.eq(DbQueueStatus::Waiting))
            .filter(queue_entries::Column::UserId.ne(entry.user_id))
            .filter(queue_entries::Column::ExpiresAt.gt(now))
            .filter(
                queue_entries::Column::InitialTimeSeconds
                    .eq(to_i32(entry.time_control.initial_time_seconds)?),
            )
            .filter(
                queue_entries::Column::IncrementSeconds
                    .eq(to_i32(entry.time_control.increment_seconds)?),
            )
            .filter(queue_entries::Column::StakeAmount.eq(entry.stake_amount))
            .order_by_asc(queue_entries::Column::CreatedAt)
            .order_by_asc(queue_entries::Column::Id)
            .all(&self.txn)
            .await?
            .into_iter()
            .map(queue_entry_from_model)
            .collect()
    }

    async fn claim_waiting_entries(&mut self, ids: &[QueueEntryId]) -> Result<bool, CoreError> {
        // Row locks are taken in id order so concurrent claimers cannot deadlock.
        let locked = queue_entries::Entity::find()
            .filter(queue_entries::Column::Id.is_in(ids.iter().copied()))
            .filter(queue_entries::Column::Status.eq(DbQueueStatus::Waiting))
            .order_by_asc(queue_entries::Column::Id)
            .lock_exclusive()
            .all(&self.txn)
            .await?;
        if locked.len() != ids.len() {
            return Ok(false);
        }
        queue_entries::Entity::update_many()
            .col_expr(
                queue_entries::Column::Status,
                Expr::value(DbQueueStatus::Matched),
            )
            .filter(queue_entries::Column::Id.is_in(ids.iter().copied()))
            .exec(&self.txn)
            .await?;
        Ok(true)
    }

    async fn attach_matched_game(
        &mut self,
        ids: &[QueueEntryId],
        game_id: GameId,
    ) -> Result<(), CoreError> {
        queue_entries::Entity::update_many()
            .col_expr(
                queue_entries::Column::MatchedGameId,
                Expr::value(Some(game_id)),
            )
            .filter(queue_entries::Column::Id.is_in(ids.iter().copied()))
            .exec(&self.txn)
            .await?;
        Ok(())
    }

    async fn cancel_waiting_entry(&mut self, id: QueueEntryId) -> Result<bool, CoreError> {
        let result = queue_entries::Entity::update_many()
            .col_expr(
                queue_entries::Column::Status,
                Expr::value(DbQueueStatus::Cancelled),
            )
            .filter(queue_entries::Column::Id.eq(id))
            .filter(queue_entries::Column::Status.eq(DbQueueStatus::Waiting))
            .exec(&self.txn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn expire_waiting_entries(&mut self, now: DateTime<Utc>) -> Result<u64, CoreError> {
        let result = queue_entries::Entity::update_many()
            .col_expr(
                queue_entries::Column::Status,
                Expr::value(DbQueueStatus::Expired),
            )
            .filter(queue_entries::Column::Status.eq(DbQueueStatus::Waiting))
            .filter(queue_entries::Column::ExpiresAt.lt(now))
            .exec(&self.txn)
            .await?;
        Ok(result.rows_affected)
    }

    async fn insert_game(&mut self, game: NewGame) -> Result<Game, CoreError> {
        let initial = game.time_control.initial_millis();
        let model = games::ActiveModel {
            reference: Set(game.reference.as_uuid()),
            creator_id: Set(game.creator_id),
            opponent_id: Set(game.opponent_id),
            tournament_id: Set(game.tournament_id),
            stake_amount: Set(game.stake_amount),
            total_pot: Set(game.total_pot),
            platform_fee_amount: Set(game.platform_fee_amount),
            status: Set(game.status.into()),
            legend_ref: Set(game.filters.legend_ref),
            opening_ref: Set(game.filters.opening_ref),
            game_data: Set(to_json(&GameData::starting(game.starting_fen.clone()))?),
            starting_fen: Set(game.starting_fen),
            initial_time_seconds: Set(to_i32(game.time_control.initial_time_seconds)?),
            increment_seconds: Set(to_i32(game.time_control.increment_seconds)?),
            creator_time_remaining: Set(initial),
            opponent_time_remaining: Set(initial),
            last_move_at: Set(None),
            invite_code: Set(game.invite_code),
            expires_at: Set(game.expires_at),
            result: Set(None),
            created_at: Set(game.created_at),
            started_at: Set(game.started_at),
            completed_at: Set(None),
            ..Default::default()
        };
        match model.insert(&self.txn).await {
            Ok(inserted) => game_from_model(inserted),
            Err(err) if is_unique_violation(&err) => {
                Err(CoreError::invalid_state("invite code collision"))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn load_game(&mut self, reference: GameRef) -> Result<Option<Game>, CoreError> {
        games::Entity::find()
            .filter(games::Column::Reference.eq(reference.as_uuid()))
            .one(&self.txn)
            .await?
            .map(game_from_model)
            .transpose()
    }

    async fn load_game_by_id(&mut self, id: GameId) -> Result<Option<Game>, CoreError> {
        games::Entity::find_by_id(id)
            .one(&self.txn)
            .await?
            .map(game_from_model)
            .transpose()
    }

    async fn lock_game(&mut self, reference: GameRef) -> Result<Option<Game>, CoreError> {
        games::Entity::find()
            .filter(games::Column::Reference.eq(reference.as_uuid()))
            .lock_exclusive()
            .one(&self.txn)
            .await?
            .map(game_from_model)
            .transpose()
    }

    async fn lock_game_by_invite(&mut self, code: &str) -> Result<Option<Game>, CoreError> {
        games::Entity::find()
            .filter(games::Column::InviteCode.eq(code))
            .lock_exclusive()
            .one(&self.txn)
            .await?
            .map(game_from_model)
            .transpose()
    }

    async fn lock_expired_invites(&mut self, now: DateTime<Utc>) -> Result<Vec<Game>, CoreError> {
        games::Entity::find()
            .filter(games::Column::Status.eq(DbGameStatus::WaitingForOpponent))
            .filter(games::Column::ExpiresAt.lt(now))
            .order_by_asc(games::Column::Id)
            .lock_exclusive()
            .all(&self.txn)
            .await?
            .into_iter()
            .map(game_from_model)
            .collect()
    }

    async fn save_game(&mut self, game: &Game) -> Result<(), CoreError> {
        games::ActiveModel {
            id: Unchanged(game.id),
            opponent_id: Set(game.opponent_id),
            status: Set(game.status.into()),
            total_pot: Set(game.total_pot),
            platform_fee_amount: Set(game.platform_fee_amount),
            creator_time_remaining: Set(game.creator_time_remaining),
            opponent_time_remaining: Set(game.opponent_time_remaining),
            last_move_at: Set(game.last_move_at),
            game_data: Set(to_json(&game.game_data)?),
            expires_at: Set(game.expires_at),
            result: Set(game.result.as_ref().map(to_json).transpose()?),
            started_at: Set(game.started_at),
            completed_at: Set(game.completed_at),
            ..Default::default()
        }
        .update(&self.txn)
        .await?;
        Ok(())
    }

    async fn insert_tournament(
        &mut self,
        tournament: NewTournament,
    ) -> Result<Tournament, CoreError> {
        let max_participants = tournament.max_participants.map(to_i32).transpose()?;
        let inserted = tournaments::ActiveModel {
            reference: Set(tournament.reference.as_uuid()),
            created_by_user_id: Set(tournament.created_by_user_id),
            name: Set(tournament.name),
            mode: Set(to_json(&tournament.mode)?),
            status: Set(DbTournamentStatus::Lobby),
            max_participants: Set(max_participants),
            initial_time_seconds: Set(to_i32(tournament.time_control.initial_time_seconds)?),
            increment_seconds: Set(to_i32(tournament.time_control.increment_seconds)?),
            stake_amount: Set(tournament.stake_amount),
            duration_minutes: Set(to_i32(tournament.duration_minutes)?),
            created_at: Set(tournament.created_at),
            started_at: Set(None),
            ends_at: Set(None),
            completed_at: Set(None),
            ..Default::default()
        }
        .insert(&self.txn)
        .await?;
        tournament_from_model(inserted)
    }

    async fn lock_tournament(
        &mut self,
        reference: TournamentRef,
    ) -> Result<Option<Tournament>, CoreError> {
        tournaments::Entity::find()
            .filter(tournaments::Column::Reference.eq(reference.as_uuid()))
            .lock_exclusive()
            .one(&self.txn)
            .await?
            .map(tournament_from_model)
            .transpose()
    }

    async fn load_tournament_by_id(
        &mut self,
        id: TournamentId,
    ) -> Result<Option<Tournament>, CoreError> {
        tournaments::Entity::find_by_id(id)
            .one(&self.txn)
            .await?
            .map(tournament_from_model)
            .transpose()
    }

    async fn save_tournament(&mut self, tournament: &Tournament) -> Result<(), CoreError> {
        tournaments::ActiveModel {
            id: Unchanged(tournament.id),
            status: Set(tournament.status.into()),
            started_at: Set(tournament.started_at),
            ends_at: Set(tournament.ends_at),
            completed_at: Set(tournament.completed_at),
            ..Default::default()
        }
        .update(&self.txn)
        .await?;
        Ok(())
    }

    async fn load_participant(
        &mut self,
        tournament_id: TournamentId,
        user_id: UserId,
    ) -> Result<Option<TournamentParticipant>, CoreError> {
        tournament_participants::Entity::find_by_id((tournament_id, user_id))
            .one(&self.txn)
            .await?
            .map(participant_from_model)
            .transpose()
    }

    async fn insert_participant(
        &mut self,
        participant: TournamentParticipant,
    ) -> Result<(), CoreError> {
        let model = participant_to_active(&participant)?;
        match model.insert(&self.txn).await {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                Err(CoreError::invalid_state("already a participant"))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn save_participant(
        &mut self,
        participant: &TournamentParticipant,
    ) -> Result<(), CoreError> {
        let mut model = participant_to_active(participant)?;
        model.tournament_id = Unchanged(participant.tournament_id);
        model.user_id = Unchanged(participant.user_id);
        model.joined_at = Unchanged(participant.joined_at);
        model.update(&self.txn).await?;
        Ok(())
    }

    async fn list_participants(
        &mut self,
        tournament_id: TournamentId,
    ) -> Result<Vec<TournamentParticipant>, CoreError> {
        tournament_participants::Entity::find()
            .filter(tournament_participants::Column::TournamentId.eq(tournament_id))
            .order_by_asc(tournament_participants::Column::UserId)
            .all(&self.txn)
            .await?
            .into_iter()
            .map(participant_from_model)
            .collect()
    }

    async fn count_participants(
        &mut self,
        tournament_id: TournamentId,
    ) -> Result<u64, CoreError> {
        let count = tournament_participants::Entity::find()
            .filter(tournament_participants::Column::TournamentId.eq(tournament_id))
            .count(&self.txn)
            .await?;
        Ok(count)
    }

    async fn searching_participants(
        &mut self,
        tournament_id: TournamentId,
    ) -> Result<Vec<TournamentParticipant>, CoreError> {
        tournament_participants::Entity::find()
            .filter(tournament_participants::Column::TournamentId.eq(tournament_id))
            .filter(tournament_participants::Column::IsSearching.eq(true))
            .order_by_asc(tournament_participants::Column::SearchingSince)
            .order_by_asc(tournament_participants::Column::UserId)
            .all(&self.txn)
            .await?
            .into_iter()
            .map(participant_from_model)
            .collect()
    }

    async fn claim_searching_participants(
        &mut self,
        tournament_id: TournamentId,
        user_ids: &[UserId],
    ) -> Result<bool, CoreError> {
        let locked = tournament_participants::Entity::find()
            .filter(tournament_participants::Column::TournamentId.eq(tournament_id))
            .filter(tournament_participants::Column::UserId.is_in(user_ids.iter().copied()))
            .filter(tournament_participants::Column::IsSearching.eq(true))
            .order_by_asc(tournament_participants::Column::UserId)
            .lock_exclusive()
            .all(&self.txn)
            .await?;
        if locked.len() != user_ids.len() {
            return Ok(false);
        }
        clear_searching(&self.txn, tournament_id, Some(user_ids)).await?;
        Ok(true)
    }

    async fn clear_all_searching(
        &mut self,
        tournament_id: TournamentId,
    ) -> Result<u64, CoreError> {
        clear_searching(&self.txn, tournament_id, None).await
    }

    async fn commit(self: Box<Self>) -> Result<(), CoreError> {
        self.txn.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) {
        let _ = self.txn.rollback().await;
    }
}

async fn clear_searching(
    txn: &DatabaseTransaction,
    tournament_id: TournamentId,
    only: Option<&[UserId]>,
) -> Result<u64, CoreError> {
    let mut update = tournament_participants::Entity::update_many()
        .col_expr(tournament_participants::Column::IsSearching, Expr::value(false))
        .col_expr(
            tournament_participants::Column::SearchingSince,
            Expr::value(Option::<DateTime<Utc>>::None),
        )
        .filter(tournament_participants::Column::TournamentId.eq(tournament_id))
        .filter(tournament_participants::Column::IsSearching.eq(true));
    if let Some(user_ids) = only {
        update = update
            .filter(tournament_participants::Column::UserId.is_in(user_ids.iter().copied()));
    }
    let result = update.exec(txn).await?;
    Ok(result.rows_affected)
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

fn to_i32(value: u32) -> Result<i32, CoreError> {
    i32::try_from(value).map_err(|_| CoreError::validation("value exceeds supported range"))
}

fn to_u32(value: i32) -> Result<u32, CoreError> {
    u32::try_from(value).map_err(|_| CoreError::storage("negative value in unsigned column"))
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, CoreError> {
    serde_json::to_value(value).map_err(|err| CoreError::storage(err.to_string()))
}

fn from_json<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, CoreError> {
    serde_json::from_value(value).map_err(|err| CoreError::storage(err.to_string()))
}

fn time_control(initial: i32, increment: i32) -> Result<TimeControl, CoreError> {
    Ok(TimeControl::new(to_u32(initial)?, to_u32(increment)?))
}

fn user_from_model(model: users::Model) -> User {
    User {
        id: model.id,
        reference: UserRef::from_uuid(model.reference),
        display_name: model.display_name,
        is_active: model.is_active,
    }
}

fn queue_entry_from_model(model: queue_entries::Model) -> Result<QueueEntry, CoreError> {
    Ok(QueueEntry {
        id: model.id,
        reference: QueueRef::from_uuid(model.reference),
        user_id: model.user_id,
        filters: MatchFilters {
            legend_ref: model.legend_ref,
            opening_ref: model.opening_ref,
        },
        time_control: time_control(model.initial_time_seconds, model.increment_seconds)?,
        stake_amount: model.stake_amount,
        status: model.status.into(),
        created_at: model.created_at,
        expires_at: model.expires_at,
        matched_game_id: model.matched_game_id,
    })
}

fn game_from_model(model: games::Model) -> Result<Game, CoreError> {
    Ok(Game {
        id: model.id,
        reference: GameRef::from_uuid(model.reference),
        creator_id: model.creator_id,
        opponent_id: model.opponent_id,
        tournament_id: model.tournament_id,
        stake_amount: model.stake_amount,
        total_pot: model.total_pot,
        platform_fee_amount: model.platform_fee_amount,
        status: model.status.into(),
        filters: MatchFilters {
            legend_ref: model.legend_ref,
            opening_ref: model.opening_ref,
        },
        starting_fen: model.starting_fen,
        time_control: time_control(model.initial_time_seconds, model.increment_seconds)?,
        creator_time_remaining: model.creator_time_remaining,
        opponent_time_remaining: model.opponent_time_remaining,
        last_move_at: model.last_move_at,
        game_data: from_json(model.game_data)?,
        invite_code: model.invite_code,
        expires_at: model.expires_at,
        result: model.result.map(from_json).transpose()?,
        created_at: model.created_at,
        started_at: model.started_at,
        completed_at: model.completed_at,
    })
}

fn tournament_from_model(model: tournaments::Model) -> Result<Tournament, CoreError> {
    Ok(Tournament {
        id: model.id,
        reference: TournamentRef::from_uuid(model.reference),
        created_by_user_id: model.created_by_user_id,
        name: model.name,
        mode: from_json(model.mode)?,
        status: model.status.into(),
        max_participants: model.max_participants.map(to_u32).transpose()?,
        time_control: time_control(model.initial_time_seconds, model.increment_seconds)?,
        stake_amount: model.stake_amount,
        duration_minutes: to_u32(model.duration_minutes)?,
        created_at: model.created_at,
        started_at: model.started_at,
        ends_at: model.ends_at,
        completed_at: model.completed_at,
    })
}

fn participant_from_model(
    model: tournament_participants::Model,
) -> Result<TournamentParticipant, CoreError> {
    Ok(TournamentParticipant {
        tournament_id: model.tournament_id,
        user_id: model.user_id,
        is_searching: model.is_searching,
        searching_since: model.searching_since,
        points: to_u32(model.points)?,
        wins: to_u32(model.wins)?,
        losses: to_u32(model.losses)?,
        draws: to_u32(model.draws)?,
        games_played: to_u32(model.games_played)?,
        joined_at: model.joined_at,
    })
}

fn participant_to_active(
    participant: &TournamentParticipant,
) -> Result<tournament_participants::ActiveModel, CoreError> {
    Ok(tournament_participants::ActiveModel {
        tournament_id: Set(participant.tournament_id),
        user_id: Set(participant.user_id),
        is_searching: Set(participant.is_searching),
        searching_since: Set(participant.searching_since),
        points: Set(to_i32(participant.points)?),
        wins: Set(to_i32(participant.wins)?),
        losses: Set(to_i32(participant.losses)?),
        draws: Set(to_i32(participant.draws)?),
        games_played: Set(to_i32(participant.games_played)?),
        joined_at: Set(participant.joined_at),
    })
}

impl From<DbQueueStatus> for QueueStatus {
    fn from(value: DbQueueStatus) -> Self {
        match value {
            DbQueueStatus::Waiting => Self::Waiting,
            DbQueueStatus::Matched => Self::Matched,
            DbQueueStatus::Cancelled => Self::Cancelled,
            DbQueueStatus::Expired => Self::Expired,
        }
    }
}

impl From<GameStatus> for DbGameStatus {
    fn from(value: GameStatus) -> Self {
        match value {
            GameStatus::WaitingForOpponent => Self::WaitingForOpponent,
            GameStatus::InProgress => Self::InProgress,
            GameStatus::Completed => Self::Completed,
            GameStatus::Cancelled => Self::Cancelled,
        }
    }
}

impl From<DbGameStatus> for GameStatus {
    fn from(value: DbGameStatus) -> Self {
        match value {
            DbGameStatus::WaitingForOpponent => Self::WaitingForOpponent,
            DbGameStatus::InProgress => Self::InProgress,
            DbGameStatus::Completed => Self::Completed,
            DbGameStatus::Cancelled => Self::Cancelled,
        }
    }
}

impl From<TournamentStatus> for DbTournamentStatus {
    fn from(value: TournamentStatus) -> Self {
        match value {
            TournamentStatus::Lobby => Self::Lobby,
            TournamentStatus::Active => Self::Active,
            TournamentStatus::Completed => Self::Completed,
        }
    }
}

impl From<DbTournamentStatus> for TournamentStatus {
    fn from(value: DbTournamentStatus) -> Self {
        match value {
            DbTournamentStatus::Lobby => Self::Lobby,
            DbTournamentStatus::Active => Self::Active,
            DbTournamentStatus::Completed => Self::Completed,
        }
    }
}

impl From<WalletEntryKind> for DbWalletEntryKind {
    fn from(value: WalletEntryKind) -> Self {
        match value {
            WalletEntryKind::Lock => Self::Lock,
            WalletEntryKind::Release => Self::Release,
            WalletEntryKind::SettleWin => Self::SettleWin,
            WalletEntryKind::SettleLoss => Self::SettleLoss,
            WalletEntryKind::PlatformFee => Self::PlatformFee,
            WalletEntryKind::DrawRelease => Self::DrawRelease,
        }
    }
}

impl From<DbWalletEntryKind> for WalletEntryKind {
    fn from(value: DbWalletEntryKind) -> Self {
        match value {
            DbWalletEntryKind::Lock => Self::Lock,
            DbWalletEntryKind::Release => Self::Release,
            DbWalletEntryKind::SettleWin => Self::SettleWin,
            DbWalletEntryKind::SettleLoss => Self::SettleLoss,
            DbWalletEntryKind::PlatformFee => Self::PlatformFee,
            DbWalletEntryKind::DrawRelease => Self::DrawRelease,
        }
    }
}

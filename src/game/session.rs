use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::config::ClockPolicy;
use crate::context::CoreContext;
use crate::error::{CoreError, CoreResult};
use crate::matchmaking::validation::{validate_stake, validate_time_control};
use crate::model::{Game, NewGame, STANDARD_START_FEN};
use crate::notify::{fan_out, CoreEvent, Topic};
use crate::store::CoreStorageTxn;
use crate::tournament::record_result;
use crate::types::{
    Color, GameRef, GameResult, GameStatus, MatchFilters, Outcome, ResultReason, UserId, UserRef,
};
use crate::wallet::{
    load_active_user, lock_stake, release_stake, settle_draw, settle_win, user_ref, Settlement,
};

use super::clock::{clocks_after_move, clocks_for_heartbeat, ClockVerdict};
use super::types::{
    CancelReason, ClockUpdate, GameView, InviteGameRequest, MoveRequest, ResolveOutcome,
};
use super::validation::{validate_fen, validate_history, validate_promotion, validate_square};

const LOG_TARGET: &str = "wager_chess::game";

const INVITE_CODE_LEN: usize = 8;
const INVITE_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const INVITE_CODE_ATTEMPTS: usize = 5;

fn generate_invite_code() -> String {
    let mut rng = rand::thread_rng();
    (0..INVITE_CODE_LEN)
        .map(|_| INVITE_CODE_ALPHABET[rng.gen_range(0..INVITE_CODE_ALPHABET.len())] as char)
        .collect()
}

fn normalize_invite_code(code: &str) -> CoreResult<String> {
    let code = code.trim().to_ascii_uppercase();
    let well_formed = code.len() == INVITE_CODE_LEN
        && code.bytes().all(|b| INVITE_CODE_ALPHABET.contains(&b));
    if !well_formed {
        return Err(CoreError::validation("malformed invite code"));
    }
    Ok(code)
}

/// Builds the client-facing projection of `game`.
pub(crate) async fn game_view(
    txn: &mut dyn CoreStorageTxn,
    game: &Game,
) -> CoreResult<GameView> {
    let white = user_ref(txn, game.creator_id).await?;
    let black = match game.opponent_id {
        Some(id) => Some(user_ref(txn, id).await?),
        None => None,
    };
    let tournament_ref = match game.tournament_id {
        Some(id) => txn.load_tournament_by_id(id).await?.map(|t| t.reference),
        None => None,
    };
    Ok(GameView {
        game_ref: game.reference,
        status: game.status,
        white,
        black,
        tournament_ref,
        stake_amount: game.stake_amount,
        total_pot: game.total_pot,
        platform_fee_amount: game.platform_fee_amount,
        time_control: game.time_control,
        starting_fen: game.starting_fen.clone(),
        fen: game.game_data.fen.clone(),
        moves: game.game_data.moves.clone(),
        side_to_move: game.side_to_move(),
        white_time_remaining: game.creator_time_remaining,
        black_time_remaining: game.opponent_time_remaining,
        last_move_at: game.last_move_at,
        invite_code: game.invite_code.clone(),
        expires_at: game.expires_at,
        result: game.result,
        created_at: game.created_at,
        started_at: game.started_at,
        completed_at: game.completed_at,
    })
}

async fn lock_existing(txn: &mut dyn CoreStorageTxn, reference: GameRef) -> CoreResult<Game> {
    txn.lock_game(reference)
        .await?
        .ok_or(CoreError::NotFound("game"))
}

fn ensure_in_progress(game: &Game) -> CoreResult<()> {
    if game.status != GameStatus::InProgress {
        return Err(CoreError::GameNotInProgress);
    }
    Ok(())
}

/// Completes `game` with `result` and settles the pot.
async fn finalize(
    txn: &mut dyn CoreStorageTxn,
    game: &mut Game,
    result: GameResult,
    now: DateTime<Utc>,
) -> CoreResult<()> {
    let white = game.creator_id;
    let black = game
        .opponent_id
        .ok_or_else(|| CoreError::invalid_state("running game has no opponent"))?;
    // Tournament rows before wallets, the order request_search takes them in.
    if let Some(tournament_id) = game.tournament_id {
        record_result(txn, tournament_id, white, black, result.outcome).await?;
    }
    match result.outcome.winner() {
        Some(color) => {
            let (winner, loser) = match color {
                Color::White => (white, black),
                Color::Black => (black, white),
            };
            settle_win(
                txn,
                Settlement {
                    winner,
                    loser,
                    stake: game.stake_amount,
                    fee: game.platform_fee_amount,
                    game_id: Some(game.id),
                },
                now,
            )
            .await?;
        }
        None => {
            settle_draw(txn, (white, black), game.stake_amount, Some(game.id), now).await?;
        }
    }
    game.status = GameStatus::Completed;
    game.result = Some(result);
    game.completed_at = Some(now);
    txn.save_game(game).await
}

async fn flag(
    txn: &mut dyn CoreStorageTxn,
    game: &mut Game,
    loser: Color,
    now: DateTime<Utc>,
) -> CoreResult<()> {
    match loser {
        Color::White => game.creator_time_remaining = 0,
        Color::Black => game.opponent_time_remaining = 0,
    }
    let result = GameResult::new(Outcome::win_for(loser.opposite()), ResultReason::Timeout);
    finalize(txn, game, result, now).await
}

fn completion_events(view: &GameView) -> Vec<(Topic, CoreEvent)> {
    let Some(result) = view.result else {
        return Vec::new();
    };
    let event = CoreEvent::GameCompleted {
        game_ref: view.game_ref,
        result,
    };
    let mut deliveries = vec![(Topic::Game(view.game_ref), event.clone())];
    if let Some(tournament_ref) = view.tournament_ref {
        deliveries.push((Topic::Tournament(tournament_ref), event));
    }
    deliveries
}

fn update_events(view: &GameView) -> Vec<(Topic, CoreEvent)> {
    if view.status == GameStatus::Completed {
        return completion_events(view);
    }
    vec![(
        Topic::Game(view.game_ref),
        CoreEvent::GameUpdated {
            game_ref: view.game_ref,
            move_count: view.moves.len(),
        },
    )]
}

#[derive(Clone)]
pub struct GameSessions {
    ctx: Arc<CoreContext>,
}

impl GameSessions {
    pub fn new(ctx: Arc<CoreContext>) -> Self {
        Self { ctx }
    }

    async fn commit_view(
        &self,
        txn: Box<dyn CoreStorageTxn>,
        result: CoreResult<GameView>,
    ) -> CoreResult<GameView> {
        match result {
            Ok(view) => {
                txn.commit().await?;
                Ok(view)
            }
            Err(err) => {
                txn.rollback().await;
                Err(err)
            }
        }
    }

    pub async fn get_game(&self, reference: GameRef) -> CoreResult<GameView> {
        let mut txn = self.ctx.storage.begin().await?;
        let result = async {
            let game = txn
                .load_game(reference)
                .await?
                .ok_or(CoreError::NotFound("game"))?;
            game_view(txn.as_mut(), &game).await
        }
        .await;
        txn.rollback().await;
        result
    }

    /// Opens a WAITING_FOR_OPPONENT game joinable through a one-off code and
    /// escrows the creator's stake.
    pub async fn create_invite_game(&self, request: InviteGameRequest) -> CoreResult<GameView> {
        let time_control =
            validate_time_control(request.initial_time_seconds, request.increment_seconds)?;
        let stake = validate_stake(request.stake_amount, &self.ctx.config, false)?;
        let now = self.ctx.now();
        let fee = self.ctx.config.platform_fee(stake);

        let mut txn = self.ctx.storage.begin().await?;
        let result = async {
            let creator = load_active_user(txn.as_mut(), request.creator).await?;
            let mut code = None;
            for _ in 0..INVITE_CODE_ATTEMPTS {
                let candidate = generate_invite_code();
                if txn.lock_game_by_invite(&candidate).await?.is_none() {
                    code = Some(candidate);
                    break;
                }
            }
            let code = code.ok_or_else(|| CoreError::storage("could not allocate invite code"))?;
            let game = txn
                .insert_game(NewGame {
                    reference: GameRef::new(),
                    creator_id: creator.id,
                    opponent_id: None,
                    tournament_id: None,
                    stake_amount: stake,
                    total_pot: stake * Decimal::TWO - fee,
                    platform_fee_amount: fee,
                    status: GameStatus::WaitingForOpponent,
                    filters: MatchFilters::none(),
                    starting_fen: STANDARD_START_FEN.to_string(),
                    time_control,
                    invite_code: Some(code),
                    expires_at: Some(now + self.ctx.config.invite_ttl),
                    created_at: now,
                    started_at: None,
                })
                .await?;
            lock_stake(txn.as_mut(), creator.id, stake, Some(game.id), now).await?;
            game_view(txn.as_mut(), &game).await
        }
        .await;
        let view = self.commit_view(txn, result).await?;
        info!(
            target = LOG_TARGET,
            game_ref = %view.game_ref,
            creator = %request.creator,
            "invite game created"
        );
        Ok(view)
    }

    /// Seats `user` as black in the game behind `code` and starts it.
    pub async fn join_by_invite(&self, code: &str, user: UserRef) -> CoreResult<GameView> {
        let code = normalize_invite_code(code)?;
        let now = self.ctx.now();
        let mut txn = self.ctx.storage.begin().await?;
        let result = async {
            let joiner = load_active_user(txn.as_mut(), user).await?;
            let mut game = txn
                .lock_game_by_invite(&code)
                .await?
                .ok_or(CoreError::NotFound("invite"))?;
            match game.status {
                GameStatus::Completed | GameStatus::Cancelled => {
                    return Err(CoreError::AlreadyResolved("game"))
                }
                GameStatus::InProgress => return Err(CoreError::GameAlreadyStarted),
                GameStatus::WaitingForOpponent => {}
            }
            if game.expires_at.is_some_and(|deadline| deadline < now) {
                return Err(CoreError::InviteExpired);
            }
            if game.creator_id == joiner.id {
                return Err(CoreError::validation("cannot join your own game"));
            }
            lock_stake(txn.as_mut(), joiner.id, game.stake_amount, Some(game.id), now).await?;
            game.opponent_id = Some(joiner.id);
            game.status = GameStatus::InProgress;
            game.started_at = Some(now);
            game.expires_at = None;
            txn.save_game(&game).await?;
            game_view(txn.as_mut(), &game).await
        }
        .await;
        let view = self.commit_view(txn, result).await?;
        info!(target = LOG_TARGET, game_ref = %view.game_ref, %user, "invite redeemed");
        let deliveries = vec![
            (
                Topic::Game(view.game_ref),
                CoreEvent::GameStarted {
                    game_ref: view.game_ref,
                },
            ),
            (
                Topic::User(view.white),
                CoreEvent::MatchFound {
                    queue_ref: None,
                    game_ref: view.game_ref,
                    tournament_ref: None,
                    color: Color::White,
                },
            ),
        ];
        fan_out(self.ctx.notifier.as_ref(), deliveries).await;
        Ok(view)
    }

    /// Cancels every invite past its deadline and returns the creators'
    /// stakes.
    pub async fn expire_invites(&self) -> CoreResult<u64> {
        let now = self.ctx.now();
        let mut txn = self.ctx.storage.begin().await?;
        let result = async {
            let mut expired = Vec::new();
            for mut game in txn.lock_expired_invites(now).await? {
                release_stake(
                    txn.as_mut(),
                    game.creator_id,
                    game.stake_amount,
                    Some(game.id),
                    now,
                )
                .await?;
                game.status = GameStatus::Cancelled;
                game.completed_at = Some(now);
                txn.save_game(&game).await?;
                expired.push(game.reference);
            }
            Ok(expired)
        }
        .await;
        let expired = match result {
            Ok(expired) => {
                txn.commit().await?;
                expired
            }
            Err(err) => {
                txn.rollback().await;
                return Err(err);
            }
        };
        if !expired.is_empty() {
            info!(target = LOG_TARGET, count = expired.len(), "expired invites");
        }
        let deliveries = expired
            .iter()
            .map(|game_ref| {
                (
                    Topic::Game(*game_ref),
                    CoreEvent::GameCancelled {
                        game_ref: *game_ref,
                        reason: CancelReason::InviteExpired.describe().to_string(),
                    },
                )
            })
            .collect();
        fan_out(self.ctx.notifier.as_ref(), deliveries).await;
        Ok(expired.len() as u64)
    }

    /// Persists a legal move with the resulting position and clocks.
    pub async fn apply_move(&self, request: MoveRequest) -> CoreResult<GameView> {
        validate_square("from", &request.from)?;
        validate_square("to", &request.to)?;
        validate_promotion(request.promotion.as_deref())?;
        validate_fen(&request.fen)?;

        let now = self.ctx.now();
        let policy = self.ctx.config.clock_policy;
        let mut txn = self.ctx.storage.begin().await?;
        let result = async {
            let mut game = lock_existing(txn.as_mut(), request.game_ref).await?;
            ensure_in_progress(&game)?;
            let actor = txn
                .load_user(request.user)
                .await?
                .ok_or(CoreError::UserNotFound)?;
            let mover = game.color_of(actor.id).ok_or(CoreError::NotAParticipant)?;
            if mover != game.side_to_move() {
                return Err(CoreError::validation("it is not your turn"));
            }
            validate_history(&game.game_data.moves, &request.move_history)?;

            let verdict = clocks_after_move(
                &game,
                mover,
                request.white_time_remaining,
                request.black_time_remaining,
                policy,
                now,
            )?;
            match verdict {
                ClockVerdict::Flagged { loser } => {
                    flag(txn.as_mut(), &mut game, loser, now).await?;
                }
                ClockVerdict::Running { white, black } => {
                    game.game_data.fen = request.fen.trim().to_string();
                    game.game_data.moves = request.move_history.clone();
                    game.creator_time_remaining = white;
                    game.opponent_time_remaining = black;
                    game.last_move_at = Some(now);
                    txn.save_game(&game).await?;
                }
            }
            game_view(txn.as_mut(), &game).await
        }
        .await;
        let view = self.commit_view(txn, result).await?;
        debug!(
            target = LOG_TARGET,
            game_ref = %view.game_ref,
            moves = view.moves.len(),
            status = ?view.status,
            "move applied"
        );
        fan_out(self.ctx.notifier.as_ref(), update_events(&view)).await;
        Ok(view)
    }

    /// Heartbeat clock sync. A clock reported at zero ends the game on time.
    pub async fn update_clocks(&self, update: ClockUpdate) -> CoreResult<GameView> {
        let now = self.ctx.now();
        let policy = self.ctx.config.clock_policy;
        let mut txn = self.ctx.storage.begin().await?;
        let result = async {
            let mut game = lock_existing(txn.as_mut(), update.game_ref).await?;
            ensure_in_progress(&game)?;
            let actor = txn
                .load_user(update.user)
                .await?
                .ok_or(CoreError::UserNotFound)?;
            game.color_of(actor.id).ok_or(CoreError::NotAParticipant)?;

            let verdict = clocks_for_heartbeat(
                &game,
                update.white_time_remaining,
                update.black_time_remaining,
                update.last_move_at,
                policy,
                now,
            )?;
            match verdict {
                ClockVerdict::Flagged { loser } => {
                    flag(txn.as_mut(), &mut game, loser, now).await?;
                }
                ClockVerdict::Running { white, black } => {
                    game.creator_time_remaining = white;
                    game.opponent_time_remaining = black;
                    if policy == ClockPolicy::TrustClient {
                        game.last_move_at = Some(update.last_move_at);
                    }
                    txn.save_game(&game).await?;
                }
            }
            game_view(txn.as_mut(), &game).await
        }
        .await;
        let view = self.commit_view(txn, result).await?;
        if view.status == GameStatus::Completed {
            info!(target = LOG_TARGET, game_ref = %view.game_ref, "flag fall");
            fan_out(self.ctx.notifier.as_ref(), completion_events(&view)).await;
        }
        Ok(view)
    }

    /// Completes a running game and settles it. Resolving a game that is
    /// already COMPLETED changes nothing.
    pub async fn resolve(
        &self,
        reference: GameRef,
        result: GameResult,
    ) -> CoreResult<ResolveOutcome> {
        let now = self.ctx.now();
        let mut txn = self.ctx.storage.begin().await?;
        let outcome = async {
            let mut game = lock_existing(txn.as_mut(), reference).await?;
            match game.status {
                GameStatus::Completed => {
                    return Ok(ResolveOutcome::AlreadyCompleted(
                        game_view(txn.as_mut(), &game).await?,
                    ))
                }
                GameStatus::Cancelled => return Err(CoreError::AlreadyResolved("game")),
                GameStatus::WaitingForOpponent => return Err(CoreError::GameNotInProgress),
                GameStatus::InProgress => {}
            }
            finalize(txn.as_mut(), &mut game, result, now).await?;
            Ok(ResolveOutcome::Resolved(game_view(txn.as_mut(), &game).await?))
        }
        .await;
        match outcome {
            Ok(ResolveOutcome::Resolved(view)) => {
                txn.commit().await?;
                info!(
                    target = LOG_TARGET,
                    game_ref = %view.game_ref,
                    outcome = ?result.outcome,
                    reason = ?result.reason,
                    "game resolved"
                );
                fan_out(self.ctx.notifier.as_ref(), completion_events(&view)).await;
                Ok(ResolveOutcome::Resolved(view))
            }
            Ok(already) => {
                txn.rollback().await;
                debug!(target = LOG_TARGET, game_ref = %reference, "duplicate resolution ignored");
                Ok(already)
            }
            Err(err) => {
                txn.rollback().await;
                Err(err)
            }
        }
    }

    /// Ends a game outside normal play. Waiting games and aborted games
    /// return every stake; an abandoned game is settled as a win for the
    /// side that stayed.
    pub async fn cancel(&self, reference: GameRef, reason: CancelReason) -> CoreResult<GameView> {
        let now = self.ctx.now();
        let mut txn = self.ctx.storage.begin().await?;
        let result = async {
            let mut game = lock_existing(txn.as_mut(), reference).await?;
            apply_cancel(txn.as_mut(), &mut game, reason, now).await?;
            game_view(txn.as_mut(), &game).await
        }
        .await;
        let view = self.commit_view(txn, result).await?;
        self.announce_cancel(&view, reason).await;
        Ok(view)
    }

    /// Cancel on behalf of a participant, picking the reason from the game's
    /// state under the game lock: withdraw a waiting invite, abort before the
    /// first move, or forfeit a running game.
    pub async fn leave(&self, reference: GameRef, user: UserRef) -> CoreResult<GameView> {
        let now = self.ctx.now();
        let mut txn = self.ctx.storage.begin().await?;
        let result = async {
            let actor = txn.load_user(user).await?.ok_or(CoreError::UserNotFound)?;
            let mut game = lock_existing(txn.as_mut(), reference).await?;
            let color = game.color_of(actor.id).ok_or(CoreError::NotAParticipant)?;
            let reason = match game.status {
                GameStatus::WaitingForOpponent => CancelReason::CreatorWithdrew,
                GameStatus::InProgress if game.game_data.moves.is_empty() => {
                    CancelReason::Aborted
                }
                GameStatus::InProgress => CancelReason::Abandoned { by: color },
                GameStatus::Completed | GameStatus::Cancelled => {
                    return Err(CoreError::AlreadyResolved("game"))
                }
            };
            apply_cancel(txn.as_mut(), &mut game, reason, now).await?;
            Ok::<_, CoreError>((game_view(txn.as_mut(), &game).await?, reason))
        }
        .await;
        let (view, reason) = match result {
            Ok(done) => {
                txn.commit().await?;
                done
            }
            Err(err) => {
                txn.rollback().await;
                return Err(err);
            }
        };
        self.announce_cancel(&view, reason).await;
        Ok(view)
    }

    async fn announce_cancel(&self, view: &GameView, reason: CancelReason) {
        info!(
            target = LOG_TARGET,
            game_ref = %view.game_ref,
            reason = reason.describe(),
            status = ?view.status,
            "game cancelled"
        );
        let deliveries = if view.status == GameStatus::Completed {
            completion_events(view)
        } else {
            vec![(
                Topic::Game(view.game_ref),
                CoreEvent::GameCancelled {
                    game_ref: view.game_ref,
                    reason: reason.describe().to_string(),
                },
            )]
        };
        fan_out(self.ctx.notifier.as_ref(), deliveries).await;
    }
}

/// Applies `reason` to a game locked by the caller's transaction.
async fn apply_cancel(
    txn: &mut dyn CoreStorageTxn,
    game: &mut Game,
    reason: CancelReason,
    now: DateTime<Utc>,
) -> CoreResult<()> {
    match (game.status, reason) {
        (GameStatus::Completed | GameStatus::Cancelled, _) => {
            Err(CoreError::AlreadyResolved("game"))
        }
        (
            GameStatus::WaitingForOpponent,
            CancelReason::InviteExpired | CancelReason::CreatorWithdrew,
        ) => {
            release_stake(txn, game.creator_id, game.stake_amount, Some(game.id), now).await?;
            game.status = GameStatus::Cancelled;
            game.completed_at = Some(now);
            txn.save_game(game).await
        }
        (GameStatus::InProgress, CancelReason::Aborted) => {
            if !game.game_data.moves.is_empty() {
                return Err(CoreError::invalid_state(
                    "a game with moves cannot be aborted",
                ));
            }
            let opponent = game
                .opponent_id
                .ok_or_else(|| CoreError::invalid_state("running game has no opponent"))?;
            for user_id in ordered(game.creator_id, opponent) {
                release_stake(txn, user_id, game.stake_amount, Some(game.id), now).await?;
            }
            game.status = GameStatus::Cancelled;
            game.completed_at = Some(now);
            txn.save_game(game).await
        }
        (GameStatus::InProgress, CancelReason::Abandoned { by }) => {
            let result =
                GameResult::new(Outcome::win_for(by.opposite()), ResultReason::Abandonment);
            finalize(txn, game, result, now).await
        }
        (status, reason) => Err(CoreError::invalid_state(format!(
            "cannot cancel a {status:?} game: {}",
            reason.describe()
        ))),
    }
}

fn ordered(a: UserId, b: UserId) -> [UserId; 2] {
    if a <= b {
        [a, b]
    } else {
        [b, a]
    }
}

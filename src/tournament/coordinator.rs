use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::{CoreConfig, MAX_TOURNAMENT_MINUTES, MIN_TOURNAMENT_MINUTES};
use crate::context::CoreContext;
use crate::error::{CoreError, CoreResult};
use crate::matchmaking::pairing::{open_paired_game, Pairing, PairingError};
use crate::matchmaking::validation::{validate_filters, validate_stake, validate_time_control};
use crate::model::{NewTournament, Tournament, TournamentMode, TournamentParticipant};
use crate::notify::{fan_out, CoreEvent, Topic};
use crate::store::CoreStorageTxn;
use crate::types::{
    Amount, Color, GameRef, TimeControl, TournamentRef, TournamentStatus, UserId, UserRef,
};
use crate::wallet::{load_active_user, user_ref};

use super::standings::rank;
use super::types::{SearchOutcome, StandingView, TournamentConfig, TournamentView};

const LOG_TARGET: &str = "wager_chess::tournament";
const MAX_NAME_LEN: usize = 80;

struct ValidatedConfig {
    name: String,
    mode: TournamentMode,
    max_participants: Option<u32>,
    time_control: TimeControl,
    stake_amount: Amount,
    duration_minutes: u32,
}

fn required_filter(name: &str, value: Option<String>) -> CoreResult<String> {
    value.ok_or_else(|| CoreError::validation(format!("{name} is required")))
}

fn validate_config(config: TournamentConfig, core: &CoreConfig) -> CoreResult<ValidatedConfig> {
    let name = config.name.trim();
    if name.is_empty() {
        return Err(CoreError::validation("name is required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(CoreError::validation(format!(
            "name cannot exceed {MAX_NAME_LEN} characters"
        )));
    }
    if !(MIN_TOURNAMENT_MINUTES..=MAX_TOURNAMENT_MINUTES).contains(&config.duration_minutes) {
        return Err(CoreError::validation(format!(
            "duration_minutes must be between {MIN_TOURNAMENT_MINUTES} and {MAX_TOURNAMENT_MINUTES}"
        )));
    }
    if config.max_participants.is_some_and(|max| max < 2) {
        return Err(CoreError::validation("max_participants must be at least 2"));
    }
    let mode = match config.mode {
        TournamentMode::Standard => TournamentMode::Standard,
        TournamentMode::Legend { legend_ref } => TournamentMode::Legend {
            legend_ref: required_filter(
                "legend_ref",
                validate_filters(Some(legend_ref), None)?.legend_ref,
            )?,
        },
        TournamentMode::Opening { opening_ref } => TournamentMode::Opening {
            opening_ref: required_filter(
                "opening_ref",
                validate_filters(None, Some(opening_ref))?.opening_ref,
            )?,
        },
    };
    Ok(ValidatedConfig {
        name: name.to_string(),
        mode,
        max_participants: config.max_participants,
        time_control: validate_time_control(
            config.initial_time_seconds,
            config.increment_seconds,
        )?,
        stake_amount: validate_stake(config.stake_amount, core, true)?,
        duration_minutes: config.duration_minutes,
    })
}

/// Completes an ACTIVE tournament whose deadline has passed and clears every
/// search flag. Returns whether the transition happened.
pub(crate) async fn auto_complete_if_expired(
    txn: &mut dyn CoreStorageTxn,
    tournament: &mut Tournament,
    now: DateTime<Utc>,
) -> CoreResult<bool> {
    let expired = tournament.status == TournamentStatus::Active
        && tournament.ends_at.is_some_and(|ends_at| ends_at < now);
    if !expired {
        return Ok(false);
    }
    tournament.status = TournamentStatus::Completed;
    tournament.completed_at = Some(now);
    txn.save_tournament(tournament).await?;
    let cleared = txn.clear_all_searching(tournament.id).await?;
    info!(
        target = LOG_TARGET,
        tournament = %tournament.reference,
        cleared,
        "tournament expired"
    );
    Ok(true)
}

async fn lock_existing(
    txn: &mut dyn CoreStorageTxn,
    reference: TournamentRef,
) -> CoreResult<Tournament> {
    txn.lock_tournament(reference)
        .await?
        .ok_or(CoreError::NotFound("tournament"))
}

async fn participant(
    txn: &mut dyn CoreStorageTxn,
    tournament: &Tournament,
    user_id: UserId,
) -> CoreResult<TournamentParticipant> {
    txn.load_participant(tournament.id, user_id)
        .await?
        .ok_or(CoreError::NotAParticipant)
}

pub(crate) async fn tournament_view(
    txn: &mut dyn CoreStorageTxn,
    tournament: &Tournament,
) -> CoreResult<TournamentView> {
    let mut participants = txn.list_participants(tournament.id).await?;
    rank(&mut participants);
    let mut standings = Vec::with_capacity(participants.len());
    for p in participants {
        let user = txn
            .load_user_by_id(p.user_id)
            .await?
            .ok_or(CoreError::UserNotFound)?;
        standings.push(StandingView {
            user: user.reference,
            display_name: user.display_name,
            points: p.points,
            wins: p.wins,
            losses: p.losses,
            draws: p.draws,
            games_played: p.games_played,
            is_searching: p.is_searching,
        });
    }
    Ok(TournamentView {
        tournament_ref: tournament.reference,
        name: tournament.name.clone(),
        mode: tournament.mode.clone(),
        status: tournament.status,
        created_by: user_ref(txn, tournament.created_by_user_id).await?,
        max_participants: tournament.max_participants,
        time_control: tournament.time_control,
        stake_amount: tournament.stake_amount,
        duration_minutes: tournament.duration_minutes,
        created_at: tournament.created_at,
        started_at: tournament.started_at,
        ends_at: tournament.ends_at,
        completed_at: tournament.completed_at,
        standings,
    })
}

enum SearchStep {
    Waiting,
    FundsFailed {
        user_id: UserId,
        error: CoreError,
    },
    Matched {
        game_ref: GameRef,
        white: UserRef,
        black: UserRef,
    },
}

#[derive(Clone)]
pub struct TournamentCoordinator {
    ctx: Arc<CoreContext>,
}

impl TournamentCoordinator {
    pub fn new(ctx: Arc<CoreContext>) -> Self {
        Self { ctx }
    }

    /// Commits when the operation succeeded or when it lazily completed the
    /// tournament before failing; rolls back otherwise.
    async fn finish<T>(
        &self,
        txn: Box<dyn CoreStorageTxn>,
        result: CoreResult<T>,
        lapsed: bool,
        reference: TournamentRef,
    ) -> CoreResult<T> {
        let result = match result {
            Ok(value) => {
                txn.commit().await?;
                Ok(value)
            }
            Err(err) if lapsed => {
                txn.commit().await?;
                Err(err)
            }
            Err(err) => {
                txn.rollback().await;
                Err(err)
            }
        };
        if lapsed {
            self.publish(vec![(
                Topic::Tournament(reference),
                CoreEvent::TournamentCompleted {
                    tournament_ref: reference,
                },
            )])
            .await;
        }
        result
    }

    async fn publish(&self, deliveries: Vec<(Topic, CoreEvent)>) {
        fan_out(self.ctx.notifier.as_ref(), deliveries).await;
    }

    fn updated(view: &TournamentView) -> Vec<(Topic, CoreEvent)> {
        vec![(
            Topic::Tournament(view.tournament_ref),
            CoreEvent::TournamentUpdated {
                tournament_ref: view.tournament_ref,
                status: view.status,
            },
        )]
    }

    /// Opens a LOBBY tournament with its creator as the first participant.
    pub async fn create(
        &self,
        creator: UserRef,
        config: TournamentConfig,
    ) -> CoreResult<TournamentView> {
        let parts = validate_config(config, &self.ctx.config)?;
        let now = self.ctx.now();
        let mut txn = self.ctx.storage.begin().await?;
        let result = async {
            let owner = load_active_user(txn.as_mut(), creator).await?;
            let tournament = txn
                .insert_tournament(NewTournament {
                    reference: TournamentRef::new(),
                    created_by_user_id: owner.id,
                    name: parts.name,
                    mode: parts.mode,
                    max_participants: parts.max_participants,
                    time_control: parts.time_control,
                    stake_amount: parts.stake_amount,
                    duration_minutes: parts.duration_minutes,
                    created_at: now,
                })
                .await?;
            txn.insert_participant(TournamentParticipant::new(tournament.id, owner.id, now))
                .await?;
            tournament_view(txn.as_mut(), &tournament).await
        }
        .await;
        let view = match result {
            Ok(view) => {
                txn.commit().await?;
                view
            }
            Err(err) => {
                txn.rollback().await;
                return Err(err);
            }
        };
        info!(
            target = LOG_TARGET,
            tournament = %view.tournament_ref,
            %creator,
            "tournament created"
        );
        Ok(view)
    }

    /// Reads a tournament, completing it first if its deadline has passed.
    pub async fn get_tournament(&self, reference: TournamentRef) -> CoreResult<TournamentView> {
        let now = self.ctx.now();
        let mut txn = self.ctx.storage.begin().await?;
        let mut lapsed = false;
        let result = async {
            let mut tournament = lock_existing(txn.as_mut(), reference).await?;
            lapsed = auto_complete_if_expired(txn.as_mut(), &mut tournament, now).await?;
            tournament_view(txn.as_mut(), &tournament).await
        }
        .await;
        self.finish(txn, result, lapsed, reference).await
    }

    /// Adds `user` to the tournament. Joining twice is a no-op.
    pub async fn join(&self, reference: TournamentRef, user: UserRef) -> CoreResult<TournamentView> {
        let now = self.ctx.now();
        let mut txn = self.ctx.storage.begin().await?;
        let mut lapsed = false;
        let mut joined = false;
        let result = async {
            let mut tournament = lock_existing(txn.as_mut(), reference).await?;
            lapsed = auto_complete_if_expired(txn.as_mut(), &mut tournament, now).await?;
            if !tournament.status.accepts_participants() {
                return Err(CoreError::NotAcceptingParticipants);
            }
            let member = load_active_user(txn.as_mut(), user).await?;
            if txn.load_participant(tournament.id, member.id).await?.is_none() {
                if let Some(max) = tournament.max_participants {
                    if txn.count_participants(tournament.id).await? >= u64::from(max) {
                        return Err(CoreError::TournamentFull);
                    }
                }
                txn.insert_participant(TournamentParticipant::new(tournament.id, member.id, now))
                    .await?;
                joined = true;
            }
            tournament_view(txn.as_mut(), &tournament).await
        }
        .await;
        let view = self.finish(txn, result, lapsed, reference).await?;
        if joined {
            info!(target = LOG_TARGET, tournament = %reference, %user, "participant joined");
            self.publish(Self::updated(&view)).await;
        }
        Ok(view)
    }

    /// LOBBY -> ACTIVE. Only the creator may start; the deadline is fixed now.
    pub async fn start(
        &self,
        reference: TournamentRef,
        requester: UserRef,
    ) -> CoreResult<TournamentView> {
        let now = self.ctx.now();
        let mut txn = self.ctx.storage.begin().await?;
        let mut lapsed = false;
        let result = async {
            let mut tournament = lock_existing(txn.as_mut(), reference).await?;
            lapsed = auto_complete_if_expired(txn.as_mut(), &mut tournament, now).await?;
            let actor = txn
                .load_user(requester)
                .await?
                .ok_or(CoreError::UserNotFound)?;
            if actor.id != tournament.created_by_user_id {
                return Err(CoreError::Forbidden);
            }
            if tournament.status != TournamentStatus::Lobby {
                return Err(CoreError::invalid_state("tournament is not in the lobby"));
            }
            tournament.status = TournamentStatus::Active;
            tournament.started_at = Some(now);
            tournament.ends_at =
                Some(now + Duration::minutes(i64::from(tournament.duration_minutes)));
            txn.save_tournament(&tournament).await?;
            tournament_view(txn.as_mut(), &tournament).await
        }
        .await;
        let view = self.finish(txn, result, lapsed, reference).await?;
        info!(
            target = LOG_TARGET,
            tournament = %reference,
            ends_at = ?view.ends_at,
            "tournament started"
        );
        self.publish(Self::updated(&view)).await;
        Ok(view)
    }

    /// Early termination by the creator from LOBBY or ACTIVE.
    pub async fn end(
        &self,
        reference: TournamentRef,
        requester: UserRef,
    ) -> CoreResult<TournamentView> {
        let now = self.ctx.now();
        let mut txn = self.ctx.storage.begin().await?;
        let mut lapsed = false;
        let result = async {
            let mut tournament = lock_existing(txn.as_mut(), reference).await?;
            lapsed = auto_complete_if_expired(txn.as_mut(), &mut tournament, now).await?;
            let actor = txn
                .load_user(requester)
                .await?
                .ok_or(CoreError::UserNotFound)?;
            if actor.id != tournament.created_by_user_id {
                return Err(CoreError::Forbidden);
            }
            if tournament.status == TournamentStatus::Completed {
                return Err(CoreError::invalid_state("tournament is already completed"));
            }
            tournament.status = TournamentStatus::Completed;
            tournament.completed_at = Some(now);
            txn.save_tournament(&tournament).await?;
            txn.clear_all_searching(tournament.id).await?;
            tournament_view(txn.as_mut(), &tournament).await
        }
        .await;
        let view = self.finish(txn, result, lapsed, reference).await?;
        info!(target = LOG_TARGET, tournament = %reference, "tournament ended");
        self.publish(vec![(
            Topic::Tournament(reference),
            CoreEvent::TournamentCompleted {
                tournament_ref: reference,
            },
        )])
        .await;
        Ok(view)
    }

    /// Marks `user` as searching and tries to pair them with the participant
    /// that has been searching longest.
    pub async fn request_search(
        &self,
        reference: TournamentRef,
        user: UserRef,
    ) -> CoreResult<SearchOutcome> {
        let mut excluded: HashSet<UserId> = HashSet::new();
        for _ in 0..self.ctx.config.max_pairing_attempts {
            let now = self.ctx.now();
            let mut txn = self.ctx.storage.begin().await?;
            let mut lapsed = false;
            let mut requester_id = None;
            let step = async {
                let mut tournament = lock_existing(txn.as_mut(), reference).await?;
                lapsed = auto_complete_if_expired(txn.as_mut(), &mut tournament, now).await?;
                if tournament.status != TournamentStatus::Active {
                    return Err(CoreError::invalid_state("tournament is not active"));
                }
                let member = load_active_user(txn.as_mut(), user).await?;
                requester_id = Some(member.id);
                let mut me = participant(txn.as_mut(), &tournament, member.id).await?;
                if !me.is_searching {
                    me.is_searching = true;
                    me.searching_since = Some(now);
                    txn.save_participant(&me).await?;
                }
                self.search_pass(txn.as_mut(), &tournament, &me, &excluded, now)
                    .await
            }
            .await;

            match step {
                Ok(SearchStep::FundsFailed { user_id, error }) => {
                    txn.rollback().await;
                    if requester_id == Some(user_id) {
                        warn!(
                            target = LOG_TARGET,
                            tournament = %reference,
                            %user,
                            error = %error,
                            "requester could not escrow tournament stake"
                        );
                        return Err(error);
                    }
                    excluded.insert(user_id);
                    self.notify_pairing_failure(user_id, &error).await;
                }
                other => {
                    let step = self.finish(txn, other, lapsed, reference).await?;
                    return Ok(self.announce(step, reference).await);
                }
            }
        }
        debug!(target = LOG_TARGET, tournament = %reference, %user, "pairing attempts exhausted");
        Ok(SearchOutcome::Searching)
    }

    async fn search_pass(
        &self,
        txn: &mut dyn CoreStorageTxn,
        tournament: &Tournament,
        me: &TournamentParticipant,
        excluded: &HashSet<UserId>,
        now: DateTime<Utc>,
    ) -> CoreResult<SearchStep> {
        let candidate = txn
            .searching_participants(tournament.id)
            .await?
            .into_iter()
            .find(|p| p.user_id != me.user_id && !excluded.contains(&p.user_id));
        let Some(candidate) = candidate else {
            return Ok(SearchStep::Waiting);
        };
        if !txn
            .claim_searching_participants(tournament.id, &[candidate.user_id, me.user_id])
            .await?
        {
            return Ok(SearchStep::Waiting);
        }
        let pairing = Pairing {
            white: candidate.user_id,
            black: me.user_id,
            stake: tournament.stake_amount,
            time_control: tournament.time_control,
            filters: tournament.mode.filters(),
            tournament_id: Some(tournament.id),
        };
        match open_paired_game(txn, &pairing, &self.ctx.config, now).await {
            Ok(game) => Ok(SearchStep::Matched {
                game_ref: game.reference,
                white: user_ref(txn, pairing.white).await?,
                black: user_ref(txn, pairing.black).await?,
            }),
            Err(PairingError::Funds { user_id, error }) => {
                Ok(SearchStep::FundsFailed { user_id, error })
            }
            Err(PairingError::Other(err)) => Err(err),
        }
    }

    async fn notify_pairing_failure(&self, user_id: UserId, error: &CoreError) {
        let loaded = async {
            let mut txn = self.ctx.storage.begin().await?;
            let user = txn.load_user_by_id(user_id).await;
            txn.rollback().await;
            user
        }
        .await;
        match loaded {
            Ok(Some(user)) => {
                self.publish(vec![(
                    Topic::User(user.reference),
                    CoreEvent::PairingFailed {
                        reason: error.to_string(),
                    },
                )])
                .await;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(target = LOG_TARGET, user_id, error = %err, "could not notify participant");
            }
        }
    }

    async fn announce(&self, step: SearchStep, reference: TournamentRef) -> SearchOutcome {
        match step {
            SearchStep::Matched {
                game_ref,
                white,
                black,
            } => {
                info!(
                    target = LOG_TARGET,
                    tournament = %reference,
                    %game_ref,
                    %white,
                    %black,
                    "tournament pairing"
                );
                let found = |color| CoreEvent::MatchFound {
                    queue_ref: None,
                    game_ref,
                    tournament_ref: Some(reference),
                    color,
                };
                self.publish(vec![
                    (Topic::User(white), found(Color::White)),
                    (Topic::User(black), found(Color::Black)),
                    (Topic::Game(game_ref), CoreEvent::GameStarted { game_ref }),
                    (
                        Topic::Tournament(reference),
                        CoreEvent::TournamentUpdated {
                            tournament_ref: reference,
                            status: TournamentStatus::Active,
                        },
                    ),
                ])
                .await;
                SearchOutcome::Matched {
                    game_ref,
                    color: Color::Black,
                }
            }
            SearchStep::Waiting | SearchStep::FundsFailed { .. } => SearchOutcome::Searching,
        }
    }

    /// Stops searching. Succeeds whether or not the user was searching.
    pub async fn cancel_search(&self, reference: TournamentRef, user: UserRef) -> CoreResult<()> {
        let now = self.ctx.now();
        let mut txn = self.ctx.storage.begin().await?;
        let mut lapsed = false;
        let result = async {
            let mut tournament = lock_existing(txn.as_mut(), reference).await?;
            lapsed = auto_complete_if_expired(txn.as_mut(), &mut tournament, now).await?;
            let member = txn.load_user(user).await?.ok_or(CoreError::UserNotFound)?;
            let mut me = participant(txn.as_mut(), &tournament, member.id).await?;
            if me.is_searching {
                me.is_searching = false;
                me.searching_since = None;
                txn.save_participant(&me).await?;
            }
            Ok(())
        }
        .await;
        self.finish(txn, result, lapsed, reference).await
    }
}

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::context::CoreContext;
use crate::error::{CoreError, CoreResult};
use crate::model::{Game, NewQueueEntry, QueueEntry};
use crate::notify::{fan_out, CoreEvent, Topic};
use crate::store::CoreStorageTxn;
use crate::types::{Color, QueueEntryId, QueueRef, QueueStatus, UserId, UserRef};
use crate::wallet::{load_active_user, user_ref};

use super::pairing::{open_paired_game, Pairing, PairingError};
use super::types::{MatchRequest, MatchRequestOutcome, MatchStatusView};
use super::validation::{validate_filters, validate_stake, validate_time_control};

const LOG_TARGET: &str = "wager_chess::matchmaking";

/// Result of one pairing attempt, decided inside a single transaction.
enum PassStep {
    /// The requester already left WAITING (paired by a peer, cancelled or
    /// expired) before this attempt could look at it.
    Settled(QueueEntry),
    NoCandidate,
    /// Another pass claimed the candidate first.
    Contended(QueueEntryId),
    FundsFailed {
        user_id: UserId,
        candidate: QueueEntry,
        error: CoreError,
    },
    Matched {
        game: Game,
        white: UserRef,
        black: UserRef,
        opponent_queue: QueueRef,
    },
}

#[derive(Clone)]
pub struct MatchmakingQueue {
    ctx: Arc<CoreContext>,
}

impl MatchmakingQueue {
    pub fn new(ctx: Arc<CoreContext>) -> Self {
        Self { ctx }
    }

    /// Admits a WAITING ticket and runs an immediate pairing pass for it.
    pub async fn create_match_request(
        &self,
        request: MatchRequest,
    ) -> CoreResult<MatchRequestOutcome> {
        let time_control =
            validate_time_control(request.initial_time_seconds, request.increment_seconds)?;
        let stake = validate_stake(request.stake_amount, &self.ctx.config, false)?;
        let filters = validate_filters(request.legend_ref, request.opening_ref)?;

        let now = self.ctx.now();
        let mut txn = self.ctx.storage.begin().await?;
        let result = async {
            let user = load_active_user(txn.as_mut(), request.user).await?;
            if txn.find_waiting_entry(user.id).await?.is_some() {
                return Err(CoreError::AlreadyQueued);
            }
            let wallet = txn
                .lock_wallet(user.id)
                .await?
                .ok_or(CoreError::NotFound("wallet"))?;
            if wallet.available() < stake {
                return Err(CoreError::InsufficientFunds);
            }
            txn.insert_queue_entry(NewQueueEntry {
                reference: QueueRef::new(),
                user_id: user.id,
                filters,
                time_control,
                stake_amount: stake,
                created_at: now,
                expires_at: now + self.ctx.config.queue_timeout,
            })
            .await
        }
        .await;

        let entry = match result {
            Ok(entry) => {
                txn.commit().await?;
                entry
            }
            Err(err) => {
                txn.rollback().await;
                return Err(err);
            }
        };

        info!(
            target = LOG_TARGET,
            user = %request.user,
            queue_ref = %entry.reference,
            time_control = %entry.time_control,
            stake = %entry.stake_amount,
            "match request queued"
        );

        self.pair(entry, request.user).await
    }

    async fn pair(
        &self,
        entry: QueueEntry,
        requester: UserRef,
    ) -> CoreResult<MatchRequestOutcome> {
        let mut excluded: HashSet<QueueEntryId> = HashSet::new();
        for attempt in 0..self.ctx.config.max_pairing_attempts {
            let now = self.ctx.now();
            let mut txn = self.ctx.storage.begin().await?;
            let step = self.pairing_pass(txn.as_mut(), &entry, &excluded, now).await;

            match step {
                Ok(PassStep::Matched {
                    game,
                    white,
                    black,
                    opponent_queue,
                }) => {
                    txn.commit().await?;
                    info!(
                        target = LOG_TARGET,
                        game_ref = %game.reference,
                        %white,
                        %black,
                        attempt,
                        "paired"
                    );
                    let deliveries = vec![
                        (
                            Topic::User(white),
                            CoreEvent::MatchFound {
                                queue_ref: Some(opponent_queue),
                                game_ref: game.reference,
                                tournament_ref: None,
                                color: Color::White,
                            },
                        ),
                        (
                            Topic::User(black),
                            CoreEvent::MatchFound {
                                queue_ref: Some(entry.reference),
                                game_ref: game.reference,
                                tournament_ref: None,
                                color: Color::Black,
                            },
                        ),
                        (
                            Topic::Game(game.reference),
                            CoreEvent::GameStarted {
                                game_ref: game.reference,
                            },
                        ),
                    ];
                    fan_out(self.ctx.notifier.as_ref(), deliveries).await;
                    return Ok(MatchRequestOutcome::Matched {
                        queue_ref: entry.reference,
                        game_ref: game.reference,
                        color: Color::Black,
                    });
                }
                Ok(PassStep::Settled(current)) => {
                    txn.rollback().await;
                    return self.settled_outcome(current).await;
                }
                Ok(PassStep::NoCandidate) => {
                    txn.rollback().await;
                    return Ok(MatchRequestOutcome::Queued {
                        queue_ref: entry.reference,
                        expires_at: entry.expires_at,
                    });
                }
                Ok(PassStep::Contended(candidate)) => {
                    txn.rollback().await;
                    debug!(target = LOG_TARGET, candidate, "candidate claimed elsewhere");
                    excluded.insert(candidate);
                }
                Ok(PassStep::FundsFailed {
                    user_id,
                    candidate,
                    error,
                }) => {
                    txn.rollback().await;
                    if user_id == entry.user_id {
                        warn!(
                            target = LOG_TARGET,
                            user = %requester,
                            error = %error,
                            "requester could not escrow stake; withdrawing ticket"
                        );
                        self.withdraw_after_failed_lock(entry.id).await;
                        return Err(error);
                    }
                    excluded.insert(candidate.id);
                    self.notify_candidate_failure(candidate.user_id, &error).await;
                }
                Err(err) => {
                    txn.rollback().await;
                    return Err(err);
                }
            }
        }

        debug!(
            target = LOG_TARGET,
            queue_ref = %entry.reference,
            "pairing attempts exhausted; ticket stays queued"
        );
        Ok(MatchRequestOutcome::Queued {
            queue_ref: entry.reference,
            expires_at: entry.expires_at,
        })
    }

    async fn pairing_pass(
        &self,
        txn: &mut dyn CoreStorageTxn,
        entry: &QueueEntry,
        excluded: &HashSet<QueueEntryId>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> CoreResult<PassStep> {
        let current = txn
            .load_queue_entry(entry.reference)
            .await?
            .ok_or(CoreError::NotFound("match request"))?;
        if current.status != QueueStatus::Waiting {
            return Ok(PassStep::Settled(current));
        }

        let candidate = txn
            .pairing_candidates(&current, now)
            .await?
            .into_iter()
            .find(|c| !excluded.contains(&c.id) && c.filters.is_compatible_with(&current.filters));
        let Some(candidate) = candidate else {
            return Ok(PassStep::NoCandidate);
        };

        if !txn.claim_waiting_entries(&[candidate.id, current.id]).await? {
            return Ok(PassStep::Contended(candidate.id));
        }

        let pairing = Pairing {
            white: candidate.user_id,
            black: current.user_id,
            stake: current.stake_amount,
            time_control: current.time_control,
            filters: candidate.filters.merged_with(&current.filters),
            tournament_id: None,
        };
        let game = match open_paired_game(txn, &pairing, &self.ctx.config, now).await {
            Ok(game) => game,
            Err(PairingError::Funds { user_id, error }) => {
                return Ok(PassStep::FundsFailed {
                    user_id,
                    candidate,
                    error,
                })
            }
            Err(PairingError::Other(err)) => return Err(err),
        };
        txn.attach_matched_game(&[candidate.id, current.id], game.id)
            .await?;

        let white = user_ref(txn, pairing.white).await?;
        let black = user_ref(txn, pairing.black).await?;
        Ok(PassStep::Matched {
            game,
            white,
            black,
            opponent_queue: candidate.reference,
        })
    }

    async fn settled_outcome(&self, current: QueueEntry) -> CoreResult<MatchRequestOutcome> {
        match (current.status, current.matched_game_id) {
            (QueueStatus::Matched, Some(game_id)) => {
                let mut txn = self.ctx.storage.begin().await?;
                let game = txn.load_game_by_id(game_id).await;
                txn.rollback().await;
                let game = game?.ok_or(CoreError::NotFound("game"))?;
                let color = game.color_of(current.user_id).unwrap_or(Color::White);
                Ok(MatchRequestOutcome::Matched {
                    queue_ref: current.reference,
                    game_ref: game.reference,
                    color,
                })
            }
            _ => Ok(MatchRequestOutcome::Queued {
                queue_ref: current.reference,
                expires_at: current.expires_at,
            }),
        }
    }

    async fn withdraw_after_failed_lock(&self, id: QueueEntryId) {
        let outcome = async {
            let mut txn = self.ctx.storage.begin().await?;
            match txn.cancel_waiting_entry(id).await {
                Ok(_) => txn.commit().await,
                Err(err) => {
                    txn.rollback().await;
                    Err(err)
                }
            }
        }
        .await;
        if let Err(err) = outcome {
            warn!(target = LOG_TARGET, entry = id, error = %err, "failed to withdraw ticket");
        }
    }

    async fn notify_candidate_failure(&self, user_id: UserId, error: &CoreError) {
        let reference = async {
            let mut txn = self.ctx.storage.begin().await?;
            let user = txn.load_user_by_id(user_id).await;
            txn.rollback().await;
            user
        }
        .await;
        match reference {
            Ok(Some(user)) => {
                fan_out(
                    self.ctx.notifier.as_ref(),
                    vec![(
                        Topic::User(user.reference),
                        CoreEvent::PairingFailed {
                            reason: error.to_string(),
                        },
                    )],
                )
                .await;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(target = LOG_TARGET, user_id, error = %err, "could not notify candidate");
            }
        }
    }

    /// Cancels a WAITING ticket owned by `user`.
    pub async fn cancel_match_request(
        &self,
        queue_ref: QueueRef,
        user: UserRef,
    ) -> CoreResult<()> {
        let mut txn = self.ctx.storage.begin().await?;
        let result = async {
            let owner = txn.load_user(user).await?.ok_or(CoreError::UserNotFound)?;
            let entry = txn
                .load_queue_entry(queue_ref)
                .await?
                .ok_or(CoreError::NotFound("match request"))?;
            if entry.user_id != owner.id {
                return Err(CoreError::Unauthorized);
            }
            if !txn.cancel_waiting_entry(entry.id).await? {
                return Err(CoreError::AlreadyResolved("match request"));
            }
            Ok(())
        }
        .await;
        match result {
            Ok(()) => {
                txn.commit().await?;
                info!(target = LOG_TARGET, %queue_ref, %user, "match request cancelled");
                fan_out(
                    self.ctx.notifier.as_ref(),
                    vec![(
                        Topic::User(user),
                        CoreEvent::MatchRequestCancelled { queue_ref },
                    )],
                )
                .await;
                Ok(())
            }
            Err(err) => {
                txn.rollback().await;
                Err(err)
            }
        }
    }

    /// Best-effort cancel fired on client disconnect. Never fails.
    pub async fn cancel_beacon(&self, queue_ref: QueueRef, user: UserRef) {
        match self.cancel_match_request(queue_ref, user).await {
            Ok(()) => {}
            Err(CoreError::AlreadyResolved(_)) => {
                debug!(target = LOG_TARGET, %queue_ref, "beacon for resolved ticket");
            }
            Err(err) => {
                warn!(target = LOG_TARGET, %queue_ref, %user, error = %err, "beacon cancel failed");
            }
        }
    }

    pub async fn get_match_status(&self, queue_ref: QueueRef) -> CoreResult<MatchStatusView> {
        let mut txn = self.ctx.storage.begin().await?;
        let result = async {
            let entry = txn
                .load_queue_entry(queue_ref)
                .await?
                .ok_or(CoreError::NotFound("match request"))?;
            let game_ref = match entry.matched_game_id {
                Some(game_id) => txn.load_game_by_id(game_id).await?.map(|g| g.reference),
                None => None,
            };
            Ok(MatchStatusView {
                queue_ref: entry.reference,
                status: entry.status,
                game_ref,
                expires_at: entry.expires_at,
            })
        }
        .await;
        txn.rollback().await;
        result
    }

    /// Moves every WAITING ticket past its deadline to EXPIRED.
    pub async fn cleanup_expired_entries(&self) -> CoreResult<u64> {
        let now = self.ctx.now();
        let mut txn = self.ctx.storage.begin().await?;
        match txn.expire_waiting_entries(now).await {
            Ok(count) => {
                txn.commit().await?;
                if count > 0 {
                    info!(target = LOG_TARGET, count, "expired match requests");
                }
                Ok(count)
            }
            Err(err) => {
                txn.rollback().await;
                Err(err)
            }
        }
    }
}

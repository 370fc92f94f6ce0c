use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::model::{Game, NewGame, STANDARD_START_FEN};
use crate::store::CoreStorageTxn;
use crate::types::{
    Amount, GameRef, GameStatus, MatchFilters, TimeControl, TournamentId, UserId,
};
use crate::wallet::lock_stake;

/// Two players chosen for a game. `white` is the player who waited longest
/// and becomes the game creator.
#[derive(Debug, Clone)]
pub(crate) struct Pairing {
    pub white: UserId,
    pub black: UserId,
    pub stake: Amount,
    pub time_control: TimeControl,
    pub filters: MatchFilters,
    pub tournament_id: Option<TournamentId>,
}

#[derive(Debug)]
pub(crate) enum PairingError {
    /// One side could not escrow its stake. The transaction must be rolled
    /// back; only `user_id` is at fault.
    Funds { user_id: UserId, error: CoreError },
    Other(CoreError),
}

impl From<CoreError> for PairingError {
    fn from(error: CoreError) -> Self {
        Self::Other(error)
    }
}

/// Creates the IN_PROGRESS game for `pairing` and escrows both stakes.
pub(crate) async fn open_paired_game(
    txn: &mut dyn CoreStorageTxn,
    pairing: &Pairing,
    config: &CoreConfig,
    now: DateTime<Utc>,
) -> Result<Game, PairingError> {
    let fee = config.platform_fee(pairing.stake);
    let game = txn
        .insert_game(NewGame {
            reference: GameRef::new(),
            creator_id: pairing.white,
            opponent_id: Some(pairing.black),
            tournament_id: pairing.tournament_id,
            stake_amount: pairing.stake,
            total_pot: pairing.stake * Decimal::TWO - fee,
            platform_fee_amount: fee,
            status: GameStatus::InProgress,
            filters: pairing.filters.clone(),
            starting_fen: STANDARD_START_FEN.to_string(),
            time_control: pairing.time_control,
            invite_code: None,
            expires_at: None,
            created_at: now,
            started_at: Some(now),
        })
        .await?;

    let (first, second) = if pairing.white < pairing.black {
        (pairing.white, pairing.black)
    } else {
        (pairing.black, pairing.white)
    };
    for user_id in [first, second] {
        match lock_stake(txn, user_id, pairing.stake, Some(game.id), now).await {
            Ok(_) => {}
            Err(
                error @ (CoreError::InsufficientFunds
                | CoreError::UserInactive
                | CoreError::UserNotFound),
            ) => return Err(PairingError::Funds { user_id, error }),
            Err(other) => return Err(PairingError::Other(other)),
        }
    }
    Ok(game)
}

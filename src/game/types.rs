use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    Amount, Color, GameRef, GameResult, GameStatus, Millis, TimeControl, TournamentRef, UserRef,
};

/// Everything a client needs to render a game. Only opaque references are
/// exposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameView {
    pub game_ref: GameRef,
    pub status: GameStatus,
    pub white: UserRef,
    pub black: Option<UserRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tournament_ref: Option<TournamentRef>,
    pub stake_amount: Amount,
    pub total_pot: Amount,
    pub platform_fee_amount: Amount,
    pub time_control: TimeControl,
    pub starting_fen: String,
    pub fen: String,
    pub moves: Vec<String>,
    pub side_to_move: Color,
    pub white_time_remaining: Millis,
    pub black_time_remaining: Millis,
    pub last_move_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_code: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub result: Option<GameResult>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InviteGameRequest {
    pub creator: UserRef,
    pub stake_amount: Amount,
    pub initial_time_seconds: u32,
    pub increment_seconds: u32,
}

/// A move already checked for legality, plus the clocks the client reports
/// after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRequest {
    pub game_ref: GameRef,
    pub user: UserRef,
    pub from: String,
    pub to: String,
    pub promotion: Option<String>,
    pub fen: String,
    pub move_history: Vec<String>,
    pub white_time_remaining: Millis,
    pub black_time_remaining: Millis,
}

/// Heartbeat clock sync, independent of a move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockUpdate {
    pub game_ref: GameRef,
    pub user: UserRef,
    pub white_time_remaining: Millis,
    pub black_time_remaining: Millis,
    pub last_move_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CancelReason {
    /// Invite passed its deadline with nobody joining.
    InviteExpired,
    /// Creator took back an invite nobody joined yet.
    CreatorWithdrew,
    /// Game started but no move was played.
    Aborted,
    /// A player left a running game; the other side wins.
    Abandoned { by: Color },
}

impl CancelReason {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::InviteExpired => "invite expired",
            Self::CreatorWithdrew => "creator withdrew",
            Self::Aborted => "aborted",
            Self::Abandoned { .. } => "abandoned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    Resolved(GameView),
    /// The game had already completed; nothing changed.
    AlreadyCompleted(GameView),
}

impl ResolveOutcome {
    pub fn view(&self) -> &GameView {
        match self {
            Self::Resolved(view) | Self::AlreadyCompleted(view) => view,
        }
    }

    pub fn into_view(self) -> GameView {
        match self {
            Self::Resolved(view) | Self::AlreadyCompleted(view) => view,
        }
    }
}

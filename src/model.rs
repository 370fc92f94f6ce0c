//! Row models shared by the storage backends and the core services.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{
    Amount, Color, GameId, GameRef, GameResult, GameStatus, MatchFilters, Millis, QueueEntryId,
    QueueRef, QueueStatus, TimeControl, TournamentId, TournamentRef, TournamentStatus, UserId,
    UserRef,
};

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub reference: UserRef,
    pub display_name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wallet {
    pub user_id: UserId,
    pub balance: Amount,
    pub locked_amount: Amount,
}

impl Wallet {
    pub fn available(&self) -> Amount {
        self.balance - self.locked_amount
    }

    pub fn holds_invariant(&self) -> bool {
        self.locked_amount >= Decimal::ZERO
            && self.balance >= Decimal::ZERO
            && self.locked_amount <= self.balance
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletEntryKind {
    Lock,
    Release,
    SettleWin,
    SettleLoss,
    PlatformFee,
    DrawRelease,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletEntry {
    pub user_id: UserId,
    pub kind: WalletEntryKind,
    pub amount: Amount,
    pub game_id: Option<GameId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: QueueEntryId,
    pub reference: QueueRef,
    pub user_id: UserId,
    pub filters: MatchFilters,
    pub time_control: TimeControl,
    pub stake_amount: Amount,
    pub status: QueueStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub matched_game_id: Option<GameId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQueueEntry {
    pub reference: QueueRef,
    pub user_id: UserId,
    pub filters: MatchFilters,
    pub time_control: TimeControl,
    pub stake_amount: Amount,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Position and ordered move list, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameData {
    pub fen: String,
    pub moves: Vec<String>,
}

impl GameData {
    pub fn starting(fen: impl Into<String>) -> Self {
        Self {
            fen: fen.into(),
            moves: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    pub id: GameId,
    pub reference: GameRef,
    pub creator_id: UserId,
    pub opponent_id: Option<UserId>,
    pub tournament_id: Option<TournamentId>,
    pub stake_amount: Amount,
    pub total_pot: Amount,
    pub platform_fee_amount: Amount,
    pub status: GameStatus,
    pub filters: MatchFilters,
    pub starting_fen: String,
    pub time_control: TimeControl,
    pub creator_time_remaining: Millis,
    pub opponent_time_remaining: Millis,
    pub last_move_at: Option<DateTime<Utc>>,
    pub game_data: GameData,
    pub invite_code: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub result: Option<GameResult>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Game {
    /// The creator always plays white.
    pub fn color_of(&self, user_id: UserId) -> Option<Color> {
        if user_id == self.creator_id {
            Some(Color::White)
        } else if Some(user_id) == self.opponent_id {
            Some(Color::Black)
        } else {
            None
        }
    }

    pub fn player(&self, color: Color) -> Option<UserId> {
        match color {
            Color::White => Some(self.creator_id),
            Color::Black => self.opponent_id,
        }
    }

    pub fn time_remaining(&self, color: Color) -> Millis {
        match color {
            Color::White => self.creator_time_remaining,
            Color::Black => self.opponent_time_remaining,
        }
    }

    /// Side to move given the recorded history.
    pub fn side_to_move(&self) -> Color {
        if self.game_data.moves.len() % 2 == 0 {
            Color::White
        } else {
            Color::Black
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGame {
    pub reference: GameRef,
    pub creator_id: UserId,
    pub opponent_id: Option<UserId>,
    pub tournament_id: Option<TournamentId>,
    pub stake_amount: Amount,
    pub total_pot: Amount,
    pub platform_fee_amount: Amount,
    pub status: GameStatus,
    pub filters: MatchFilters,
    pub starting_fen: String,
    pub time_control: TimeControl,
    pub invite_code: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TournamentMode {
    Standard,
    Legend { legend_ref: String },
    Opening { opening_ref: String },
}

impl TournamentMode {
    pub fn filters(&self) -> MatchFilters {
        match self {
            Self::Standard => MatchFilters::none(),
            Self::Legend { legend_ref } => MatchFilters {
                legend_ref: Some(legend_ref.clone()),
                opening_ref: None,
            },
            Self::Opening { opening_ref } => MatchFilters {
                legend_ref: None,
                opening_ref: Some(opening_ref.clone()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tournament {
    pub id: TournamentId,
    pub reference: TournamentRef,
    pub created_by_user_id: UserId,
    pub name: String,
    pub mode: TournamentMode,
    pub status: TournamentStatus,
    pub max_participants: Option<u32>,
    pub time_control: TimeControl,
    pub stake_amount: Amount,
    pub duration_minutes: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTournament {
    pub reference: TournamentRef,
    pub created_by_user_id: UserId,
    pub name: String,
    pub mode: TournamentMode,
    pub max_participants: Option<u32>,
    pub time_control: TimeControl,
    pub stake_amount: Amount,
    pub duration_minutes: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentParticipant {
    pub tournament_id: TournamentId,
    pub user_id: UserId,
    pub is_searching: bool,
    pub searching_since: Option<DateTime<Utc>>,
    pub points: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub games_played: u32,
    pub joined_at: DateTime<Utc>,
}

impl TournamentParticipant {
    pub fn new(tournament_id: TournamentId, user_id: UserId, joined_at: DateTime<Utc>) -> Self {
        Self {
            tournament_id,
            user_id,
            is_searching: false,
            searching_since: None,
            points: 0,
            wins: 0,
            losses: 0,
            draws: 0,
            games_played: 0,
            joined_at,
        }
    }
}

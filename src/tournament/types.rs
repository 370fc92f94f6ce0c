use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::TournamentMode;
use crate::types::{Amount, Color, GameRef, TimeControl, TournamentRef, TournamentStatus, UserRef};

fn standard_mode() -> TournamentMode {
    TournamentMode::Standard
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TournamentConfig {
    pub name: String,
    #[serde(default = "standard_mode")]
    pub mode: TournamentMode,
    #[serde(default)]
    pub max_participants: Option<u32>,
    pub initial_time_seconds: u32,
    pub increment_seconds: u32,
    #[serde(default)]
    pub stake_amount: Decimal,
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StandingView {
    pub user: UserRef,
    pub display_name: String,
    pub points: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub games_played: u32,
    pub is_searching: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TournamentView {
    pub tournament_ref: TournamentRef,
    pub name: String,
    pub mode: TournamentMode,
    pub status: TournamentStatus,
    pub created_by: UserRef,
    pub max_participants: Option<u32>,
    pub time_control: TimeControl,
    pub stake_amount: Amount,
    pub duration_minutes: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Ranked by points, then wins.
    pub standings: Vec<StandingView>,
}

impl TournamentView {
    pub fn standing(&self, user: UserRef) -> Option<&StandingView> {
        self.standings.iter().find(|s| s.user == user)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SearchOutcome {
    Searching,
    Matched { game_ref: GameRef, color: Color },
}

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::opaque_ref;

pub type UserId = i64;
pub type QueueEntryId = i64;
pub type GameId = i64;
pub type TournamentId = i64;

/// Monetary amounts. Always non-negative once persisted.
pub type Amount = Decimal;

/// Remaining clock time in milliseconds.
pub type Millis = i64;

opaque_ref!(
    /// Public reference for a user account.
    UserRef
);
opaque_ref!(
    /// Public reference for a matchmaking ticket.
    QueueRef
);
opaque_ref!(
    /// Public reference for a game.
    GameRef
);
opaque_ref!(
    /// Public reference for a tournament.
    TournamentRef
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    Waiting,
    Matched,
    Cancelled,
    Expired,
}

impl QueueStatus {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Waiting)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    WaitingForOpponent,
    InProgress,
    Completed,
    Cancelled,
}

impl GameStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TournamentStatus {
    Lobby,
    Active,
    Completed,
}

impl TournamentStatus {
    pub const fn accepts_participants(self) -> bool {
        matches!(self, Self::Lobby | Self::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub const fn opposite(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeControl {
    pub initial_time_seconds: u32,
    pub increment_seconds: u32,
}

impl TimeControl {
    pub const fn new(initial_time_seconds: u32, increment_seconds: u32) -> Self {
        Self {
            initial_time_seconds,
            increment_seconds,
        }
    }

    pub fn initial_millis(&self) -> Millis {
        Millis::from(self.initial_time_seconds) * 1_000
    }

    pub fn increment_millis(&self) -> Millis {
        Millis::from(self.increment_seconds) * 1_000
    }
}

impl fmt::Display for TimeControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.initial_time_seconds, self.increment_seconds)
    }
}

/// Optional pairing filters. A dimension left unset accepts any opponent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchFilters {
    pub legend_ref: Option<String>,
    pub opening_ref: Option<String>,
}

impl MatchFilters {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_compatible_with(&self, other: &Self) -> bool {
        dimension_compatible(&self.legend_ref, &other.legend_ref)
            && dimension_compatible(&self.opening_ref, &other.opening_ref)
    }

    /// Filter applied to a game created from two compatible tickets.
    pub fn merged_with(&self, other: &Self) -> Self {
        Self {
            legend_ref: self.legend_ref.clone().or_else(|| other.legend_ref.clone()),
            opening_ref: self
                .opening_ref
                .clone()
                .or_else(|| other.opening_ref.clone()),
        }
    }
}

fn dimension_compatible(left: &Option<String>, right: &Option<String>) -> bool {
    match (left, right) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    WhiteWins,
    BlackWins,
    Draw,
}

impl Outcome {
    pub const fn winner(self) -> Option<Color> {
        match self {
            Self::WhiteWins => Some(Color::White),
            Self::BlackWins => Some(Color::Black),
            Self::Draw => None,
        }
    }

    pub const fn win_for(color: Color) -> Self {
        match color {
            Color::White => Self::WhiteWins,
            Color::Black => Self::BlackWins,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultReason {
    Checkmate,
    Resignation,
    Timeout,
    Stalemate,
    Agreement,
    Repetition,
    InsufficientMaterial,
    Abandonment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameResult {
    pub outcome: Outcome,
    pub reason: ResultReason,
}

impl GameResult {
    pub const fn new(outcome: Outcome, reason: ResultReason) -> Self {
        Self { outcome, reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_accept_missing_dimensions() {
        let any = MatchFilters::none();
        let tal = MatchFilters {
            legend_ref: Some("tal".into()),
            opening_ref: None,
        };
        let capa = MatchFilters {
            legend_ref: Some("capablanca".into()),
            opening_ref: None,
        };
        assert!(any.is_compatible_with(&tal));
        assert!(tal.is_compatible_with(&any));
        assert!(tal.is_compatible_with(&tal.clone()));
        assert!(!tal.is_compatible_with(&capa));
    }

    #[test]
    fn merged_filters_keep_the_set_dimension() {
        let opening = MatchFilters {
            legend_ref: None,
            opening_ref: Some("sicilian".into()),
        };
        let merged = MatchFilters::none().merged_with(&opening);
        assert_eq!(merged.opening_ref.as_deref(), Some("sicilian"));
        assert!(merged.legend_ref.is_none());
    }

    #[test]
    fn refs_parse_from_their_display_form() {
        let reference = GameRef::new();
        let parsed: GameRef = reference.to_string().parse().unwrap();
        assert_eq!(parsed, reference);
        assert!("not-a-ref".parse::<GameRef>().is_err());
    }

    #[test]
    fn time_control_converts_to_millis() {
        let tc = TimeControl::new(300, 2);
        assert_eq!(tc.initial_millis(), 300_000);
        assert_eq!(tc.increment_millis(), 2_000);
        assert_eq!(tc.to_string(), "300+2");
    }
}

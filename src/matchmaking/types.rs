use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Amount, Color, GameRef, QueueRef, QueueStatus, UserRef};

/// A player's request to be paired. Filters left unset accept any opponent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MatchRequest {
    pub user: UserRef,
    #[serde(default)]
    pub legend_ref: Option<String>,
    #[serde(default)]
    pub opening_ref: Option<String>,
    pub initial_time_seconds: u32,
    pub increment_seconds: u32,
    pub stake_amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MatchRequestOutcome {
    Queued {
        queue_ref: QueueRef,
        expires_at: DateTime<Utc>,
    },
    Matched {
        queue_ref: QueueRef,
        game_ref: GameRef,
        color: Color,
    },
}

impl MatchRequestOutcome {
    pub fn queue_ref(&self) -> QueueRef {
        match self {
            Self::Queued { queue_ref, .. } | Self::Matched { queue_ref, .. } => *queue_ref,
        }
    }

    pub fn game_ref(&self) -> Option<GameRef> {
        match self {
            Self::Queued { .. } => None,
            Self::Matched { game_ref, .. } => Some(*game_ref),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchStatusView {
    pub queue_ref: QueueRef,
    pub status: QueueStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_ref: Option<GameRef>,
    pub expires_at: DateTime<Utc>,
}

//! Fire-and-forget fan-out of state transitions.
//!
//! Delivery is at-least-once and unordered across topics; subscribers
//! re-fetch the referenced entity on every event.

pub mod broadcast;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::error::CoreError;
use crate::types::{
    Color, GameRef, GameResult, QueueRef, TournamentRef, TournamentStatus, UserRef,
};

pub use broadcast::BroadcastNotifier;

const LOG_TARGET: &str = "wager_chess::notify";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    User(UserRef),
    Game(GameRef),
    Tournament(TournamentRef),
}

impl Topic {
    pub fn parse(kind: &str, reference: &str) -> Result<Self, CoreError> {
        match kind {
            "user" => Ok(Self::User(reference.parse()?)),
            "game" => Ok(Self::Game(reference.parse()?)),
            "tournament" => Ok(Self::Tournament(reference.parse()?)),
            other => Err(CoreError::validation(format!("unknown topic kind {other}"))),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(r) => write!(f, "user:{r}"),
            Self::Game(r) => write!(f, "game:{r}"),
            Self::Tournament(r) => write!(f, "tournament:{r}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoreEvent {
    MatchFound {
        #[serde(skip_serializing_if = "Option::is_none")]
        queue_ref: Option<QueueRef>,
        game_ref: GameRef,
        #[serde(skip_serializing_if = "Option::is_none")]
        tournament_ref: Option<TournamentRef>,
        color: Color,
    },
    MatchRequestCancelled {
        queue_ref: QueueRef,
    },
    PairingFailed {
        reason: String,
    },
    GameStarted {
        game_ref: GameRef,
    },
    GameUpdated {
        game_ref: GameRef,
        move_count: usize,
    },
    GameCompleted {
        game_ref: GameRef,
        result: GameResult,
    },
    GameCancelled {
        game_ref: GameRef,
        reason: String,
    },
    TournamentUpdated {
        tournament_ref: TournamentRef,
        status: TournamentStatus,
    },
    TournamentCompleted {
        tournament_ref: TournamentRef,
    },
}

impl CoreEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::MatchFound { .. } => "match_found",
            Self::MatchRequestCancelled { .. } => "match_request_cancelled",
            Self::PairingFailed { .. } => "pairing_failed",
            Self::GameStarted { .. } => "game_started",
            Self::GameUpdated { .. } => "game_updated",
            Self::GameCompleted { .. } => "game_completed",
            Self::GameCancelled { .. } => "game_cancelled",
            Self::TournamentUpdated { .. } => "tournament_updated",
            Self::TournamentCompleted { .. } => "tournament_completed",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("channel unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, topic: Topic, event: CoreEvent) -> Result<(), NotifyError>;
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn publish(&self, _topic: Topic, _event: CoreEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Publishes each delivery, downgrading failures to warnings.
pub async fn fan_out(notifier: &dyn Notifier, deliveries: Vec<(Topic, CoreEvent)>) {
    for (topic, event) in deliveries {
        let name = event.event_name();
        if let Err(err) = notifier.publish(topic, event).await {
            warn!(
                target = LOG_TARGET,
                %topic,
                event = name,
                error = %err,
                "dropped notification"
            );
        }
    }
}

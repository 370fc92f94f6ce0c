//! Game Session: the per-game state machine
//! `WAITING_FOR_OPPONENT -> IN_PROGRESS -> {COMPLETED, CANCELLED}`, clock
//! accounting and settlement on the terminal transition.
//!
//! Chess legality is checked by the caller before a move reaches this
//! module; only the structure of a move is validated here.

mod clock;
mod session;
mod types;
mod validation;

#[cfg(test)]
mod tests;

pub use session::GameSessions;
pub use types::{
    CancelReason, ClockUpdate, GameView, InviteGameRequest, MoveRequest, ResolveOutcome,
};

//! Tournament Coordinator: `LOBBY -> ACTIVE -> COMPLETED` lifecycle,
//! in-tournament search and standings.
//!
//! Completion of an expired tournament is lazy: every operation that reads
//! a tournament first checks its deadline and completes it in place.

mod coordinator;
mod standings;
mod types;


pub use coordinator::TournamentCoordinator;
pub(crate) use standings::record_result;
pub use standings::{POINTS_FOR_DRAW, POINTS_FOR_WIN};
pub use types::{SearchOutcome, StandingView, TournamentConfig, TournamentView};

//! Matchmaking Queue: admission, cancellation, expiry and FIFO pairing of
//! waiting tickets.
//!
//! Tickets move `WAITING -> {MATCHED, CANCELLED, EXPIRED}` only through
//! conditional status updates, so a sweep, a cancel and a pairing pass
//! racing on the same ticket resolve to exactly one terminal status.

pub(crate) mod pairing;
mod service;
mod types;
pub(crate) mod validation;


pub use service::MatchmakingQueue;
pub use types::{MatchRequest, MatchRequestOutcome, MatchStatusView};

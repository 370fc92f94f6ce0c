//! Wagered chess platform core: wallet ledger, matchmaking queue, game
//! sessions and arena tournaments, plus the HTTP surface that fronts them.

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod game;
pub mod macros;
pub mod matchmaking;
pub mod model;
pub mod notify;
pub mod server;
pub mod store;
pub mod tokio_tools;
pub mod tournament;
pub mod types;
pub mod wallet;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::CoreContext;
pub use error::{CoreError, CoreResult};

//! HTTP surface over the core services.
//!
//! Handlers are thin: they extract the acting user, call one core operation
//! and map [`crate::error::CoreError`] onto a status code. Routes under
//! `/internal` act for no player and require the service token instead.

mod bootstrap;
mod dto;
mod error;
mod events;
mod logging;
mod routes;

#[cfg(test)]
mod tests;

pub use bootstrap::{run_server, spawn_sweeper, ServerConfig};
pub use error::ApiError;
pub use routes::{
    ActingUser, AppState, ServiceCaller, WagerChessServer, SERVICE_HEADER, USER_HEADER,
};

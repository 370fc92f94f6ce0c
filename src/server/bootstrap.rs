use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::CoreContext;
use crate::notify::BroadcastNotifier;
use crate::tokio_tools::spawn_named_task;

use super::routes::{AppState, WagerChessServer};

const LOG_TARGET: &str = "wager_chess::server::bootstrap";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// How often stale queue tickets and unclaimed invites are swept.
    pub sweep_interval: Duration,
    /// Shared secret for `/internal` routes; they stay closed when unset.
    pub service_token: Option<String>,
}

/// Serves the API until ctrl-c, running the expiry sweeper alongside.
///
/// `events` must be the notifier `ctx` publishes to, otherwise SSE
/// subscribers never see anything.
pub async fn run_server(
    ctx: Arc<CoreContext>,
    events: Arc<BroadcastNotifier>,
    config: ServerConfig,
) -> Result<()> {
    if config.service_token.is_none() {
        warn!(target = LOG_TARGET, "no service token configured; internal routes are closed");
    }
    let state = Arc::new(AppState::new(ctx, events).with_service_token(config.service_token));
    let cancel = CancellationToken::new();
    let sweeper = spawn_sweeper(Arc::clone(&state), config.sweep_interval, cancel.clone());

    let router = WagerChessServer::new(state).into_router();
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    let local_addr = listener.local_addr()?;
    info!(
        target = LOG_TARGET,
        %local_addr,
        sweep_interval_secs = config.sweep_interval.as_secs(),
        "wager chess server listening"
    );

    let served = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error");

    cancel.cancel();
    if let Err(err) = sweeper.await {
        warn!(target = LOG_TARGET, error = %err, "sweeper task ended abnormally");
    }
    served
}

/// Periodically expires stale queue tickets and unclaimed invites until
/// `cancel` fires. Failures are logged and retried on the next tick.
pub fn spawn_sweeper(
    state: Arc<AppState>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    spawn_named_task("expiry-sweeper", async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(target = LOG_TARGET, "cancellation token triggered; stopping sweeper");
                    break;
                }
                _ = interval.tick() => {
                    match state.queue.cleanup_expired_entries().await {
                        Ok(0) => {}
                        Ok(expired) => info!(target = LOG_TARGET, expired, "expired queue tickets"),
                        Err(err) => warn!(target = LOG_TARGET, error = %err, "queue sweep failed"),
                    }
                    match state.games.expire_invites().await {
                        Ok(0) => {}
                        Ok(expired) => info!(target = LOG_TARGET, expired, "expired invites"),
                        Err(err) => warn!(target = LOG_TARGET, error = %err, "invite sweep failed"),
                    }
                }
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(
            target = LOG_TARGET,
            error = %err,
            "failed to install ctrl-c handler"
        );
    }
    info!(target = LOG_TARGET, "shutdown signal received");
}

//! Shared fixtures for service tests: in-memory storage, a manual clock and a
//! broadcast notifier so tests can observe fan-out.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::config::CoreConfig;
use crate::context::{CoreContext, ManualClock};
use crate::game::GameSessions;
use crate::matchmaking::{MatchRequest, MatchmakingQueue};
use crate::notify::BroadcastNotifier;
use crate::store::{CoreStorage, InMemoryCoreStorage};
use crate::tournament::TournamentCoordinator;
use crate::types::UserRef;
use crate::wallet::{WalletLedger, WalletView};

pub(crate) fn dec(raw: &str) -> Decimal {
    Decimal::from_str(raw).expect("decimal literal")
}

pub(crate) fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap()
}

pub(crate) struct Harness {
    pub ctx: Arc<CoreContext>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<BroadcastNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(CoreConfig::default())
    }

    pub fn with_config(config: CoreConfig) -> Self {
        Self::build(Arc::new(InMemoryCoreStorage::new()), config)
    }

    /// Runs the services over a wrapped or substituted store.
    pub fn with_storage(storage: Arc<dyn CoreStorage>) -> Self {
        Self::build(storage, CoreConfig::default())
    }

    fn build(storage: Arc<dyn CoreStorage>, config: CoreConfig) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        let notifier = Arc::new(BroadcastNotifier::default());
        let ctx = CoreContext::new(
            storage,
            notifier.clone(),
            clock.clone(),
            config,
        )
        .expect("valid test config");
        Self {
            ctx: Arc::new(ctx),
            clock,
            notifier,
        }
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub fn wallets(&self) -> WalletLedger {
        WalletLedger::new(self.ctx.clone())
    }

    pub fn queue(&self) -> MatchmakingQueue {
        MatchmakingQueue::new(self.ctx.clone())
    }

    pub fn games(&self) -> GameSessions {
        GameSessions::new(self.ctx.clone())
    }

    pub fn tournaments(&self) -> TournamentCoordinator {
        TournamentCoordinator::new(self.ctx.clone())
    }

    pub async fn funded_user(&self, name: &str, balance: &str) -> UserRef {
        self.wallets()
            .open_account(name, dec(balance))
            .await
            .expect("open account")
            .reference
    }

    pub async fn balance(&self, user: UserRef) -> WalletView {
        self.wallets().balance(user).await.expect("balance")
    }
}

/// A blitz request with no filters.
pub(crate) fn blitz_request(user: UserRef, stake: &str) -> MatchRequest {
    MatchRequest {
        user,
        legend_ref: None,
        opening_ref: None,
        initial_time_seconds: 300,
        increment_seconds: 0,
        stake_amount: dec(stake),
    }
}

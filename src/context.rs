use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::notify::{NoopNotifier, Notifier};
use crate::store::{CoreStorage, InMemoryCoreStorage};

/// Time source for every deadline the core evaluates.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Everything a core operation needs, built once by the process entry point.
#[derive(Clone)]
pub struct CoreContext {
    pub storage: Arc<dyn CoreStorage>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub config: CoreConfig,
}

impl CoreContext {
    pub fn new(
        storage: Arc<dyn CoreStorage>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: CoreConfig,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        Ok(Self {
            storage,
            notifier,
            clock,
            config,
        })
    }

    /// In-memory storage, no fan-out, wall clock.
    pub fn in_memory(config: CoreConfig) -> Result<Self, CoreError> {
        Self::new(
            Arc::new(InMemoryCoreStorage::new()),
            Arc::new(NoopNotifier),
            Arc::new(SystemClock),
            config,
        )
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

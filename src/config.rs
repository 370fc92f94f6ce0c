use chrono::Duration;
use rust_decimal::Decimal;

use crate::error::CoreError;

pub const DEFAULT_QUEUE_TIMEOUT_SECS: i64 = 300;
pub const DEFAULT_INVITE_TTL_SECS: i64 = 30 * 60;
pub const DEFAULT_PLATFORM_FEE_BPS: u32 = 500;
pub const MAX_PLATFORM_FEE_BPS: u32 = 5_000;
pub const DEFAULT_MAX_PAIRING_ATTEMPTS: usize = 16;

pub const MIN_INITIAL_TIME_SECONDS: u32 = 15;
pub const MAX_INITIAL_TIME_SECONDS: u32 = 10_800;
pub const MAX_INCREMENT_SECONDS: u32 = 180;
pub const MIN_TOURNAMENT_MINUTES: u32 = 1;
pub const MAX_TOURNAMENT_MINUTES: u32 = 1_440;

/// How `apply_move` treats the clock values reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockPolicy {
    /// Persist client clocks verbatim as long as they are non-negative.
    TrustClient,
    /// Derive the mover's clock from the `last_move_at` delta and only accept
    /// client values within `tolerance_ms` of it.
    ServerAuthoritative { tolerance_ms: i64 },
}

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub queue_timeout: Duration,
    pub invite_ttl: Duration,
    pub platform_fee_bps: u32,
    pub clock_policy: ClockPolicy,
    pub max_pairing_attempts: usize,
    pub max_stake: Decimal,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            queue_timeout: Duration::seconds(DEFAULT_QUEUE_TIMEOUT_SECS),
            invite_ttl: Duration::seconds(DEFAULT_INVITE_TTL_SECS),
            platform_fee_bps: DEFAULT_PLATFORM_FEE_BPS,
            clock_policy: ClockPolicy::TrustClient,
            max_pairing_attempts: DEFAULT_MAX_PAIRING_ATTEMPTS,
            max_stake: Decimal::new(1_000_000, 0),
        }
    }
}

impl CoreConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.queue_timeout <= Duration::zero() {
            return Err(CoreError::validation("queue_timeout must be positive"));
        }
        if self.invite_ttl <= Duration::zero() {
            return Err(CoreError::validation("invite_ttl must be positive"));
        }
        if self.platform_fee_bps > MAX_PLATFORM_FEE_BPS {
            return Err(CoreError::validation(format!(
                "platform_fee_bps cannot exceed {MAX_PLATFORM_FEE_BPS}"
            )));
        }
        if self.max_pairing_attempts == 0 {
            return Err(CoreError::validation(
                "max_pairing_attempts must be at least 1",
            ));
        }
        if self.max_stake <= Decimal::ZERO {
            return Err(CoreError::validation("max_stake must be positive"));
        }
        if let ClockPolicy::ServerAuthoritative { tolerance_ms } = self.clock_policy {
            if tolerance_ms < 0 {
                return Err(CoreError::validation("clock tolerance cannot be negative"));
            }
        }
        Ok(())
    }

    /// Platform fee charged on a two-player pot of `2 × stake`.
    pub fn platform_fee(&self, stake: Decimal) -> Decimal {
        let pot = stake * Decimal::TWO;
        (pot * Decimal::from(self.platform_fee_bps) / Decimal::from(10_000u32)).round_dp(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        CoreConfig::default().validate().unwrap();
    }

    #[test]
    fn fee_is_basis_points_of_the_pot() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.platform_fee(Decimal::new(100, 0)), Decimal::new(10, 0));
        let free = CoreConfig {
            platform_fee_bps: 0,
            ..CoreConfig::default()
        };
        assert_eq!(free.platform_fee(Decimal::new(100, 0)), Decimal::ZERO);
    }

    #[test]
    fn rejects_fee_above_half_the_pot() {
        let cfg = CoreConfig {
            platform_fee_bps: MAX_PLATFORM_FEE_BPS + 1,
            ..CoreConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(CoreError::Validation(_))));
    }
}

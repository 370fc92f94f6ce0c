use rust_decimal::Decimal;

use crate::config::{
    CoreConfig, MAX_INCREMENT_SECONDS, MAX_INITIAL_TIME_SECONDS, MIN_INITIAL_TIME_SECONDS,
};
use crate::error::CoreError;
use crate::types::{Amount, MatchFilters, TimeControl};

const MAX_FILTER_LEN: usize = 64;

pub fn validate_time_control(
    initial_time_seconds: u32,
    increment_seconds: u32,
) -> Result<TimeControl, CoreError> {
    if !(MIN_INITIAL_TIME_SECONDS..=MAX_INITIAL_TIME_SECONDS).contains(&initial_time_seconds) {
        return Err(CoreError::validation(format!(
            "initial_time_seconds must be between {MIN_INITIAL_TIME_SECONDS} and {MAX_INITIAL_TIME_SECONDS}"
        )));
    }
    if increment_seconds > MAX_INCREMENT_SECONDS {
        return Err(CoreError::validation(format!(
            "increment_seconds cannot exceed {MAX_INCREMENT_SECONDS}"
        )));
    }
    Ok(TimeControl::new(initial_time_seconds, increment_seconds))
}

/// Stakes carry at most two decimal places and stay within `max_stake`.
pub fn validate_stake(
    amount: Amount,
    config: &CoreConfig,
    allow_zero: bool,
) -> Result<Amount, CoreError> {
    if amount < Decimal::ZERO || (amount.is_zero() && !allow_zero) {
        return Err(CoreError::validation("stake_amount must be positive"));
    }
    if amount > config.max_stake {
        return Err(CoreError::validation(format!(
            "stake_amount cannot exceed {}",
            config.max_stake
        )));
    }
    if amount.normalize().scale() > 2 {
        return Err(CoreError::validation(
            "stake_amount supports at most two decimal places",
        ));
    }
    Ok(amount.normalize())
}

fn normalize_filter(name: &str, value: Option<String>) -> Result<Option<String>, CoreError> {
    let Some(raw) = value else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.len() > MAX_FILTER_LEN {
        return Err(CoreError::validation(format!(
            "{name} cannot exceed {MAX_FILTER_LEN} characters"
        )));
    }
    Ok(Some(trimmed.to_string()))
}

pub fn validate_filters(
    legend_ref: Option<String>,
    opening_ref: Option<String>,
) -> Result<MatchFilters, CoreError> {
    Ok(MatchFilters {
        legend_ref: normalize_filter("legend_ref", legend_ref)?,
        opening_ref: normalize_filter("opening_ref", opening_ref)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_control_bounds() {
        assert!(validate_time_control(300, 0).is_ok());
        assert!(validate_time_control(14, 0).is_err());
        assert!(validate_time_control(10_801, 0).is_err());
        assert!(validate_time_control(60, 181).is_err());
    }

    #[test]
    fn stake_rules() {
        let cfg = CoreConfig::default();
        assert_eq!(
            validate_stake(Decimal::new(1050, 2), &cfg, false).unwrap(),
            Decimal::new(105, 1)
        );
        assert!(validate_stake(Decimal::ZERO, &cfg, false).is_err());
        assert!(validate_stake(Decimal::ZERO, &cfg, true).is_ok());
        assert!(validate_stake(Decimal::new(-1, 0), &cfg, true).is_err());
        assert!(validate_stake(Decimal::new(1001, 3), &cfg, false).is_err());
        assert!(validate_stake(cfg.max_stake + Decimal::ONE, &cfg, false).is_err());
    }

    #[test]
    fn blank_filters_mean_any() {
        let filters = validate_filters(Some("  ".into()), Some(" najdorf ".into())).unwrap();
        assert_eq!(filters.legend_ref, None);
        assert_eq!(filters.opening_ref.as_deref(), Some("najdorf"));
        assert!(validate_filters(Some("x".repeat(65)), None).is_err());
    }
}

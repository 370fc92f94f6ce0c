use chrono::{DateTime, Utc};

use crate::config::ClockPolicy;
use crate::error::CoreError;
use crate::model::Game;
use crate::types::{Color, Millis};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ClockVerdict {
    Running { white: Millis, black: Millis },
    /// `loser` ran out of time.
    Flagged { loser: Color },
}

fn by_color(color: Color, mover: Millis, other: Millis) -> (Millis, Millis) {
    match color {
        Color::White => (mover, other),
        Color::Black => (other, mover),
    }
}

fn elapsed_since_last_move(game: &Game, now: DateTime<Utc>) -> Millis {
    let since = game.last_move_at.or(game.started_at).unwrap_or(now);
    (now - since).num_milliseconds().max(0)
}

/// Clock values to persist after `mover` completes a move.
pub(super) fn clocks_after_move(
    game: &Game,
    mover: Color,
    reported_white: Millis,
    reported_black: Millis,
    policy: ClockPolicy,
    now: DateTime<Utc>,
) -> Result<ClockVerdict, CoreError> {
    if reported_white < 0 || reported_black < 0 {
        return Err(CoreError::validation("clock values cannot be negative"));
    }
    let increment = game.time_control.increment_millis();
    let mover_before = game.time_remaining(mover);
    let other_before = game.time_remaining(mover.opposite());
    let (reported_mover, reported_other) = match mover {
        Color::White => (reported_white, reported_black),
        Color::Black => (reported_black, reported_white),
    };

    match policy {
        ClockPolicy::TrustClient => {
            if reported_mover > mover_before + increment {
                return Err(CoreError::validation(
                    "mover's clock cannot grow by more than the increment",
                ));
            }
            if reported_other > other_before {
                return Err(CoreError::validation(
                    "waiting side's clock cannot grow",
                ));
            }
            if reported_mover == 0 {
                return Ok(ClockVerdict::Flagged { loser: mover });
            }
            if reported_other == 0 {
                return Ok(ClockVerdict::Flagged {
                    loser: mover.opposite(),
                });
            }
            let (white, black) = by_color(mover, reported_mover, reported_other);
            Ok(ClockVerdict::Running { white, black })
        }
        ClockPolicy::ServerAuthoritative { tolerance_ms } => {
            let remaining = mover_before - elapsed_since_last_move(game, now);
            if remaining <= 0 {
                return Ok(ClockVerdict::Flagged { loser: mover });
            }
            let derived = remaining + increment;
            if (reported_mover - derived).abs() > tolerance_ms {
                return Err(CoreError::validation(
                    "reported clock deviates from server time",
                ));
            }
            let (white, black) = by_color(mover, derived, other_before);
            Ok(ClockVerdict::Running { white, black })
        }
    }
}

/// Clock values to persist for a heartbeat sync. Between moves clocks only
/// run down, so neither side may report more time than is stored.
pub(super) fn clocks_for_heartbeat(
    game: &Game,
    reported_white: Millis,
    reported_black: Millis,
    reported_last_move_at: DateTime<Utc>,
    policy: ClockPolicy,
    now: DateTime<Utc>,
) -> Result<ClockVerdict, CoreError> {
    if reported_white < 0 || reported_black < 0 {
        return Err(CoreError::validation("clock values cannot be negative"));
    }
    if reported_last_move_at > now {
        return Err(CoreError::validation("last_move_at cannot be in the future"));
    }
    let to_move = game.side_to_move();
    match policy {
        ClockPolicy::TrustClient => {
            if reported_white > game.creator_time_remaining
                || reported_black > game.opponent_time_remaining
            {
                return Err(CoreError::validation("clocks cannot grow between moves"));
            }
            if reported_white == 0 && reported_black == 0 {
                return Ok(ClockVerdict::Flagged { loser: to_move });
            }
            if reported_white == 0 {
                return Ok(ClockVerdict::Flagged {
                    loser: Color::White,
                });
            }
            if reported_black == 0 {
                return Ok(ClockVerdict::Flagged {
                    loser: Color::Black,
                });
            }
            Ok(ClockVerdict::Running {
                white: reported_white,
                black: reported_black,
            })
        }
        ClockPolicy::ServerAuthoritative { .. } => {
            let remaining = game.time_remaining(to_move) - elapsed_since_last_move(game, now);
            if remaining <= 0 {
                return Ok(ClockVerdict::Flagged { loser: to_move });
            }
            Ok(ClockVerdict::Running {
                white: game.creator_time_remaining,
                black: game.opponent_time_remaining,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;

    use super::*;
    use crate::model::{GameData, STANDARD_START_FEN};
    use crate::types::{GameRef, GameStatus, MatchFilters, TimeControl};

    fn running_game(started_at: DateTime<Utc>) -> Game {
        let tc = TimeControl::new(60, 2);
        Game {
            id: 1,
            reference: GameRef::new(),
            creator_id: 1,
            opponent_id: Some(2),
            tournament_id: None,
            stake_amount: Decimal::ONE,
            total_pot: Decimal::TWO,
            platform_fee_amount: Decimal::ZERO,
            status: GameStatus::InProgress,
            filters: MatchFilters::none(),
            starting_fen: STANDARD_START_FEN.into(),
            time_control: tc,
            creator_time_remaining: tc.initial_millis(),
            opponent_time_remaining: tc.initial_millis(),
            last_move_at: None,
            game_data: GameData::starting(STANDARD_START_FEN),
            invite_code: None,
            expires_at: None,
            result: None,
            created_at: started_at,
            started_at: Some(started_at),
            completed_at: None,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn trusted_clocks_are_persisted() {
        let game = running_game(t0());
        let verdict =
            clocks_after_move(&game, Color::White, 59_000, 60_000, ClockPolicy::TrustClient, t0())
                .unwrap();
        assert_eq!(
            verdict,
            ClockVerdict::Running {
                white: 59_000,
                black: 60_000
            }
        );
    }

    #[test]
    fn trusted_clock_cannot_gain_time() {
        let game = running_game(t0());
        let err =
            clocks_after_move(&game, Color::White, 63_000, 60_000, ClockPolicy::TrustClient, t0())
                .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        let err =
            clocks_after_move(&game, Color::White, 59_000, 61_000, ClockPolicy::TrustClient, t0())
                .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn zero_clock_is_a_flag_fall() {
        let game = running_game(t0());
        let verdict =
            clocks_after_move(&game, Color::White, 0, 60_000, ClockPolicy::TrustClient, t0())
                .unwrap();
        assert_eq!(verdict, ClockVerdict::Flagged { loser: Color::White });
    }

    #[test]
    fn server_clock_derives_from_elapsed_time() {
        let game = running_game(t0());
        let policy = ClockPolicy::ServerAuthoritative { tolerance_ms: 500 };
        let now = t0() + Duration::seconds(10);
        // 60s - 10s elapsed + 2s increment
        let verdict = clocks_after_move(&game, Color::White, 52_300, 60_000, policy, now).unwrap();
        assert_eq!(
            verdict,
            ClockVerdict::Running {
                white: 52_000,
                black: 60_000
            }
        );
        assert!(clocks_after_move(&game, Color::White, 58_000, 60_000, policy, now).is_err());
    }

    #[test]
    fn server_clock_flags_when_time_is_spent() {
        let game = running_game(t0());
        let policy = ClockPolicy::ServerAuthoritative { tolerance_ms: 500 };
        let now = t0() + Duration::seconds(61);
        assert_eq!(
            clocks_for_heartbeat(&game, 1_000, 60_000, t0(), policy, now).unwrap(),
            ClockVerdict::Flagged { loser: Color::White }
        );
    }

    #[test]
    fn heartbeat_cannot_add_time() {
        let game = running_game(t0());
        let now = t0() + Duration::seconds(5);
        let policy = ClockPolicy::TrustClient;
        assert_eq!(
            clocks_for_heartbeat(&game, 55_000, 60_000, t0(), policy, now).unwrap(),
            ClockVerdict::Running {
                white: 55_000,
                black: 60_000
            }
        );
        let err = clocks_for_heartbeat(&game, 55_000, 9_000_000, t0(), policy, now).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        let err = clocks_for_heartbeat(&game, 60_001, 60_000, t0(), policy, now).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn heartbeat_rejects_a_future_last_move() {
        let game = running_game(t0());
        let err = clocks_for_heartbeat(
            &game,
            55_000,
            60_000,
            t0() + Duration::seconds(1),
            ClockPolicy::TrustClient,
            t0(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}

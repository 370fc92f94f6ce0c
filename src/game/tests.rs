use std::sync::Arc;

use anyhow::Result;
use chrono::Duration;
use rust_decimal::Decimal;

use super::{
    CancelReason, ClockUpdate, GameSessions, InviteGameRequest, MoveRequest, ResolveOutcome,
};
use crate::error::CoreError;
use crate::model::WalletEntryKind;
use crate::notify::{CoreEvent, Topic};
use crate::test_support::{blitz_request, dec, Harness};
use crate::types::{Color, GameRef, GameResult, GameStatus, Outcome, ResultReason, UserRef};

const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";
const AFTER_E5: &str = "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq e6 0 2";

/// Pairs two fresh 1000-balance players at a 100 stake. White first.
async fn paired_game(h: &Harness) -> Result<(GameRef, UserRef, UserRef)> {
    let white = h.funded_user("white", "1000").await;
    let black = h.funded_user("black", "1000").await;
    h.queue().create_match_request(blitz_request(white, "100")).await?;
    let outcome = h.queue().create_match_request(blitz_request(black, "100")).await?;
    let game_ref = outcome.game_ref().expect("paired");
    Ok((game_ref, white, black))
}

fn e4(game_ref: GameRef, user: UserRef) -> MoveRequest {
    MoveRequest {
        game_ref,
        user,
        from: "e2".into(),
        to: "e4".into(),
        promotion: None,
        fen: AFTER_E4.into(),
        move_history: vec!["e4".into()],
        white_time_remaining: 298_000,
        black_time_remaining: 300_000,
    }
}

fn e5(game_ref: GameRef, user: UserRef) -> MoveRequest {
    MoveRequest {
        game_ref,
        user,
        from: "e7".into(),
        to: "e5".into(),
        promotion: None,
        fen: AFTER_E5.into(),
        move_history: vec!["e4".into(), "e5".into()],
        white_time_remaining: 298_000,
        black_time_remaining: 297_500,
    }
}

fn invite(creator: UserRef, stake: &str) -> InviteGameRequest {
    InviteGameRequest {
        creator,
        stake_amount: dec(stake),
        initial_time_seconds: 180,
        increment_seconds: 2,
    }
}

#[tokio::test]
async fn moves_alternate_and_persist_clocks() -> Result<()> {
    let h = Harness::new();
    let (game_ref, white, black) = paired_game(&h).await?;
    let mut game_events = h.notifier.subscribe(Topic::Game(game_ref));

    let view = h.games().apply_move(e4(game_ref, white)).await?;
    assert_eq!(view.moves, vec!["e4".to_string()]);
    assert_eq!(view.fen, AFTER_E4);
    assert_eq!(view.side_to_move, Color::Black);
    assert_eq!(view.white_time_remaining, 298_000);
    assert!(view.last_move_at.is_some());
    assert_eq!(
        game_events.try_recv()?,
        CoreEvent::GameUpdated {
            game_ref,
            move_count: 1
        }
    );

    let view = h.games().apply_move(e5(game_ref, black)).await?;
    assert_eq!(view.moves.len(), 2);
    assert_eq!(view.black_time_remaining, 297_500);
    Ok(())
}

#[tokio::test]
async fn moves_out_of_turn_or_by_strangers_are_rejected() -> Result<()> {
    let h = Harness::new();
    let (game_ref, white, black) = paired_game(&h).await?;
    let stranger = h.funded_user("stranger", "10").await;

    let err = h.games().apply_move(e4(game_ref, black)).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    let err = h.games().apply_move(e4(game_ref, stranger)).await.unwrap_err();
    assert!(matches!(err, CoreError::NotAParticipant));

    let mut skipped = e5(game_ref, white);
    skipped.move_history = vec!["d4".into(), "e5".into(), "c4".into()];
    let err = h.games().apply_move(skipped).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    let mut bad_square = e4(game_ref, white);
    bad_square.to = "e9".into();
    let err = h.games().apply_move(bad_square).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    assert!(h.games().get_game(game_ref).await?.moves.is_empty());
    Ok(())
}

#[tokio::test]
async fn clocks_cannot_run_backwards_under_trusted_policy() -> Result<()> {
    let h = Harness::new();
    let (game_ref, white, _) = paired_game(&h).await?;

    let mut greedy = e4(game_ref, white);
    greedy.white_time_remaining = 301_000;
    let err = h.games().apply_move(greedy).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    Ok(())
}

#[tokio::test]
async fn zero_clock_on_move_flags_the_mover() -> Result<()> {
    let h = Harness::new();
    let (game_ref, white, black) = paired_game(&h).await?;

    let mut flagged = e4(game_ref, white);
    flagged.white_time_remaining = 0;
    let view = h.games().apply_move(flagged).await?;
    assert_eq!(view.status, GameStatus::Completed);
    assert_eq!(
        view.result,
        Some(GameResult::new(Outcome::BlackWins, ResultReason::Timeout))
    );
    assert!(view.moves.is_empty());
    assert_eq!(h.balance(black).await.balance, dec("1090"));
    assert_eq!(h.balance(white).await.balance, dec("900"));
    Ok(())
}

#[tokio::test]
async fn heartbeat_with_zero_clock_ends_the_game() -> Result<()> {
    let h = Harness::new();
    let (game_ref, white, black) = paired_game(&h).await?;
    h.games().apply_move(e4(game_ref, white)).await?;

    let view = h
        .games()
        .update_clocks(ClockUpdate {
            game_ref,
            user: white,
            white_time_remaining: 250_000,
            black_time_remaining: 0,
            last_move_at: h.ctx.now(),
        })
        .await?;
    assert_eq!(view.status, GameStatus::Completed);
    assert_eq!(view.result.map(|r| r.outcome), Some(Outcome::WhiteWins));
    assert_eq!(h.balance(black).await.locked, Decimal::ZERO);

    let err = h.games().apply_move(e5(game_ref, black)).await.unwrap_err();
    assert!(matches!(err, CoreError::GameNotInProgress));
    Ok(())
}

#[tokio::test]
async fn resolving_twice_settles_once() -> Result<()> {
    let h = Harness::new();
    let (game_ref, white, black) = paired_game(&h).await?;
    let checkmate = GameResult::new(Outcome::WhiteWins, ResultReason::Checkmate);

    let first = h.games().resolve(game_ref, checkmate).await?;
    assert!(matches!(first, ResolveOutcome::Resolved(_)));
    let second = h
        .games()
        .resolve(
            game_ref,
            GameResult::new(Outcome::BlackWins, ResultReason::Resignation),
        )
        .await?;
    let ResolveOutcome::AlreadyCompleted(view) = second else {
        panic!("second resolution should be a no-op");
    };
    assert_eq!(view.result, Some(checkmate));

    let winner = h.balance(white).await;
    let loser = h.balance(black).await;
    assert_eq!(winner.balance, dec("1090"));
    assert_eq!(winner.locked, Decimal::ZERO);
    assert_eq!(loser.balance, dec("900"));
    assert_eq!(loser.locked, Decimal::ZERO);

    let settlements = h
        .wallets()
        .history(white)
        .await?
        .into_iter()
        .filter(|e| e.kind == WalletEntryKind::SettleWin)
        .count();
    assert_eq!(settlements, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_resolutions_settle_once() -> Result<()> {
    let h = Harness::new();
    let (game_ref, white, black) = paired_game(&h).await?;
    let games = Arc::new(h.games());

    let mut handles = Vec::new();
    for outcome in [Outcome::WhiteWins, Outcome::BlackWins, Outcome::Draw] {
        let games: Arc<GameSessions> = games.clone();
        handles.push(tokio::spawn(async move {
            games
                .resolve(game_ref, GameResult::new(outcome, ResultReason::Agreement))
                .await
        }));
    }
    let mut resolved = 0;
    for handle in handles {
        if let ResolveOutcome::Resolved(_) = handle.await?? {
            resolved += 1;
        }
    }
    assert_eq!(resolved, 1);

    let total = h.balance(white).await.balance + h.balance(black).await.balance;
    // Only the platform fee leaves the two wallets, and only on a decisive result.
    assert!(total == dec("2000") || total == dec("1990"));
    assert_eq!(h.balance(white).await.locked, Decimal::ZERO);
    assert_eq!(h.balance(black).await.locked, Decimal::ZERO);
    Ok(())
}

#[tokio::test]
async fn draw_returns_both_stakes() -> Result<()> {
    let h = Harness::new();
    let (game_ref, white, black) = paired_game(&h).await?;
    h.games()
        .resolve(
            game_ref,
            GameResult::new(Outcome::Draw, ResultReason::Stalemate),
        )
        .await?;
    for user in [white, black] {
        let wallet = h.balance(user).await;
        assert_eq!(wallet.balance, dec("1000"));
        assert_eq!(wallet.locked, Decimal::ZERO);
    }
    Ok(())
}

#[tokio::test]
async fn invite_lifecycle() -> Result<()> {
    let h = Harness::new();
    let host = h.funded_user("host", "500").await;
    let guest = h.funded_user("guest", "500").await;

    let created = h.games().create_invite_game(invite(host, "50")).await?;
    assert_eq!(created.status, GameStatus::WaitingForOpponent);
    assert_eq!(created.black, None);
    assert_eq!(h.balance(host).await.locked, dec("50"));
    let code = created.invite_code.clone().expect("invite code");
    assert_eq!(code.len(), 8);

    let err = h.games().join_by_invite(&code, host).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    let joined = h
        .games()
        .join_by_invite(&code.to_ascii_lowercase(), guest)
        .await?;
    assert_eq!(joined.status, GameStatus::InProgress);
    assert_eq!(joined.black, Some(guest));
    assert_eq!(joined.white_time_remaining, 180_000);
    assert_eq!(h.balance(guest).await.locked, dec("50"));

    let late = h.funded_user("late", "500").await;
    let err = h.games().join_by_invite(&code, late).await.unwrap_err();
    assert!(matches!(err, CoreError::GameAlreadyStarted));
    Ok(())
}

#[tokio::test]
async fn unknown_invite_code_is_not_found() -> Result<()> {
    let h = Harness::new();
    let guest = h.funded_user("guest", "500").await;
    let err = h.games().join_by_invite("ZZZZZZZZ", guest).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
    let err = h.games().join_by_invite("short", guest).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    Ok(())
}

#[tokio::test]
async fn expired_invites_refund_the_creator() -> Result<()> {
    let h = Harness::new();
    let host = h.funded_user("host", "500").await;
    let guest = h.funded_user("guest", "500").await;
    let created = h.games().create_invite_game(invite(host, "50")).await?;
    let code = created.invite_code.clone().expect("invite code");

    h.advance(Duration::minutes(31));
    let err = h.games().join_by_invite(&code, guest).await.unwrap_err();
    assert!(matches!(err, CoreError::InviteExpired));

    assert_eq!(h.games().expire_invites().await?, 1);
    let view = h.games().get_game(created.game_ref).await?;
    assert_eq!(view.status, GameStatus::Cancelled);
    assert_eq!(h.balance(host).await.locked, Decimal::ZERO);
    assert_eq!(h.games().expire_invites().await?, 0);
    Ok(())
}

#[tokio::test]
async fn creator_can_withdraw_a_waiting_invite() -> Result<()> {
    let h = Harness::new();
    let host = h.funded_user("host", "500").await;
    let created = h.games().create_invite_game(invite(host, "75")).await?;

    let view = h.games().leave(created.game_ref, host).await?;
    assert_eq!(view.status, GameStatus::Cancelled);
    assert_eq!(h.balance(host).await.locked, Decimal::ZERO);

    let err = h
        .games()
        .cancel(created.game_ref, CancelReason::CreatorWithdrew)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AlreadyResolved(_)));
    Ok(())
}

#[tokio::test]
async fn leaving_before_the_first_move_aborts() -> Result<()> {
    let h = Harness::new();
    let (game_ref, white, black) = paired_game(&h).await?;

    let view = h.games().leave(game_ref, black).await?;
    assert_eq!(view.status, GameStatus::Cancelled);
    assert!(view.result.is_none());
    for user in [white, black] {
        let wallet = h.balance(user).await;
        assert_eq!(wallet.balance, dec("1000"));
        assert_eq!(wallet.locked, Decimal::ZERO);
    }
    Ok(())
}

#[tokio::test]
async fn leaving_a_running_game_forfeits_it() -> Result<()> {
    let h = Harness::new();
    let (game_ref, white, black) = paired_game(&h).await?;
    h.games().apply_move(e4(game_ref, white)).await?;

    let view = h.games().leave(game_ref, white).await?;
    assert_eq!(view.status, GameStatus::Completed);
    assert_eq!(
        view.result,
        Some(GameResult::new(Outcome::BlackWins, ResultReason::Abandonment))
    );
    assert_eq!(h.balance(black).await.balance, dec("1090"));

    let again = h
        .games()
        .resolve(
            game_ref,
            GameResult::new(Outcome::WhiteWins, ResultReason::Checkmate),
        )
        .await?;
    assert!(matches!(again, ResolveOutcome::AlreadyCompleted(_)));
    Ok(())
}

#[tokio::test]
async fn cancelled_game_cannot_be_resolved() -> Result<()> {
    let h = Harness::new();
    let (game_ref, _, _) = paired_game(&h).await?;
    h.games().cancel(game_ref, CancelReason::Aborted).await?;

    let err = h
        .games()
        .resolve(
            game_ref,
            GameResult::new(Outcome::Draw, ResultReason::Agreement),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AlreadyResolved(_)));
    Ok(())
}

#[tokio::test]
async fn heartbeat_cannot_grow_a_clock() -> Result<()> {
    let h = Harness::new();
    let (game_ref, white, black) = paired_game(&h).await?;
    h.games().apply_move(e4(game_ref, white)).await?;

    let err = h
        .games()
        .update_clocks(ClockUpdate {
            game_ref,
            user: black,
            white_time_remaining: 298_000,
            black_time_remaining: 9_000_000,
            last_move_at: h.ctx.now(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    let err = h
        .games()
        .update_clocks(ClockUpdate {
            game_ref,
            user: black,
            white_time_remaining: 298_000,
            black_time_remaining: 299_000,
            last_move_at: h.ctx.now() + Duration::seconds(30),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    let view = h.games().get_game(game_ref).await?;
    assert_eq!(view.black_time_remaining, 300_000);

    let mut inflated = e5(game_ref, black);
    inflated.black_time_remaining = 8_999_000;
    let err = h.games().apply_move(inflated).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn leaving_while_a_move_lands_never_errors() -> Result<()> {
    for _ in 0..20 {
        let h = Harness::new();
        let (game_ref, white, _) = paired_game(&h).await?;
        let games = Arc::new(h.games());

        let mover = {
            let games = games.clone();
            tokio::spawn(async move { games.apply_move(e4(game_ref, white)).await })
        };
        let leaver = {
            let games = games.clone();
            tokio::spawn(async move { games.leave(game_ref, white).await })
        };
        let moved = mover.await?;
        let view = leaver.await??;

        match view.status {
            // Left first: the game was aborted and the move bounced.
            GameStatus::Cancelled => assert!(moved.is_err()),
            // Moved first: leaving forfeits.
            GameStatus::Completed => {
                assert!(moved.is_ok());
                assert_eq!(
                    view.result,
                    Some(GameResult::new(Outcome::BlackWins, ResultReason::Abandonment))
                );
            }
            other => panic!("unexpected status {other:?}"),
        }
    }
    Ok(())
}

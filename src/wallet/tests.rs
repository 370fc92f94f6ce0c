use std::sync::Arc;

use anyhow::Result;
use rust_decimal::Decimal;

use crate::error::CoreError;
use crate::model::WalletEntryKind;
use crate::test_support::{dec, Harness};

#[tokio::test]
async fn lock_moves_funds_from_available_to_locked() -> Result<()> {
    let h = Harness::new();
    let alice = h.funded_user("alice", "1000").await;

    let view = h.wallets().lock(alice, dec("250")).await?;
    assert_eq!(view.balance, dec("1000"));
    assert_eq!(view.locked, dec("250"));
    assert_eq!(view.available, dec("750"));

    let history = h.wallets().history(alice).await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, WalletEntryKind::Lock);
    assert_eq!(history[0].amount, dec("250"));
    Ok(())
}

#[tokio::test]
async fn lock_beyond_available_is_refused_without_side_effects() -> Result<()> {
    let h = Harness::new();
    let alice = h.funded_user("alice", "100").await;
    h.wallets().lock(alice, dec("80")).await?;

    let err = h.wallets().lock(alice, dec("30")).await.unwrap_err();
    assert!(matches!(err, CoreError::InsufficientFunds));
    assert_eq!(h.balance(alice).await.locked, dec("80"));
    assert_eq!(h.wallets().history(alice).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn inactive_user_cannot_lock() -> Result<()> {
    let h = Harness::new();
    let alice = h.funded_user("alice", "100").await;
    h.wallets().set_active(alice, false).await?;

    let err = h.wallets().lock(alice, dec("10")).await.unwrap_err();
    assert!(matches!(err, CoreError::UserInactive));
    Ok(())
}

#[tokio::test]
async fn release_floors_locked_at_zero() -> Result<()> {
    let h = Harness::new();
    let alice = h.funded_user("alice", "100").await;
    h.wallets().lock(alice, dec("40")).await?;

    let view = h.wallets().release(alice, dec("65")).await?;
    assert_eq!(view.locked, Decimal::ZERO);
    assert_eq!(view.balance, dec("100"));

    let history = h.wallets().history(alice).await?;
    let release = history.last().expect("release entry");
    assert_eq!(release.kind, WalletEntryKind::Release);
    assert_eq!(release.amount, dec("40"));
    Ok(())
}

#[tokio::test]
async fn negative_amounts_are_rejected() -> Result<()> {
    let h = Harness::new();
    let alice = h.funded_user("alice", "100").await;
    let err = h.wallets().lock(alice, dec("-1")).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    let err = h.wallets().release(alice, dec("-1")).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    Ok(())
}

#[tokio::test]
async fn settlement_pays_pot_net_of_fee() -> Result<()> {
    let h = Harness::new();
    let winner = h.funded_user("winner", "1000").await;
    let loser = h.funded_user("loser", "1000").await;
    h.wallets().lock(winner, dec("100")).await?;
    h.wallets().lock(loser, dec("100")).await?;

    h.wallets()
        .settle(winner, loser, dec("100"), dec("10"))
        .await?;

    let w = h.balance(winner).await;
    let l = h.balance(loser).await;
    assert_eq!(w.balance, dec("1090"));
    assert_eq!(w.locked, Decimal::ZERO);
    assert_eq!(l.balance, dec("900"));
    assert_eq!(l.locked, Decimal::ZERO);

    let kinds: Vec<_> = h
        .wallets()
        .history(winner)
        .await?
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            WalletEntryKind::Lock,
            WalletEntryKind::SettleWin,
            WalletEntryKind::PlatformFee
        ]
    );
    Ok(())
}

#[tokio::test]
async fn draw_releases_both_stakes_without_transfer() -> Result<()> {
    let h = Harness::new();
    let a = h.funded_user("a", "500").await;
    let b = h.funded_user("b", "500").await;
    h.wallets().lock(a, dec("50")).await?;
    h.wallets().lock(b, dec("50")).await?;

    h.wallets().settle_draw(a, b, dec("50")).await?;

    for user in [a, b] {
        let view = h.balance(user).await;
        assert_eq!(view.balance, dec("500"));
        assert_eq!(view.locked, Decimal::ZERO);
    }
    let err = h.wallets().settle_draw(a, a, dec("50")).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_locks_never_overdraw() -> Result<()> {
    let h = Harness::new();
    let alice = h.funded_user("alice", "100").await;
    let ledger = Arc::new(h.wallets());

    let mut handles = Vec::new();
    for _ in 0..20 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(
            async move { ledger.lock(alice, dec("15")).await },
        ));
    }
    let mut granted = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => granted += 1,
            Err(CoreError::InsufficientFunds) => {}
            Err(other) => return Err(other.into()),
        }
    }

    // 6 × 15 = 90 fits, a seventh would not.
    assert_eq!(granted, 6);
    let view = h.balance(alice).await;
    assert_eq!(view.locked, dec("90"));
    assert!(view.locked <= view.balance);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn locking_while_losing_a_settlement_stays_within_balance() -> Result<()> {
    let h = Harness::new();
    let alice = h.funded_user("alice", "200").await;
    let bob = h.funded_user("bob", "200").await;
    let ledger = Arc::new(h.wallets());

    for round in 0..8 {
        ledger.lock(alice, dec("20")).await?;
        ledger.lock(bob, dec("20")).await?;

        let locker = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.lock(alice, dec("30")).await })
        };
        let settler = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.settle(bob, alice, dec("20"), Decimal::ZERO).await })
        };
        let locked_extra = match locker.await? {
            Ok(_) => true,
            Err(CoreError::InsufficientFunds) => false,
            Err(other) => return Err(other.into()),
        };
        settler.await??;

        let view = h.balance(alice).await;
        assert!(view.locked >= Decimal::ZERO, "round {round}: {view:?}");
        assert!(view.locked <= view.balance, "round {round}: {view:?}");
        assert_eq!(view.balance, dec("200") - dec("20") * Decimal::from(round + 1));

        if locked_extra {
            ledger.release(alice, dec("30")).await?;
        }
        assert_eq!(h.balance(alice).await.locked, Decimal::ZERO);
    }
    Ok(())
}

#[tokio::test]
async fn blank_display_name_is_rejected() {
    let h = Harness::new();
    let err = h.wallets().open_account("  ", dec("10")).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}

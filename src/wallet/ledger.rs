use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use crate::context::CoreContext;
use crate::error::{CoreError, CoreResult};
use crate::model::{User, Wallet, WalletEntry, WalletEntryKind};
use crate::store::{CoreStorageTxn, NewUser};
use crate::types::{Amount, GameId, UserId, UserRef};

const LOG_TARGET: &str = "wager_chess::wallet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WalletView {
    pub balance: Amount,
    pub locked: Amount,
    pub available: Amount,
}

impl From<&Wallet> for WalletView {
    fn from(wallet: &Wallet) -> Self {
        Self {
            balance: wallet.balance,
            locked: wallet.locked_amount,
            available: wallet.available(),
        }
    }
}

/// A decisive result to be paid out: both players staked `stake`, the
/// platform keeps `fee` out of the `2 × stake` pot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub winner: UserId,
    pub loser: UserId,
    pub stake: Amount,
    pub fee: Amount,
    pub game_id: Option<GameId>,
}

/// Resolves a reference to a user that may act.
pub(crate) async fn load_active_user(
    txn: &mut dyn CoreStorageTxn,
    reference: UserRef,
) -> CoreResult<User> {
    let user = txn
        .load_user(reference)
        .await?
        .ok_or(CoreError::UserNotFound)?;
    if !user.is_active {
        return Err(CoreError::UserInactive);
    }
    Ok(user)
}

pub(crate) async fn user_ref(
    txn: &mut dyn CoreStorageTxn,
    user_id: UserId,
) -> CoreResult<UserRef> {
    txn.load_user_by_id(user_id)
        .await?
        .map(|user| user.reference)
        .ok_or(CoreError::UserNotFound)
}

async fn locked_wallet(txn: &mut dyn CoreStorageTxn, user_id: UserId) -> CoreResult<Wallet> {
    txn.lock_wallet(user_id)
        .await?
        .ok_or(CoreError::NotFound("wallet"))
}

async fn persist(
    txn: &mut dyn CoreStorageTxn,
    wallet: &Wallet,
    journal: Vec<(WalletEntryKind, Amount)>,
    game_id: Option<GameId>,
    now: DateTime<Utc>,
) -> CoreResult<()> {
    if !wallet.holds_invariant() {
        return Err(CoreError::invalid_state(format!(
            "wallet {} would violate 0 <= locked <= balance",
            wallet.user_id
        )));
    }
    txn.save_wallet(wallet).await?;
    for (kind, amount) in journal {
        txn.append_wallet_entry(WalletEntry {
            user_id: wallet.user_id,
            kind,
            amount,
            game_id,
            created_at: now,
        })
        .await?;
    }
    Ok(())
}

fn ensure_non_negative(amount: Amount) -> CoreResult<()> {
    if amount < Decimal::ZERO {
        return Err(CoreError::validation("amount cannot be negative"));
    }
    Ok(())
}

/// Moves `amount` from available into locked funds. A zero amount is a no-op.
pub async fn lock_stake(
    txn: &mut dyn CoreStorageTxn,
    user_id: UserId,
    amount: Amount,
    game_id: Option<GameId>,
    now: DateTime<Utc>,
) -> CoreResult<Wallet> {
    ensure_non_negative(amount)?;
    let user = txn
        .load_user_by_id(user_id)
        .await?
        .ok_or(CoreError::UserNotFound)?;
    if !user.is_active {
        return Err(CoreError::UserInactive);
    }
    let mut wallet = locked_wallet(txn, user_id).await?;
    if amount.is_zero() {
        return Ok(wallet);
    }
    if wallet.available() < amount {
        debug!(
            target = LOG_TARGET,
            user_id,
            %amount,
            available = %wallet.available(),
            "lock refused"
        );
        return Err(CoreError::InsufficientFunds);
    }
    wallet.locked_amount += amount;
    persist(txn, &wallet, vec![(WalletEntryKind::Lock, amount)], game_id, now).await?;
    Ok(wallet)
}

/// Returns `amount` of locked funds to available, flooring locked at zero.
pub async fn release_stake(
    txn: &mut dyn CoreStorageTxn,
    user_id: UserId,
    amount: Amount,
    game_id: Option<GameId>,
    now: DateTime<Utc>,
) -> CoreResult<Wallet> {
    ensure_non_negative(amount)?;
    let mut wallet = locked_wallet(txn, user_id).await?;
    if amount.is_zero() {
        return Ok(wallet);
    }
    let released = amount.min(wallet.locked_amount);
    wallet.locked_amount -= released;
    persist(
        txn,
        &wallet,
        vec![(WalletEntryKind::Release, released)],
        game_id,
        now,
    )
    .await?;
    Ok(wallet)
}

/// Releases both stakes and pays the pot net of fee to the winner.
pub async fn settle_win(
    txn: &mut dyn CoreStorageTxn,
    settlement: Settlement,
    now: DateTime<Utc>,
) -> CoreResult<(Wallet, Wallet)> {
    let Settlement {
        winner,
        loser,
        stake,
        fee,
        game_id,
    } = settlement;
    ensure_non_negative(stake)?;
    ensure_non_negative(fee)?;
    if winner == loser {
        return Err(CoreError::validation("winner and loser must differ"));
    }
    if fee > stake * Decimal::TWO {
        return Err(CoreError::validation("fee exceeds the pot"));
    }

    // Lock order by user id so concurrent settlements cannot deadlock.
    let (mut winner_wallet, mut loser_wallet) = if winner < loser {
        let w = locked_wallet(txn, winner).await?;
        let l = locked_wallet(txn, loser).await?;
        (w, l)
    } else {
        let l = locked_wallet(txn, loser).await?;
        let w = locked_wallet(txn, winner).await?;
        (w, l)
    };

    loser_wallet.locked_amount -= stake.min(loser_wallet.locked_amount);
    if loser_wallet.balance < stake {
        return Err(CoreError::invalid_state(format!(
            "wallet {loser} cannot cover its stake"
        )));
    }
    loser_wallet.balance -= stake;

    winner_wallet.locked_amount -= stake.min(winner_wallet.locked_amount);
    let net = stake - fee;
    winner_wallet.balance += net;

    let mut loser_journal = vec![(WalletEntryKind::SettleLoss, stake)];
    let mut winner_journal = vec![(WalletEntryKind::SettleWin, net)];
    if !fee.is_zero() {
        winner_journal.push((WalletEntryKind::PlatformFee, fee));
    }
    if stake.is_zero() {
        loser_journal.clear();
        winner_journal.clear();
    }

    persist(txn, &loser_wallet, loser_journal, game_id, now).await?;
    persist(txn, &winner_wallet, winner_journal, game_id, now).await?;

    info!(
        target = LOG_TARGET,
        winner,
        loser,
        %stake,
        %fee,
        game_id = ?game_id,
        "settled"
    );
    Ok((winner_wallet, loser_wallet))
}

/// Releases both stakes with no transfer.
pub async fn settle_draw(
    txn: &mut dyn CoreStorageTxn,
    players: (UserId, UserId),
    stake: Amount,
    game_id: Option<GameId>,
    now: DateTime<Utc>,
) -> CoreResult<()> {
    ensure_non_negative(stake)?;
    if players.0 == players.1 {
        return Err(CoreError::validation("a draw needs two distinct players"));
    }
    let (first, second) = if players.0 <= players.1 {
        players
    } else {
        (players.1, players.0)
    };
    for user_id in [first, second] {
        let mut wallet = locked_wallet(txn, user_id).await?;
        let released = stake.min(wallet.locked_amount);
        wallet.locked_amount -= released;
        let journal = if stake.is_zero() {
            Vec::new()
        } else {
            vec![(WalletEntryKind::DrawRelease, released)]
        };
        persist(txn, &wallet, journal, game_id, now).await?;
    }
    info!(target = LOG_TARGET, players = ?players, %stake, "draw settled");
    Ok(())
}

/// Standalone ledger operations, each in its own transaction.
#[derive(Clone)]
pub struct WalletLedger {
    ctx: Arc<CoreContext>,
}

impl WalletLedger {
    pub fn new(ctx: Arc<CoreContext>) -> Self {
        Self { ctx }
    }

    pub async fn open_account(
        &self,
        display_name: &str,
        opening_balance: Amount,
    ) -> CoreResult<User> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(CoreError::validation("display_name is required"));
        }
        if opening_balance < Decimal::ZERO {
            return Err(CoreError::validation("opening balance cannot be negative"));
        }
        let mut txn = self.ctx.storage.begin().await?;
        let result = txn
            .insert_user(NewUser {
                reference: UserRef::new(),
                display_name: display_name.to_string(),
                is_active: true,
                opening_balance,
            })
            .await;
        match result {
            Ok(user) => {
                txn.commit().await?;
                info!(target = LOG_TARGET, user = %user.reference, "account opened");
                Ok(user)
            }
            Err(err) => {
                txn.rollback().await;
                Err(err)
            }
        }
    }

    pub async fn set_active(&self, user: UserRef, active: bool) -> CoreResult<()> {
        let mut txn = self.ctx.storage.begin().await?;
        let result = async {
            let record = txn.load_user(user).await?.ok_or(CoreError::UserNotFound)?;
            txn.set_user_active(record.id, active).await
        }
        .await;
        match result {
            Ok(()) => {
                txn.commit().await?;
                Ok(())
            }
            Err(err) => {
                txn.rollback().await;
                Err(err)
            }
        }
    }

    pub async fn balance(&self, user: UserRef) -> CoreResult<WalletView> {
        let mut txn = self.ctx.storage.begin().await?;
        let result = async {
            let record = txn.load_user(user).await?.ok_or(CoreError::UserNotFound)?;
            let wallet = locked_wallet(txn.as_mut(), record.id).await?;
            Ok(WalletView::from(&wallet))
        }
        .await;
        txn.rollback().await;
        result
    }

    pub async fn history(&self, user: UserRef) -> CoreResult<Vec<WalletEntry>> {
        let mut txn = self.ctx.storage.begin().await?;
        let result = async {
            let record = txn.load_user(user).await?.ok_or(CoreError::UserNotFound)?;
            txn.list_wallet_entries(record.id).await
        }
        .await;
        txn.rollback().await;
        result
    }

    pub async fn lock(&self, user: UserRef, amount: Amount) -> CoreResult<WalletView> {
        let now = self.ctx.now();
        let mut txn = self.ctx.storage.begin().await?;
        let result = async {
            let record = txn.load_user(user).await?.ok_or(CoreError::UserNotFound)?;
            lock_stake(txn.as_mut(), record.id, amount, None, now).await
        }
        .await;
        finish(txn, result).await
    }

    pub async fn release(&self, user: UserRef, amount: Amount) -> CoreResult<WalletView> {
        let now = self.ctx.now();
        let mut txn = self.ctx.storage.begin().await?;
        let result = async {
            let record = txn.load_user(user).await?.ok_or(CoreError::UserNotFound)?;
            release_stake(txn.as_mut(), record.id, amount, None, now).await
        }
        .await;
        finish(txn, result).await
    }

    pub async fn settle(
        &self,
        winner: UserRef,
        loser: UserRef,
        stake: Amount,
        fee: Amount,
    ) -> CoreResult<()> {
        let now = self.ctx.now();
        let mut txn = self.ctx.storage.begin().await?;
        let result = async {
            let winner = txn.load_user(winner).await?.ok_or(CoreError::UserNotFound)?;
            let loser = txn.load_user(loser).await?.ok_or(CoreError::UserNotFound)?;
            settle_win(
                txn.as_mut(),
                Settlement {
                    winner: winner.id,
                    loser: loser.id,
                    stake,
                    fee,
                    game_id: None,
                },
                now,
            )
            .await
        }
        .await;
        match result {
            Ok(_) => {
                txn.commit().await?;
                Ok(())
            }
            Err(err) => {
                txn.rollback().await;
                Err(err)
            }
        }
    }

    pub async fn settle_draw(
        &self,
        first: UserRef,
        second: UserRef,
        stake: Amount,
    ) -> CoreResult<()> {
        let now = self.ctx.now();
        let mut txn = self.ctx.storage.begin().await?;
        let result = async {
            let first = txn.load_user(first).await?.ok_or(CoreError::UserNotFound)?;
            let second = txn.load_user(second).await?.ok_or(CoreError::UserNotFound)?;
            settle_draw(txn.as_mut(), (first.id, second.id), stake, None, now).await
        }
        .await;
        match result {
            Ok(()) => {
                txn.commit().await?;
                Ok(())
            }
            Err(err) => {
                txn.rollback().await;
                Err(err)
            }
        }
    }
}

async fn finish(
    txn: Box<dyn CoreStorageTxn>,
    result: CoreResult<Wallet>,
) -> CoreResult<WalletView> {
    match result {
        Ok(wallet) => {
            txn.commit().await?;
            Ok(WalletView::from(&wallet))
        }
        Err(err) => {
            txn.rollback().await;
            Err(err)
        }
    }
}

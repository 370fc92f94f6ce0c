//! Wallet Ledger: escrow of game stakes against user balances.
//!
//! Every mutation keeps `0 <= locked_amount <= balance` and appends a
//! [`WalletEntry`](crate::model::WalletEntry) in the same transaction. The
//! free functions operate inside a caller-owned transaction so that pairing
//! and settlement can compose them with queue and game writes;
//! [`WalletLedger`] wraps each one in its own transaction.

mod ledger;

#[cfg(test)]
mod tests;

pub(crate) use ledger::{load_active_user, user_ref};
pub use ledger::{
    lock_stake, release_stake, settle_draw, settle_win, Settlement, WalletLedger, WalletView,
};

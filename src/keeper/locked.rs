//! The locked-coins getter the keeper hands to the bank.
//!
//! It is a free function over the context alone, so the bank can hold it
//! without holding the keeper.

use std::sync::Arc;

use crate::address::Address;
use crate::bank::LockedCoinsGetter;
use crate::coin::Coins;
use crate::context::Context;
use crate::error::HoldError;

use super::keys;

/// Funds on hold for `addr`, or nothing when `ctx` bypasses holds.
///
/// A single unreadable entry fails the whole lookup: reporting less than is
/// actually held would let those funds be spent.
pub fn get_locked_coins(ctx: &Context, addr: &Address) -> Result<Coins, HoldError> {
    if ctx.has_bypass() {
        return Ok(Coins::default());
    }
    keys::account_hold_coins(ctx, addr).into_result()
}

pub fn locked_coins_getter() -> LockedCoinsGetter {
    Arc::new(get_locked_coins)
}

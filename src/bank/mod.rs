//! The balance subsystem, seen from the hold ledger.
//!
//! The ledger consumes [`BankKeeper`] to learn what an account can spend and
//! hands back a [`LockedCoinsGetter`] so the bank can subtract holds when it
//! computes spendable funds. Neither side names the other's concrete type.
//!
//! [`MemBank`] is an in-memory bank that honours that contract; the CLI and
//! the tests run the ledger against it.

use std::collections::BTreeMap;
use std::sync::Arc;

use num_traits::{Signed, Zero};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::coin::{Coin, Coins};
use crate::context::Context;
use crate::error::HoldError;

/// "How much of this address's balance is locked right now?"
pub type LockedCoinsGetter =
    Arc<dyn Fn(&Context, &Address) -> Result<Coins, HoldError> + Send + Sync>;

pub trait BankKeeper: Send + Sync {
    fn get_balance(&self, ctx: &Context, addr: &Address, denom: &str) -> Coin;

    fn get_all_balances(&self, ctx: &Context, addr: &Address) -> Coins;

    /// Everything locked against the address by any registered mechanism.
    fn locked_coins(&self, ctx: &Context, addr: &Address) -> Result<Coins, HoldError>;

    /// Balance minus locked, per denom, never below zero.
    fn spendable_coins(&self, ctx: &Context, addr: &Address) -> Result<Coins, HoldError> {
        let locked = self.locked_coins(ctx, addr)?;
        Ok(subtract_locked(&self.get_all_balances(ctx, addr), &locked))
    }

    fn append_locked_coins_getter(&self, getter: LockedCoinsGetter);
}

fn subtract_locked(balances: &Coins, locked: &Coins) -> Coins {
    balances
        .iter()
        .filter_map(|bal| {
            let remaining = &bal.amount - locked.amount_of(&bal.denom);
            remaining
                .is_positive()
                .then(|| Coin::new(bal.denom.clone(), remaining))
        })
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum BankError {
    #[error("spendable balance {available} is smaller than {requested}: insufficient funds")]
    InsufficientFunds { available: Coin, requested: Coin },
    #[error("cannot send negative amount \"{0}\"")]
    NegativeAmount(Coins),
    #[error("could not determine locked funds: {0}")]
    Locked(#[from] HoldError),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Balance {
    pub address: Address,
    pub coins: Coins,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BankGenesis {
    #[serde(default)]
    pub balances: Vec<Balance>,
}

#[derive(Default)]
pub struct MemBank {
    balances: RwLock<BTreeMap<Address, Coins>>,
    // Locks placed by something other than the hold ledger (vesting, etc.).
    external_locks: RwLock<BTreeMap<Address, Coins>>,
    getters: RwLock<Vec<LockedCoinsGetter>>,
}

impl MemBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_genesis(genesis: &BankGenesis) -> Self {
        let bank = Self::new();
        for balance in &genesis.balances {
            bank.fund_account(&balance.address, &balance.coins);
        }
        bank
    }

    pub fn export_genesis(&self) -> BankGenesis {
        let balances = self
            .balances
            .read()
            .iter()
            .filter(|(_, coins)| !coins.is_empty())
            .map(|(address, coins)| Balance {
                address: address.clone(),
                coins: coins.clone(),
            })
            .collect();
        BankGenesis { balances }
    }

    pub fn fund_account(&self, addr: &Address, coins: &Coins) {
        self.balances
            .write()
            .entry(addr.clone())
            .or_default()
            .add(coins);
    }

    /// Remove funds without looking at locks. Models balance changes that
    /// bypass the hold ledger entirely (slashing, burns).
    pub fn burn_unchecked(&self, addr: &Address, coins: &Coins) {
        let mut balances = self.balances.write();
        let entry = balances.entry(addr.clone()).or_default();
        for coin in coins {
            let have = entry.amount_of(&coin.denom);
            let take = if coin.amount > have { have } else { coin.amount.clone() };
            entry.add_coin(Coin::new(coin.denom.clone(), -take));
        }
    }

    pub fn set_external_lock(&self, addr: &Address, coins: Coins) {
        let mut locks = self.external_locks.write();
        if coins.is_zero() {
            locks.remove(addr);
        } else {
            locks.insert(addr.clone(), coins);
        }
    }

    /// Move funds, refusing to touch anything that is locked.
    pub fn send_coins(
        &self,
        ctx: &Context,
        from: &Address,
        to: &Address,
        amount: &Coins,
    ) -> Result<(), BankError> {
        if amount.is_any_negative() {
            return Err(BankError::NegativeAmount(amount.clone()));
        }
        let spendable = self.spendable_coins(ctx, from)?;
        for coin in amount.iter().filter(|c| !c.is_zero()) {
            let available = spendable.amount_of(&coin.denom);
            if available < coin.amount {
                return Err(BankError::InsufficientFunds {
                    available: Coin::new(coin.denom.clone(), available),
                    requested: coin.clone(),
                });
            }
        }

        let mut balances = self.balances.write();
        for coin in amount.iter().filter(|c| !c.is_zero()) {
            balances
                .entry(from.clone())
                .or_default()
                .add_coin(Coin::new(coin.denom.clone(), -coin.amount.clone()));
            balances.entry(to.clone()).or_default().add_coin(coin.clone());
        }
        Ok(())
    }
}

impl BankKeeper for MemBank {
    fn get_balance(&self, _ctx: &Context, addr: &Address, denom: &str) -> Coin {
        let amount = self
            .balances
            .read()
            .get(addr)
            .map(|coins| coins.amount_of(denom))
            .unwrap_or_else(Zero::zero);
        Coin::new(denom, amount)
    }

    fn get_all_balances(&self, _ctx: &Context, addr: &Address) -> Coins {
        self.balances.read().get(addr).cloned().unwrap_or_default()
    }

    fn locked_coins(&self, ctx: &Context, addr: &Address) -> Result<Coins, HoldError> {
        let mut locked = self
            .external_locks
            .read()
            .get(addr)
            .cloned()
            .unwrap_or_default();
        // Getters may call back into this bank, so no lock is held while they run.
        let getters: Vec<LockedCoinsGetter> = self.getters.read().clone();
        for getter in getters {
            locked.add(&getter(ctx, addr)?);
        }
        Ok(locked)
    }

    fn append_locked_coins_getter(&self, getter: LockedCoinsGetter) {
        self.getters.write().push(getter);
    }
}

//! The hold keeper: places funds on hold, releases them, and reads them back.
//!
//! Every write goes through [`keys::set_hold_coin_amount`], so a zero amount
//! is never persisted. Bulk reads keep going past entries they cannot decode
//! and report them alongside whatever did decode (see [`Partial`]).

pub mod genesis;
pub mod invariants;
pub mod keys;
pub mod locked;
pub mod query;

use std::ops::ControlFlow;
use std::sync::Arc;

use num_traits::Signed;

use crate::address::{Address, AddressError};
use crate::bank::BankKeeper;
use crate::coin::{Coin, Coins};
use crate::config::HoldConfig;
use crate::context::Context;
use crate::error::{HoldError, Partial};
use crate::events::HoldEvent;
use crate::genesis::AccountHold;

#[derive(Clone)]
pub struct Keeper {
    bank: Arc<dyn BankKeeper>,
    config: HoldConfig,
}

impl Keeper {
    /// Build a keeper and register its locked-coins getter with `bank`.
    /// Construct one keeper per bank; each registration counts holds again.
    pub fn new(bank: Arc<dyn BankKeeper>, config: HoldConfig) -> Self {
        bank.append_locked_coins_getter(locked::locked_coins_getter());
        tracing::debug!("registered hold locked coins getter");
        Self { bank, config }
    }

    pub fn config(&self) -> &HoldConfig {
        &self.config
    }

    pub fn bank(&self) -> &Arc<dyn BankKeeper> {
        &self.bank
    }

    /// Check that `addr` can currently spend everything in `funds`.
    ///
    /// The check counts all locked funds, holds included, so it answers
    /// "can this much more go on hold?".
    pub fn validate_new_hold(&self, ctx: &Context, addr: &Address, funds: &Coins) -> Result<(), HoldError> {
        ensure_address(addr)?;
        if funds.is_zero() {
            return Ok(());
        }
        if funds.is_any_negative() {
            return Err(HoldError::NegativeHold {
                addr: addr.clone(),
                funds: funds.clone(),
            });
        }
        ensure_sorted_unique(addr, funds)?;

        let spendable = self.spendable_for_denoms(ctx, addr, funds)?;
        for to_add in funds.iter().filter(|c| !c.is_zero()) {
            let available = spendable
                .find(&to_add.denom)
                .cloned()
                .unwrap_or_else(|| Coin::zero(to_add.denom.clone()));
            if available.amount < to_add.amount {
                return Err(HoldError::InsufficientSpendable {
                    addr: addr.clone(),
                    available,
                    requested: to_add.clone(),
                });
            }
        }
        Ok(())
    }

    // Spendable balance of just the denoms in `funds`. Cheaper than asking the
    // bank for every denom the account owns.
    fn spendable_for_denoms(&self, ctx: &Context, addr: &Address, funds: &Coins) -> Result<Coins, HoldError> {
        let all_locked = self.bank.locked_coins(ctx, addr)?;

        let mut rv = Vec::with_capacity(funds.len());
        for coin in funds {
            let mut bal = self.bank.get_balance(ctx, addr, &coin.denom);
            if !bal.is_positive() {
                continue;
            }
            let locked = all_locked.amount_of(&coin.denom);
            if locked.is_positive() {
                if bal.amount <= locked {
                    continue;
                }
                bal.amount -= locked;
            }
            rv.push(bal);
        }
        Ok(Coins::from_raw(rv))
    }

    /// Put `funds` on hold for `addr`.
    ///
    /// The whole call is rejected if the account cannot cover the funds.
    /// After that, each denom is applied on its own: a denom whose current
    /// entry cannot be read is skipped and reported, the rest still go on
    /// hold. One `HoldAdded` event covers everything that was applied.
    pub fn add_hold(
        &self,
        ctx: &Context,
        addr: &Address,
        funds: &Coins,
        reason: &str,
    ) -> Result<Partial<Coins>, HoldError> {
        ensure_address(addr)?;
        if funds.is_zero() {
            return Ok(Partial::default());
        }
        self.validate_new_hold(ctx, addr, funds)?;

        let mut added = Coins::default();
        let mut errors = Vec::new();
        for to_add in funds.iter().filter(|c| !c.is_zero()) {
            let on_hold = match keys::get_hold_coin_amount(ctx, addr, &to_add.denom) {
                Ok(amount) => amount,
                Err(err) => {
                    tracing::warn!(%addr, denom = %to_add.denom, error = %err, "skipping hold");
                    errors.push(err.context(format!(
                        "failed to get current {} hold amount for {addr}",
                        to_add.denom
                    )));
                    continue;
                }
            };
            let new_amount = on_hold + &to_add.amount;
            if let Err(err) = keys::set_hold_coin_amount(ctx, addr, &to_add.denom, &new_amount) {
                tracing::warn!(%addr, coin = %to_add, error = %err, "could not store hold");
                errors.push(err.context(format!("failed to place {to_add} on hold for {addr}")));
                continue;
            }
            added.add_coin(to_add.clone());
        }

        if !added.is_zero() {
            tracing::debug!(%addr, amount = %added, reason, "funds placed on hold");
            ctx.emit(HoldEvent::hold_added(addr, added.clone(), reason));
        }
        Ok(Partial::new(added, errors))
    }

    /// Take `funds` off hold for `addr`.
    ///
    /// Denoms are released independently. Asking for more than is held for a
    /// denom fails that denom only. One `HoldReleased` event covers the
    /// denoms that changed.
    pub fn release_hold(&self, ctx: &Context, addr: &Address, funds: &Coins) -> Result<Partial<Coins>, HoldError> {
        ensure_address(addr)?;
        if funds.is_zero() {
            return Ok(Partial::default());
        }
        if funds.is_any_negative() {
            return Err(HoldError::NegativeRelease {
                addr: addr.clone(),
                funds: funds.clone(),
            });
        }
        ensure_sorted_unique(addr, funds)?;

        let mut released = Coins::default();
        let mut errors = Vec::new();
        for to_release in funds.iter().filter(|c| !c.is_zero()) {
            let on_hold = match keys::get_hold_coin_amount(ctx, addr, &to_release.denom) {
                Ok(amount) => amount,
                Err(err) => {
                    tracing::warn!(%addr, denom = %to_release.denom, error = %err, "skipping release");
                    errors.push(err.context(format!(
                        "failed to get current {} hold amount for {addr}",
                        to_release.denom
                    )));
                    continue;
                }
            };

            let new_amount = &on_hold - &to_release.amount;
            if new_amount.is_negative() {
                errors.push(HoldError::InsufficientHold {
                    addr: addr.clone(),
                    requested: to_release.clone(),
                    held: Coin::new(to_release.denom.clone(), on_hold),
                });
                continue;
            }

            if let Err(err) = keys::set_hold_coin_amount(ctx, addr, &to_release.denom, &new_amount) {
                tracing::warn!(%addr, coin = %to_release, error = %err, "could not store release");
                errors.push(err.context(format!("failed to release {to_release} from hold for {addr}")));
                continue;
            }
            released.add_coin(to_release.clone());
        }

        if !released.is_zero() {
            tracing::debug!(%addr, amount = %released, "funds released from hold");
            ctx.emit(HoldEvent::hold_released(addr, released.clone()));
        }
        Ok(Partial::new(released, errors))
    }

    /// Amount of `denom` on hold for `addr`; a zero coin when there is none.
    pub fn get_hold_coin(&self, ctx: &Context, addr: &Address, denom: &str) -> Result<Coin, HoldError> {
        keys::get_hold_coin_amount(ctx, addr, denom).map(|amount| Coin::new(denom, amount))
    }

    pub fn get_hold_coins(&self, ctx: &Context, addr: &Address) -> Partial<Coins> {
        keys::account_hold_coins(ctx, addr)
    }

    /// Visit each denom on hold for `addr`, in denom order.
    pub fn iterate_holds<F>(&self, ctx: &Context, addr: &Address, mut process: F) -> Result<(), HoldError>
    where
        F: FnMut(Coin) -> ControlFlow<()>,
    {
        let prefix = keys::create_hold_coin_key_addr_prefix(addr);
        let errors = keys::walk_hold_entries(ctx, &prefix, |_, coin| process(coin));
        HoldError::join(errors).map_or(Ok(()), Err)
    }

    /// Visit every hold entry, ordered by address then denom.
    pub fn iterate_all_holds<F>(&self, ctx: &Context, mut process: F) -> Result<(), HoldError>
    where
        F: FnMut(&Address, Coin) -> ControlFlow<()>,
    {
        let errors = keys::walk_hold_entries(ctx, keys::KEY_PREFIX_HOLD_COIN, |addr, coin| process(&addr, coin));
        HoldError::join(errors).map_or(Ok(()), Err)
    }

    /// One [`AccountHold`] per address that has anything on hold.
    pub fn get_all_account_holds(&self, ctx: &Context) -> Partial<Vec<AccountHold>> {
        let mut holds: Vec<AccountHold> = Vec::new();
        let mut last_addr: Option<Address> = None;
        let errors = keys::walk_hold_entries(ctx, keys::KEY_PREFIX_HOLD_COIN, |addr, coin| {
            if last_addr.as_ref() != Some(&addr) {
                holds.push(AccountHold::new(&addr, Coins::default()));
                last_addr = Some(addr);
            }
            if let Some(entry) = holds.last_mut() {
                entry.amount.add_coin(coin);
            }
            ControlFlow::Continue(())
        });
        Partial::new(holds, errors)
    }

    /// What the bank should treat as locked for `addr` on account of holds.
    pub fn get_locked_coins(&self, ctx: &Context, addr: &Address) -> Result<Coins, HoldError> {
        locked::get_locked_coins(ctx, addr)
    }
}

fn ensure_address(addr: &Address) -> Result<(), HoldError> {
    if addr.is_empty() {
        return Err(AddressError::Empty.into());
    }
    Ok(())
}

// A repeated denom would be checked once but applied twice.
fn ensure_sorted_unique(addr: &Address, funds: &Coins) -> Result<(), HoldError> {
    if !funds.is_sorted_unique() {
        return Err(HoldError::UnsortedFunds {
            addr: addr.clone(),
            funds: funds.clone(),
        });
    }
    Ok(())
}

impl std::fmt::Debug for Keeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keeper").field("config", &self.config).finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use std::ops::ControlFlow;

    use super::fixture::{addr, coins, Fixture};
    use super::keys;
    use crate::address::Address;
    use crate::bank::BankKeeper;
    use crate::events::HoldEvent;
    use crate::store::KvStore;

    #[test]
    fn validate_new_hold_cases() {
        let f = Fixture::new();
        let (a1, a2) = (addr(1), addr(2));
        f.fund(&a1, "100banana,5cucumber");
        f.fund(&a2, "10banana");
        f.set_hold(&a2, "banana", 4);

        assert!(f.keeper.validate_new_hold(&f.ctx, &a1, &coins("")).is_ok());
        assert!(f.keeper.validate_new_hold(&f.ctx, &a1, &coins("0banana")).is_ok());
        assert!(f.keeper.validate_new_hold(&f.ctx, &a1, &coins("100banana,5cucumber")).is_ok());

        let err = f.keeper.validate_new_hold(&f.ctx, &a1, &coins("5banana,-1cucumber")).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("hold amounts \"5banana,-1cucumber\" for {a1} cannot be negative")
        );

        let err = f.keeper.validate_new_hold(&f.ctx, &a1, &coins("3acorn")).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("account {a1} spendable balance 0acorn is less than hold amount 3acorn")
        );

        // The existing hold counts against what a2 can spend.
        let err = f.keeper.validate_new_hold(&f.ctx, &a2, &coins("7banana")).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("account {a2} spendable balance 6banana is less than hold amount 7banana")
        );
        assert!(f.keeper.validate_new_hold(&f.ctx, &a2, &coins("6banana")).is_ok());

        // Without the hook the hold disappears from the calculation.
        assert!(f.keeper.validate_new_hold(&f.ctx.with_bypass(), &a2, &coins("10banana")).is_ok());
    }

    #[test]
    fn add_then_read_back() {
        let f = Fixture::new();
        let a = addr(1);
        f.fund(&a, "100banana,50cucumber");

        let applied = f.keeper.add_hold(&f.ctx, &a, &coins("10banana,3cucumber"), "order 1").unwrap();
        assert!(applied.is_complete());
        assert_eq!(applied.value.to_string(), "10banana,3cucumber");
        f.keeper.add_hold(&f.ctx, &a, &coins("5banana"), "order 2").unwrap();

        assert_eq!(f.keeper.get_hold_coin(&f.ctx, &a, "banana").unwrap().to_string(), "15banana");
        assert_eq!(f.keeper.get_hold_coin(&f.ctx, &a, "acorn").unwrap().to_string(), "0acorn");
        assert_eq!(
            f.keeper.get_hold_coins(&f.ctx, &a).into_result().unwrap().to_string(),
            "15banana,3cucumber"
        );
        assert_eq!(
            f.ctx.event_manager().events(),
            vec![
                HoldEvent::hold_added(&a, coins("10banana,3cucumber"), "order 1"),
                HoldEvent::hold_added(&a, coins("5banana"), "order 2"),
            ]
        );
    }

    #[test]
    fn add_rejects_whole_call_when_short() {
        let f = Fixture::new();
        let a = addr(1);
        f.fund(&a, "10banana,10cucumber");
        let err = f.keeper.add_hold(&f.ctx, &a, &coins("5banana,11cucumber"), "x").unwrap_err();
        assert!(err.to_string().contains("spendable balance 10cucumber is less than hold amount 11cucumber"));
        assert!(f.store.is_empty());
        assert!(f.ctx.event_manager().events().is_empty());
    }

    #[test]
    fn zero_funds_are_a_no_op() {
        let f = Fixture::new();
        let a = addr(1);
        let added = f.keeper.add_hold(&f.ctx, &a, &coins("0banana,0cucumber"), "x").unwrap();
        assert!(added.is_complete() && added.value.is_empty());
        let released = f.keeper.release_hold(&f.ctx, &a, &coins("")).unwrap();
        assert!(released.is_complete() && released.value.is_empty());
        assert!(f.ctx.event_manager().events().is_empty());
    }

    #[test]
    fn add_skips_zero_denoms_and_corrupt_entries() {
        let f = Fixture::new();
        let a = addr(1);
        f.fund(&a, "100banana,100cucumber");
        // A corrupt entry makes the locked lookup fail, so go around the hook
        // to get past validation.
        f.set_raw(&a, "cucumber", b"garbage");
        let ctx = f.ctx.with_bypass();

        let (added, err) = f
            .keeper
            .add_hold(&ctx, &a, &coins("0acorn,7banana,2cucumber"), "x")
            .unwrap()
            .into_parts();
        assert_eq!(added.to_string(), "7banana");
        let msg = err.unwrap().to_string();
        assert!(
            msg.starts_with(&format!("failed to get current cucumber hold amount for {a}: failed to read amount of cucumber")),
            "{msg}"
        );
        assert_eq!(
            f.ctx.event_manager().events(),
            vec![HoldEvent::hold_added(&a, coins("7banana"), "x")]
        );
    }

    #[test]
    fn release_restores_and_deletes_at_zero() {
        let f = Fixture::new();
        let a = addr(1);
        f.fund(&a, "100banana,50cucumber");
        f.keeper.add_hold(&f.ctx, &a, &coins("10banana,3cucumber"), "x").unwrap();

        let released = f.keeper.release_hold(&f.ctx, &a, &coins("10banana,1cucumber")).unwrap();
        assert!(released.is_complete());
        assert_eq!(f.keeper.get_hold_coins(&f.ctx, &a).value.to_string(), "2cucumber");
        assert_eq!(f.store.len(), 1);

        f.keeper.release_hold(&f.ctx, &a, &coins("2cucumber")).unwrap();
        assert!(f.store.is_empty());
    }

    #[test]
    fn release_mixed_good_and_bad() {
        let f = Fixture::new();
        let a = addr(1);
        f.set_hold(&a, "banana", 10);
        f.set_hold(&a, "cucumber", 3);

        let (released, err) = f
            .keeper
            .release_hold(&f.ctx, &a, &coins("4banana,5cucumber,1durian"))
            .unwrap()
            .into_parts();
        assert_eq!(released.to_string(), "4banana");
        let msg = err.unwrap().to_string();
        let lines: Vec<&str> = msg.lines().collect();
        assert_eq!(
            lines,
            vec![
                format!("cannot release 5cucumber from hold for {a}: account only has 3cucumber on hold"),
                format!("cannot release 1durian from hold for {a}: account only has 0durian on hold"),
            ]
        );
        assert_eq!(f.keeper.get_hold_coins(&f.ctx, &a).value.to_string(), "6banana,3cucumber");
        assert_eq!(
            f.ctx.event_manager().events(),
            vec![HoldEvent::hold_released(&a, coins("4banana"))]
        );
    }

    #[test]
    fn repeated_or_unsorted_denoms_are_rejected() {
        let f = Fixture::new();
        let a = addr(1);
        f.fund(&a, "6banana,6cucumber");

        let err = f.keeper.add_hold(&f.ctx, &a, &coins("5banana,5banana"), "x").unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("amounts \"5banana,5banana\" for {a} must be sorted by denom with each denom listed once")
        );
        assert!(f.keeper.add_hold(&f.ctx, &a, &coins("1cucumber,1banana"), "x").is_err());
        assert!(f.store.is_empty());
        assert_eq!(f.keeper.bank().spendable_coins(&f.ctx, &a).unwrap().to_string(), "6banana,6cucumber");

        f.keeper.add_hold(&f.ctx, &a, &coins("6banana"), "x").unwrap();
        assert!(f.keeper.release_hold(&f.ctx, &a, &coins("3banana,3banana")).is_err());
        assert_eq!(f.keeper.get_hold_coin(&f.ctx, &a, "banana").unwrap().to_string(), "6banana");
        assert_eq!(
            f.ctx.event_manager().events(),
            vec![HoldEvent::hold_added(&a, coins("6banana"), "x")]
        );
    }

    #[test]
    fn empty_address_is_rejected() {
        let f = Fixture::new();
        let empty = Address::from_raw(Vec::new());

        let err = f.keeper.add_hold(&f.ctx, &empty, &coins("5banana"), "x").unwrap_err();
        assert_eq!(err.to_string(), "invalid address: address cannot be empty");
        assert!(f.keeper.release_hold(&f.ctx, &empty, &coins("5banana")).is_err());
        assert!(f.keeper.validate_new_hold(&f.ctx, &empty, &coins("")).is_err());
        assert!(keys::set_hold_coin_amount(&f.ctx, &empty, "banana", &5.into()).is_err());

        assert!(f.store.is_empty());
        assert!(f.keeper.get_all_account_holds(&f.ctx).into_result().unwrap().is_empty());
    }

    #[test]
    fn release_skips_corrupt_entries() {
        let f = Fixture::new();
        let a = addr(1);
        f.set_hold(&a, "banana", 10);
        f.set_raw(&a, "cucumber", b"garbage");

        let (released, err) = f
            .keeper
            .release_hold(&f.ctx.with_bypass(), &a, &coins("4banana,2cucumber"))
            .unwrap()
            .into_parts();
        assert_eq!(released.to_string(), "4banana");
        let msg = err.unwrap().to_string();
        assert!(
            msg.starts_with(&format!("failed to get current cucumber hold amount for {a}: failed to read amount of cucumber")),
            "{msg}"
        );
        assert_eq!(f.keeper.get_hold_coin(&f.ctx, &a, "banana").unwrap().to_string(), "6banana");
        assert_eq!(f.store.get(&keys::create_hold_coin_key(&a, "cucumber")), Some(b"garbage".to_vec()));
        assert_eq!(
            f.ctx.event_manager().events(),
            vec![HoldEvent::hold_released(&a, coins("4banana"))]
        );
    }

    #[test]
    fn release_rejects_negative() {
        let f = Fixture::new();
        let a = addr(1);
        let err = f.keeper.release_hold(&f.ctx, &a, &coins("1banana,-1cucumber")).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("cannot release \"1banana,-1cucumber\" from hold for {a}: amounts cannot be negative")
        );
    }

    #[test]
    fn amounts_beyond_u64() {
        let f = Fixture::new();
        let a = addr(1);
        f.fund(&a, "5000000000000000000000hugecoin");
        f.keeper
            .add_hold(&f.ctx, &a, &coins("2000000000000000000000hugecoin"), "x")
            .unwrap();
        f.keeper
            .add_hold(&f.ctx, &a, &coins("1844674407370955161500hugecoin"), "y")
            .unwrap();
        assert_eq!(
            f.keeper.get_hold_coin(&f.ctx, &a, "hugecoin").unwrap().to_string(),
            "3844674407370955161500hugecoin"
        );
    }

    #[test]
    fn iterate_and_group() {
        let f = Fixture::new();
        let (a1, a2, a3) = (addr(1), addr(2), addr(3));
        f.set_hold(&a1, "banana", 1);
        f.set_hold(&a1, "acorn", 2);
        f.set_hold(&a2, "banana", 3);
        f.set_raw(&a2, "badcoin", b"nope");
        f.set_hold(&a3, "cucumber", 4);

        let mut denoms = Vec::new();
        f.keeper
            .iterate_holds(&f.ctx, &a1, |coin| {
                denoms.push(coin.denom);
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(denoms, vec!["acorn", "banana"]);

        let mut seen = Vec::new();
        let err = f
            .keeper
            .iterate_all_holds(&f.ctx, |addr, coin| {
                seen.push((addr.clone(), coin.to_string()));
                ControlFlow::Continue(())
            })
            .unwrap_err();
        assert!(err.to_string().contains("failed to read amount of badcoin"));
        assert_eq!(
            seen,
            vec![
                (a1.clone(), "2acorn".to_string()),
                (a1.clone(), "1banana".to_string()),
                (a2.clone(), "3banana".to_string()),
                (a3.clone(), "4cucumber".to_string()),
            ]
        );

        let mut count = 0;
        let _ = f.keeper.iterate_all_holds(&f.ctx, |_, _| {
            count += 1;
            ControlFlow::Break(())
        });
        assert_eq!(count, 1);

        let (holds, err) = f.keeper.get_all_account_holds(&f.ctx).into_parts();
        assert!(err.is_some());
        let summary: Vec<(String, String)> = holds
            .iter()
            .map(|h| (h.address.clone(), h.amount.to_string()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (a1.to_string(), "2acorn,1banana".to_string()),
                (a2.to_string(), "3banana".to_string()),
                (a3.to_string(), "4cucumber".to_string()),
            ]
        );
    }

    #[test]
    fn exact_spendable_hold_leaves_nothing_spendable() {
        let f = Fixture::new();
        let a = addr(1);
        f.fund(&a, "40banana");
        f.keeper.add_hold(&f.ctx, &a, &coins("40banana"), "all").unwrap();

        let spendable = f.keeper.bank().spendable_coins(&f.ctx, &a).unwrap();
        assert!(spendable.is_empty());
        assert_eq!(f.keeper.get_locked_coins(&f.ctx, &a).unwrap().to_string(), "40banana");
        assert!(f.keeper.get_locked_coins(&f.ctx.with_bypass(), &a).unwrap().is_empty());
    }
}

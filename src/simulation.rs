//! Random genesis generation for simulations.
//!
//! Holds are generated first and the bank genesis is then topped up so every
//! hold is covered, which keeps the generated state importable.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::address::{Address, AddressError};
use crate::bank::BankGenesis;
use crate::coin::{Coin, Coins};
use crate::genesis::{AccountHold, GenesisState};

/// Largest amount a simulated account puts on hold.
pub const MAX_SIM_HOLD: u64 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("no bank genesis balance found for {address} that should have a hold on {amount}")]
    NoBalance { address: String, amount: Coins },
    #[error(transparent)]
    Address(#[from] AddressError),
}

/// Each account, in random order, is picked with even odds. Picked accounts
/// hold between 1 and [`MAX_SIM_HOLD`] of `bond_denom`.
pub fn random_account_holds<R: Rng + ?Sized>(
    rng: &mut R,
    accounts: &[Address],
    bond_denom: &str,
) -> Vec<AccountHold> {
    let mut order: Vec<&Address> = accounts.iter().collect();
    order.shuffle(rng);

    let mut holds = Vec::new();
    for addr in order {
        if !rng.gen_bool(0.5) {
            continue;
        }
        let amount = rng.gen_range(1..=MAX_SIM_HOLD);
        holds.push(AccountHold::new(addr, Coins::new([Coin::new(bond_denom, amount)])));
    }
    holds
}

/// Add each hold's amount to its account's bank genesis balance.
///
/// Nothing is changed unless every hold has a balance entry to add to.
pub fn update_bank_balances_for_holds(bank: &mut BankGenesis, holds: &GenesisState) -> Result<(), SimulationError> {
    let mut targets = Vec::with_capacity(holds.holds.len());
    for hold in &holds.holds {
        let addr = hold.parsed_address()?;
        let idx = bank
            .balances
            .iter()
            .position(|bal| bal.address == addr)
            .ok_or_else(|| SimulationError::NoBalance {
                address: hold.address.clone(),
                amount: hold.amount.clone(),
            })?;
        targets.push((idx, &hold.amount));
    }
    for (idx, amount) in targets {
        bank.balances[idx].coins.add(amount);
    }
    Ok(())
}

/// A random hold genesis for `accounts`, with `bank` adjusted to cover it.
pub fn randomized_gen_state<R: Rng + ?Sized>(
    rng: &mut R,
    accounts: &[Address],
    bank: &mut BankGenesis,
    bond_denom: &str,
) -> Result<GenesisState, SimulationError> {
    let state = GenesisState::new(random_account_holds(rng, accounts, bond_denom));
    update_bank_balances_for_holds(bank, &state)?;
    tracing::info!(holds = %holds_string(&state.holds), "selected randomly generated hold genesis");
    Ok(state)
}

/// One `"address":"amount"` line per hold, wrapped in braces.
pub fn holds_string(holds: &[AccountHold]) -> String {
    if holds.is_empty() {
        return "{}".to_string();
    }
    let lines: Vec<String> = holds
        .iter()
        .map(|h| format!(" \"{}\":\"{}\"", h.address, h.amount))
        .collect();
    format!("{{\n{}\n}}", lines.join(",\n"))
}

#[cfg(test)]
mod tests {
    use num_bigint::BigInt;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::bank::Balance;

    fn addr(n: u8) -> Address {
        let mut bytes = format!("addr{n}").into_bytes();
        bytes.resize(20, b'_');
        Address::new(bytes).unwrap()
    }

    fn bal(n: u8, amount: u64) -> Balance {
        Balance {
            address: addr(n),
            coins: Coins::new([Coin::new("trout", amount)]),
        }
    }

    fn ah(n: u8, amount: u64) -> AccountHold {
        AccountHold::new(&addr(n), Coins::new([Coin::new("trout", amount)]))
    }

    #[test]
    fn random_holds_are_deterministic_and_in_range() {
        let accounts: Vec<Address> = (1..=20).map(addr).collect();
        let a = random_account_holds(&mut StdRng::seed_from_u64(7), &accounts, "stake");
        let b = random_account_holds(&mut StdRng::seed_from_u64(7), &accounts, "stake");
        assert_eq!(a, b);
        assert!(a.len() <= accounts.len());
        for hold in &a {
            assert_eq!(hold.amount.len(), 1);
            let amount = hold.amount.amount_of("stake");
            assert!(amount >= BigInt::from(1u64) && amount <= BigInt::from(MAX_SIM_HOLD), "{amount}");
        }
        let state = GenesisState::new(a);
        state.validate().unwrap();
        assert!(random_account_holds(&mut StdRng::seed_from_u64(7), &[], "stake").is_empty());
    }

    #[test]
    fn update_bank_adds_hold_amounts() {
        let mut bank = BankGenesis {
            balances: vec![bal(1, 33), bal(2, 66), bal(3, 99)],
        };
        let holds = GenesisState::new(vec![ah(2, 24), ah(3, 1), ah(1, 17)]);
        update_bank_balances_for_holds(&mut bank, &holds).unwrap();
        assert_eq!(bank.balances, vec![bal(1, 50), bal(2, 90), bal(3, 100)]);
    }

    #[test]
    fn update_bank_requires_a_balance() {
        let mut bank = BankGenesis {
            balances: vec![bal(1, 33), bal(2, 66)],
        };
        let holds = GenesisState::new(vec![ah(2, 24), ah(4, 111), ah(1, 17)]);
        let err = update_bank_balances_for_holds(&mut bank, &holds).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("no bank genesis balance found for {} that should have a hold on 111trout", addr(4))
        );
        assert_eq!(bank.balances, vec![bal(1, 33), bal(2, 66)]);
    }

    #[test]
    fn randomized_state_is_covered_by_bank() {
        let accounts: Vec<Address> = (1..=5).map(addr).collect();
        let mut bank = BankGenesis {
            balances: accounts.iter().map(|a| Balance { address: a.clone(), coins: Coins::default() }).collect(),
        };
        let state = randomized_gen_state(&mut StdRng::seed_from_u64(3), &accounts, &mut bank, "stake").unwrap();
        for hold in &state.holds {
            let addr = hold.parsed_address().unwrap();
            let balance = bank.balances.iter().find(|b| b.address == addr).unwrap();
            assert_eq!(balance.coins, hold.amount);
        }
    }

    #[test]
    fn holds_string_format() {
        assert_eq!(holds_string(&[]), "{}");
        let s = holds_string(&[ah(1, 11), ah(2, 22)]);
        assert_eq!(
            s,
            format!("{{\n \"{}\":\"11trout\",\n \"{}\":\"22trout\"\n}}", addr(1), addr(2))
        );
    }
}

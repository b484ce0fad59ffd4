//! Ledger-wide audit: does every account still have the balance its holds
//! claim?

use std::fmt::Write as _;

use crate::address::Address;
use crate::coin::Coins;
use crate::context::Context;
use crate::error::HoldError;

use super::Keeper;

pub const MODULE_NAME: &str = "hold";
pub const ROUTE_ACCOUNT_SPENDABLE: &str = "account-spendable";

/// Returns a report and whether the invariant is broken.
pub type Invariant = Box<dyn Fn(&Context) -> (String, bool) + Send + Sync>;

/// Somewhere invariants can be registered under a module and route.
pub trait InvariantRegistry {
    fn register_route(&mut self, module: &str, route: &str, invariant: Invariant);
}

/// Registered invariants, run in registration order.
#[derive(Default)]
pub struct Invariants {
    routes: Vec<(String, String, Invariant)>,
}

impl Invariants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routes(&self) -> impl Iterator<Item = String> + '_ {
        self.routes.iter().map(|(module, route, _)| format!("{module}/{route}"))
    }

    /// Run everything; returns each report with its broken flag.
    pub fn check_all(&self, ctx: &Context) -> Vec<(String, bool)> {
        self.routes
            .iter()
            .map(|(module, route, invariant)| {
                let (msg, broken) = invariant(ctx);
                if broken {
                    tracing::warn!(module = %module, route = %route, "invariant broken");
                }
                (msg, broken)
            })
            .collect()
    }
}

impl InvariantRegistry for Invariants {
    fn register_route(&mut self, module: &str, route: &str, invariant: Invariant) {
        self.routes.push((module.to_string(), route.to_string(), invariant));
    }
}

pub fn register_invariants(registry: &mut dyn InvariantRegistry, keeper: &Keeper) {
    registry.register_route(
        MODULE_NAME,
        ROUTE_ACCOUNT_SPENDABLE,
        hold_account_balances_invariant(keeper.clone()),
    );
}

pub fn hold_account_balances_invariant(keeper: Keeper) -> Invariant {
    Box::new(move |ctx: &Context| {
        let (msg, broken) = hold_account_balances_invariant_helper(ctx, &keeper);
        (format_invariant(MODULE_NAME, ROUTE_ACCOUNT_SPENDABLE, &msg), broken)
    })
}

pub fn format_invariant(module: &str, route: &str, msg: &str) -> String {
    format!("{module}: {route} invariant\n{msg}\n")
}

/// Re-check every account's holds against its balance, ignoring the holds
/// themselves when working out what is locked.
pub fn hold_account_balances_invariant_helper(ctx: &Context, keeper: &Keeper) -> (String, bool) {
    let holds = match keeper.get_all_account_holds(ctx).into_result() {
        Ok(holds) => holds,
        Err(err) => return (format!("Failed to get a record of all funds that are on hold: {err}"), true),
    };
    if holds.is_empty() {
        return ("No accounts have funds on hold. No problems detected.".to_string(), false);
    }

    let ctx = ctx.with_bypass();
    let mut total = Coins::default();
    let mut problems: Vec<HoldError> = Vec::new();
    for hold in &holds {
        total.add(&hold.amount);
        let checked = hold
            .address
            .parse::<Address>()
            .map_err(HoldError::from)
            .and_then(|addr| keeper.validate_new_hold(&ctx, &addr, &hold.amount));
        if let Err(err) = checked {
            problems.push(err);
        }
    }

    let mut msg = if holds.len() == 1 {
        format!("1 account has {total} on hold. ")
    } else {
        format!("{} accounts have {total} on hold. ", holds.len())
    };
    match problems.len() {
        0 => msg.push_str("No problems detected."),
        1 => {
            let _ = write!(msg, "1 problem detected: {}", problems[0]);
        }
        n => {
            let _ = write!(msg, "{n} problems detected:");
            for (i, err) in problems.iter().enumerate() {
                let _ = write!(msg, "\n{}: {err}", i + 1);
            }
        }
    }
    (msg, !problems.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keeper::fixture::{addr, coins, Fixture};

    fn ins(a: &Address, available: &str, requested: &str) -> String {
        format!("account {a} spendable balance {available} is less than hold amount {requested}")
    }

    #[test]
    fn no_holds() {
        let f = Fixture::new();
        assert_eq!(
            hold_account_balances_invariant_helper(&f.ctx, &f.keeper),
            ("No accounts have funds on hold. No problems detected.".to_string(), false)
        );
    }

    #[test]
    fn everything_covered() {
        let f = Fixture::new();
        f.fund(&addr(1), "100banana,3cucumber");
        f.fund(&addr(2), "12banana");
        f.set_hold(&addr(1), "banana", 100);
        f.set_hold(&addr(1), "cucumber", 3);
        f.set_hold(&addr(2), "banana", 12);
        assert_eq!(
            hold_account_balances_invariant_helper(&f.ctx, &f.keeper),
            ("2 accounts have 112banana,3cucumber on hold. No problems detected.".to_string(), false)
        );
    }

    #[test]
    fn one_problem() {
        let f = Fixture::new();
        f.fund(&addr(2), "12banana");
        f.set_hold(&addr(2), "banana", 13);
        let (msg, broken) = hold_account_balances_invariant_helper(&f.ctx, &f.keeper);
        assert!(broken);
        assert_eq!(
            msg,
            format!("1 account has 13banana on hold. 1 problem detected: {}", ins(&addr(2), "12banana", "13banana"))
        );
    }

    #[test]
    fn several_problems_are_numbered() {
        let f = Fixture::new();
        f.fund(&addr(1), "99banana");
        f.fund(&addr(2), "1844674407370955161500hugecoin");
        f.set_hold(&addr(1), "banana", 100);
        f.set_hold(&addr(2), "hugecoin", "1844674407370955161501".parse::<num_bigint::BigInt>().unwrap());
        f.set_hold(&addr(3), "stake", 5);
        let (msg, broken) = hold_account_balances_invariant_helper(&f.ctx, &f.keeper);
        assert!(broken);
        assert_eq!(
            msg,
            format!(
                "3 accounts have 100banana,1844674407370955161501hugecoin,5stake on hold. 3 problems detected:\n1: {}\n2: {}\n3: {}",
                ins(&addr(1), "99banana", "100banana"),
                ins(&addr(2), "1844674407370955161500hugecoin", "1844674407370955161501hugecoin"),
                ins(&addr(3), "0stake", "5stake"),
            )
        );
    }

    #[test]
    fn balance_drained_outside_the_ledger_is_caught() {
        let f = Fixture::new();
        f.fund(&addr(1), "10banana");
        f.keeper.add_hold(&f.ctx, &addr(1), &coins("8banana"), "x").unwrap();
        assert!(!hold_account_balances_invariant_helper(&f.ctx, &f.keeper).1);

        f.bank.burn_unchecked(&addr(1), &coins("5banana"));
        assert_eq!(
            hold_account_balances_invariant_helper(&f.ctx, &f.keeper),
            (
                format!("1 account has 8banana on hold. 1 problem detected: {}", ins(&addr(1), "5banana", "8banana")),
                true
            )
        );
    }

    #[test]
    fn external_locks_still_count() {
        let f = Fixture::new();
        f.fund(&addr(4), "10stake");
        f.bank.set_external_lock(&addr(4), coins("6stake"));
        f.set_hold(&addr(4), "stake", 5);
        let (msg, broken) = hold_account_balances_invariant_helper(&f.ctx, &f.keeper);
        assert!(broken);
        assert!(msg.ends_with(&ins(&addr(4), "4stake", "5stake")), "{msg}");
    }

    #[test]
    fn corrupt_store_is_broken() {
        let f = Fixture::new();
        f.set_raw(&addr(1), "banana", b"x");
        let (msg, broken) = hold_account_balances_invariant_helper(&f.ctx, &f.keeper);
        assert!(broken);
        assert!(msg.starts_with("Failed to get a record of all funds that are on hold: failed to read amount of banana"));
    }

    #[test]
    fn registry_formats_route() {
        let f = Fixture::new();
        let mut registry = Invariants::new();
        register_invariants(&mut registry, &f.keeper);
        assert_eq!(registry.routes().collect::<Vec<_>>(), vec!["hold/account-spendable"]);
        let results = registry.check_all(&f.ctx);
        assert_eq!(
            results,
            vec![(
                "hold: account-spendable invariant\nNo accounts have funds on hold. No problems detected.\n".to_string(),
                false
            )]
        );
    }
}

//! Account-scoped fund holds.
//!
//! A hold marks part of an account's balance as unspendable without moving
//! it. The [`Keeper`] stores one entry per (address, denom), validates new
//! holds against the bank's spendable balance and reports held funds back
//! to the bank as locked coins so transfers cannot touch them.

pub mod address;
pub mod app;
pub mod bank;
pub mod coin;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod genesis;
pub mod keeper;
pub mod simulation;
pub mod store;

pub use address::Address;
pub use bank::{BankKeeper, MemBank};
pub use coin::{Coin, Coins};
pub use config::HoldConfig;
pub use context::Context;
pub use error::{HoldError, Partial, QueryError};
pub use events::{EventManager, HoldEvent};
pub use genesis::{AccountHold, GenesisState};
pub use keeper::Keeper;
pub use store::{KvStore, MemStore};

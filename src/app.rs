//! A bank and a hold keeper over one in-memory store, loaded from and
//! exported to a single JSON document.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bank::{BankGenesis, MemBank};
use crate::config::HoldConfig;
use crate::context::Context;
use crate::error::HoldError;
use crate::genesis::{GenesisError, GenesisState};
use crate::keeper::genesis::InitGenesisError;
use crate::keeper::invariants::{register_invariants, Invariants};
use crate::keeper::Keeper;
use crate::store::MemStore;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppState {
    #[serde(default)]
    pub bank: BankGenesis,
    #[serde(default)]
    pub hold: GenesisState,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("hold genesis: {0}")]
    Invalid(#[from] GenesisError),
    #[error("hold genesis: {0}")]
    Import(#[from] InitGenesisError),
}

pub struct App {
    pub store: Arc<MemStore>,
    pub bank: Arc<MemBank>,
    pub keeper: Keeper,
    pub invariants: Invariants,
    ctx: Context,
}

impl App {
    pub fn new(config: HoldConfig) -> Self {
        let store = Arc::new(MemStore::new());
        let bank = Arc::new(MemBank::new());
        let keeper = Keeper::new(bank.clone(), config);
        let mut invariants = Invariants::new();
        register_invariants(&mut invariants, &keeper);
        let ctx = Context::new(store.clone());
        Self {
            store,
            bank,
            keeper,
            invariants,
            ctx,
        }
    }

    /// Validate `state`, load balances, then load holds.
    pub fn from_state(state: &AppState, config: HoldConfig) -> Result<Self, AppError> {
        state.hold.validate()?;
        let app = Self::new(config);
        for balance in &state.bank.balances {
            app.bank.fund_account(&balance.address, &balance.coins);
        }
        app.keeper.try_init_genesis(&app.ctx, &state.hold)?;
        Ok(app)
    }

    pub fn ctx(&self) -> &Context {
        &self.ctx
    }

    pub fn export(&self) -> Result<AppState, HoldError> {
        Ok(AppState {
            bank: self.bank.export_genesis(),
            hold: self.keeper.try_export_genesis(&self.ctx)?,
        })
    }
}

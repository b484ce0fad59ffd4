use crate::address::AddressError;
use crate::context::Context;
use crate::error::HoldError;
use crate::events::EventManager;
use crate::genesis::GenesisState;

use super::Keeper;

/// Reason recorded on holds placed while loading genesis.
pub const GENESIS_REASON: &str = "genesis";

#[derive(Debug, thiserror::Error)]
pub enum ImportFailure {
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error(transparent)]
    Hold(#[from] HoldError),
}

/// A genesis entry that could not be loaded.
#[derive(Debug, thiserror::Error)]
#[error("holds[{index}]: {address}: {source}")]
pub struct InitGenesisError {
    pub index: usize,
    pub address: String,
    #[source]
    pub source: ImportFailure,
}

impl Keeper {
    /// Load every hold in `state`, stopping at the first one that fails.
    ///
    /// Balances must already be in the bank: each hold goes through the
    /// same spendable check as [`Keeper::add_hold`]. Nothing is emitted.
    pub fn try_init_genesis(&self, ctx: &Context, state: &GenesisState) -> Result<(), InitGenesisError> {
        let ctx = ctx.with_event_manager(EventManager::discarding());
        for (index, hold) in state.holds.iter().enumerate() {
            let fail = |source: ImportFailure| InitGenesisError {
                index,
                address: hold.address.clone(),
                source,
            };
            let addr = hold.parsed_address().map_err(|e| fail(e.into()))?;
            self.add_hold(&ctx, &addr, &hold.amount, GENESIS_REASON)
                .and_then(|applied| applied.into_result())
                .map_err(|e| fail(e.into()))?;
        }
        tracing::info!(accounts = state.holds.len(), "imported hold genesis");
        Ok(())
    }

    /// Load genesis. An invalid genesis must never start, so any failure panics.
    pub fn init_genesis(&self, ctx: &Context, state: &GenesisState) {
        if let Err(err) = self.try_init_genesis(ctx, state) {
            panic!("{err}");
        }
    }

    pub fn try_export_genesis(&self, ctx: &Context) -> Result<GenesisState, HoldError> {
        let holds = self.get_all_account_holds(ctx).into_result()?;
        tracing::info!(accounts = holds.len(), "exported hold genesis");
        Ok(GenesisState::new(holds))
    }

    /// Dump the ledger. A corrupt entry here means the state itself is broken,
    /// so this panics rather than writing a partial export.
    pub fn export_genesis(&self, ctx: &Context) -> GenesisState {
        match self.try_export_genesis(ctx) {
            Ok(state) => state,
            Err(err) => panic!("{err}"),
        }
    }
}

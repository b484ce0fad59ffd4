//! Genesis document for the hold ledger.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::address::{Address, AddressError};
use crate::coin::{validate_denom, Coins, CoinsParseError};

/// Everything one account has on hold. Never stored as such; assembled from
/// the per-denom entries for genesis and queries.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountHold {
    pub address: String,
    pub amount: Coins,
}

impl AccountHold {
    pub fn new(address: &Address, amount: Coins) -> Self {
        Self {
            address: address.to_string(),
            amount,
        }
    }

    pub fn parsed_address(&self) -> Result<Address, AddressError> {
        self.address.parse()
    }

    pub fn validate(&self) -> Result<(), GenesisError> {
        self.parsed_address()
            .map_err(|e| GenesisError::Address(self.address.clone(), e))?;
        validate_coins(&self.amount)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenesisError {
    #[error("invalid address {0:?}: {1}")]
    Address(String, AddressError),
    #[error("invalid amount \"{0}\": {1}")]
    Denom(Coins, CoinsParseError),
    #[error("invalid amount \"{0}\": coin {1} is not positive")]
    NotPositive(Coins, String),
    #[error("invalid amount \"{0}\": denoms must be sorted and unique")]
    Unsorted(Coins),
    #[error("duplicate address {addr} also at holds[{first}]")]
    DuplicateAddress { addr: String, first: usize },
    #[error("invalid holds[{index}]: {source}")]
    Entry {
        index: usize,
        #[source]
        source: Box<GenesisError>,
    },
}

fn validate_coins(coins: &Coins) -> Result<(), GenesisError> {
    for coin in coins {
        validate_denom(&coin.denom).map_err(|e| GenesisError::Denom(coins.clone(), e))?;
        if !coin.is_positive() {
            return Err(GenesisError::NotPositive(coins.clone(), coin.to_string()));
        }
    }
    if !coins.is_sorted_unique() {
        return Err(GenesisError::Unsorted(coins.clone()));
    }
    Ok(())
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenesisState {
    #[serde(default)]
    pub holds: Vec<AccountHold>,
}

impl GenesisState {
    pub fn new(holds: Vec<AccountHold>) -> Self {
        Self { holds }
    }

    /// Check every entry and that no address appears twice.
    pub fn validate(&self) -> Result<(), GenesisError> {
        let mut seen: Vec<(Address, usize)> = Vec::with_capacity(self.holds.len());
        for (index, hold) in self.holds.iter().enumerate() {
            let wrap = |source: GenesisError| GenesisError::Entry {
                index,
                source: Box::new(source),
            };
            hold.validate().map_err(wrap)?;
            let addr = hold
                .parsed_address()
                .map_err(|e| wrap(GenesisError::Address(hold.address.clone(), e)))?;
            if let Some((_, first)) = seen.iter().find(|(a, _)| *a == addr) {
                return Err(wrap(GenesisError::DuplicateAddress {
                    addr: hold.address.clone(),
                    first: *first,
                }));
            }
            seen.push((addr, index));
        }
        Ok(())
    }

    /// Sum of every hold.
    pub fn total(&self) -> Coins {
        let mut total = Coins::default();
        for hold in &self.holds {
            total.add(&hold.amount);
        }
        total
    }

    /// Merkle root over the (address, denom, amount) entries, order independent
    /// of how the holds list was written.
    pub fn state_root(&self) -> [u8; 32] {
        let mut entries: Vec<(Vec<u8>, &str, String)> = Vec::new();
        for hold in &self.holds {
            let addr = hold
                .parsed_address()
                .map(|a| a.as_bytes().to_vec())
                .unwrap_or_else(|_| hold.address.as_bytes().to_vec());
            for coin in &hold.amount {
                entries.push((addr.clone(), coin.denom.as_str(), coin.amount.to_string()));
            }
        }
        entries.sort();
        let leaves: Vec<[u8; 32]> = entries
            .iter()
            .map(|(addr, denom, amount)| -> [u8; 32] {
                let mut hasher = Sha256::new();
                hasher.update(b"hold");
                hasher.update([addr.len() as u8]);
                hasher.update(addr);
                hasher.update(denom.as_bytes());
                hasher.update([0u8]);
                hasher.update(amount.as_bytes());
                hasher.finalize().into()
            })
            .collect();
        build_merkle(leaves)
    }
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"hold-ledger-empty").into();
    }
    while leaves.len() > 1 {
        leaves = leaves
            .chunks(2)
            .map(|pair| -> [u8; 32] {
                let mut hasher = Sha256::new();
                hasher.update(b"node");
                hasher.update(pair[0]);
                hasher.update(pair.get(1).unwrap_or(&pair[0]));
                hasher.finalize().into()
            })
            .collect();
    }
    leaves[0]
}

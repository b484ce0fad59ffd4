use std::fmt;

use thiserror::Error;

use crate::address::{Address, AddressError};
use crate::coin::{Coin, Coins, Denom};

/// Stored bytes that are not a non-negative base-10 integer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot parse {0:?} as a non-negative integer")]
pub struct AmountDecodeError(pub String);

/// A store key that does not follow the hold key layout.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("key is empty")]
    Empty,
    #[error("key {0} does not start with the hold coin prefix")]
    WrongPrefix(String),
    #[error("key {key} declares a {len} byte address but only {remaining} bytes remain")]
    Truncated {
        key: String,
        len: usize,
        remaining: usize,
    },
    #[error("key {0} has no address")]
    NoAddress(String),
    #[error("key {0} has no denom")]
    NoDenom(String),
    #[error("key {0} has a denom that is not valid utf-8")]
    DenomEncoding(String),
}

/// Canonical error type of the hold keeper.
#[derive(Debug, Error)]
pub enum HoldError {
    #[error("hold amounts \"{funds}\" for {addr} cannot be negative")]
    NegativeHold { addr: Address, funds: Coins },

    #[error("amounts \"{funds}\" for {addr} must be sorted by denom with each denom listed once")]
    UnsortedFunds { addr: Address, funds: Coins },

    #[error("account {addr} spendable balance {available} is less than hold amount {requested}")]
    InsufficientSpendable {
        addr: Address,
        available: Coin,
        requested: Coin,
    },

    #[error("cannot release \"{funds}\" from hold for {addr}: amounts cannot be negative")]
    NegativeRelease { addr: Address, funds: Coins },

    #[error("cannot release {requested} from hold for {addr}: account only has {held} on hold")]
    InsufficientHold {
        addr: Address,
        requested: Coin,
        held: Coin,
    },

    #[error("cannot store hold with an empty denom for {addr}")]
    EmptyDenom { addr: Address },

    #[error("cannot store negative hold amount {amount} for {addr}")]
    NegativeAmount { addr: Address, amount: Coin },

    /// An entry whose value could not be decoded.
    #[error("failed to read amount of {denom} for account {addr}: {source}")]
    CorruptEntry {
        addr: Address,
        denom: Denom,
        source: AmountDecodeError,
    },

    #[error("failed to read hold entry: {0}")]
    BadKey(#[from] KeyError),

    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    /// An underlying failure plus what was being attempted.
    #[error("{action}: {source}")]
    Context {
        action: String,
        #[source]
        source: Box<HoldError>,
    },

    #[error("{0}")]
    Joined(JoinedErrors),
}

impl HoldError {
    pub fn context(self, action: impl Into<String>) -> HoldError {
        HoldError::Context {
            action: action.into(),
            source: Box::new(self),
        }
    }

    /// Combine errors collected over one call. A single error comes back as is.
    pub fn join(mut errors: Vec<HoldError>) -> Option<HoldError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(HoldError::Joined(JoinedErrors(errors))),
        }
    }
}

/// Several errors reported together, one message per line.
#[derive(Debug)]
pub struct JoinedErrors(pub Vec<HoldError>);

impl fmt::Display for JoinedErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, err) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

/// The result of a call that keeps going past per-entry failures.
///
/// `value` is whatever was actually applied or read; `errors` lists the
/// entries that were skipped.
#[derive(Debug)]
pub struct Partial<T> {
    pub value: T,
    pub errors: Vec<HoldError>,
}

impl<T> Partial<T> {
    pub fn new(value: T, errors: Vec<HoldError>) -> Self {
        Self { value, errors }
    }

    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// Split into the value and the joined error, if any.
    pub fn into_parts(self) -> (T, Option<HoldError>) {
        (self.value, HoldError::join(self.errors))
    }

    /// Drop the value if anything went wrong.
    pub fn into_result(self) -> Result<T, HoldError> {
        match HoldError::join(self.errors) {
            None => Ok(self.value),
            Some(err) => Err(err),
        }
    }
}

impl<T: Default> Default for Partial<T> {
    fn default() -> Self {
        Self::new(T::default(), Vec::new())
    }
}

/// Query failures, split the way an RPC layer would map them to status codes.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl QueryError {
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::InvalidArgument(_) => "InvalidArgument",
            QueryError::Internal(_) => "Internal",
        }
    }
}

//! Coins: a denom plus an arbitrary-precision signed amount, and sorted
//! multisets of them.
//!
//! Amounts are signed so that callers can hand us bad input (negative holds)
//! and get a proper error back instead of an unrepresentable value. Anything
//! the ledger persists is non-negative.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};

pub type Denom = String;
pub type Amount = BigInt;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Coin {
    pub denom: Denom,
    #[serde(with = "crate::coin::amount_text")]
    pub amount: Amount,
}

impl Coin {
    pub fn new(denom: impl Into<Denom>, amount: impl Into<Amount>) -> Self {
        Self {
            denom: denom.into(),
            amount: amount.into(),
        }
    }

    pub fn zero(denom: impl Into<Denom>) -> Self {
        Self::new(denom, BigInt::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.amount.is_negative()
    }

    pub fn is_positive(&self) -> bool {
        self.amount.is_positive()
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CoinsParseError {
    #[error("invalid coin expression {0:?}")]
    InvalidCoin(String),
    #[error("invalid denom {0:?}")]
    InvalidDenom(String),
}

impl FromStr for Coin {
    type Err = CoinsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits_start = usize::from(s.starts_with('-'));
        let split = s[digits_start..]
            .find(|c: char| !c.is_ascii_digit())
            .map(|idx| idx + digits_start)
            .unwrap_or(s.len());
        if split == digits_start {
            return Err(CoinsParseError::InvalidCoin(s.to_string()));
        }
        let amount = s[..split]
            .parse::<BigInt>()
            .map_err(|_| CoinsParseError::InvalidCoin(s.to_string()))?;
        let denom = s[split..].trim();
        validate_denom(denom)?;
        Ok(Coin::new(denom, amount))
    }
}

/// Checks a denom against `[a-zA-Z][a-zA-Z0-9/:._-]{2,127}`.
pub fn validate_denom(denom: &str) -> Result<(), CoinsParseError> {
    let mut chars = denom.chars();
    let first_ok = chars.next().map_or(false, |c| c.is_ascii_alphabetic());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | ':' | '.' | '_' | '-'));
    if !first_ok || !rest_ok || denom.len() < 3 || denom.len() > 128 {
        return Err(CoinsParseError::InvalidDenom(denom.to_string()));
    }
    Ok(())
}

/// A list of coins.
///
/// Values built through [`Coins::add_coin`], [`Coins::add`] or [`Coins::new`]
/// are sorted by denom, hold each denom once and contain no zero amounts.
/// [`Coins::from_raw`] keeps whatever it is given, which is how caller input
/// with zero or negative entries reaches validation untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Coins(Vec<Coin>);

impl Coins {
    /// Normalize the given coins: sort, merge duplicate denoms, drop zeros.
    pub fn new(coins: impl IntoIterator<Item = Coin>) -> Self {
        let mut rv = Coins::default();
        for coin in coins {
            rv.add_coin(coin);
        }
        rv
    }

    pub fn from_raw(coins: Vec<Coin>) -> Self {
        Self(coins)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Coin> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when there are no coins or every amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(Coin::is_zero)
    }

    pub fn is_any_negative(&self) -> bool {
        self.0.iter().any(Coin::is_negative)
    }

    pub fn find(&self, denom: &str) -> Option<&Coin> {
        self.0.iter().find(|c| c.denom == denom)
    }

    pub fn amount_of(&self, denom: &str) -> Amount {
        self.find(denom)
            .map(|c| c.amount.clone())
            .unwrap_or_else(BigInt::zero)
    }

    pub fn add_coin(&mut self, coin: Coin) {
        match self
            .0
            .binary_search_by(|existing| existing.denom.as_str().cmp(coin.denom.as_str()))
        {
            Ok(idx) => {
                self.0[idx].amount += coin.amount;
                if self.0[idx].is_zero() {
                    self.0.remove(idx);
                }
            }
            Err(idx) => {
                if !coin.is_zero() {
                    self.0.insert(idx, coin);
                }
            }
        }
    }

    pub fn add(&mut self, other: &Coins) {
        for coin in other.iter() {
            self.add_coin(coin.clone());
        }
    }

    /// Whether the coins are sorted by denom with no denom repeated.
    pub fn is_sorted_unique(&self) -> bool {
        self.0
            .windows(2)
            .all(|pair| pair[0].denom.cmp(&pair[1].denom) == Ordering::Less)
    }

    pub fn into_vec(self) -> Vec<Coin> {
        self.0
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, coin) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{coin}")?;
        }
        Ok(())
    }
}

/// Parses `"10acorn,-3boin,22corn"` as-is (no normalization).
impl FromStr for Coins {
    type Err = CoinsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Coins::default());
        }
        s.split(',')
            .map(str::parse)
            .collect::<Result<Vec<Coin>, _>>()
            .map(Coins::from_raw)
    }
}

impl<'a> IntoIterator for &'a Coins {
    type Item = &'a Coin;
    type IntoIter = std::slice::Iter<'a, Coin>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Coin> for Coins {
    fn from_iter<T: IntoIterator<Item = Coin>>(iter: T) -> Self {
        Coins::new(iter)
    }
}

/// Serde helper: amounts travel as decimal strings so JSON never truncates them.
pub mod amount_text {
    use num_bigint::BigInt;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(amount: &BigInt, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BigInt, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<BigInt>()
            .map_err(|e| de::Error::custom(format!("invalid amount {s:?}: {e}")))
    }
}

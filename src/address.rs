//! Account addresses.
//!
//! An address is an opaque byte string of 1 to 255 bytes. Its textual form is
//! lowercase hex, which is what genesis files, query requests and the CLI use.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Longest address that still fits behind a one byte length prefix.
pub const MAX_ADDR_LEN: usize = 255;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AddressError {
    #[error("address cannot be empty")]
    Empty,
    #[error("address length {0} exceeds maximum of {MAX_ADDR_LEN} bytes")]
    TooLong(usize),
    #[error("decoding hex failed: {0}")]
    Hex(#[from] hex::FromHexError),
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(Vec<u8>);

impl Address {
    /// Wrap raw address bytes, checking the length bounds.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, AddressError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(AddressError::Empty);
        }
        if bytes.len() > MAX_ADDR_LEN {
            return Err(AddressError::TooLong(bytes.len()));
        }
        Ok(Self(bytes))
    }

    /// Wrap raw bytes without any checks. Only key parsing and tests need this.
    pub(crate) fn from_raw(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AddressError::Empty);
        }
        Self::new(hex::decode(s)?)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

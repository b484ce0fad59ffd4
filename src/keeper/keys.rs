//! Hold entry encoding.
//!
//! Key: `0x00 | len(addr) | addr | denom`. The one byte length prefix lets
//! addresses of any length share the keyspace and lets a key be cut back to
//! the address for per-account scans.
//!
//! Value: the amount as base-10 ASCII digits. Digit strings do not sort like
//! numbers; nothing here depends on value order, only key order.

use std::ops::ControlFlow;

use num_bigint::BigInt;
use num_traits::{Signed, Zero};

use crate::address::{Address, AddressError};
use crate::coin::{Amount, Coin, Coins};
use crate::context::Context;
use crate::error::{AmountDecodeError, HoldError, KeyError, Partial};

/// Type byte for hold coin entries.
pub const KEY_PREFIX_HOLD_COIN: &[u8] = &[0x00];

fn length_prefixed(addr: &Address) -> Vec<u8> {
    let bytes = addr.as_bytes();
    if bytes.is_empty() {
        return Vec::new();
    }
    let mut rv = Vec::with_capacity(1 + bytes.len());
    // Address::new caps the length at 255.
    rv.push(bytes.len() as u8);
    rv.extend_from_slice(bytes);
    rv
}

/// `0x00 | len | addr`: the prefix shared by every entry of one account.
/// An empty address yields the bare type prefix.
pub fn create_hold_coin_key_addr_prefix(addr: &Address) -> Vec<u8> {
    let lp = length_prefixed(addr);
    let mut rv = Vec::with_capacity(KEY_PREFIX_HOLD_COIN.len() + lp.len());
    rv.extend_from_slice(KEY_PREFIX_HOLD_COIN);
    rv.extend_from_slice(&lp);
    rv
}

pub fn create_hold_coin_key(addr: &Address, denom: &str) -> Vec<u8> {
    let mut rv = create_hold_coin_key_addr_prefix(addr);
    rv.extend_from_slice(denom.as_bytes());
    rv
}

/// Split a full hold coin key into its address and denom.
pub fn parse_hold_coin_key(key: &[u8]) -> Result<(Address, String), KeyError> {
    if key.is_empty() {
        return Err(KeyError::Empty);
    }
    match key.strip_prefix(KEY_PREFIX_HOLD_COIN) {
        Some(rest) => parse_hold_coin_key_unprefixed(rest),
        None => Err(KeyError::WrongPrefix(hex::encode(key))),
    }
}

/// Same as [`parse_hold_coin_key`] for a key whose type byte is already gone.
/// Pagination cursors have this shape.
pub fn parse_hold_coin_key_unprefixed(key: &[u8]) -> Result<(Address, String), KeyError> {
    let (&len, rest) = key.split_first().ok_or(KeyError::Empty)?;
    let len = usize::from(len);
    if len == 0 {
        return Err(KeyError::NoAddress(hex::encode(key)));
    }
    if rest.len() < len {
        return Err(KeyError::Truncated {
            key: hex::encode(key),
            len,
            remaining: rest.len(),
        });
    }
    let (addr, denom) = rest.split_at(len);
    if denom.is_empty() {
        return Err(KeyError::NoDenom(hex::encode(key)));
    }
    let denom = std::str::from_utf8(denom).map_err(|_| KeyError::DenomEncoding(hex::encode(key)))?;
    Ok((Address::from_raw(addr.to_vec()), denom.to_string()))
}

pub fn marshal_hold_coin_value(amount: &Amount) -> Vec<u8> {
    amount.to_string().into_bytes()
}

/// Decode a stored amount. An empty value is zero; anything other than
/// ASCII digits is an error.
pub fn unmarshal_hold_coin_value(value: &[u8]) -> Result<Amount, AmountDecodeError> {
    if value.is_empty() {
        return Ok(BigInt::zero());
    }
    if !value.iter().all(u8::is_ascii_digit) {
        return Err(AmountDecodeError(String::from_utf8_lossy(value).into_owned()));
    }
    BigInt::parse_bytes(value, 10)
        .ok_or_else(|| AmountDecodeError(String::from_utf8_lossy(value).into_owned()))
}

/// Write the hold amount for one (address, denom). Zero deletes the entry.
pub fn set_hold_coin_amount(
    ctx: &Context,
    addr: &Address,
    denom: &str,
    amount: &Amount,
) -> Result<(), HoldError> {
    // An empty address would leave the key without its length byte.
    if addr.is_empty() {
        return Err(AddressError::Empty.into());
    }
    if denom.is_empty() {
        return Err(HoldError::EmptyDenom { addr: addr.clone() });
    }
    if amount.is_negative() {
        return Err(HoldError::NegativeAmount {
            addr: addr.clone(),
            amount: Coin::new(denom, amount.clone()),
        });
    }

    let key = create_hold_coin_key(addr, denom);
    if amount.is_zero() {
        ctx.store().delete(&key);
    } else {
        ctx.store().set(&key, &marshal_hold_coin_value(amount));
    }
    Ok(())
}

/// Read the hold amount for one (address, denom). Missing means zero.
pub fn get_hold_coin_amount(ctx: &Context, addr: &Address, denom: &str) -> Result<Amount, HoldError> {
    let key = create_hold_coin_key(addr, denom);
    match ctx.store().get(&key) {
        None => Ok(BigInt::zero()),
        Some(value) => unmarshal_hold_coin_value(&value).map_err(|source| HoldError::CorruptEntry {
            addr: addr.clone(),
            denom: denom.to_string(),
            source,
        }),
    }
}

/// Walk every entry under `prefix` in key order, handing each decoded coin
/// to `f` until it breaks. Entries that fail to decode are skipped and
/// returned.
pub fn walk_hold_entries<F>(ctx: &Context, prefix: &[u8], mut f: F) -> Vec<HoldError>
where
    F: FnMut(Address, Coin) -> ControlFlow<()>,
{
    let mut errors = Vec::new();
    for (key, value) in ctx.store().prefix_range(prefix, false) {
        let (addr, denom) = match parse_hold_coin_key(&key) {
            Ok(parsed) => parsed,
            Err(err) => {
                errors.push(err.into());
                continue;
            }
        };
        match unmarshal_hold_coin_value(&value) {
            Ok(amount) => {
                if f(addr, Coin::new(denom, amount)).is_break() {
                    break;
                }
            }
            Err(source) => errors.push(HoldError::CorruptEntry { addr, denom, source }),
        }
    }
    errors
}

/// Everything on hold for one account, with any entries that could not be read.
pub fn account_hold_coins(ctx: &Context, addr: &Address) -> Partial<Coins> {
    let mut coins = Coins::default();
    let errors = walk_hold_entries(ctx, &create_hold_coin_key_addr_prefix(addr), |_, coin| {
        coins.add_coin(coin);
        ControlFlow::Continue(())
    });
    Partial::new(coins, errors)
}

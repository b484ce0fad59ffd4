//! Read-only queries over the hold store.
//!
//! `get_all_holds` pages over accounts rather than rows: a page of N holds
//! is N addresses, however many denoms each one has. The cursor is the raw
//! key of the first row of the next address, minus the type byte.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::coin::{Coin, Coins};
use crate::context::Context;
use crate::error::QueryError;
use crate::genesis::AccountHold;
use crate::store::prefix_end;

use super::keys::{self, KEY_PREFIX_HOLD_COIN};
use super::Keeper;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GetHoldsRequest {
    pub address: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GetHoldsResponse {
    pub amount: Coins,
}

/// Paging parameters. `key` and `offset` are mutually exclusive.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PageRequest {
    #[serde(with = "page_key")]
    pub key: Vec<u8>,
    pub offset: u64,
    pub limit: u64,
    pub count_total: bool,
    pub reverse: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PageResponse {
    #[serde(with = "page_key::optional")]
    pub next_key: Option<Vec<u8>>,
    pub total: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GetAllHoldsRequest {
    #[serde(default)]
    pub pagination: Option<PageRequest>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GetAllHoldsResponse {
    pub holds: Vec<AccountHold>,
    pub pagination: PageResponse,
}

impl Keeper {
    /// Everything on hold for one address.
    pub fn get_holds(&self, ctx: &Context, req: &GetHoldsRequest) -> Result<GetHoldsResponse, QueryError> {
        if req.address.trim().is_empty() {
            return Err(QueryError::InvalidArgument("address cannot be empty".into()));
        }
        let addr = req
            .address
            .parse::<Address>()
            .map_err(|e| QueryError::InvalidArgument(format!("invalid address: {e}")))?;
        let amount = self
            .get_hold_coins(ctx, &addr)
            .into_result()
            .map_err(|e| QueryError::Internal(e.to_string()))?;
        Ok(GetHoldsResponse { amount })
    }

    /// All accounts with funds on hold, one page at a time.
    /// No request, or no page request, means everything with a total.
    pub fn get_all_holds(
        &self,
        ctx: &Context,
        req: Option<&GetAllHoldsRequest>,
    ) -> Result<GetAllHoldsResponse, QueryError> {
        let page = req
            .and_then(|r| r.pagination.clone())
            .unwrap_or_else(|| PageRequest {
                count_total: true,
                ..PageRequest::default()
            });
        self.paginate_all_holds(ctx, &page)
    }

    fn paginate_all_holds(&self, ctx: &Context, page: &PageRequest) -> Result<GetAllHoldsResponse, QueryError> {
        let has_key = !page.key.is_empty();
        if page.offset > 0 && has_key {
            return Err(QueryError::InvalidArgument(
                "either offset or key is expected, got both".into(),
            ));
        }

        let mut limit = page.limit;
        let mut count_total = page.count_total;
        if limit == 0 {
            limit = self.config().default_page_limit;
            count_total = true;
        }

        if has_key {
            keys::parse_hold_coin_key_unprefixed(&page.key)
                .map_err(|e| QueryError::InvalidArgument(format!("invalid pagination key: {e}")))?;
        }

        let store = ctx.store();
        let rows = if !has_key {
            store.prefix_range(KEY_PREFIX_HOLD_COIN, page.reverse)
        } else {
            let start = [KEY_PREFIX_HOLD_COIN, page.key.as_slice()].concat();
            if page.reverse {
                // The cursor row itself is part of the page.
                let mut end = start;
                end.push(0x00);
                store.range(Some(KEY_PREFIX_HOLD_COIN), Some(end.as_slice()), true)
            } else {
                let end = prefix_end(KEY_PREFIX_HOLD_COIN);
                store.range(Some(start.as_slice()), end.as_deref(), false)
            }
        };

        let mut holds: Vec<AccountHold> = Vec::new();
        let mut last_addr: Option<Address> = None;
        let mut num_hits: u64 = 0;
        let mut accumulate = false;
        let mut next_key: Option<Vec<u8>> = None;

        for (key, value) in rows {
            let (addr, denom) = match keys::parse_hold_coin_key(&key) {
                Ok(parsed) => parsed,
                Err(err) => {
                    // Only a row that could land in this page is worth failing over.
                    let full = holds.len() as u64 >= limit;
                    if !full && (has_key || num_hits >= page.offset) {
                        return Err(QueryError::Internal(format!("failed to read hold entry: {err}")));
                    }
                    continue;
                }
            };

            if last_addr.as_ref() != Some(&addr) {
                let full = holds.len() as u64 >= limit;
                if full && next_key.is_none() {
                    next_key = Some(key[KEY_PREFIX_HOLD_COIN.len()..].to_vec());
                    if !count_total {
                        break;
                    }
                }
                num_hits += 1;
                accumulate = !full && (has_key || num_hits > page.offset);
                if accumulate {
                    holds.push(AccountHold::new(&addr, Coins::default()));
                }
                last_addr = Some(addr.clone());
            }

            if !accumulate {
                continue;
            }
            let amount = keys::unmarshal_hold_coin_value(&value).map_err(|e| {
                QueryError::Internal(format!("failed to read amount of {denom} for account {addr}: {e}"))
            })?;
            if let Some(entry) = holds.last_mut() {
                entry.amount.add_coin(Coin::new(denom, amount));
            }
        }

        tracing::trace!(accounts = holds.len(), num_hits, "paged all holds");
        Ok(GetAllHoldsResponse {
            holds,
            pagination: PageResponse {
                next_key,
                total: if count_total { num_hits } else { 0 },
            },
        })
    }
}

/// Page keys travel as base64 text in JSON.
mod page_key {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(key))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        STANDARD.decode(s.as_bytes()).map_err(de::Error::custom)
    }

    pub mod optional {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine as _;
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(key: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
            match key {
                Some(key) => super::serialize(key, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(s) => STANDARD.decode(s.as_bytes()).map(Some).map_err(de::Error::custom),
                None => Ok(None),
            }
        }
    }
}

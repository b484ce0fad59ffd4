//! Ordered byte key-value store the hold ledger persists into.
//!
//! The host application owns the real store; [`MemStore`] is the in-memory
//! implementation used by the CLI and tests.

use std::collections::BTreeMap;
use std::ops::Bound;

use parking_lot::RwLock;

pub type KvPair = (Vec<u8>, Vec<u8>);

/// Minimal ordered KV store.
///
/// `range` takes an inclusive `start` and exclusive `end`; `None` leaves that
/// side open. Results come back in key order, or reversed when asked.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    fn set(&self, key: &[u8], value: &[u8]);
    fn delete(&self, key: &[u8]);
    fn range(&self, start: Option<&[u8]>, end: Option<&[u8]>, reverse: bool) -> Vec<KvPair>;

    fn prefix_range(&self, prefix: &[u8], reverse: bool) -> Vec<KvPair> {
        let end = prefix_end(prefix);
        self.range(Some(prefix), end.as_deref(), reverse)
    }
}

/// Smallest key greater than every key starting with `prefix`.
/// `None` when no such key exists (empty or all-0xff prefix).
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

#[derive(Debug, Default)]
pub struct MemStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KvStore for MemStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &[u8], value: &[u8]) {
        self.entries.write().insert(key.to_vec(), value.to_vec());
    }

    fn delete(&self, key: &[u8]) {
        self.entries.write().remove(key);
    }

    fn range(&self, start: Option<&[u8]>, end: Option<&[u8]>, reverse: bool) -> Vec<KvPair> {
        let lower = start.map_or(Bound::Unbounded, |k| Bound::Included(k.to_vec()));
        let upper = end.map_or(Bound::Unbounded, |k| Bound::Excluded(k.to_vec()));
        if let (Bound::Included(lo), Bound::Excluded(hi)) = (&lower, &upper) {
            if lo >= hi {
                return Vec::new();
            }
        }
        let entries = self.entries.read();
        let iter = entries
            .range::<Vec<u8>, _>((lower, upper))
            .map(|(k, v)| (k.clone(), v.clone()));
        if reverse {
            iter.rev().collect()
        } else {
            iter.collect()
        }
    }
}
